//! Leveled logging to stderr. The level is a process-wide atomic,
//! set once from the command line options (`LogLevelOpt`); library
//! code only ever reads it via the `warn!`, `info!` and `debug!`
//! macros.

use std::{
    io::{StderrLock, Write, stderr},
    sync::atomic::{AtomicU8, Ordering},
};

use anyhow::{Result, bail};
use chrono::{Local, SecondsFormat};

/// Writes the line prefix (local time, level tag, source location)
/// and hands out the locked stderr for the message itself.
pub fn write_prefix(level: LogLevel, file: &str, line: u32) -> StderrLock<'static> {
    let t_str = Local::now().to_rfc3339_opts(SecondsFormat::Millis, false);
    let mut lock = stderr().lock();
    write!(&mut lock, "{t_str}\t[ {} ]\t{file}:{line}\t", level.tag())
        .expect("stderr must not fail");
    lock
}

// Do *not* make the fields public here to force going through `TryFrom`, OK?
#[derive(Debug, clap::Args)]
pub struct LogLevelOpt {
    /// Show what is being done (k-means iterations, table sizes)
    #[clap(short, long)]
    verbose: bool,

    /// Show information that helps debug this program (implies
    /// `--verbose`)
    #[clap(short, long)]
    debug: bool,

    /// Disable warnings, too. Conflicts with `--verbose` and `--debug`.
    #[clap(short, long)]
    quiet: bool,
}

impl TryFrom<LogLevelOpt> for LogLevel {
    type Error = anyhow::Error;

    fn try_from(value: LogLevelOpt) -> Result<Self> {
        let LogLevelOpt {
            verbose,
            debug,
            quiet,
        } = value;
        match (verbose, debug, quiet) {
            (false, false, false) => Ok(LogLevel::Warn),
            (true, false, false) => Ok(LogLevel::Info),
            (_, true, false) => Ok(LogLevel::Debug),
            (false, false, true) => Ok(LogLevel::Quiet),
            (_, _, true) => {
                bail!("option `--quiet` conflicts with the options `--verbose` and `--debug`")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Do not log anything
    Quiet,
    /// The default: only data problems that were recovered from
    /// (missing counters, non-convergence) are shown
    Warn,
    /// Progress of the computations, for the user
    Info,
    /// Highest amount of log statements, for debugging this program
    Debug,
}

impl LogLevel {
    // Not public api, only for sorting or comparisons!
    fn level(self) -> u8 {
        self as u8
    }

    fn from_level(level: u8) -> Option<Self> {
        let slf = match level {
            0 => Some(LogLevel::Quiet),
            1 => Some(LogLevel::Warn),
            2 => Some(LogLevel::Info),
            3 => Some(LogLevel::Debug),
            _ => None,
        }?;
        assert_eq!(slf.level(), level);
        Some(slf)
    }

    pub fn tag(self) -> &'static str {
        match self {
            LogLevel::Quiet => "QUIET",
            LogLevel::Warn => "WARNING",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

impl PartialOrd for LogLevel {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LogLevel {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.level().cmp(&other.level())
    }
}

pub static LOGLEVEL: AtomicU8 = AtomicU8::new(1);

pub fn set_log_level(val: LogLevel) {
    LOGLEVEL.store(val.level(), Ordering::Relaxed);
}

#[inline]
pub fn log_level() -> LogLevel {
    let level = LOGLEVEL.load(Ordering::Relaxed);
    LogLevel::from_level(level).expect("no possibility to store invalid u8")
}

#[macro_export]
macro_rules! warn {
    { $($arg:tt)* } => {
        if $crate::utillib::logging::log_level() >= $crate::utillib::logging::LogLevel::Warn {
            use std::io::Write;
            let mut lock = $crate::utillib::logging::write_prefix(
                $crate::utillib::logging::LogLevel::Warn, file!(), line!());
            writeln!(&mut lock, $($arg)*).expect("stderr must not fail");
        }
    }
}

#[macro_export]
macro_rules! info {
    { $($arg:tt)* } => {
        if $crate::utillib::logging::log_level() >= $crate::utillib::logging::LogLevel::Info {
            use std::io::Write;
            let mut lock = $crate::utillib::logging::write_prefix(
                $crate::utillib::logging::LogLevel::Info, file!(), line!());
            writeln!(&mut lock, $($arg)*).expect("stderr must not fail");
        }
    }
}

#[macro_export]
macro_rules! debug {
    { $($arg:tt)* } => {
        if $crate::utillib::logging::log_level() >= $crate::utillib::logging::LogLevel::Debug {
            use std::io::Write;
            let mut lock = $crate::utillib::logging::write_prefix(
                $crate::utillib::logging::LogLevel::Debug, file!(), line!());
            writeln!(&mut lock, $($arg)*).expect("stderr must not fail");
        }
    }
}
