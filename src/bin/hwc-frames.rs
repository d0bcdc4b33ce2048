use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use serde::Serialize;

use hwc_frames::{
    collate::collate_runs,
    compare::{CompareScope, compare},
    config::EngineConfig,
    config_file::LoadConfigFile,
    counter_table::CounterTable,
    get_terminal_width::get_terminal_width,
    info,
    representative::{FrameRange, select_frame_sets, select_frames},
    utillib::logging::{LogLevelOpt, set_log_level},
    verify::{fastforward_start_frames, verify_fastforward},
};

const PROGRAM_NAME: &str = "hwc-frames";
const PROGRAM_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(clap::Parser, Debug)]
#[clap(next_line_help = true)]
#[clap(term_width = get_terminal_width(4))]
/// Select representative frames from per-frame GPU hardware counter
/// tables, and verify fast-forwarded replays against their source
/// trace.
struct Opts {
    #[clap(flatten)]
    log_level: LogLevelOpt,

    /// Path to the configuration file (JSON5, YAML or HCL, by file
    /// extension). Default: `~/.hwc-frames.*` if present, built-in
    /// defaults otherwise.
    #[clap(long)]
    config: Option<PathBuf>,

    /// The subcommand to run. Use `--help` after the sub-command to
    /// get a list of the allowed options there.
    #[clap(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct RangeOpts {
    /// First frame to consider (0-based)
    #[clap(long, default_value = "0")]
    start: usize,

    /// Frame after the last frame to consider; default: up to the
    /// last frame in the table
    #[clap(long)]
    end: Option<usize>,
}

impl From<RangeOpts> for FrameRange {
    fn from(RangeOpts { start, end }: RangeOpts) -> Self {
        FrameRange { start, end }
    }
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Print version
    Version,

    /// Select representative frames from a counter table, print them
    /// as JSON.
    Select {
        #[clap(flatten)]
        range: RangeOpts,

        /// Number of frames to select (clusters to form), 1 to 3
        #[clap(short, long, default_value = "1")]
        frames: usize,

        /// Write the JSON here instead of to stdout
        #[clap(short, long)]
        output: Option<PathBuf>,

        /// CSV counter table of the trace, one row per frame
        table: PathBuf,
    },

    /// Run the single and the triple frame selection, write both as
    /// JSON files, and print the frames to start fast-forward traces
    /// at, one per line.
    SelectSets {
        #[clap(flatten)]
        range: RangeOpts,

        /// Directory to write `selected_frames_single.json` and
        /// `selected_frames_triple.json` to
        #[clap(long, default_value = ".")]
        output_dir: PathBuf,

        /// CSV counter table of the trace, one row per frame
        table: PathBuf,
    },

    /// Collate the counter tables from repeated runs into one,
    /// keeping the minimum of each cell.
    Collate {
        /// Where to write the collated CSV table
        #[clap(short, long)]
        output: PathBuf,

        /// CSV counter tables of the runs
        #[clap(required = true)]
        tables: Vec<PathBuf>,
    },

    /// Compare the counters of a fast-forward replay against those of
    /// its source trace, print the differences outside the thresholds
    /// as JSON.
    Compare {
        /// Frame number in the source trace corresponding to the
        /// second frame of the replay (the selected frame; the first
        /// replay frame matches source frame `offset - 1`)
        #[clap(long)]
        offset: usize,

        /// Compare all aligned frames, not only the selected one
        /// (overrides the `scope` from the config file)
        #[clap(long)]
        all_frames: bool,

        /// Write the JSON here instead of to stdout
        #[clap(short, long)]
        output: Option<PathBuf>,

        /// CSV counter table of the fast-forward replay
        ff_table: PathBuf,

        /// CSV counter table of the source trace
        source_table: PathBuf,
    },

    /// Collate the runs of a fast-forward replay and compare the
    /// result against the source trace. The differences are only
    /// written if there are any.
    Verify {
        /// Frame number in the source trace corresponding to the
        /// second frame of the replay (the selected frame; the first
        /// replay frame matches source frame `offset - 1`)
        #[clap(long)]
        offset: usize,

        /// Write the differences JSON here instead of to stdout
        #[clap(short, long)]
        output: Option<PathBuf>,

        /// Also write the collated counter table here
        #[clap(long)]
        collated: Option<PathBuf>,

        /// CSV counter table of the source trace
        source_table: PathBuf,

        /// CSV counter tables of the replay runs
        #[clap(required = true)]
        ff_tables: Vec<PathBuf>,
    },
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            std::fs::write(path, format!("{s}\n")).with_context(|| anyhow!("writing {path:?}"))?
        }
        None => println!("{s}"),
    }
    Ok(())
}

fn read_tables(paths: &[PathBuf]) -> Result<Vec<CounterTable>> {
    paths
        .iter()
        .map(|path| CounterTable::read_csv(path))
        .collect()
}

fn main() -> Result<()> {
    let Opts {
        log_level,
        config,
        command,
    } = Opts::parse();
    set_log_level(log_level.try_into()?);

    let config = EngineConfig::load_config(config, |msg| {
        info!("using default configuration: {msg}");
        Ok(EngineConfig::default())
    })?;
    let EngineConfig {
        selection,
        verification,
    } = config;

    match command {
        Command::Version => println!("{PROGRAM_NAME} version {PROGRAM_VERSION}"),

        Command::Select {
            range,
            frames,
            output,
            table,
        } => {
            let table = CounterTable::read_csv(&table)?;
            let results = select_frames(
                &table,
                range.into(),
                frames,
                &selection,
                &mut selection.rng(),
            )?;
            write_json(&results, output.as_deref())?;
        }

        Command::SelectSets {
            range,
            output_dir,
            table,
        } => {
            let table = CounterTable::read_csv(&table)?;
            let sets = select_frame_sets(&table, range.into(), &selection, &mut selection.rng())?;
            write_json(
                &sets.single,
                Some(output_dir.join("selected_frames_single.json").as_path()),
            )?;
            write_json(
                &sets.triple,
                Some(output_dir.join("selected_frames_triple.json").as_path()),
            )?;
            for frame in fastforward_start_frames(&sets) {
                println!("{frame}");
            }
        }

        Command::Collate { output, tables } => {
            let tables = read_tables(&tables)?;
            let collated = collate_runs(&tables, verification.runs)?;
            collated.write_csv(&output)?;
        }

        Command::Compare {
            offset,
            all_frames,
            output,
            ff_table,
            source_table,
        } => {
            let ff = CounterTable::read_csv(&ff_table)?;
            let source = CounterTable::read_csv(&source_table)?;
            let scope = if all_frames {
                CompareScope::AllFrames
            } else {
                verification.scope
            };
            let report = compare(&ff, &source, offset, &verification.thresholds, scope)?;
            write_json(&report, output.as_deref())?;
        }

        Command::Verify {
            offset,
            output,
            collated,
            source_table,
            ff_tables,
        } => {
            let source = CounterTable::read_csv(&source_table)?;
            let ff_runs = read_tables(&ff_tables)?;
            let report = verify_fastforward(&source, &ff_runs, offset, &verification)?;
            if let Some(path) = collated {
                report.collated.write_csv(&path)?;
            }
            if report.diffs.is_empty() {
                eprintln!("no counter differences outside the thresholds");
            } else {
                eprintln!(
                    "{} counter differences outside the thresholds",
                    report.diffs.diffs.len()
                );
                write_json(&report.diffs, output.as_deref())?;
            }
        }
    }

    Ok(())
}
