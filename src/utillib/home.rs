use std::path::PathBuf;

use anyhow::{Result, anyhow};

/// The user's home directory, from the `HOME` environment variable.
pub fn home_dir() -> Result<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("the HOME environment variable is not set"))
}
