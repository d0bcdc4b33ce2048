use std::path::PathBuf;

use anyhow::Result;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::{
    collate::COLLATE_RUNS,
    compare::{CompareScope, ThresholdTable},
    config_file::LoadConfigFile,
    kmeans::{DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE, KMeans, KMeansParams},
    schema::MissingColumnPolicy,
    utillib::home::home_dir,
};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
#[serde(default)]
pub struct SelectionConfig {
    /// Centers moving less than this (Euclidean distance in
    /// normalized feature space) count as converged
    pub tolerance: f64,
    /// Give up (with a warning) after this many iterations
    pub max_iterations: usize,
    /// Seed for the random center initialization, which is only used
    /// when there are fewer than 3 frames
    pub random_seed: u64,
    pub missing_columns: MissingColumnPolicy,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            random_seed: 0,
            missing_columns: MissingColumnPolicy::default(),
        }
    }
}

impl SelectionConfig {
    pub fn kmeans_params(&self, k: usize) -> KMeansParams {
        KMeans::params(k)
            .tolerance(self.tolerance)
            .max_iterations(self.max_iterations)
    }

    pub fn rng(&self) -> Xoshiro256PlusPlus {
        Xoshiro256PlusPlus::seed_from_u64(self.random_seed)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
#[serde(default)]
pub struct VerificationConfig {
    /// Number of fast-forward replay runs expected per verification
    pub runs: usize,
    pub scope: CompareScope,
    /// Replaces the built-in table as a whole when given
    pub thresholds: ThresholdTable,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            runs: COLLATE_RUNS,
            scope: CompareScope::default(),
            thresholds: ThresholdTable::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
#[serde(default)]
pub struct EngineConfig {
    pub selection: SelectionConfig,
    pub verification: VerificationConfig,
}

impl LoadConfigFile for EngineConfig {
    fn default_config_path_without_suffix() -> Result<Option<PathBuf>> {
        let home = home_dir()?;
        Ok(Some(home.join(".hwc-frames")))
    }
}
