//! Picking one representative frame per cluster, with weights that
//! say how much of the workload each picked frame stands for.

use std::ops::Range;

use ndarray::s;
use num_traits::Zero;
use rand::Rng;

use crate::{
    config::SelectionConfig,
    counter_table::CounterTable,
    features::{FeatureError, FeatureMatrix, extract_features, normalize},
    info,
    kmeans::{KMeansError, KMeansParams, euclidean_distance},
    schema::{MALI_FRAME_SELECTION_V1, PRIMARY_DIMENSION},
};

/// One picked frame. `frame` is relative to the start of the whole
/// counter table, not to the selected range.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SelectionResult {
    pub frame: usize,
    /// Weight for replaying at a fixed frame rate: corrects for the
    /// picked frame's load differing from the cluster's mean load.
    pub fixed_rate_weight: f64,
    /// Weight for replaying with fixed time per frame: the same
    /// correction, via the mean of the inverse loads.
    pub fixed_time_weight: f64,
    /// Cluster members with a nonzero primary metric
    pub num_frames_in_cluster: usize,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum SelectionError {
    #[error("input counter table is empty, can't select any frames")]
    EmptyInput,
    #[error(
        "invalid frame range: start {start}, end {end:?}, for {total} frames \
         (start must be below the end and the number of frames)"
    )]
    InvalidRange {
        start: usize,
        end: Option<usize>,
        total: usize,
    },
    #[error("raw samples have {raw} rows, normalized samples {normalized}")]
    SampleCountMismatch { raw: usize, normalized: usize },
    #[error("extracting features: {0}")]
    Features(#[from] FeatureError),
    #[error("clustering: {0}")]
    KMeans(#[from] KMeansError),
}

/// The frames to select from: `start..end`, `end` defaulting to
/// (and being capped at) the number of frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameRange {
    pub start: usize,
    pub end: Option<usize>,
}

impl FrameRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn resolve(self, total: usize) -> Result<Range<usize>, SelectionError> {
        let Self { start, end } = self;
        let invalid = || SelectionError::InvalidRange { start, end, total };
        if start > total {
            return Err(invalid());
        }
        let capped_end = end.map_or(total, |end| end.min(total));
        if start >= capped_end {
            return Err(invalid());
        }
        Ok(start..capped_end)
    }
}

#[derive(Debug, Clone, Copy)]
struct Representative {
    sample: usize,
    distance: f64,
}

/// Per-cluster bookkeeping, indexed by cluster id. Only samples with
/// a nonzero primary metric are accounted.
#[derive(Debug, Default)]
struct ClusterTally {
    count: usize,
    active_sum: f64,
    inverse_active_sum: f64,
    representative: Option<Representative>,
}

/// Cluster `normalized` (rows matching `raw`), then pick for each
/// cluster the member closest to its center among those with a
/// nonzero primary metric in `raw`. Clusters without such a member
/// are left out of the result, as are samples the clustering left
/// unassigned.
pub fn pick<R: Rng + ?Sized>(
    params: &KMeansParams,
    normalized: &FeatureMatrix,
    raw: &FeatureMatrix,
    range_start: usize,
    rng: &mut R,
) -> Result<Vec<SelectionResult>, SelectionError> {
    let num_samples = normalized.nrows();
    if raw.nrows() != num_samples {
        return Err(SelectionError::SampleCountMismatch {
            raw: raw.nrows(),
            normalized: num_samples,
        });
    }
    if num_samples == 0 {
        return Err(SelectionError::EmptyInput);
    }

    let clustering = params.fit(normalized, rng)?;

    let mut tallies: Vec<ClusterTally> = (0..clustering.num_clusters())
        .map(|_| ClusterTally::default())
        .collect();

    for (sample, cluster) in clustering.assignment.iter().enumerate() {
        let Some(cluster) = *cluster else {
            continue;
        };
        let active = raw[[sample, PRIMARY_DIMENSION]];
        if active.is_zero() {
            continue;
        }
        let tally = &mut tallies[cluster.0];

        let distance = euclidean_distance(clustering.center(cluster), normalized.row(sample));
        let best = tally.representative.map_or(f64::INFINITY, |r| r.distance);
        if distance < best {
            tally.representative = Some(Representative { sample, distance });
        }

        tally.count += 1;
        tally.active_sum += active;
        tally.inverse_active_sum += 1.0 / active;
    }

    let results = tallies
        .iter()
        .filter_map(|tally| {
            let representative = tally.representative?;
            let count = tally.count as f64;
            let raw_weight = count / num_samples as f64;
            let representative_active = raw[[representative.sample, PRIMARY_DIMENSION]];

            let mean_active = tally.active_sum / count;
            let mean_inverse_active = tally.inverse_active_sum / count;
            Some(SelectionResult {
                frame: representative.sample + range_start,
                fixed_rate_weight: (mean_active / representative_active) * raw_weight,
                fixed_time_weight: mean_inverse_active * representative_active * raw_weight,
                num_frames_in_cluster: tally.count,
            })
        })
        .collect();
    Ok(results)
}

/// Select `num_frames` representative frames from the frames of
/// `table` within `range`.
pub fn select_frames<R: Rng + ?Sized>(
    table: &CounterTable,
    range: FrameRange,
    num_frames: usize,
    config: &SelectionConfig,
    rng: &mut R,
) -> Result<Vec<SelectionResult>, SelectionError> {
    if table.is_empty() {
        return Err(SelectionError::EmptyInput);
    }
    let raw = extract_features(table, &MALI_FRAME_SELECTION_V1, config.missing_columns)?;
    let total = raw.nrows();
    info!("running frame selection on dataset containing {total} frames");

    let range = range.resolve(total)?;
    let raw = raw.slice(s![range.clone(), ..]).to_owned();
    info!("number of frames in frame range: {}", raw.nrows());

    let normalized = normalize(&raw)?;
    pick(
        &config.kmeans_params(num_frames),
        &normalized,
        &raw,
        range.start,
        rng,
    )
}

/// The two selections the capture workflow stores side by side.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SelectionSets {
    pub single: Vec<SelectionResult>,
    pub triple: Vec<SelectionResult>,
}

pub fn select_frame_sets<R: Rng + ?Sized>(
    table: &CounterTable,
    range: FrameRange,
    config: &SelectionConfig,
    rng: &mut R,
) -> Result<SelectionSets, SelectionError> {
    Ok(SelectionSets {
        single: select_frames(table, range, 1, config, rng)?,
        triple: select_frames(table, range, 3, config, rng)?,
    })
}
