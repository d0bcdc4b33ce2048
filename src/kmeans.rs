//! K-means over normalized feature vectors, with centers seeded from
//! evenly spaced samples.
//!
//! Only when there are fewer than 3 samples (no spacing possible) are
//! the centers drawn at random, from the caller's `Rng`.

use ndarray::{Array2, ArrayView1};
use rand::Rng;

use crate::{debug, features::FeatureMatrix, info, warn};

pub const DEFAULT_TOLERANCE: f64 = 0.001;
pub const DEFAULT_MAX_ITERATIONS: usize = 1000;

/// Index of a cluster, i.e. of a row in `KMeansResult::centers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::From)]
pub struct ClusterId(pub usize);

/// How the initial centers were chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seeding {
    /// Center `i` started as a copy of sample `offset + i * step`
    Spaced { step: usize, offset: usize },
    /// Centers were drawn uniformly from [0, 1)^d; the result depends
    /// on the random source
    Random,
}

impl Seeding {
    pub fn is_deterministic(self) -> bool {
        match self {
            Seeding::Spaced { .. } => true,
            Seeding::Random => false,
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum KMeansError {
    #[error("the number of clusters must be at least 1")]
    NoClusters,
    #[error("no samples to cluster")]
    NoSamples,
    #[error(
        "cannot seed {k} clusters from {num_samples} samples \
         (seed step {step}, offset {offset}): too many clusters"
    )]
    TooManyClusters {
        k: usize,
        num_samples: usize,
        step: usize,
        offset: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct KMeansParams {
    k: usize,
    tolerance: f64,
    max_iterations: usize,
}

/// Entry point for the builder: `KMeans::params(3).tolerance(1e-4).fit(..)`.
pub struct KMeans;

impl KMeans {
    pub fn params(k: usize) -> KMeansParams {
        KMeansParams {
            k,
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KMeansResult {
    /// Cluster of each sample, in sample order. `None` for samples
    /// that never had a finite distance to any center (e.g. NaN
    /// features); they take no part in any cluster's mean.
    pub assignment: Vec<Option<ClusterId>>,
    /// One row per cluster
    pub centers: Array2<f64>,
    /// Number of assignment/update rounds that were run
    pub iterations: usize,
    /// False if the iteration limit stopped the run
    pub converged: bool,
    pub seeding: Seeding,
}

impl KMeansResult {
    pub fn num_clusters(&self) -> usize {
        self.centers.nrows()
    }

    pub fn center(&self, cluster: ClusterId) -> ArrayView1<'_, f64> {
        self.centers.row(cluster.0)
    }
}

pub fn euclidean_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = y - x;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

impl KMeansParams {
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    fn seed_centers<R: Rng + ?Sized>(
        &self,
        samples: &FeatureMatrix,
        rng: &mut R,
    ) -> Result<(Array2<f64>, Seeding), KMeansError> {
        let Self { k, .. } = *self;
        let (num_samples, sample_size) = samples.dim();
        let step = num_samples / 3;
        let offset = step / 2;

        if step == 0 {
            warn!(
                "only {num_samples} samples, seeding {k} cluster centers at random, \
                 the result is not reproducible"
            );
            let centers = Array2::from_shape_fn((k, sample_size), |_| rng.gen_range(0.0..1.0));
            return Ok((centers, Seeding::Random));
        }

        if offset + (k - 1) * step >= num_samples {
            return Err(KMeansError::TooManyClusters {
                k,
                num_samples,
                step,
                offset,
            });
        }
        info!("initializing clusters using step size {step} and initial offset {offset}");
        let mut centers = Array2::zeros((k, sample_size));
        for (i, mut center) in centers.rows_mut().into_iter().enumerate() {
            center.assign(&samples.row(offset + i * step));
        }
        Ok((centers, Seeding::Spaced { step, offset }))
    }

    /// Cluster the rows of `samples`. `rng` is only used if there are
    /// fewer than 3 samples.
    pub fn fit<R: Rng + ?Sized>(
        &self,
        samples: &FeatureMatrix,
        rng: &mut R,
    ) -> Result<KMeansResult, KMeansError> {
        let Self {
            k,
            tolerance,
            max_iterations,
        } = *self;
        if k == 0 {
            return Err(KMeansError::NoClusters);
        }
        let (num_samples, sample_size) = samples.dim();
        if num_samples == 0 {
            return Err(KMeansError::NoSamples);
        }

        let (mut centers, seeding) = self.seed_centers(samples, rng)?;

        // Samples whose distance to every center is NaN keep their
        // previous cluster, or stay unassigned.
        let mut assignment: Vec<Option<ClusterId>> = vec![None; num_samples];
        let mut iterations = 0;
        let converged = loop {
            info!("running k-means iteration {iterations} with {k} clusters");

            for (sample, cluster) in samples.rows().into_iter().zip(assignment.iter_mut()) {
                let mut min_dist = f64::INFINITY;
                for (cluster_index, center) in centers.rows().into_iter().enumerate() {
                    let dist = euclidean_distance(sample, center);
                    if dist < min_dist {
                        min_dist = dist;
                        *cluster = Some(cluster_index.into());
                    }
                }
            }

            let mut counts = vec![0usize; k];
            let mut sums = Array2::<f64>::zeros((k, sample_size));
            for (sample, cluster) in samples.rows().into_iter().zip(&assignment) {
                let Some(cluster) = cluster else {
                    continue;
                };
                counts[cluster.0] += 1;
                let mut sum = sums.row_mut(cluster.0);
                sum += &sample;
            }

            let mut done = true;
            for (cluster_index, count) in counts.iter().enumerate() {
                if *count == 0 {
                    // Empty clusters keep their center
                    continue;
                }
                let new_center = sums.row(cluster_index).mapv(|v| v / *count as f64);
                let moved = euclidean_distance(new_center.view(), centers.row(cluster_index));
                debug!("cluster {cluster_index}: {count} samples, center moved by {moved}");
                // (NaN movement does not count as movement)
                if moved > tolerance {
                    done = false;
                    centers.row_mut(cluster_index).assign(&new_center);
                }
            }

            iterations += 1;

            if done {
                break true;
            }
            if iterations > max_iterations {
                warn!(
                    "k-means reached the maximum number of iterations, {max_iterations}, \
                     selected frames may not be great"
                );
                break false;
            }
        };

        info!("finished k-means after {iterations} iterations");

        Ok(KMeansResult {
            assignment,
            centers,
            iterations,
            converged,
            seeding,
        })
    }
}
