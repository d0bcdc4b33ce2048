//! Turning a counter table into feature vectors (one row per frame)
//! and min-max normalizing them.

use std::collections::BTreeMap;

use ndarray::Array2;

use crate::{
    counter_table::{CounterTable, TableError},
    schema::{CounterSchema, FeatureSource, MissingColumnPolicy, PRIMARY_DIMENSION},
    warn,
};

/// Rows are frames, columns feature dimensions, column
/// `PRIMARY_DIMENSION` is the primary load metric.
pub type FeatureMatrix = Array2<f64>;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum FeatureError {
    #[error("no samples to work on")]
    EmptyInput,
    #[error("counter table does not match schema {schema}, missing columns: {missing:?}")]
    SchemaMismatch {
        schema: String,
        missing: Vec<String>,
    },
    #[error("reading counter values: {0}")]
    Table(#[from] TableError),
}

/// One feature vector per table row, laid out as declared by
/// `schema`. Empty cells count as 0. The per-primary dimensions are
/// NaN or infinite for frames with a zero primary value.
pub fn extract_features(
    table: &CounterTable,
    schema: &CounterSchema,
    policy: MissingColumnPolicy,
) -> Result<FeatureMatrix, FeatureError> {
    let primary_index = table.column_index(schema.primary_column);
    if primary_index.is_none() {
        warn!(
            "{:?} counter is missing, setting it to 0 for all frames",
            schema.primary_column
        );
    }

    let mut column_indices: BTreeMap<&str, Option<usize>> = BTreeMap::new();
    let mut missing = Vec::new();
    for column in schema.secondary_columns() {
        let index = table.column_index(column);
        if index.is_none() {
            missing.push(column.to_string());
        }
        column_indices.insert(column, index);
    }
    if !missing.is_empty() {
        match policy {
            MissingColumnPolicy::Strict => {
                return Err(FeatureError::SchemaMismatch {
                    schema: schema.to_string(),
                    missing,
                });
            }
            MissingColumnPolicy::ZeroFill => {
                for column in &missing {
                    warn!("{column:?} counter is missing (schema {schema}), using 0 for all frames");
                }
            }
        }
    }

    let value = |row: usize, index: Option<usize>| -> Result<f64, TableError> {
        match index {
            Some(index) => Ok(table.value(row, index)?.unwrap_or(0.)),
            None => Ok(0.),
        }
    };

    let mut samples = Array2::zeros((table.num_rows(), schema.dimensionality()));
    for (row, mut sample) in samples.rows_mut().into_iter().enumerate() {
        let active = value(row, primary_index)?;
        sample[PRIMARY_DIMENSION] = active;
        for (i, dimension) in schema.dimensions.iter().enumerate() {
            sample[i + 1] = match &dimension.source {
                FeatureSource::Column(column) => value(row, column_indices[column])?,
                FeatureSource::SumPerPrimary(columns) => {
                    let mut sum = 0.;
                    for column in columns.iter() {
                        sum += value(row, column_indices[column])?;
                    }
                    sum / active
                }
            };
        }
    }
    Ok(samples)
}

/// Rescale each dimension into [0, 1] using its min and max over all
/// samples. Dimensions without range map to exactly 0. NaN values
/// take no part in finding min and max.
pub fn normalize(samples: &FeatureMatrix) -> Result<FeatureMatrix, FeatureError> {
    let (num_samples, sample_size) = samples.dim();
    if num_samples == 0 {
        return Err(FeatureError::EmptyInput);
    }

    let mut mins = vec![f64::INFINITY; sample_size];
    let mut maxes = vec![f64::NEG_INFINITY; sample_size];
    for sample in samples.rows() {
        for (i, &value) in sample.iter().enumerate() {
            if maxes[i] < value {
                maxes[i] = value;
            }
            if mins[i] > value {
                mins[i] = value;
            }
        }
    }

    let mut normalized = Array2::zeros((num_samples, sample_size));
    for ((row, i), &value) in samples.indexed_iter() {
        let range = maxes[i] - mins[i];
        if range > 0.0 {
            normalized[[row, i]] = (value - mins[i]) / range;
        }
    }
    Ok(normalized)
}
