//! The declared contract between the counter capture and feature
//! extraction: which counter columns are read, and which feature
//! dimensions are derived from them, in which order.

use std::fmt::Display;

use lazy_static::lazy_static;

/// What to do when a non-primary schema column is absent from the
/// counter table. (A missing primary column is always zero-filled
/// with a warning.)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize,
    strum_macros::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab_case")]
pub enum MissingColumnPolicy {
    /// Treat the column as all zeros, warn once per column
    #[default]
    ZeroFill,
    /// Fail the extraction
    Strict,
}

/// How a feature dimension is computed from the counter columns.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureSource {
    /// The value of one column
    Column(&'static str),
    /// Sum of the given columns divided by the primary column's value
    /// of the same frame (NaN or infinite for a zero primary value)
    SumPerPrimary(&'static [&'static str]),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureDimension {
    pub name: &'static str,
    pub source: FeatureSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CounterSchema {
    pub name: &'static str,
    pub version: u32,
    /// The load metric, always output as dimension 0
    pub primary_column: &'static str,
    /// Dimensions after the primary one, in output order
    pub dimensions: Vec<FeatureDimension>,
}

impl Display for CounterSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} v{}", self.name, self.version)
    }
}

pub const GPU_ACTIVE_CYCLES: &str = "GPU active cycles";

/// Index of the primary metric in every feature vector.
pub const PRIMARY_DIMENSION: usize = 0;

const BYTES_COLUMNS: &[&str] = &[
    "Tile unit write bytes",
    "Load/store unit write bytes",
    "Load/store unit read bytes from L2 cache",
    "Texture unit read bytes from L2 cache",
    "Front-end unit read bytes from L2 cache",
];

const PRIMITIVES_COLUMNS: &[&str] = &[
    "Point primitives",
    "Line primitives",
    "Triangle primitives",
];

lazy_static! {
    /// Mali counter names, as written by the on-device counter capture.
    pub static ref MALI_FRAME_SELECTION_V1: CounterSchema = CounterSchema {
        name: "mali-frame-selection",
        version: 1,
        primary_column: GPU_ACTIVE_CYCLES,
        dimensions: vec![
            FeatureDimension {
                name: "Bytes/Cy",
                source: FeatureSource::SumPerPrimary(BYTES_COLUMNS),
            },
            FeatureDimension {
                name: "Prim/Cy",
                source: FeatureSource::SumPerPrimary(PRIMITIVES_COLUMNS),
            },
            FeatureDimension {
                name: "EE Util",
                source: FeatureSource::Column("Execution core utilization"),
            },
            FeatureDimension {
                name: "LSC Util",
                source: FeatureSource::Column("Load/store unit utilization"),
            },
            FeatureDimension {
                name: "Var Util",
                source: FeatureSource::Column("Varying unit utilization"),
            },
            FeatureDimension {
                name: "Tex Util",
                source: FeatureSource::Column("Texture unit utilization"),
            },
        ],
    };
}

impl CounterSchema {
    /// Number of feature dimensions including the primary one.
    pub fn dimensionality(&self) -> usize {
        1 + self.dimensions.len()
    }

    /// Names of the output dimensions, primary first.
    pub fn dimension_names(&self) -> Vec<&'static str> {
        let mut names = vec!["GPU Active"];
        names.extend(self.dimensions.iter().map(|d| d.name));
        names
    }

    /// All input columns the schema reads except the primary one,
    /// deduplicated, in first-use order.
    pub fn secondary_columns(&self) -> Vec<&'static str> {
        let mut columns: Vec<&'static str> = Vec::new();
        for dimension in &self.dimensions {
            let used: &[&'static str] = match &dimension.source {
                FeatureSource::Column(column) => std::slice::from_ref(column),
                FeatureSource::SumPerPrimary(columns) => columns,
            };
            for column in used {
                if !columns.contains(column) && *column != self.primary_column {
                    columns.push(*column);
                }
            }
        }
        columns
    }
}
