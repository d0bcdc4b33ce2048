//! Comparing the counters of a fast-forward replay against those of
//! the source trace it was cut from, reporting metrics whose relative
//! difference leaves the allowed band.

use std::collections::BTreeMap;

use lazy_static::lazy_static;

use crate::{
    counter_table::{CounterTable, TableError},
    debug, info, warn,
};

/// Allowed relative difference in percent, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Band {
    pub min: f64,
    pub max: f64,
}

impl Band {
    pub fn contains(&self, percentage: f64) -> bool {
        !(percentage < self.min || percentage > self.max)
    }
}

/// Metrics to compare, by counter name. Columns not listed are not
/// compared.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ThresholdTable(pub BTreeMap<String, Band>);

const DEFAULT_BAND: Band = Band {
    min: -10.,
    max: 10.,
};
const EXACT_BAND: Band = Band { min: 0., max: 0. };

const DEFAULT_METRICS: &[(&str, Band)] = &[
    ("GPU active cycles", DEFAULT_BAND),
    ("Fragment active cycles", DEFAULT_BAND),
    ("Fragment jobs", DEFAULT_BAND),
    ("Non-fragment active cycles", DEFAULT_BAND),
    ("Non-fragment jobs", DEFAULT_BAND),
    ("Tiles", DEFAULT_BAND),
    ("Killed unchanged tiles", DEFAULT_BAND),
    ("Rasterized fine quads", DEFAULT_BAND),
    ("Non-fragment core tasks", DEFAULT_BAND),
    ("Arithmetic FMA pipe instructions", DEFAULT_BAND),
    ("Triangle primitives", EXACT_BAND),
    ("Tiler active cycles", DEFAULT_BAND),
    ("Load/store unit full read issues", DEFAULT_BAND),
    ("Load/store unit partial read issues", DEFAULT_BAND),
    ("Load/store unit full write issues", DEFAULT_BAND),
    ("Load/store unit partial write issues", DEFAULT_BAND),
    ("Load/store unit atomic issues", DEFAULT_BAND),
    ("Output external read beats", DEFAULT_BAND),
    ("Output external write beats", DEFAULT_BAND),
    ("Ray tracing triangle batches tested", DEFAULT_BAND),
    ("Ray tracing box tests", DEFAULT_BAND),
    ("Ray tracing started rays", EXACT_BAND),
    ("Ray tracing box tester issue cycles", DEFAULT_BAND),
    ("Ray tracing triangle tester issue cycles", DEFAULT_BAND),
    ("Ray tracing unit active cycles", DEFAULT_BAND),
];

lazy_static! {
    static ref DEFAULT_THRESHOLDS: ThresholdTable = ThresholdTable(
        DEFAULT_METRICS
            .iter()
            .map(|(name, band)| (name.to_string(), *band))
            .collect()
    );
}

impl Default for ThresholdTable {
    fn default() -> Self {
        DEFAULT_THRESHOLDS.clone()
    }
}

impl ThresholdTable {
    pub fn get(&self, metric: &str) -> Option<&Band> {
        self.0.get(metric)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Which aligned rows are compared.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize,
    strum_macros::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab_case")]
pub enum CompareScope {
    /// Only the row where the running frame counter reaches
    /// `offset + 1`
    #[default]
    SelectedFrame,
    /// Every aligned row
    AllFrames,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DiffRecord {
    pub source_frame: usize,
    pub ff_frame: usize,
    pub metric: String,
    pub source_value: f64,
    pub ff_value: f64,
    /// `source_value - ff_value`
    pub diff_value: f64,
    pub diff_ratio: f64,
    pub diff_percentage: f64,
    pub min_threshold: f64,
    pub max_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct DiffReport {
    pub diffs: Vec<DiffRecord>,
}

impl DiffReport {
    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }
}

/// Relative difference; a zero source value gives ±999 by the sign
/// of the difference, or 0 if there is none.
pub fn diff_ratio(source_value: f64, diff_value: f64) -> f64 {
    if source_value != 0. {
        diff_value / source_value
    } else if diff_value != 0. {
        999. * diff_value.signum()
    } else {
        0.
    }
}

/// Compare `ff` against `source`. The first ff row is aligned with
/// source row `offset - 1` (row 0 for offset 0), so ff row 1 (the frame compared with
/// `CompareScope::SelectedFrame`) is aligned with source row
/// `offset`. Both tables must have identical headers.
pub fn compare(
    ff: &CounterTable,
    source: &CounterTable,
    offset: usize,
    thresholds: &ThresholdTable,
    scope: CompareScope,
) -> Result<DiffReport, TableError> {
    ff.check_same_header(source)?;

    let metrics: Vec<(usize, &str, &Band)> = ff
        .header()
        .iter()
        .enumerate()
        .filter_map(|(column, name)| {
            thresholds
                .get(name.as_str())
                .map(|band| (column, name.as_str(), band))
        })
        .collect();
    debug!("comparing {} metrics", metrics.len());

    let mut report = DiffReport::default();
    let mut source_rows = offset.saturating_sub(1)..source.num_rows();
    let mut frame_counter = offset;
    for ff_row in 0..ff.num_rows() {
        let Some(source_row) = source_rows.next() else {
            warn!("source counter table ran out of rows early, at ff frame {ff_row}");
            break;
        };

        let in_scope = match scope {
            CompareScope::SelectedFrame => frame_counter == offset + 1,
            CompareScope::AllFrames => true,
        };
        if in_scope {
            for &(column, metric, band) in &metrics {
                let ff_frame = frame_counter - offset;
                let (ff_value, source_value) =
                    match (ff.value(ff_row, column), source.value(source_row, column)) {
                        (Ok(Some(f)), Ok(Some(s))) => (f, s),
                        _ => {
                            warn!(
                                "missing or invalid value when comparing ff frame {ff_frame} \
                                 with source frame {source_row}, column {metric:?}: {:?} {:?}",
                                ff.cell(ff_row, column),
                                source.cell(source_row, column)
                            );
                            continue;
                        }
                    };

                let diff_value = source_value - ff_value;
                let diff_ratio = diff_ratio(source_value, diff_value);
                let diff_percentage = diff_ratio * 100.;
                if !band.contains(diff_percentage) {
                    info!(
                        "diff above {}% or below {}% when comparing ff frame {ff_frame} \
                         with source frame {source_row}, column {metric:?}: \
                         {ff_value} {source_value} ({diff_percentage}%)",
                        band.max,
                        band.min
                    );
                    report.diffs.push(DiffRecord {
                        source_frame: frame_counter,
                        ff_frame,
                        metric: metric.to_string(),
                        source_value,
                        ff_value,
                        diff_value,
                        diff_ratio,
                        diff_percentage,
                        min_threshold: band.min,
                        max_threshold: band.max,
                    });
                }
            }
        }
        frame_counter += 1;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use anyhow::Result;

    use super::*;

    const HEADER: &[&str] = &["Frame", "GPU active cycles", "Triangle primitives"];

    fn table(rows: &[[f64; 3]]) -> CounterTable {
        CounterTable::from_values(
            HEADER,
            rows.iter().map(|row| row.iter().map(|v| Some(*v)).collect()),
        )
        .expect("three cells per row")
    }

    fn source() -> CounterTable {
        table(&[
            [0., 100., 10.],
            [1., 100., 10.],
            [2., 100., 10.],
            [3., 100., 10.],
            [4., 100., 10.],
        ])
    }

    #[test]
    fn t_default_thresholds() {
        let t = ThresholdTable::default();
        assert_eq!(t.len(), 25);
        assert_eq!(t.get("Triangle primitives"), Some(&EXACT_BAND));
        assert_eq!(t.get("Ray tracing started rays"), Some(&EXACT_BAND));
        assert_eq!(t.get("GPU active cycles"), Some(&DEFAULT_BAND));
        assert_eq!(t.get("Frame"), None);
    }

    #[test]
    fn t_identical_tables_have_no_diffs() -> Result<()> {
        let s = source();
        for offset in 0..4 {
            for scope in [CompareScope::SelectedFrame, CompareScope::AllFrames] {
                let report = compare(&s, &s, offset, &ThresholdTable::default(), scope)?;
                assert!(report.is_empty());
            }
        }
        Ok(())
    }

    #[test]
    fn t_band_boundaries() -> Result<()> {
        // ff row 1 aligns with source row 2 for offset 2
        let ff_at_boundary = table(&[[0., 0., 0.], [2., 90., 10.]]);
        let report = compare(
            &ff_at_boundary,
            &source(),
            2,
            &ThresholdTable::default(),
            CompareScope::SelectedFrame,
        )?;
        assert!(report.is_empty(), "10% is inside the band");

        let ff_over = table(&[[0., 0., 0.], [2., 89., 11.]]);
        let report = compare(
            &ff_over,
            &source(),
            2,
            &ThresholdTable::default(),
            CompareScope::SelectedFrame,
        )?;
        assert_eq!(report.diffs.len(), 2);
        let gpu = &report.diffs[0];
        assert_eq!(gpu.metric, "GPU active cycles");
        assert_eq!(gpu.source_frame, 3);
        assert_eq!(gpu.ff_frame, 1);
        assert_eq!(gpu.source_value, 100.);
        assert_eq!(gpu.ff_value, 89.);
        assert_eq!(gpu.diff_value, 11.);
        assert!((gpu.diff_percentage - 11.).abs() < 1e-9);
        assert_eq!((gpu.min_threshold, gpu.max_threshold), (-10., 10.));
        let triangles = &report.diffs[1];
        assert_eq!(triangles.metric, "Triangle primitives");
        assert_eq!(triangles.diff_value, -1.);
        assert!((triangles.diff_percentage + 10.).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn t_selected_ff_row_aligns_with_source_row_offset() -> Result<()> {
        let source = table(&[
            [0., 100., 10.],
            [1., 200., 10.],
            [2., 300., 10.],
            [3., 400., 10.],
        ]);
        // ff row 0 is source frame 1, ff row 1 is source frame 2
        let ff = table(&[[1., 200., 10.], [2., 300., 10.], [3., 400., 10.]]);
        for scope in [CompareScope::SelectedFrame, CompareScope::AllFrames] {
            let report = compare(&ff, &source, 2, &ThresholdTable::default(), scope)?;
            assert!(report.is_empty());
        }
        // one frame off, every aligned row differs
        let report = compare(
            &ff,
            &source,
            3,
            &ThresholdTable::default(),
            CompareScope::SelectedFrame,
        )?;
        assert_eq!(report.diffs.len(), 1);
        assert_eq!(report.diffs[0].source_value, 400.);
        assert_eq!(report.diffs[0].ff_value, 300.);
        Ok(())
    }

    #[test]
    fn t_zero_source_sentinel() -> Result<()> {
        assert_eq!(diff_ratio(0., 5.), 999.);
        assert_eq!(diff_ratio(0., -5.), -999.);
        assert_eq!(diff_ratio(0., 0.), 0.);
        assert_eq!(diff_ratio(4., 1.), 0.25);

        let source = table(&[[0., 0., 0.], [1., 0., 0.]]);
        let ff = table(&[[0., 0., 0.], [1., 7., 0.]]);
        let report = compare(
            &ff,
            &source,
            0,
            &ThresholdTable::default(),
            CompareScope::SelectedFrame,
        )?;
        assert_eq!(report.diffs.len(), 1);
        assert_eq!(report.diffs[0].diff_ratio, -999.);
        assert_eq!(report.diffs[0].diff_percentage, -99900.);
        Ok(())
    }

    #[test]
    fn t_only_selected_frame_unless_all_frames() -> Result<()> {
        let ff = table(&[[0., 50., 10.], [1., 100., 10.], [2., 50., 10.]]);
        let selected = compare(
            &ff,
            &source(),
            1,
            &ThresholdTable::default(),
            CompareScope::SelectedFrame,
        )?;
        assert!(selected.is_empty());

        let all = compare(
            &ff,
            &source(),
            1,
            &ThresholdTable::default(),
            CompareScope::AllFrames,
        )?;
        let frames: Vec<(usize, usize)> = all
            .diffs
            .iter()
            .map(|d| (d.source_frame, d.ff_frame))
            .collect();
        assert_eq!(frames, [(1, 0), (3, 2)]);
        Ok(())
    }

    #[test]
    fn t_missing_cells_are_skipped() -> Result<()> {
        let source = table(&[[0., 100., 10.], [1., 100., 10.]]);
        let ff = CounterTable::from_values(
            HEADER,
            vec![
                vec![Some(0.), Some(0.), Some(0.)],
                vec![Some(1.), None, Some(20.)],
            ],
        )?;
        let report = compare(
            &ff,
            &source,
            0,
            &ThresholdTable::default(),
            CompareScope::SelectedFrame,
        )?;
        assert_eq!(report.diffs.len(), 1);
        assert_eq!(report.diffs[0].metric, "Triangle primitives");
        Ok(())
    }

    #[test]
    fn t_short_source_stops_comparison() -> Result<()> {
        let ff = table(&[[0., 1., 1.], [1., 1., 1.], [2., 1., 1.]]);
        let report = compare(
            &ff,
            &source(),
            4,
            &ThresholdTable::default(),
            CompareScope::AllFrames,
        )?;
        // only source rows 3 and 4 remain
        assert_eq!(report.diffs.len(), 4);
        Ok(())
    }

    #[test]
    fn t_header_mismatch() {
        let other = CounterTable::from_csv_str("Frame,GPU active cycles\n0,1\n").unwrap();
        assert!(matches!(
            compare(
                &other,
                &source(),
                0,
                &ThresholdTable::default(),
                CompareScope::SelectedFrame
            ),
            Err(TableError::HeaderMismatch { .. })
        ));
    }

    #[test]
    fn t_scope_from_str() {
        assert_eq!(
            CompareScope::from_str("all-frames").unwrap(),
            CompareScope::AllFrames
        );
        assert_eq!(
            CompareScope::from_str("selected-frame").unwrap(),
            CompareScope::SelectedFrame
        );
    }
}
