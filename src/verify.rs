//! Verifying a fast-forward replay: its repeated counter captures are
//! collated and then compared against the source trace's counters.

use itertools::Itertools;

use crate::{
    collate::collate_runs,
    compare::{DiffReport, compare},
    config::VerificationConfig,
    counter_table::{CounterTable, TableError},
    info,
    representative::SelectionSets,
};

#[derive(Debug, Clone, PartialEq)]
pub struct VerifyReport {
    /// Cell-wise minimum of the replay runs
    pub collated: CounterTable,
    pub diffs: DiffReport,
}

/// `source` is the counter table of the full source trace, `ff_runs`
/// those of the replay runs, whose second frame (the selected one)
/// is frame `offset` of the source.
pub fn verify_fastforward(
    source: &CounterTable,
    ff_runs: &[CounterTable],
    offset: usize,
    config: &VerificationConfig,
) -> Result<VerifyReport, TableError> {
    let collated = collate_runs(ff_runs, config.runs)?;
    let diffs = compare(&collated, source, offset, &config.thresholds, config.scope)?;
    if diffs.is_empty() {
        info!("no counter differences outside the thresholds");
    } else {
        info!("{} counter differences outside the thresholds", diffs.diffs.len());
    }
    Ok(VerifyReport { collated, diffs })
}

/// The frames at which fast-forward traces are cut: every frame of
/// both selections, each once, single selection first.
pub fn fastforward_start_frames(sets: &SelectionSets) -> Vec<usize> {
    sets.single
        .iter()
        .chain(&sets.triple)
        .map(|result| result.frame)
        .unique()
        .collect()
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;
    use crate::{
        compare::CompareScope,
        representative::SelectionResult,
    };

    fn result(frame: usize) -> SelectionResult {
        SelectionResult {
            frame,
            fixed_rate_weight: 1.,
            fixed_time_weight: 1.,
            num_frames_in_cluster: 1,
        }
    }

    #[test]
    fn t_start_frames_are_deduplicated() {
        let sets = SelectionSets {
            single: vec![result(40)],
            triple: vec![result(12), result(40), result(77)],
        };
        assert_eq!(fastforward_start_frames(&sets), [40, 12, 77]);
    }

    fn table(active: &[f64]) -> CounterTable {
        CounterTable::from_values(
            &["GPU active cycles", "Tiles"],
            active.iter().map(|a| vec![Some(*a), Some(16.)]),
        )
        .expect("two cells per row")
    }

    #[test]
    fn t_noise_is_collated_away() -> Result<()> {
        let source = table(&[100., 100., 100., 100.]);
        // one noisy run per row, the minimum matches the source
        let runs = [
            table(&[100., 100., 130.]),
            table(&[150., 100., 100.]),
            table(&[100., 180., 100.]),
        ];
        let config = VerificationConfig {
            scope: CompareScope::AllFrames,
            ..Default::default()
        };
        let report = verify_fastforward(&source, &runs, 1, &config)?;
        assert_eq!(report.collated, table(&[100., 100., 100.]));
        assert!(report.diffs.is_empty());
        Ok(())
    }

    #[test]
    fn t_real_difference_is_reported() -> Result<()> {
        let source = table(&[100., 100., 100., 100.]);
        let runs = [
            table(&[100., 120., 100.]),
            table(&[100., 125., 100.]),
            table(&[100., 121., 100.]),
        ];
        let report = verify_fastforward(&source, &runs, 1, &VerificationConfig::default())?;
        assert_eq!(report.diffs.diffs.len(), 1);
        let diff = &report.diffs.diffs[0];
        assert_eq!(diff.metric, "GPU active cycles");
        assert_eq!(diff.ff_value, 120.);
        assert_eq!((diff.source_frame, diff.ff_frame), (2, 1));
        Ok(())
    }
}
