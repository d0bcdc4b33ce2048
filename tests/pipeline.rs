use anyhow::Result;
use approx::assert_abs_diff_eq;
use itertools::Itertools;

use hwc_frames::{
    compare::CompareScope,
    config::{EngineConfig, VerificationConfig},
    counter_table::CounterTable,
    representative::{FrameRange, select_frame_sets, select_frames},
    schema::{GPU_ACTIVE_CYCLES, MALI_FRAME_SELECTION_V1},
    verify::{fastforward_start_frames, verify_fastforward},
};

/// CSV text with all columns the frame selection reads, as the
/// counter capture writes it.
fn capture_csv(num_frames: usize, value: impl Fn(usize, &str) -> f64) -> String {
    let mut header = vec![GPU_ACTIVE_CYCLES];
    header.extend(MALI_FRAME_SELECTION_V1.secondary_columns());
    let mut s = header.iter().map(|h| format!("\"{h}\"")).join(",");
    s.push_str("\r\n");
    for frame in 0..num_frames {
        s.push_str(&header.iter().map(|h| value(frame, h)).join(","));
        s.push_str("\r\n");
    }
    s
}

fn nine_frames() -> Result<CounterTable> {
    Ok(CounterTable::from_csv_str(&capture_csv(9, |frame, column| {
        match column {
            GPU_ACTIVE_CYCLES => 1000.,
            "Execution core utilization" => frame as f64 * 10.,
            _ => 1.,
        }
    }))?)
}

#[test]
fn three_evenly_spread_groups() -> Result<()> {
    let config = EngineConfig::default();
    let table = nine_frames()?;
    let results = select_frames(
        &table,
        FrameRange::all(),
        3,
        &config.selection,
        &mut config.selection.rng(),
    )?;
    assert_eq!(results.len(), 3);
    let frames: Vec<usize> = results.iter().map(|r| r.frame).collect();
    assert_eq!(frames, [1, 4, 7]);
    for r in &results {
        assert_eq!(r.num_frames_in_cluster, 3);
        assert_abs_diff_eq!(r.fixed_rate_weight, 1. / 3., epsilon = 1e-12);
        assert_abs_diff_eq!(r.fixed_time_weight, 1. / 3., epsilon = 1e-12);
    }
    Ok(())
}

#[test]
fn selection_is_deterministic() -> Result<()> {
    let config = EngineConfig::default();
    let table = CounterTable::from_csv_str(&capture_csv(50, |frame, column| {
        let x = (frame * 37 % 11) as f64;
        match column {
            GPU_ACTIVE_CYCLES => 5000. + x * 100.,
            "Tile unit write bytes" => x * x,
            "Triangle primitives" => 100. - x,
            "Varying unit utilization" => (frame % 3) as f64,
            _ => 2.,
        }
    }))?;
    let select = || {
        select_frame_sets(
            &table,
            FrameRange {
                start: 5,
                end: Some(45),
            },
            &config.selection,
            &mut config.selection.rng(),
        )
    };
    let first = select()?;
    assert_eq!(first, select()?);

    let weight: f64 = first
        .triple
        .iter()
        .map(|r| r.num_frames_in_cluster as f64 / 40.)
        .sum();
    assert_abs_diff_eq!(weight, 1., epsilon = 1e-12);
    for frame in fastforward_start_frames(&first) {
        assert!((5..45).contains(&frame));
    }
    Ok(())
}

#[test]
fn verify_replay_of_selected_frame() -> Result<()> {
    let columns = ["Frame", "GPU active cycles", "Tiles", "Triangle primitives"];
    let source_csv = |frames: std::ops::Range<usize>, noise: &dyn Fn(usize) -> f64| {
        let mut s = columns.join(",");
        s.push('\n');
        for frame in frames {
            s.push_str(&format!(
                "{frame},{},{},{}\n",
                2000. + noise(frame),
                64,
                frame % 4
            ));
        }
        s
    };

    let source = CounterTable::from_csv_str(&source_csv(0..20, &|_| 0.))?;
    // the replay starts at source frame 8; each run has noise on a
    // different frame, which collation removes
    let runs: Vec<CounterTable> = (0..3)
        .map(|run| {
            CounterTable::from_csv_str(&source_csv(8..12, &|frame| {
                if frame % 3 == run { 900. } else { 0. }
            }))
        })
        .collect::<Result<_, _>>()?;

    let report = verify_fastforward(&source, &runs, 9, &VerificationConfig::default())?;
    assert!(report.diffs.is_empty());

    let config = VerificationConfig {
        scope: CompareScope::AllFrames,
        ..Default::default()
    };
    let report = verify_fastforward(&source, &runs, 9, &config)?;
    assert!(report.diffs.is_empty());

    // a replay that draws more than it should
    let heavy: Vec<CounterTable> = (0..3)
        .map(|_| CounterTable::from_csv_str(&source_csv(8..12, &|_| 400.)))
        .collect::<Result<_, _>>()?;
    let report = verify_fastforward(&source, &heavy, 9, &VerificationConfig::default())?;
    assert_eq!(report.diffs.diffs.len(), 1);
    assert_eq!(report.diffs.diffs[0].metric, "GPU active cycles");
    assert_abs_diff_eq!(report.diffs.diffs[0].diff_percentage, -20., epsilon = 1e-9);
    Ok(())
}
