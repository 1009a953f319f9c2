use crate::{
    collect, AggregatedMetric, Aggregator, AnalysisError, Cell, ModelSeries, RATE_MARKER,
};
use std::fs;
use tempfile::tempdir;

#[test]
pub fn averages_over_repetitions() {
    let mut aggregator = Aggregator::new(3).unwrap();
    for rate in [10.0, 20.0, 30.0] {
        aggregator.record("x", 4, rate);
    }

    let metric = aggregator.finish().unwrap();
    assert_eq!(metric.rate("x", 4), Some(20.0));
    assert_eq!(metric.thread_counts, [4]);
}

#[test]
pub fn keeps_insertion_order() {
    let mut aggregator = Aggregator::new(1).unwrap();
    for model in ["sha1", "empty"] {
        for threads in [4, 8, 12] {
            aggregator.record(model, threads, threads as f64);
        }
    }

    let metric = aggregator.finish().unwrap();
    assert_eq!(metric.thread_counts, [4, 8, 12]);
    assert_eq!(
        metric
            .series
            .iter()
            .map(|series| series.model.as_str())
            .collect::<Vec<_>>(),
        ["sha1", "empty"]
    );
    assert_eq!(metric.series("empty").unwrap().rates, [4.0, 8.0, 12.0]);
}

#[test]
pub fn short_series_has_no_rate() {
    let metric = AggregatedMetric {
        thread_counts: vec![4, 8],
        series: vec![ModelSeries {
            model: "x".to_string(),
            rates: vec![1.5],
        }],
    };

    assert_eq!(metric.rate("x", 4), Some(1.5));
    assert_eq!(metric.rate("x", 8), None);
    assert_eq!(metric.rate("x", 16), None);
    assert_eq!(metric.rate("y", 4), None);
}

#[test]
pub fn incomplete_cells_are_errors() {
    let mut aggregator = Aggregator::new(2).unwrap();
    aggregator.record("x", 1, 1.0);
    aggregator.record("x", 1, 1.0);
    aggregator.record("x", 2, 1.0);

    assert!(matches!(
        aggregator.finish(),
        Err(AnalysisError::IncompleteCell { threads: 2, found: 1, expected: 2, .. })
    ));
}

#[test]
pub fn zero_repetitions_are_rejected() {
    assert!(matches!(Aggregator::new(0), Err(AnalysisError::NoRepetitions)));
}

#[test]
pub fn empty_input_gives_empty_metric() {
    assert_eq!(
        Aggregator::new(1).unwrap().finish().unwrap(),
        AggregatedMetric::default()
    );
}

#[test]
pub fn collects_from_log_files() {
    let dir = tempdir().unwrap();
    let mut cells = Vec::new();

    for (threads, rates) in [(1, [100.0, 300.0]), (2, [400.0, 400.0])] {
        for (rep, rate) in rates.iter().enumerate() {
            let path = dir.path().join(format!("x_{threads}_{rep}.log"));
            fs::write(&path, format!("preamble\nEvents per second {rate}\n")).unwrap();
            cells.push(Cell {
                model: "x".to_string(),
                threads,
                path,
            });
        }
    }

    let metric = collect(&cells, 2, RATE_MARKER).unwrap();
    assert_eq!(metric.rate("x", 1), Some(200.0));
    assert_eq!(metric.rate("x", 2), Some(400.0));
}

#[test]
pub fn collect_fails_on_missing_metric() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("x_1_0.log");
    fs::write(&path, "crashed before reporting\n").unwrap();

    let cells = [Cell {
        model: "x".to_string(),
        threads: 1,
        path,
    }];
    assert!(matches!(
        collect(&cells, 1, RATE_MARKER),
        Err(AnalysisError::MetricNotFound { .. })
    ));
}
