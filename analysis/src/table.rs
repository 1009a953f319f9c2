
use crate::{AggregatedMetric, AnalysisError};
use std::{fmt::Write as _, io::Write};

/// Summary table as CSV, one row per model and one column per thread count.
/// Every field is followed by a comma, the trailing one included.
pub fn write_csv<W: Write>(metric: &AggregatedMetric, mut writer: W) -> Result<(), AnalysisError> {
    write!(writer, "Benchmark,")?;
    for threads in metric.thread_counts.iter() {
        write!(writer, "{threads},")?;
    }
    writeln!(writer)?;

    for series in metric.series.iter() {
        write!(writer, "{},", series.model)?;
        for rate in series.rates.iter() {
            write!(writer, "{rate},")?;
        }
        writeln!(writer)?;
    }

    writer.flush()?;

    Ok(())
}

/// aligned plain text rendering of the summary for the log
pub fn render_table(metric: &AggregatedMetric) -> String {
    let width = metric
        .series
        .iter()
        .map(|series| series.model.len())
        .max()
        .unwrap_or(0)
        .max("model".len());

    let mut table = format!("{:<width$}", "model");
    for threads in metric.thread_counts.iter() {
        let _ = write!(table, " {threads:>14}");
    }

    for series in metric.series.iter() {
        let _ = write!(table, "\n{:<width$}", series.model);
        for rate in series.rates.iter() {
            let _ = write!(table, " {rate:>14.2}");
        }
    }

    table
}
