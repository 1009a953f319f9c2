
use crate::AnalysisError;
use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};
use tracing::trace;

/// prefix of the line the benchmark prints its throughput on
pub const RATE_MARKER: &str = "Events per second";

/// last token of the first line starting with `marker`
pub fn rate_token<R: BufRead>(reader: R, marker: &str) -> io::Result<Option<String>> {
    for line in reader.lines() {
        let line = line?;

        if line.starts_with(marker) {
            return Ok(Some(
                line.split_whitespace().last().unwrap_or_default().to_string(),
            ));
        }
    }

    Ok(None)
}

/// Extract the measured rate from the captured output of a run
pub fn extract_rate(path: &Path, marker: &str) -> Result<f64, AnalysisError> {
    let io_error = |source| AnalysisError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_error)?;

    let Some(value) = rate_token(BufReader::new(file), marker).map_err(io_error)? else {
        return Err(AnalysisError::MetricNotFound {
            path: path.to_path_buf(),
            marker: marker.to_string(),
        });
    };

    match value.parse::<f64>() {
        Ok(rate) if rate.is_finite() => {
            trace!(path = ?path, rate, "Extracted rate");
            Ok(rate)
        }
        _ => Err(AnalysisError::InvalidMetric {
            path: path.to_path_buf(),
            value,
        }),
    }
}
