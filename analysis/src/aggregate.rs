#[cfg(test)]
mod aggregate_test;

use crate::{extract_rate, AnalysisError};
use rayon::prelude::*;
use std::{collections::HashMap, path::PathBuf};
use tracing::debug;

/// captured output of a single run of `model` with `threads` threads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub model: String,
    pub threads: usize,
    pub path: PathBuf,
}

/// average rate of a model, one entry per thread count
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSeries {
    pub model: String,
    pub rates: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregatedMetric {
    /// x-axis, in the order the thread counts were first recorded
    pub thread_counts: Vec<usize>,
    pub series: Vec<ModelSeries>,
}

impl AggregatedMetric {
    pub fn series(&self, model: &str) -> Option<&ModelSeries> {
        self.series.iter().find(|series| series.model == model)
    }

    pub fn rate(&self, model: &str, threads: usize) -> Option<f64> {
        let index = self
            .thread_counts
            .iter()
            .position(|count| *count == threads)?;

        self.series(model)
            .and_then(|series| series.rates.get(index).copied())
    }
}

/// Averages rates per (model, thread count) over a fixed number of repetitions
#[derive(Debug)]
pub struct Aggregator {
    repetitions: usize,
    models: Vec<String>,
    thread_counts: Vec<usize>,
    sums: HashMap<(String, usize), (f64, usize)>,
}

impl Aggregator {
    pub fn new(repetitions: usize) -> Result<Self, AnalysisError> {
        if repetitions == 0 {
            return Err(AnalysisError::NoRepetitions);
        }

        Ok(Self {
            repetitions,
            models: Vec::new(),
            thread_counts: Vec::new(),
            sums: HashMap::new(),
        })
    }

    pub fn record(&mut self, model: &str, threads: usize, rate: f64) {
        if !self.models.iter().any(|known| known == model) {
            self.models.push(model.to_string());
        }
        if !self.thread_counts.contains(&threads) {
            self.thread_counts.push(threads);
        }

        let (sum, count) = self
            .sums
            .entry((model.to_string(), threads))
            .or_insert((0.0, 0));
        *sum += rate;
        *count += 1;
    }

    pub fn finish(self) -> Result<AggregatedMetric, AnalysisError> {
        let mut series = Vec::with_capacity(self.models.len());

        for model in self.models.iter() {
            let mut rates = Vec::with_capacity(self.thread_counts.len());

            for threads in self.thread_counts.iter() {
                let (sum, found) = self
                    .sums
                    .get(&(model.clone(), *threads))
                    .copied()
                    .unwrap_or((0.0, 0));

                if found != self.repetitions {
                    return Err(AnalysisError::IncompleteCell {
                        model: model.clone(),
                        threads: *threads,
                        found,
                        expected: self.repetitions,
                    });
                }

                rates.push(sum / self.repetitions as f64);
            }

            series.push(ModelSeries {
                model: model.clone(),
                rates,
            });
        }

        Ok(AggregatedMetric {
            thread_counts: self.thread_counts,
            series,
        })
    }
}

/// Extract the rate of every cell in parallel and average them
pub fn collect(
    cells: &[Cell],
    repetitions: usize,
    marker: &str,
) -> Result<AggregatedMetric, AnalysisError> {
    let mut aggregator = Aggregator::new(repetitions)?;

    let rates = cells
        .par_iter()
        .map(|cell| extract_rate(&cell.path, marker))
        .collect::<Result<Vec<f64>, AnalysisError>>()?;

    debug!(cells = cells.len(), "Extracted all rates");

    for (cell, rate) in cells.iter().zip(rates) {
        aggregator.record(&cell.model, cell.threads, rate);
    }

    aggregator.finish()
}
