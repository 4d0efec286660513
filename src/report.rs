// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2024 NervoSys

//! Durations file and per-delay statistics
//!
//! The durations file holds one `"<delay_ms> <duration_ms>"` line per
//! sample, in the order samples were taken. Downstream plotting tools read
//! this format, so it must not change.

use crate::bench::LatencySample;
use crate::error::{BenchError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

/// Where the durations file is written unless configured otherwise
pub const DEFAULT_DURATIONS_PATH: &str = "./winml_durations.txt";

/// One durations file line, without the newline
pub fn format_sample(sample: &LatencySample) -> String {
    format!("{} {}", sample.delay.as_millis(), sample.duration.as_millis())
}

pub fn write_durations_to<W: Write>(mut out: W, samples: &[LatencySample]) -> Result<()> {
    for sample in samples {
        writeln!(out, "{}", format_sample(sample))?;
    }
    out.flush()?;
    Ok(())
}

/// Create (or truncate) `path` and write every sample
pub fn write_durations(path: impl AsRef<Path>, samples: &[LatencySample]) -> Result<()> {
    let file = File::create(path.as_ref())?;
    write_durations_to(BufWriter::new(file), samples)?;
    log::info!(
        "wrote {} samples to {}",
        samples.len(),
        path.as_ref().display()
    );
    Ok(())
}

/// Parse a durations file; blank lines are skipped
pub fn read_durations<R: BufRead>(reader: R) -> Result<Vec<LatencySample>> {
    let mut samples = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(delay), Some(duration), None) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(BenchError::Parse(format!(
                "line {}: expected '<delay_ms> <duration_ms>', got '{}'",
                index + 1,
                line
            )));
        };
        samples.push(LatencySample {
            delay: Duration::from_millis(parse_millis(delay, index)?),
            duration: Duration::from_millis(parse_millis(duration, index)?),
        });
    }
    Ok(samples)
}

fn parse_millis(field: &str, index: usize) -> Result<u64> {
    field
        .parse()
        .map_err(|e| BenchError::Parse(format!("line {}: '{}': {}", index + 1, field, e)))
}

/// Duration statistics for one delay value, in whole milliseconds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelaySummary {
    pub delay_ms: u64,
    pub count: usize,
    pub min_ms: u64,
    pub max_ms: u64,
    pub mean_ms: f64,
    /// Sample standard deviation (n - 1); 0 for a single sample
    pub std_ms: f64,
}

/// Group samples by delay (ascending) and compute min/max/mean/std
pub fn summarize(samples: &[LatencySample]) -> Vec<DelaySummary> {
    let mut groups: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    for sample in samples {
        groups
            .entry(sample.delay.as_millis() as u64)
            .or_default()
            .push(sample.duration.as_millis() as u64);
    }

    groups
        .into_iter()
        .map(|(delay_ms, durations)| {
            let count = durations.len();
            let mean = durations.iter().sum::<u64>() as f64 / count as f64;
            let std = if count > 1 {
                let var = durations
                    .iter()
                    .map(|&d| (d as f64 - mean).powi(2))
                    .sum::<f64>()
                    / (count - 1) as f64;
                var.sqrt()
            } else {
                0.0
            };
            DelaySummary {
                delay_ms,
                count,
                min_ms: durations.iter().copied().min().unwrap_or(0),
                max_ms: durations.iter().copied().max().unwrap_or(0),
                mean_ms: mean,
                std_ms: std,
            }
        })
        .collect()
}

/// Render summaries as an aligned text table
pub fn format_summary_table(summaries: &[DelaySummary]) -> String {
    let mut table = format!(
        "{:>10} {:>7} {:>8} {:>8} {:>10} {:>10}\n",
        "delay_ms", "count", "min", "max", "mean", "std"
    );
    for s in summaries {
        table.push_str(&format!(
            "{:>10} {:>7} {:>8} {:>8} {:>10.3} {:>10.3}\n",
            s.delay_ms, s.count, s.min_ms, s.max_ms, s.mean_ms, s.std_ms
        ));
    }
    table
}
