// Copyright 2025 TreeVec Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::Path;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};
use treevec_common::{Error, Result};

use crate::specs::Specs;

pub const HISTOGRAM_BINS: usize = 100;

/// Fixed-bin counting histogram over `[low, high]`; the top edge is
/// closed so the observed maximum lands in the last bin.
#[derive(Clone, Debug, Serialize)]
pub struct Histogram {
    low: f64,
    high: f64,
    bins: Vec<u64>,
    underflow: u64,
    overflow: u64,
}

impl Histogram {
    pub fn new(num: usize, low: f64, high: f64) -> Self {
        Self {
            low,
            high,
            bins: vec![0; num.max(1)],
            underflow: 0,
            overflow: 0,
        }
    }

    pub fn fill(&mut self, v: f64) {
        if v.is_nan() {
            return;
        }
        if v < self.low {
            self.underflow += 1;
            return;
        }
        if v > self.high {
            self.overflow += 1;
            return;
        }
        let num = self.bins.len();
        let idx = if self.high == self.low {
            0
        } else {
            (((v - self.low) / (self.high - self.low)) * num as f64) as usize
        };
        self.bins[idx.min(num - 1)] += 1;
    }

    pub fn count(&self) -> u64 {
        self.bins.iter().sum::<u64>() + self.underflow + self.overflow
    }

    pub fn bins(&self) -> &[u64] {
        &self.bins
    }
}

#[derive(Clone, Debug, Serialize)]
struct HistEntry {
    key: String,
    raw: Histogram,
    norm: Histogram,
}

/// Per-branch raw and normalized histograms, filled during
/// vectorization for real (mask = 1) values only.
#[derive(Clone, Debug, Serialize)]
pub struct HistogramSet {
    entries: Vec<HistEntry>,
}

impl HistogramSet {
    /// One raw histogram over the branch bounds and one normalized
    /// histogram over the unit range per key, in output order.
    pub fn from_specs(specs: &Specs) -> Self {
        let entries = specs
            .keys()
            .map(|key| {
                let low = specs.minv.get(key).copied().unwrap_or(0.0);
                let high = specs.maxv.get(key).copied().unwrap_or(1.0);
                HistEntry {
                    key: key.to_owned(),
                    raw: Histogram::new(HISTOGRAM_BINS, low, high),
                    norm: Histogram::new(HISTOGRAM_BINS, 0.0, 1.0),
                }
            })
            .collect();
        Self { entries }
    }

    /// `idx` is the key position in output order: flat keys first, then
    /// jagged keys.
    pub(crate) fn fill(&mut self, idx: usize, raw: f64, norm: f64) {
        let entry = &mut self.entries[idx];
        entry.raw.fill(raw);
        entry.norm.fill(norm);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count_for(&self, key: &str) -> Option<u64> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.raw.count())
    }

    /// Export all histograms as JSON.
    pub fn dump(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let body = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| Error::Config(format!("cannot serialize histograms: {}", e)))?;
        std::fs::write(path, body).map_err(|e| Error::io(path, e))?;
        info!(path = %path.display(), keys = self.entries.len(), "dumped histograms");
        Ok(())
    }
}

const MB: f64 = 1024.0 * 1024.0;

/// Accumulates per-chunk read statistics and reports throughput: one
/// line per chunk at DEBUG, a final summary at INFO.
#[derive(Debug)]
pub struct ThroughputMeter {
    rows: u64,
    bytes: u64,
    chunks: u64,
    started: Instant,
}

impl ThroughputMeter {
    pub fn new() -> Self {
        Self {
            rows: 0,
            bytes: 0,
            chunks: 0,
            started: Instant::now(),
        }
    }

    pub fn observe_chunk(&mut self, rows: usize, branches: usize, bytes: usize, elapsed: Duration) {
        self.rows += rows as u64;
        self.bytes += bytes as u64;
        self.chunks += 1;
        let secs = elapsed.as_secs_f64().max(f64::EPSILON);
        debug!(
            "# {} entries, {} branches, {:.3} MB, {:.3} sec, {:.3} MB/sec, {:.3} kHz",
            rows,
            branches,
            bytes as f64 / MB,
            secs,
            bytes as f64 / MB / secs,
            rows as f64 / secs / 1000.0
        );
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Final one-line summary: total rows, kHz, total seconds.
    pub fn summary(&self, label: &str) {
        let secs = self.started.elapsed().as_secs_f64().max(f64::EPSILON);
        info!(
            "{}: {} rows in {} chunks, {:.3} kHz, {:.3} sec total",
            label,
            self.rows,
            self.chunks,
            self.rows as f64 / secs / 1000.0,
            secs
        );
    }
}
