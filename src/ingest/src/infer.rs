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

//! First-pass schema inference: classify each branch on the first
//! chunk, then fold bounds and jagged widths over every chunk.

use std::collections::BTreeMap;
use std::time::Instant;

use itertools::Itertools;
use tracing::{debug, warn};
use treevec_common::array::DataChunk;
use treevec_common::catalog::BranchKind;
use treevec_common::util::pretty_bytes;
use treevec_common::{Error, Result};

use crate::file::TreeHandle;
use crate::specs::Specs;
use crate::stats::ThroughputMeter;

/// Bound seeds; any observed value tightens them, and a branch still
/// carrying them after the pass had nothing to observe.
const MIN_SEED: f64 = 1e15;
const MAX_SEED: f64 = -1e15;

/// Folds streamed chunks into a [`Specs`].
pub struct SpecsBuilder {
    identifiers: Vec<String>,
    nan: f64,
    fkeys: Vec<String>,
    jkeys: Vec<String>,
    minv: BTreeMap<String, f64>,
    maxv: BTreeMap<String, f64>,
    jdim: BTreeMap<String, u32>,
    seeded: bool,
}

impl SpecsBuilder {
    pub fn new(identifiers: &[String], nan: f64) -> Self {
        Self {
            identifiers: identifiers.to_vec(),
            nan,
            fkeys: Vec::new(),
            jkeys: Vec::new(),
            minv: BTreeMap::new(),
            maxv: BTreeMap::new(),
            jdim: BTreeMap::new(),
            seeded: false,
        }
    }

    /// Fold one chunk. The first chunk also classifies the branches
    /// and seeds their bounds.
    pub fn observe(&mut self, chunk: &DataChunk) {
        for (desc, column) in chunk.schema().branches().iter().zip(chunk.columns()) {
            if self.identifiers.contains(&desc.name) {
                continue;
            }
            if !self.seeded {
                match desc.kind {
                    BranchKind::Flat => self.fkeys.push(desc.name.clone()),
                    BranchKind::Jagged => {
                        self.jkeys.push(desc.name.clone());
                        self.jdim.insert(desc.name.clone(), 0);
                    }
                }
                self.minv.insert(desc.name.clone(), MIN_SEED);
                self.maxv.insert(desc.name.clone(), MAX_SEED);
            }
            if let Some((lo, hi)) = column.min_max() {
                self.minv
                    .entry(desc.name.clone())
                    .and_modify(|m| *m = m.min(lo))
                    .or_insert(lo);
                self.maxv
                    .entry(desc.name.clone())
                    .and_modify(|m| *m = m.max(hi))
                    .or_insert(hi);
            }
            if desc.kind == BranchKind::Jagged {
                let dim = column.max_inner_len();
                self.jdim
                    .entry(desc.name.clone())
                    .and_modify(|d| *d = (*d).max(dim))
                    .or_insert(dim);
            }
        }
        self.seeded = true;
    }

    /// Finalize: drop branches with nothing observed, sort the key
    /// lists, precompute `normalize(k, 0)`.
    pub fn finish(self) -> Result<Specs> {
        let Self {
            nan,
            fkeys,
            jkeys,
            mut minv,
            mut maxv,
            mut jdim,
            ..
        } = self;
        let empty = |key: &String| match (minv.get(key), maxv.get(key)) {
            (Some(lo), Some(hi)) => lo > hi,
            _ => true,
        };
        for key in fkeys.iter().chain(jkeys.iter()) {
            if empty(key) {
                warn!(key = %key, "branch has no observed values, dropping it from output");
            }
        }
        let fkeys: Vec<_> = fkeys.into_iter().filter(|k| !empty(k)).sorted().collect();
        let jkeys: Vec<_> = jkeys.into_iter().filter(|k| !empty(k)).sorted().collect();
        let kept = |key: &String| fkeys.contains(key) || jkeys.contains(key);
        minv.retain(|k, _| kept(k));
        maxv.retain(|k, _| kept(k));
        jdim.retain(|k, _| jkeys.contains(k));
        if fkeys.is_empty() && jkeys.is_empty() {
            return Err(Error::Schema(
                "inference found no branches with observed values".to_owned(),
            ));
        }
        let mut specs = Specs {
            fkeys,
            jkeys,
            minv,
            maxv,
            jdim,
            nans: BTreeMap::new(),
            nan,
        };
        let mut nans = BTreeMap::new();
        for key in specs.fkeys.iter().chain(specs.jkeys.iter()) {
            nans.insert(key.clone(), specs.normalize(key, 0.0)?);
        }
        specs.nans = nans;
        Ok(specs)
    }
}

/// Run the inference pass over the selected branches of `handle`. With
/// `nevts > 0` the pass stops once the cumulative row count first
/// exceeds it; otherwise it consumes the whole tree.
pub fn infer_specs(
    handle: &mut TreeHandle,
    branches: &[String],
    identifiers: &[String],
    chunk_size: u64,
    nevts: i64,
    nan: f64,
) -> Result<Specs> {
    let schema = handle.resolve_schema(branches)?;
    let mut builder = SpecsBuilder::new(identifiers, nan);
    let mut meter = ThroughputMeter::new();
    let mem_before = used_memory();
    let mut total = 0u64;
    let mut chunks = handle.chunks(schema, chunk_size);
    loop {
        let started = Instant::now();
        let Some(chunk) = chunks.next() else { break };
        let chunk = chunk?;
        meter.observe_chunk(
            chunk.cardinality(),
            chunk.columns().len(),
            chunk.byte_size(),
            started.elapsed(),
        );
        builder.observe(&chunk);
        total += chunk.cardinality() as u64;
        if nevts > 0 && total > nevts as u64 {
            break;
        }
    }
    meter.summary("first pass");
    debug!(
        used = %pretty_bytes::convert(used_memory().saturating_sub(mem_before) as f64),
        "first pass memory delta"
    );
    builder.finish()
}

fn used_memory() -> u64 {
    let mut system = sysinfo::System::new();
    system.refresh_memory();
    system.used_memory()
}
