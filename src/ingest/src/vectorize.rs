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

use tracing::trace;
use treevec_common::array::{RowRef, ValueRef};
use treevec_common::catalog::{BranchKind, Schema};
use treevec_common::{Error, Result};

use crate::specs::Specs;
use crate::stats::HistogramSet;

struct FlatPlan {
    col: usize,
    min: f64,
    max: f64,
    hist: usize,
}

struct JaggedPlan {
    col: usize,
    min: f64,
    max: f64,
    dim: usize,
    hist: usize,
}

/// Flattens one chunk row into the `(x, mask)` pair: sorted flat keys
/// first, then each jagged key padded to its `jdim` width. Column
/// positions and bounds are resolved once at construction, so the
/// per-event path is free of name lookups.
pub struct RowVectorizer {
    width: usize,
    nan: f64,
    flat: Vec<FlatPlan>,
    jagged: Vec<JaggedPlan>,
}

impl RowVectorizer {
    pub fn new(specs: &Specs, schema: &Schema) -> Result<Self> {
        let mut flat = Vec::with_capacity(specs.fkeys.len());
        for (hist, key) in specs.fkeys.iter().enumerate() {
            let col = resolve(schema, key, BranchKind::Flat)?;
            let (min, max) = bounds(specs, key)?;
            flat.push(FlatPlan {
                col,
                min,
                max,
                hist,
            });
        }
        let mut jagged = Vec::with_capacity(specs.jkeys.len());
        for (idx, key) in specs.jkeys.iter().enumerate() {
            let col = resolve(schema, key, BranchKind::Jagged)?;
            let (min, max) = bounds(specs, key)?;
            let dim = specs
                .jdim
                .get(key)
                .copied()
                .ok_or_else(|| Error::Range(key.clone()))? as usize;
            jagged.push(JaggedPlan {
                col,
                min,
                max,
                dim,
                hist: specs.fkeys.len() + idx,
            });
        }
        let width = flat.len() + jagged.iter().map(|p| p.dim).sum::<usize>();
        trace!(
            flat = flat.len(),
            jagged = jagged.len(),
            width,
            "built vectorizer plan"
        );
        Ok(Self {
            width,
            nan: specs.nan,
            flat,
            jagged,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn vectorize(
        &self,
        row: RowRef<'_>,
        mut hists: Option<&mut HistogramSet>,
    ) -> (Vec<f64>, Vec<u8>) {
        let mut x = Vec::with_capacity(self.width);
        let mut mask = Vec::with_capacity(self.width);
        for plan in &self.flat {
            let ValueRef::Flat(v) = row.value_at(plan.col) else {
                unreachable!("branch kinds are checked at construction")
            };
            if v.is_nan() {
                x.push(self.nan);
                mask.push(0);
            } else {
                let u = normalize_with(plan.min, plan.max, v);
                if let Some(hists) = hists.as_deref_mut() {
                    hists.fill(plan.hist, v, u);
                }
                x.push(u);
                mask.push(1);
            }
        }
        for plan in &self.jagged {
            let ValueRef::Jagged(inner) = row.value_at(plan.col) else {
                unreachable!("branch kinds are checked at construction")
            };
            for j in 0..plan.dim {
                match inner.get(j) {
                    Some(&v) if !v.is_nan() => {
                        let u = normalize_with(plan.min, plan.max, v);
                        if let Some(hists) = hists.as_deref_mut() {
                            hists.fill(plan.hist, v, u);
                        }
                        x.push(u);
                        mask.push(1);
                    }
                    _ => {
                        x.push(self.nan);
                        mask.push(0);
                    }
                }
            }
        }
        (x, mask)
    }
}

fn resolve(schema: &Schema, key: &str, kind: BranchKind) -> Result<usize> {
    let col = schema.index_of(key).ok_or_else(|| {
        Error::Schema(format!("branch `{}` missing from chunk schema", key))
    })?;
    if schema[col].kind != kind {
        return Err(Error::Schema(format!(
            "branch `{}` is {:?} in specs but {:?} in the tree",
            key, kind, schema[col].kind
        )));
    }
    Ok(col)
}

fn bounds(specs: &Specs, key: &str) -> Result<(f64, f64)> {
    match (specs.minv.get(key), specs.maxv.get(key)) {
        (Some(&min), Some(&max)) => Ok((min, max)),
        _ => Err(Error::Range(key.to_owned())),
    }
}

fn normalize_with(min: f64, max: f64, v: f64) -> f64 {
    if max == min {
        return v;
    }
    (v - min) / (max - min)
}
