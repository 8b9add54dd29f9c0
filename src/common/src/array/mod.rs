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

//! Typed column arrays. A branch materializes as either a [`FlatArray`]
//! (one scalar per event) or a [`JaggedArray`] (a variable-length inner
//! sequence per event, stored flat with an offsets table).

mod data_chunk;
mod data_chunk_iter;
mod flat;
mod jagged;

pub use data_chunk::DataChunk;
pub use data_chunk_iter::{DataChunkRefIter, RowRef};
pub use flat::{FlatArray, FlatArrayBuilder};
pub use jagged::{JaggedArray, JaggedArrayBuilder};

use crate::catalog::BranchKind;

/// Tagged union over the two physical column layouts.
#[derive(Clone, Debug, PartialEq)]
pub enum ArrayImpl {
    Flat(FlatArray),
    Jagged(JaggedArray),
}

/// A borrowed per-event value extracted from a column.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ValueRef<'a> {
    Flat(f64),
    Jagged(&'a [f64]),
}

impl ArrayImpl {
    pub fn len(&self) -> usize {
        match self {
            Self::Flat(a) => a.len(),
            Self::Jagged(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> BranchKind {
        match self {
            Self::Flat(_) => BranchKind::Flat,
            Self::Jagged(_) => BranchKind::Jagged,
        }
    }

    pub fn value_at(&self, idx: usize) -> ValueRef<'_> {
        match self {
            Self::Flat(a) => ValueRef::Flat(a.value(idx)),
            Self::Jagged(a) => ValueRef::Jagged(a.value(idx)),
        }
    }

    /// Inclusive bounds over all finite values, `None` if there are none.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        match self {
            Self::Flat(a) => a.min_max(),
            Self::Jagged(a) => a.min_max(),
        }
    }

    /// Largest inner length; 0 for flat arrays.
    pub fn max_inner_len(&self) -> u32 {
        match self {
            Self::Flat(_) => 0,
            Self::Jagged(a) => a.max_inner_len(),
        }
    }

    /// In-memory payload size, used for throughput accounting.
    pub fn byte_size(&self) -> usize {
        match self {
            Self::Flat(a) => a.byte_size(),
            Self::Jagged(a) => a.byte_size(),
        }
    }
}

impl From<FlatArray> for ArrayImpl {
    fn from(array: FlatArray) -> Self {
        Self::Flat(array)
    }
}

impl From<JaggedArray> for ArrayImpl {
    fn from(array: JaggedArray) -> Self {
        Self::Jagged(array)
    }
}

impl<'a> ValueRef<'a> {
    pub fn as_flat(&self) -> Option<f64> {
        match self {
            Self::Flat(v) => Some(*v),
            Self::Jagged(_) => None,
        }
    }

    pub fn as_jagged(&self) -> Option<&'a [f64]> {
        match self {
            Self::Flat(_) => None,
            Self::Jagged(vs) => Some(vs),
        }
    }
}

/// Fold `(min, max)` over finite values only; NaN is normal input
/// handled by the mask downstream, not an error.
pub(crate) fn fold_min_max(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let mut bounds = None;
    for v in values {
        if v.is_nan() {
            continue;
        }
        bounds = match bounds {
            None => Some((v, v)),
            Some((lo, hi)) => Some((f64::min(lo, v), f64::max(hi, v))),
        };
    }
    bounds
}
