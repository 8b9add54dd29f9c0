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

use super::fold_min_max;

/// A column of one scalar per event.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlatArray {
    data: Vec<f64>,
}

impl FlatArray {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn value(&self, idx: usize) -> f64 {
        self.data[idx]
    }

    pub fn values(&self) -> &[f64] {
        &self.data
    }

    pub fn min_max(&self) -> Option<(f64, f64)> {
        fold_min_max(self.data.iter().copied())
    }

    pub fn byte_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f64>()
    }
}

impl From<Vec<f64>> for FlatArray {
    fn from(data: Vec<f64>) -> Self {
        Self { data }
    }
}

#[derive(Debug, Default)]
pub struct FlatArrayBuilder {
    data: Vec<f64>,
}

impl FlatArrayBuilder {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    pub fn append(&mut self, value: f64) {
        self.data.push(value);
    }

    pub fn finish(self) -> FlatArray {
        FlatArray { data: self.data }
    }
}
