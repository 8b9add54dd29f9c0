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

use anyhow::{bail, Result};
use itertools::Itertools;

use super::fold_min_max;

/// A column of one variable-length numeric sequence per event. Inner
/// values are stored flat; `offsets` has `len + 1` entries and encodes
/// per-event inner lengths without materializing inner arrays.
#[derive(Clone, Debug, PartialEq)]
pub struct JaggedArray {
    values: Vec<f64>,
    offsets: Vec<u32>,
}

impl JaggedArray {
    /// Reassemble from raw parts, validating the offsets table.
    pub fn from_parts(values: Vec<f64>, offsets: Vec<u32>) -> Result<Self> {
        if offsets.first() != Some(&0) {
            bail!("offsets must start at 0");
        }
        if offsets.iter().tuple_windows().any(|(a, b)| a > b) {
            bail!("offsets must be non-decreasing");
        }
        if *offsets.last().unwrap() as usize != values.len() {
            bail!(
                "offsets end at {} but {} values present",
                offsets.last().unwrap(),
                values.len()
            );
        }
        Ok(Self { values, offsets })
    }

    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The inner sequence of event `idx`.
    pub fn value(&self, idx: usize) -> &[f64] {
        let start = self.offsets[idx] as usize;
        let end = self.offsets[idx + 1] as usize;
        &self.values[start..end]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    pub fn min_max(&self) -> Option<(f64, f64)> {
        fold_min_max(self.values.iter().copied())
    }

    pub fn max_inner_len(&self) -> u32 {
        self.offsets
            .iter()
            .tuple_windows()
            .map(|(a, b)| b - a)
            .max()
            .unwrap_or(0)
    }

    pub fn byte_size(&self) -> usize {
        self.values.len() * std::mem::size_of::<f64>()
            + self.offsets.len() * std::mem::size_of::<u32>()
    }
}

#[derive(Debug)]
pub struct JaggedArrayBuilder {
    values: Vec<f64>,
    offsets: Vec<u32>,
}

impl Default for JaggedArrayBuilder {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            offsets: vec![0],
        }
    }
}

impl JaggedArrayBuilder {
    pub fn with_capacity(rows: usize) -> Self {
        let mut offsets = Vec::with_capacity(rows + 1);
        offsets.push(0);
        Self {
            values: Vec::new(),
            offsets,
        }
    }

    pub fn append(&mut self, inner: &[f64]) {
        self.values.extend_from_slice(inner);
        self.offsets.push(self.values.len() as u32);
    }

    pub fn finish(self) -> JaggedArray {
        JaggedArray {
            values: self.values,
            offsets: self.offsets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> JaggedArray {
        let mut builder = JaggedArrayBuilder::default();
        builder.append(&[4.0, 2.0]);
        builder.append(&[]);
        builder.append(&[1.0, 5.5, -3.0]);
        builder.finish()
    }

    #[test]
    fn test_rows_and_inner_values() {
        let array = sample();
        assert_eq!(array.len(), 3);
        assert_eq!(array.value(0), &[4.0, 2.0]);
        assert_eq!(array.value(1), &[] as &[f64]);
        assert_eq!(array.value(2), &[1.0, 5.5, -3.0]);
    }

    #[test]
    fn test_reductions() {
        let array = sample();
        assert_eq!(array.min_max(), Some((-3.0, 5.5)));
        assert_eq!(array.max_inner_len(), 3);
    }

    #[test]
    fn test_from_parts_round_trip() {
        let array = sample();
        let rebuilt =
            JaggedArray::from_parts(array.values().to_vec(), array.offsets().to_vec()).unwrap();
        assert_eq!(rebuilt, array);
    }

    #[test]
    fn test_from_parts_rejects_bad_offsets() {
        assert!(JaggedArray::from_parts(vec![1.0], vec![0, 2]).is_err());
        assert!(JaggedArray::from_parts(vec![1.0], vec![1, 1]).is_err());
        assert!(JaggedArray::from_parts(vec![1.0, 2.0], vec![0, 2, 1]).is_err());
    }
}
