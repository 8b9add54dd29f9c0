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

use std::iter::FusedIterator;

use crate::array::{DataChunk, ValueRef};

impl DataChunk {
    /// Get an iterator over the rows of this chunk.
    pub fn rows(&self) -> DataChunkRefIter<'_> {
        DataChunkRefIter {
            chunk: self,
            idx: 0,
        }
    }

    pub fn row_at(&self, idx: usize) -> RowRef<'_> {
        RowRef::new(self, idx)
    }
}

pub struct DataChunkRefIter<'a> {
    chunk: &'a DataChunk,
    idx: usize,
}

impl<'a> Iterator for DataChunkRefIter<'a> {
    type Item = RowRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.idx == self.chunk.cardinality() {
            return None;
        }
        let row = RowRef {
            chunk: self.chunk,
            idx: self.idx,
        };
        self.idx += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let size = self.chunk.cardinality() - self.idx;
        (size, Some(size))
    }
}

impl ExactSizeIterator for DataChunkRefIter<'_> {}
impl FusedIterator for DataChunkRefIter<'_> {}

#[derive(Clone, Copy)]
pub struct RowRef<'a> {
    chunk: &'a DataChunk,

    idx: usize,
}

impl<'a> std::fmt::Debug for RowRef<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'a> RowRef<'a> {
    pub fn new(chunk: &'a DataChunk, idx: usize) -> Self {
        debug_assert!(idx < chunk.cardinality());
        Self { chunk, idx }
    }

    /// Get the index of this row in the data chunk.
    #[must_use]
    pub fn index(&self) -> usize {
        self.idx
    }

    pub fn value_at(&self, col_idx: usize) -> ValueRef<'a> {
        self.chunk.column_at(col_idx).value_at(self.idx)
    }

    pub fn len(&self) -> usize {
        self.chunk.columns().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = ValueRef<'a>> + '_ {
        self.chunk
            .columns()
            .iter()
            .map(move |col| col.value_at(self.idx))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::array::{DataChunk, FlatArray, JaggedArrayBuilder, ValueRef};
    use crate::catalog::{BranchDesc, Schema};

    fn chunk() -> DataChunk {
        let schema = Arc::new(Schema::new(vec![
            BranchDesc::flat("a"),
            BranchDesc::jagged("j"),
        ]));
        let mut jagged = JaggedArrayBuilder::default();
        jagged.append(&[7.0, 8.0]);
        jagged.append(&[]);
        DataChunk::new(
            schema,
            vec![
                FlatArray::from(vec![1.0, 2.0]).into(),
                jagged.finish().into(),
            ],
        )
    }

    #[test]
    fn test_row_iteration() {
        let chunk = chunk();
        let rows = chunk.rows().collect::<Vec<_>>();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value_at(0), ValueRef::Flat(1.0));
        assert_eq!(rows[0].value_at(1), ValueRef::Jagged(&[7.0, 8.0]));
        assert_eq!(rows[1].value_at(1), ValueRef::Jagged(&[]));
        assert_eq!(rows[1].index(), 1);
    }

    #[test]
    fn test_row_ref_len() {
        let chunk = chunk();
        let row = chunk.row_at(0);
        assert_eq!(row.len(), 2);
        assert_eq!(row.iter().len(), 2);
    }
}
