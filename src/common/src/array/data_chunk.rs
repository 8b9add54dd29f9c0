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

use std::sync::Arc;

use crate::array::ArrayImpl;
use crate::catalog::Schema;

/// A bounded buffer of consecutive rows in struct-of-arrays layout:
/// one column per branch, all columns aligned on cardinality. Row
/// extraction is index-based through the shared [`Schema`] handle.
#[derive(Clone, Debug)]
pub struct DataChunk {
    schema: Arc<Schema>,
    columns: Vec<ArrayImpl>,
    cardinality: usize,
}

impl DataChunk {
    pub fn new(schema: Arc<Schema>, columns: Vec<ArrayImpl>) -> Self {
        assert_eq!(schema.len(), columns.len());
        let cardinality = columns.first().map(ArrayImpl::len).unwrap_or(0);
        for column in &columns {
            assert_eq!(column.len(), cardinality);
        }
        Self {
            schema,
            columns,
            cardinality,
        }
    }

    /// Number of rows in this chunk.
    pub fn cardinality(&self) -> usize {
        self.cardinality
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn columns(&self) -> &[ArrayImpl] {
        &self.columns
    }

    pub fn column_at(&self, idx: usize) -> &ArrayImpl {
        &self.columns[idx]
    }

    /// Column for the named branch, if the schema carries it.
    pub fn column_by_name(&self, name: &str) -> Option<&ArrayImpl> {
        self.schema.index_of(name).map(|idx| &self.columns[idx])
    }

    /// Total payload size of all columns, for throughput accounting.
    pub fn byte_size(&self) -> usize {
        self.columns.iter().map(ArrayImpl::byte_size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{FlatArray, JaggedArrayBuilder};
    use crate::catalog::BranchDesc;

    #[test]
    fn test_chunk_alignment() {
        let schema = Arc::new(Schema::new(vec![
            BranchDesc::flat("a"),
            BranchDesc::jagged("j"),
        ]));
        let mut jagged = JaggedArrayBuilder::default();
        jagged.append(&[1.0]);
        jagged.append(&[2.0, 3.0]);
        let chunk = DataChunk::new(
            schema,
            vec![
                FlatArray::from(vec![10.0, 20.0]).into(),
                jagged.finish().into(),
            ],
        );
        assert_eq!(chunk.cardinality(), 2);
        assert_eq!(chunk.byte_size(), 2 * 8 + 3 * 8 + 3 * 4);
        assert!(chunk.column_by_name("j").is_some());
        assert!(chunk.column_by_name("x").is_none());
    }
}
