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

use bytes::BufMut;
use treevec_common::array::ArrayImpl;
use treevec_common::{Error, Result};

use super::format::{BranchMeta, ContainerMeta, TreeMeta, FOOTER_LEN, MAGIC, VERSION};

/// Writes container files. The engine itself never writes its input
/// format; this surface exists for fixtures and the `gen` command.
#[derive(Default)]
pub struct TreeFileBuilder {
    payload: Vec<u8>,
    trees: Vec<TreeMeta>,
}

impl TreeFileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tree assembled from named columns. All columns must
    /// share one cardinality.
    pub fn add_tree(
        &mut self,
        name: &str,
        columns: Vec<(String, ArrayImpl)>,
    ) -> Result<&mut Self> {
        let rows = match columns.first() {
            Some((_, column)) => column.len(),
            None => {
                return Err(Error::Config(format!(
                    "tree `{}` must carry at least one branch",
                    name
                )))
            }
        };
        let mut branches = Vec::with_capacity(columns.len());
        for (branch, column) in columns {
            if column.len() != rows {
                return Err(Error::Config(format!(
                    "branch `{}` has {} rows, tree `{}` has {}",
                    branch,
                    column.len(),
                    name,
                    rows
                )));
            }
            let offset = self.payload.len() as u64;
            match &column {
                ArrayImpl::Flat(array) => {
                    for v in array.values() {
                        self.payload.put_f64_le(*v);
                    }
                }
                ArrayImpl::Jagged(array) => {
                    for o in array.offsets() {
                        self.payload.put_u32_le(*o);
                    }
                    for v in array.values() {
                        self.payload.put_f64_le(*v);
                    }
                }
            }
            let bytes = self.payload.len() as u64 - offset;
            let crc = crc32fast::hash(&self.payload[offset as usize..]);
            branches.push(BranchMeta {
                name: branch,
                kind: column.kind(),
                offset,
                bytes,
                crc,
            });
        }
        self.trees.push(TreeMeta {
            name: name.to_owned(),
            rows: rows as u64,
            branches,
        });
        Ok(self)
    }

    /// Serialize the container: branch blocks, meta block, footer.
    pub fn finish(self) -> Result<Vec<u8>> {
        let mut out = self.payload;
        let meta = ContainerMeta { trees: self.trees };
        let meta_offset = out.len() as u64;
        let meta_json = serde_json::to_vec(&meta)
            .map_err(|e| Error::Config(format!("cannot serialize container meta: {}", e)))?;
        let meta_len = meta_json.len() as u32;
        let crc = crc32fast::hash(&meta_json);
        out.extend_from_slice(&meta_json);
        out.put_u32_le(crc);
        out.put_u64_le(meta_offset);
        out.put_u32_le(meta_len);
        out.put_u32_le(VERSION);
        out.put_u32_le(MAGIC);
        debug_assert!(out.len() >= FOOTER_LEN);
        Ok(out)
    }

    pub fn write_to(self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let data = self.finish()?;
        std::fs::write(path, data).map_err(|e| Error::io(path, e))
    }
}
