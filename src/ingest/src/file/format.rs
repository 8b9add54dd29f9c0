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

use serde::{Deserialize, Serialize};
use treevec_common::catalog::{BranchDesc, BranchKind, Schema};

/// `TVEC` in ASCII.
pub const MAGIC: u32 = 0x5456_4543;
pub const VERSION: u32 = 1;

/// meta offset (u64) | meta len (u32) | version (u32) | magic (u32),
/// all little-endian.
pub const FOOTER_LEN: usize = 8 + 4 + 4 + 4;

/// Self-describing tail of a container file, serialized as JSON and
/// followed by a crc32 of the JSON bytes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContainerMeta {
    pub trees: Vec<TreeMeta>,
}

impl ContainerMeta {
    pub fn tree(&self, name: &str) -> Option<&TreeMeta> {
        self.trees.iter().find(|t| t.name == name)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TreeMeta {
    pub name: String,
    /// Total number of records in the tree.
    pub rows: u64,
    pub branches: Vec<BranchMeta>,
}

impl TreeMeta {
    pub fn branch(&self, name: &str) -> Option<&BranchMeta> {
        self.branches.iter().find(|b| b.name == name)
    }

    /// Schema over all branches, in container order.
    pub fn schema(&self) -> Schema {
        Schema::new(
            self.branches
                .iter()
                .map(|b| BranchDesc::new(b.name.clone(), b.kind))
                .collect(),
        )
    }
}

/// One branch block. Flat payload is `rows` f64 values; jagged payload
/// is `rows + 1` u32 offsets followed by the inner values.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BranchMeta {
    pub name: String,
    pub kind: BranchKind,
    /// Byte offset of the block within the container.
    pub offset: u64,
    /// Payload length in bytes.
    pub bytes: u64,
    /// crc32 of the payload.
    pub crc: u32,
}

impl BranchMeta {
    /// Byte length of the offsets section of a jagged block.
    pub fn offsets_bytes(&self, rows: u64) -> u64 {
        match self.kind {
            BranchKind::Flat => 0,
            BranchKind::Jagged => (rows + 1) * 4,
        }
    }
}
