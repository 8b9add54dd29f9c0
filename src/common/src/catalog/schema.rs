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

use std::ops::Index;

use serde::{Deserialize, Serialize};

/// Per-event payload shape of a branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchKind {
    /// A single scalar value per event.
    Flat,
    /// A length-varying sequence of values per event.
    Jagged,
}

/// The descriptor of one branch in a tree.
#[derive(Clone, PartialEq, Eq)]
pub struct BranchDesc {
    pub name: String,
    pub kind: BranchKind,
}

impl std::fmt::Debug for BranchDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{:?}", self.name, self.kind)
    }
}

impl BranchDesc {
    pub fn new(name: impl Into<String>, kind: BranchKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn flat(name: impl Into<String>) -> Self {
        Self::new(name, BranchKind::Flat)
    }

    pub fn jagged(name: impl Into<String>) -> Self {
        Self::new(name, BranchKind::Jagged)
    }
}

/// The ordered set of branches a chunk carries. Shared read-only by
/// every chunk read from the same tree.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Schema {
    branches: Vec<BranchDesc>,
}

impl Schema {
    pub fn new(branches: Vec<BranchDesc>) -> Self {
        Self { branches }
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    pub fn branches(&self) -> &[BranchDesc] {
        &self.branches
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.branches.iter().map(|b| b.name.as_str())
    }

    /// Position of the named branch in this schema, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.branches.iter().position(|b| b.name == name)
    }
}

impl Index<usize> for Schema {
    type Output = BranchDesc;

    fn index(&self, index: usize) -> &Self::Output {
        &self.branches[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_of() {
        let schema = Schema::new(vec![
            BranchDesc::flat("run"),
            BranchDesc::jagged("Muon_pt"),
        ]);
        assert_eq!(schema.len(), 2);
        assert_eq!(schema.index_of("Muon_pt"), Some(1));
        assert_eq!(schema.index_of("Muon_eta"), None);
        assert_eq!(schema[0].kind, BranchKind::Flat);
    }
}
