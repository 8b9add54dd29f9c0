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

//! The columnar container: named trees of flat and jagged branches,
//! branch blocks first and a self-describing meta block at the end, so
//! a reader can serve any row range of any branch with positioned reads.

mod builder;
mod format;
mod reader;

pub use builder::TreeFileBuilder;
pub use format::{BranchMeta, ContainerMeta, TreeMeta};
pub use reader::{ChunkIter, TreeHandle};
