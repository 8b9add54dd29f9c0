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

mod schema;
mod selection;

pub use schema::{BranchDesc, BranchKind, Schema};
pub use selection::{BranchPattern, BranchSelection};

/// Default identifier branches, excluded from output vectors and
/// surfaced through the per-event side channel.
pub const DEFAULT_IDENTIFIERS: [&str; 3] = ["run", "event", "luminosityBlock"];
