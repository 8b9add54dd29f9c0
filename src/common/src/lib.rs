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

//! Shared building blocks of the TreeVec engine: column arrays, data
//! chunks, the branch catalog and the common error type.

pub mod array;
pub mod catalog;
pub mod error;
pub mod util;

pub use error::{Error, Result};
