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

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Engine-wide error type. Adapter errors surface unchanged to the
/// caller; the engine never retries I/O.
#[derive(Error, Debug)]
pub enum Error {
    /// Cannot open the source, short read, corrupt block or remote
    /// transport failure.
    #[error("io error on `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    /// Branch absent from the tree, or an inclusion pattern matched
    /// zero branches.
    #[error("schema error: {0}")]
    Schema(String),

    /// Specs sidecar parse failure or missing required field.
    #[error("specs error on `{path}`: {reason}")]
    Specs { path: String, reason: String },

    /// Attempt to vectorize a branch with unknown min/max bounds.
    #[error("unknown value range for branch `{0}`")]
    Range(String),

    /// `next_event` called after end-of-stream.
    #[error("event stream exhausted")]
    Exhausted,

    /// Invalid control-plane option.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn io(path: impl AsRef<Path>, source: impl Into<anyhow::Error>) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source: source.into(),
        }
    }

    pub fn specs(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::Specs {
            path: path.as_ref().display().to_string(),
            reason: reason.into(),
        }
    }
}
