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

use std::path::{Path, PathBuf};

/// Default data-federation redirector prepended to bare logical file
/// names.
pub const DEFAULT_REDIRECTOR: &str = "root://cms-xrd-global.cern.ch";

/// A resolved input reference: either a file on disk or a remote URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Locator {
    Local(PathBuf),
    Remote(String),
}

impl Locator {
    /// Resolve a user-supplied string. Purely lexical plus a single
    /// filesystem existence check; there is no error state.
    ///
    /// 1. A string already carrying the redirector prefix is taken as is.
    /// 2. Otherwise an existing local path is taken as is.
    /// 3. Otherwise `<redirector>/` is prepended.
    pub fn resolve(input: &str, redirector: &str) -> Self {
        if input.starts_with(redirector) {
            return Self::Remote(input.to_owned());
        }
        if Path::new(input).exists() {
            return Self::Local(PathBuf::from(input));
        }
        Self::Remote(format!("{}/{}", redirector, input))
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => write!(f, "{}", url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirector_prefix_passes_through() {
        let input = format!("{}/store/data/file.tvf", DEFAULT_REDIRECTOR);
        let locator = Locator::resolve(&input, DEFAULT_REDIRECTOR);
        assert_eq!(locator, Locator::Remote(input));
    }

    #[test]
    fn test_existing_path_stays_local() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let input = file.path().to_str().unwrap();
        let locator = Locator::resolve(input, DEFAULT_REDIRECTOR);
        assert_eq!(locator, Locator::Local(file.path().to_path_buf()));
    }

    #[test]
    fn test_missing_path_gets_redirector() {
        let locator = Locator::resolve("/store/data/missing.tvf", "http://proxy:1094");
        assert_eq!(
            locator,
            Locator::Remote("http://proxy:1094//store/data/missing.tvf".to_owned())
        );
    }
}
