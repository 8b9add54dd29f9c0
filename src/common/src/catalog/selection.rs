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

/// A branch-name pattern. A pattern ending with `*` matches any branch
/// whose name starts with the literal prefix; anything else is an exact
/// match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BranchPattern {
    Exact(String),
    Prefix(String),
}

impl BranchPattern {
    pub fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) => Self::Prefix(prefix.to_owned()),
            None => Self::Exact(pattern.to_owned()),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Exact(p) => name == p,
            Self::Prefix(p) => name.starts_with(p),
        }
    }
}

/// Column projection over branch names: inclusion patterns first (an
/// empty set selects everything), exclusion patterns applied after.
#[derive(Clone, Debug, Default)]
pub struct BranchSelection {
    include: Vec<BranchPattern>,
    exclude: Vec<BranchPattern>,
}

impl BranchSelection {
    pub fn new(include: &[String], exclude: &[String]) -> Self {
        Self {
            include: include.iter().map(|p| BranchPattern::parse(p)).collect(),
            exclude: exclude.iter().map(|p| BranchPattern::parse(p)).collect(),
        }
    }

    /// Selects every branch.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_all(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    pub fn selects(&self, name: &str) -> bool {
        let included =
            self.include.is_empty() || self.include.iter().any(|p| p.matches(name));
        included && !self.exclude.iter().any(|p| p.matches(name))
    }

    /// Filter the given branch names, preserving their order.
    pub fn apply<'a>(&self, names: impl Iterator<Item = &'a str>) -> Vec<String> {
        names
            .filter(|name| self.selects(name))
            .map(|name| name.to_owned())
            .collect()
    }
}
