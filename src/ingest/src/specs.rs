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

use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;
use treevec_common::{Error, Result};

fn nan_default() -> f64 {
    f64::NAN
}

/// The immutable schema artifact of one input file: sorted key lists,
/// per-branch bounds, padded widths of the jagged branches and the
/// normalization of zero per branch. Loading a sidecar bypasses the
/// inference pass entirely.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Specs {
    /// Sorted flat keys, identifiers excluded.
    pub fkeys: Vec<String>,
    /// Sorted jagged keys.
    pub jkeys: Vec<String>,
    pub minv: BTreeMap<String, f64>,
    pub maxv: BTreeMap<String, f64>,
    /// Padded width per jagged key.
    pub jdim: BTreeMap<String, u32>,
    /// `normalize(k, 0)` per key; informational, never written to `x`.
    pub nans: BTreeMap<String, f64>,
    /// Sentinel written to `x` wherever the mask is 0. Runtime
    /// configuration, not part of the sidecar.
    #[serde(skip_serializing, skip_deserializing, default = "nan_default")]
    pub nan: f64,
}

/// Sidecar round-trip compares the persisted fields; the sentinel is
/// runtime configuration.
impl PartialEq for Specs {
    fn eq(&self, other: &Self) -> bool {
        self.fkeys == other.fkeys
            && self.jkeys == other.jkeys
            && self.minv == other.minv
            && self.maxv == other.maxv
            && self.jdim == other.jdim
            && self.nans == other.nans
    }
}

impl Specs {
    /// Length of every `x` and `mask` vector shaped by these specs.
    pub fn width(&self) -> usize {
        self.fkeys.len()
            + self
                .jkeys
                .iter()
                .map(|k| self.jdim.get(k).copied().unwrap_or(0) as usize)
                .sum::<usize>()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fkeys
            .iter()
            .chain(self.jkeys.iter())
            .map(String::as_str)
    }

    fn bounds(&self, key: &str) -> Result<(f64, f64)> {
        match (self.minv.get(key), self.maxv.get(key)) {
            (Some(&min), Some(&max)) => Ok((min, max)),
            _ => Err(Error::Range(key.to_owned())),
        }
    }

    /// Map `v` into the unit range of `key`. NaN maps to the sentinel;
    /// a degenerate range is the identity.
    pub fn normalize(&self, key: &str, v: f64) -> Result<f64> {
        if v.is_nan() {
            return Ok(self.nan);
        }
        let (min, max) = self.bounds(key)?;
        if max == min {
            return Ok(v);
        }
        Ok((v - min) / (max - min))
    }

    /// Inverse of [`normalize`](Self::normalize); informational.
    pub fn denormalize(&self, key: &str, u: f64) -> Result<f64> {
        if u == 0.0 {
            return Ok(self.nan);
        }
        let (min, max) = self.bounds(key)?;
        Ok(u * (max - min) + min)
    }

    /// Labels of the output positions: flat keys, then `key_i`
    /// expansions for each jagged key.
    pub fn columns(&self) -> Vec<String> {
        let mut cols = self.fkeys.clone();
        for key in &self.jkeys {
            for idx in 0..self.jdim.get(key).copied().unwrap_or(0) {
                cols.push(format!("{}_{}", key, idx));
            }
        }
        cols
    }

    /// The contiguous positions `key` occupies in the output vector.
    pub fn branch_span(&self, key: &str) -> Result<Range<usize>> {
        if let Some(idx) = self.fkeys.iter().position(|k| k == key) {
            return Ok(idx..idx + 1);
        }
        let mut start = self.fkeys.len();
        for jkey in &self.jkeys {
            let dim = self.jdim.get(jkey).copied().unwrap_or(0) as usize;
            if jkey == key {
                return Ok(start..start + dim);
            }
            start += dim;
        }
        Err(Error::Range(key.to_owned()))
    }

    /// Keep only the listed keys, dropping the bounds of everything
    /// else. Used to apply a branch selection on top of loaded specs.
    pub fn project(mut self, keys: &[String]) -> Self {
        self.fkeys.retain(|k| keys.contains(k));
        self.jkeys.retain(|k| keys.contains(k));
        let kept: Vec<&String> = self.fkeys.iter().chain(self.jkeys.iter()).collect();
        let kept = |k: &String| kept.iter().any(|key| *key == k);
        self.minv.retain(|k, _| kept(k));
        self.maxv.retain(|k, _| kept(k));
        self.nans.retain(|k, _| kept(k));
        let jkeys = std::mem::take(&mut self.jkeys);
        self.jdim.retain(|k, _| jkeys.contains(k));
        self.jkeys = jkeys;
        self
    }

    pub fn with_nan(mut self, nan: f64) -> Self {
        self.nan = nan;
        self
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let body = serde_json::to_string_pretty(self)
            .map_err(|e| Error::specs(path, format!("cannot serialize: {}", e)))?;
        std::fs::write(path, body).map_err(|e| Error::io(path, e))?;
        debug!(path = %path.display(), "wrote specs sidecar");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let body = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let specs: Self = serde_json::from_str(&body)
            .map_err(|e| Error::specs(path, e.to_string()))?;
        specs.validate(path)?;
        debug!(path = %path.display(), keys = specs.fkeys.len() + specs.jkeys.len(), "loaded specs sidecar");
        Ok(specs)
    }

    /// Every key must carry bounds; every jagged key a width of at
    /// least one.
    fn validate(&self, path: &Path) -> Result<()> {
        for key in self.fkeys.iter().chain(self.jkeys.iter()) {
            if !self.minv.contains_key(key) || !self.maxv.contains_key(key) {
                return Err(Error::specs(path, format!("missing bounds for `{}`", key)));
            }
        }
        for key in &self.jkeys {
            match self.jdim.get(key) {
                Some(dim) if *dim >= 1 => {}
                Some(_) => {
                    return Err(Error::specs(path, format!("zero jdim for `{}`", key)));
                }
                None => {
                    return Err(Error::specs(path, format!("missing jdim for `{}`", key)));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    pub(crate) fn sample() -> Specs {
        let mut minv = BTreeMap::new();
        let mut maxv = BTreeMap::new();
        let mut jdim = BTreeMap::new();
        let mut nans = BTreeMap::new();
        minv.insert("a".to_owned(), 0.0);
        maxv.insert("a".to_owned(), 10.0);
        minv.insert("b".to_owned(), 1.0);
        maxv.insert("b".to_owned(), 2.0);
        minv.insert("j".to_owned(), 0.0);
        maxv.insert("j".to_owned(), 4.0);
        jdim.insert("j".to_owned(), 3);
        nans.insert("a".to_owned(), 0.0);
        nans.insert("b".to_owned(), -1.0);
        nans.insert("j".to_owned(), 0.0);
        Specs {
            fkeys: vec!["a".to_owned(), "b".to_owned()],
            jkeys: vec!["j".to_owned()],
            minv,
            maxv,
            jdim,
            nans,
            nan: f64::NAN,
        }
    }

    #[test]
    fn test_width_and_columns() {
        let specs = sample();
        assert_eq!(specs.width(), 5);
        assert_eq!(
            specs.columns(),
            vec!["a", "b", "j_0", "j_1", "j_2"]
                .into_iter()
                .map(str::to_owned)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_normalize_round_trip() {
        let specs = sample();
        let v = 7.5;
        let u = specs.normalize("a", v).unwrap();
        assert_eq!(u, 0.75);
        assert!((specs.denormalize("a", u).unwrap() - v).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_nan_yields_sentinel() {
        let specs = sample().with_nan(-999.0);
        assert_eq!(specs.normalize("a", f64::NAN).unwrap(), -999.0);
        assert_eq!(specs.denormalize("a", 0.0).unwrap(), -999.0);
    }

    #[test]
    fn test_degenerate_range_is_identity() {
        let mut specs = sample();
        specs.minv.insert("a".to_owned(), 7.0);
        specs.maxv.insert("a".to_owned(), 7.0);
        assert_eq!(specs.normalize("a", 7.0).unwrap(), 7.0);
    }

    #[test]
    fn test_unknown_key_is_range_error() {
        let specs = sample();
        assert!(matches!(
            specs.normalize("zzz", 1.0),
            Err(Error::Range(_))
        ));
    }

    #[test]
    fn test_branch_span() {
        let specs = sample();
        assert_eq!(specs.branch_span("b").unwrap(), 1..2);
        assert_eq!(specs.branch_span("j").unwrap(), 2..5);
        assert!(specs.branch_span("zzz").is_err());
    }

    #[test]
    fn test_sidecar_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.tvf.specs.json");
        let specs = sample();
        specs.save(&path).unwrap();
        let loaded = Specs::load(&path).unwrap();
        assert_eq!(loaded, specs);
        assert!(loaded.nan.is_nan());
    }

    #[test]
    fn test_load_rejects_missing_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.specs.json");
        std::fs::write(&path, r#"{"fkeys": ["a"], "jkeys": []}"#).unwrap();
        assert!(matches!(Specs::load(&path), Err(Error::Specs { .. })));
    }

    #[test]
    fn test_load_rejects_missing_jdim() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nojdim.specs.json");
        let mut specs = sample();
        specs.jdim.clear();
        let body = serde_json::to_string(&specs).unwrap();
        std::fs::write(&path, body).unwrap();
        assert!(matches!(Specs::load(&path), Err(Error::Specs { .. })));
    }

    #[test]
    fn test_project_keeps_only_selection() {
        let specs = sample().project(&["a".to_owned(), "j".to_owned()]);
        assert_eq!(specs.fkeys, vec!["a".to_owned()]);
        assert_eq!(specs.jkeys, vec!["j".to_owned()]);
        assert!(!specs.minv.contains_key("b"));
        assert_eq!(specs.width(), 4);
    }
}
