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
use std::sync::Arc;

use tracing::{info, warn};
use treevec_common::catalog::{BranchSelection, DEFAULT_IDENTIFIERS};
use treevec_common::{Error, Result};

use crate::file::TreeHandle;
use crate::infer::infer_specs;
use crate::source::{Locator, DEFAULT_REDIRECTOR};
use crate::specs::Specs;
use crate::stream::EventStream;

/// Control-plane options of the reader pipeline.
#[derive(Clone, Debug)]
pub struct ReaderOptions {
    /// Name of the tree inside the container.
    pub tree: String,
    /// Identifier branches surfaced per event and excluded from `x`.
    pub identifiers: Vec<String>,
    /// Inclusion patterns, exact or `prefix*`; empty selects all.
    pub selected_branches: Vec<String>,
    /// Exclusion patterns, applied after inclusion.
    pub exclude_branches: Vec<String>,
    pub chunk_size: u64,
    pub batch_size: usize,
    /// Upper bound on rows consumed; -1 reads everything.
    pub nevts: i64,
    /// Sentinel written to `x` for NaN and padding.
    pub nan: f64,
    /// Prebuilt specs sidecar; inferred and auto-persisted when absent.
    pub specs: Option<PathBuf>,
    pub redirector: String,
    pub histograms: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            tree: "Events".to_owned(),
            identifiers: DEFAULT_IDENTIFIERS.iter().map(|s| (*s).to_owned()).collect(),
            selected_branches: Vec::new(),
            exclude_branches: Vec::new(),
            chunk_size: 1000,
            batch_size: 256,
            nevts: -1,
            nan: f64::NAN,
            specs: None,
            redirector: DEFAULT_REDIRECTOR.to_owned(),
            histograms: false,
        }
    }
}

impl ReaderOptions {
    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_owned()));
        }
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be at least 1".to_owned()));
        }
        if self.nevts < -1 {
            return Err(Error::Config(format!(
                "nevts must be -1 or non-negative, got {}",
                self.nevts
            )));
        }
        if self.tree.is_empty() {
            return Err(Error::Config("tree name must not be empty".to_owned()));
        }
        Ok(())
    }
}

/// One mini-batch: `batch_size` consecutive events concatenated into
/// row-major `x` and `mask` buffers of shape `[rows, width]`.
#[derive(Clone, Debug)]
pub struct Batch {
    pub rows: usize,
    pub width: usize,
    pub x: Vec<f64>,
    pub mask: Vec<u8>,
    pub identifiers: Vec<Vec<f64>>,
}

/// Aggregates consecutive events into fixed-shape batches. Emits
/// exactly `num_batches()` full batches; the trailing remainder of the
/// event stream is not emitted.
pub struct BatchGenerator {
    stream: EventStream,
    batch_size: usize,
    num_batches: u64,
    emitted: u64,
}

impl BatchGenerator {
    /// Resolve `input`, open the tree, obtain specs (loading the
    /// sidecar or running the inference pass) and set up the stream.
    pub fn open(input: &str, options: ReaderOptions) -> Result<Self> {
        options.validate()?;
        let locator = Locator::resolve(input, &options.redirector);
        info!(locator = %locator, tree = %options.tree, "opening event source");
        let mut handle = TreeHandle::open(&locator, &options.tree)?;

        let selection =
            BranchSelection::new(&options.selected_branches, &options.exclude_branches);
        let selected = selection.apply(
            handle
                .branch_names()
                .filter(|name| !options.identifiers.iter().any(|id| id == name)),
        );
        if selected.is_empty() {
            return Err(Error::Schema(
                "branch selection matches zero branches".to_owned(),
            ));
        }

        let specs = match &options.specs {
            Some(path) => {
                let specs = Specs::load(path)?
                    .with_nan(options.nan)
                    .project(&selected);
                for name in &selected {
                    if !specs.keys().any(|key| key == name.as_str()) {
                        warn!(branch = %name, "selected branch not covered by specs, skipping");
                    }
                }
                specs
            }
            None => {
                let specs = infer_specs(
                    &mut handle,
                    &selected,
                    &options.identifiers,
                    options.chunk_size,
                    options.nevts,
                    options.nan,
                )?;
                let sidecar = sidecar_path(&locator);
                specs.save(&sidecar)?;
                info!(path = %sidecar.display(), "auto-persisted inferred specs");
                specs
            }
        };
        if specs.fkeys.is_empty() && specs.jkeys.is_empty() {
            return Err(Error::Schema(
                "specs carry no branches after selection".to_owned(),
            ));
        }

        let mut names: Vec<String> = specs
            .fkeys
            .iter()
            .chain(specs.jkeys.iter())
            .cloned()
            .collect();
        names.extend(options.identifiers.iter().cloned());
        let schema = handle.resolve_schema(&names)?;

        let stream = EventStream::new(
            handle,
            Arc::new(specs),
            schema,
            &options.identifiers,
            options.chunk_size,
            options.histograms,
        )?;
        let total = if options.nevts < 0 {
            stream.rows()
        } else {
            stream.rows().min(options.nevts as u64)
        };
        let num_batches = total / options.batch_size as u64;
        Ok(Self {
            stream,
            batch_size: options.batch_size,
            num_batches,
            emitted: 0,
        })
    }

    /// `⌊nevts / batch_size⌋`.
    pub fn num_batches(&self) -> u64 {
        self.num_batches
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Length of every row vector.
    pub fn width(&self) -> usize {
        self.stream.width()
    }

    /// Total records in the underlying tree.
    pub fn rows(&self) -> u64 {
        self.stream.rows()
    }

    pub fn specs(&self) -> &Arc<Specs> {
        self.stream.specs()
    }

    pub fn stream(&self) -> &EventStream {
        &self.stream
    }

    /// Produce the next full batch, or `None` once `num_batches()` have
    /// been emitted. On error the partially assembled batch is
    /// discarded.
    pub fn next_batch(&mut self) -> Result<Option<Batch>> {
        if self.emitted == self.num_batches {
            return Ok(None);
        }
        let width = self.width();
        let mut x = Vec::with_capacity(self.batch_size * width);
        let mut mask = Vec::with_capacity(self.batch_size * width);
        let mut identifiers = Vec::with_capacity(self.batch_size);
        for _ in 0..self.batch_size {
            let event = self.stream.next_event()?;
            x.extend_from_slice(&event.x);
            mask.extend_from_slice(&event.mask);
            identifiers.push(event.identifiers);
        }
        self.emitted += 1;
        Ok(Some(Batch {
            rows: self.batch_size,
            width,
            x,
            mask,
            identifiers,
        }))
    }

    /// Restart from the first event. Nothing resets implicitly; this
    /// is the only way back.
    pub fn rewind(&mut self) {
        self.stream.rewind();
        self.emitted = 0;
    }

    /// Log the final throughput summary.
    pub fn summary(&self) {
        self.stream.meter().summary("read");
    }

    /// Export the collected histograms, consuming them.
    pub fn dump_histograms(&mut self, path: impl AsRef<Path>) -> Result<()> {
        match self.stream.take_histograms() {
            Some(hists) => hists.dump(path),
            None => Err(Error::Config(
                "histograms were not enabled for this reader".to_owned(),
            )),
        }
    }
}

/// Sidecar named after the input: next to a local file, in the working
/// directory for a remote one.
fn sidecar_path(locator: &Locator) -> PathBuf {
    match locator {
        Locator::Local(path) => {
            let mut os = path.clone().into_os_string();
            os.push(".specs.json");
            PathBuf::from(os)
        }
        Locator::Remote(url) => {
            let name = url
                .rsplit('/')
                .next()
                .filter(|s| !s.is_empty())
                .unwrap_or("tree");
            PathBuf::from(format!("{}.specs.json", name))
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use treevec_common::array::{FlatArray, JaggedArrayBuilder};

    use super::*;
    use crate::file::TreeFileBuilder;

    /// Twelve events: run = i, a = i, jagged j of cycling lengths 1, 2, 3.
    fn write_fixture(dir: &TempDir) -> String {
        let path = dir.path().join("events.tvf");
        let n = 12usize;
        let run = FlatArray::from((0..n).map(|i| i as f64).collect::<Vec<_>>());
        let a = FlatArray::from((0..n).map(|i| i as f64).collect::<Vec<_>>());
        let mut j = JaggedArrayBuilder::default();
        for i in 0..n {
            let inner: Vec<f64> = (0..(i % 3) + 1).map(|k| (i + k) as f64).collect();
            j.append(&inner);
        }
        let mut builder = TreeFileBuilder::new();
        builder
            .add_tree(
                "Events",
                vec![
                    ("run".to_owned(), run.into()),
                    ("a".to_owned(), a.into()),
                    ("j".to_owned(), j.finish().into()),
                ],
            )
            .unwrap();
        builder.write_to(&path).unwrap();
        path.to_str().unwrap().to_owned()
    }

    fn options() -> ReaderOptions {
        ReaderOptions {
            identifiers: vec!["run".to_owned()],
            chunk_size: 5,
            batch_size: 4,
            ..Default::default()
        }
    }

    #[test]
    fn test_batching_drops_trailing_remainder() {
        let dir = TempDir::new().unwrap();
        let input = write_fixture(&dir);
        let mut generator = BatchGenerator::open(
            &input,
            ReaderOptions {
                nevts: 10,
                ..options()
            },
        )
        .unwrap();
        assert_eq!(generator.num_batches(), 2);

        let first = generator.next_batch().unwrap().unwrap();
        assert_eq!(first.rows, 4);
        assert_eq!(first.width, generator.width());
        assert_eq!(first.x.len(), 4 * first.width);
        assert_eq!(first.mask.len(), 4 * first.width);
        let ids: Vec<f64> = first.identifiers.iter().map(|id| id[0]).collect();
        assert_eq!(ids, vec![0.0, 1.0, 2.0, 3.0]);

        let second = generator.next_batch().unwrap().unwrap();
        let ids: Vec<f64> = second.identifiers.iter().map(|id| id[0]).collect();
        assert_eq!(ids, vec![4.0, 5.0, 6.0, 7.0]);

        // events 8..11 are never emitted
        assert!(generator.next_batch().unwrap().is_none());
        assert!(generator.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_rewind_replays_the_same_events() {
        let dir = TempDir::new().unwrap();
        let input = write_fixture(&dir);
        let mut generator = BatchGenerator::open(&input, options()).unwrap();
        assert_eq!(generator.num_batches(), 3);
        let first = generator.next_batch().unwrap().unwrap();
        while generator.next_batch().unwrap().is_some() {}
        generator.rewind();
        let again = generator.next_batch().unwrap().unwrap();
        assert_eq!(again.identifiers, first.identifiers);
        assert_eq!(again.mask, first.mask);
    }

    #[test]
    fn test_auto_persists_sidecar_and_reloads_it() {
        let dir = TempDir::new().unwrap();
        let input = write_fixture(&dir);
        let generator = BatchGenerator::open(&input, options()).unwrap();
        let sidecar = PathBuf::from(format!("{}.specs.json", input));
        assert!(sidecar.exists());
        let specs = Specs::load(&sidecar).unwrap();
        assert_eq!(&specs, generator.specs().as_ref());

        // a second reader driven by the sidecar skips inference
        let from_sidecar = BatchGenerator::open(
            &input,
            ReaderOptions {
                specs: Some(sidecar),
                ..options()
            },
        )
        .unwrap();
        assert_eq!(from_sidecar.width(), generator.width());
    }

    #[test]
    fn test_branch_selection_applies_to_output() {
        let dir = TempDir::new().unwrap();
        let input = write_fixture(&dir);
        let generator = BatchGenerator::open(
            &input,
            ReaderOptions {
                selected_branches: vec!["a".to_owned()],
                ..options()
            },
        )
        .unwrap();
        assert_eq!(generator.specs().fkeys, vec!["a".to_owned()]);
        assert!(generator.specs().jkeys.is_empty());
        assert_eq!(generator.width(), 1);
    }

    #[test]
    fn test_zero_match_selection_is_schema_error() {
        let dir = TempDir::new().unwrap();
        let input = write_fixture(&dir);
        let result = BatchGenerator::open(
            &input,
            ReaderOptions {
                selected_branches: vec!["Muon_*".to_owned()],
                ..options()
            },
        );
        assert!(matches!(result, Err(Error::Schema(_))));
    }

    #[test]
    fn test_invalid_options_are_config_errors() {
        let dir = TempDir::new().unwrap();
        let input = write_fixture(&dir);
        for broken in [
            ReaderOptions {
                batch_size: 0,
                ..options()
            },
            ReaderOptions {
                chunk_size: 0,
                ..options()
            },
            ReaderOptions {
                nevts: -2,
                ..options()
            },
        ] {
            assert!(matches!(
                BatchGenerator::open(&input, broken),
                Err(Error::Config(_))
            ));
        }
    }

    #[test]
    fn test_histogram_dump() {
        let dir = TempDir::new().unwrap();
        let input = write_fixture(&dir);
        let mut generator = BatchGenerator::open(
            &input,
            ReaderOptions {
                histograms: true,
                ..options()
            },
        )
        .unwrap();
        while generator.next_batch().unwrap().is_some() {}
        let out = dir.path().join("hists.json");
        generator.dump_histograms(&out).unwrap();
        assert!(out.exists());
        // a second dump has nothing left to export
        assert!(generator.dump_histograms(&out).is_err());
    }
}
