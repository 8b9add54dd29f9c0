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

use std::sync::Arc;
use std::time::Instant;

use rand::Rng;
use tracing::trace;
use treevec_common::array::{DataChunk, ValueRef};
use treevec_common::catalog::{BranchKind, Schema};
use treevec_common::{Error, Result};

use crate::file::TreeHandle;
use crate::specs::Specs;
use crate::stats::{HistogramSet, ThroughputMeter};
use crate::vectorize::RowVectorizer;

/// One flattened event: the identifier side channel plus the
/// normalized vector and its mask.
#[derive(Clone, Debug)]
pub struct Event {
    pub identifiers: Vec<f64>,
    pub x: Vec<f64>,
    pub mask: Vec<u8>,
}

/// Sequential cursor over a tree: advances one record at a time and
/// refills its chunk buffer on the boundary. The final partial chunk is
/// consumed to exhaustion; afterwards every call fails and only an
/// explicit [`rewind`](Self::rewind) restarts the stream.
pub struct EventStream {
    handle: TreeHandle,
    specs: Arc<Specs>,
    schema: Arc<Schema>,
    vectorizer: RowVectorizer,
    id_cols: Vec<usize>,
    chunk_size: u64,
    rows: u64,
    idx: u64,
    cidx: usize,
    buffer: Option<DataChunk>,
    meter: ThroughputMeter,
    hists: Option<HistogramSet>,
}

impl EventStream {
    /// `schema` is the chunk projection: the output branches followed
    /// by the identifier branches.
    pub fn new(
        handle: TreeHandle,
        specs: Arc<Specs>,
        schema: Arc<Schema>,
        identifiers: &[String],
        chunk_size: u64,
        histograms: bool,
    ) -> Result<Self> {
        let vectorizer = RowVectorizer::new(&specs, &schema)?;
        let id_cols = identifiers
            .iter()
            .map(|name| {
                let col = schema.index_of(name).ok_or_else(|| {
                    Error::Schema(format!("identifier branch `{}` absent from tree", name))
                })?;
                if schema[col].kind != BranchKind::Flat {
                    return Err(Error::Schema(format!(
                        "identifier branch `{}` must be flat",
                        name
                    )));
                }
                Ok(col)
            })
            .collect::<Result<Vec<_>>>()?;
        let rows = handle.row_count();
        let chunk_size = chunk_size.min(rows.max(1));
        let hists = histograms.then(|| HistogramSet::from_specs(&specs));
        Ok(Self {
            handle,
            specs,
            schema,
            vectorizer,
            id_cols,
            chunk_size,
            rows,
            idx: 0,
            cidx: 0,
            buffer: None,
            meter: ThroughputMeter::new(),
            hists,
        })
    }

    /// Total number of records behind this stream.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Length of every emitted `x` and `mask`.
    pub fn width(&self) -> usize {
        self.vectorizer.width()
    }

    pub fn specs(&self) -> &Arc<Specs> {
        &self.specs
    }

    pub fn meter(&self) -> &ThroughputMeter {
        &self.meter
    }

    pub fn handle(&self) -> &TreeHandle {
        &self.handle
    }

    pub fn take_histograms(&mut self) -> Option<HistogramSet> {
        self.hists.take()
    }

    /// Emit the next event, refilling the chunk buffer when the
    /// intra-chunk cursor crosses its end.
    pub fn next_event(&mut self) -> Result<Event> {
        if self.idx == self.rows {
            return Err(Error::Exhausted);
        }
        let refill = !self
            .buffer
            .as_ref()
            .is_some_and(|chunk| self.cidx < chunk.cardinality());
        if refill {
            let take = self.chunk_size.min(self.rows - self.idx);
            let started = Instant::now();
            let chunk = self.handle.read_rows(self.idx..self.idx + take, &self.schema)?;
            self.meter.observe_chunk(
                chunk.cardinality(),
                chunk.columns().len(),
                chunk.byte_size(),
                started.elapsed(),
            );
            trace!(idx = self.idx, rows = take, "refilled chunk buffer");
            self.cidx = 0;
            self.buffer = Some(chunk);
        }
        let Some(chunk) = self.buffer.as_ref() else {
            unreachable!("buffer was just refilled")
        };
        let row = chunk.row_at(self.cidx);
        let identifiers = self
            .id_cols
            .iter()
            .map(|&col| flat_value(row.value_at(col)))
            .collect();
        let (x, mask) = self.vectorizer.vectorize(row, self.hists.as_mut());
        self.cidx += 1;
        self.idx += 1;
        Ok(Event {
            identifiers,
            x,
            mask,
        })
    }

    /// Reset the cursor to the first record and drop the chunk buffer.
    /// Throughput counters and histograms start over as well.
    pub fn rewind(&mut self) {
        self.idx = 0;
        self.cidx = 0;
        self.buffer = None;
        self.meter = ThroughputMeter::new();
        if self.hists.is_some() {
            self.hists = Some(HistogramSet::from_specs(&self.specs));
        }
    }

    /// Draw a random value of `key` from the buffered chunk, perturbed
    /// by ±10%. Used to synthesize probe vectors.
    pub fn draw_value(&mut self, key: &str) -> Result<f64> {
        if self.buffer.is_none() {
            let take = self.chunk_size.min(self.rows);
            let chunk = self.handle.read_rows(0..take, &self.schema)?;
            self.buffer = Some(chunk);
        }
        let Some(chunk) = self.buffer.as_ref() else {
            unreachable!("buffer was just refilled")
        };
        if chunk.cardinality() == 0 {
            return Err(Error::Exhausted);
        }
        let col = self
            .schema
            .index_of(key)
            .ok_or_else(|| Error::Schema(format!("branch `{}` absent from tree", key)))?;
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let row = rng.gen_range(0..chunk.cardinality());
            let value = match chunk.column_at(col).value_at(row) {
                ValueRef::Flat(v) => v,
                ValueRef::Jagged(inner) => {
                    if inner.is_empty() {
                        continue;
                    }
                    inner[rng.gen_range(0..inner.len())]
                }
            };
            if value.is_nan() {
                continue;
            }
            return if rng.gen_bool(0.5) {
                Ok(value + value / 10.0)
            } else {
                Ok(value - value / 10.0)
            };
        }
        Err(Error::Schema(format!(
            "branch `{}` has no drawable values in the buffered chunk",
            key
        )))
    }
}

fn flat_value(value: ValueRef<'_>) -> f64 {
    match value {
        ValueRef::Flat(v) => v,
        ValueRef::Jagged(_) => unreachable!("identifier kinds are checked at construction"),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use treevec_common::array::{FlatArray, JaggedArrayBuilder};

    use super::*;
    use crate::file::TreeFileBuilder;
    use crate::infer::infer_specs;
    use crate::source::Locator;

    /// Five events: run 1..=5, flat `a` = 0..=4, jagged `j` of lengths
    /// 2, 0, 1, 3, 1.
    fn open_fixture(dir: &TempDir) -> TreeHandle {
        let path = dir.path().join("events.tvf");
        let mut jagged = JaggedArrayBuilder::default();
        jagged.append(&[1.0, 2.0]);
        jagged.append(&[]);
        jagged.append(&[3.0]);
        jagged.append(&[4.0, 5.0, 6.0]);
        jagged.append(&[7.0]);
        let mut builder = TreeFileBuilder::new();
        builder
            .add_tree(
                "Events",
                vec![
                    (
                        "run".to_owned(),
                        FlatArray::from(vec![1.0, 2.0, 3.0, 4.0, 5.0]).into(),
                    ),
                    (
                        "a".to_owned(),
                        FlatArray::from(vec![0.0, 1.0, 2.0, 3.0, 4.0]).into(),
                    ),
                    ("j".to_owned(), jagged.finish().into()),
                ],
            )
            .unwrap();
        builder.write_to(&path).unwrap();
        TreeHandle::open(&Locator::Local(path), "Events").unwrap()
    }

    fn open_stream(dir: &TempDir, chunk_size: u64) -> EventStream {
        let mut handle = open_fixture(dir);
        let identifiers = vec!["run".to_owned()];
        let branches = vec!["a".to_owned(), "j".to_owned()];
        let specs = infer_specs(&mut handle, &branches, &identifiers, chunk_size, -1, f64::NAN)
            .unwrap();
        let schema = handle
            .resolve_schema(&["a".to_owned(), "j".to_owned(), "run".to_owned()])
            .unwrap();
        EventStream::new(
            handle,
            Arc::new(specs),
            schema,
            &identifiers,
            chunk_size,
            false,
        )
        .unwrap()
    }

    #[test]
    fn test_streams_all_rows_in_order() {
        let dir = TempDir::new().unwrap();
        let mut stream = open_stream(&dir, 2);
        assert_eq!(stream.rows(), 5);
        // width: one flat key + jdim(j) = 1 + 3
        assert_eq!(stream.width(), 4);
        for idx in 0..5 {
            let event = stream.next_event().unwrap();
            assert_eq!(event.identifiers, vec![idx as f64 + 1.0]);
            assert_eq!(event.x.len(), 4);
            assert_eq!(event.mask.len(), 4);
            // flat `a` spans [0, 4], so normalize(a, idx) = idx / 4
            assert_eq!(event.x[0], idx as f64 / 4.0);
        }
        assert!(matches!(stream.next_event(), Err(Error::Exhausted)));
    }

    #[test]
    fn test_partial_final_chunk_is_consumed() {
        let dir = TempDir::new().unwrap();
        // chunk size 3 over 5 rows: chunks of 3 and 2
        let mut stream = open_stream(&dir, 3);
        let mut count = 0;
        while let Ok(event) = stream.next_event() {
            assert_eq!(event.x.len(), stream.width());
            count += 1;
        }
        assert_eq!(count, 5);
        assert_eq!(stream.meter().rows(), 5);
    }

    #[test]
    fn test_mask_marks_padding() {
        let dir = TempDir::new().unwrap();
        let mut stream = open_stream(&dir, 5);
        let first = stream.next_event().unwrap();
        // j = [1, 2] padded to width 3
        assert_eq!(&first.mask[1..], &[1, 1, 0]);
        let second = stream.next_event().unwrap();
        assert_eq!(&second.mask[1..], &[0, 0, 0]);
        assert!(second.x[1..].iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_rewind_restarts_from_first_row() {
        let dir = TempDir::new().unwrap();
        let mut stream = open_stream(&dir, 2);
        let first = stream.next_event().unwrap();
        for _ in 0..4 {
            stream.next_event().unwrap();
        }
        assert!(stream.next_event().is_err());
        stream.rewind();
        let again = stream.next_event().unwrap();
        assert_eq!(again.identifiers, first.identifiers);
        assert_eq!(again.mask, first.mask);
    }

    #[test]
    fn test_missing_identifier_is_schema_error() {
        let dir = TempDir::new().unwrap();
        let mut handle = open_fixture(&dir);
        let identifiers = vec!["lumi".to_owned()];
        let branches = vec!["a".to_owned()];
        let specs =
            infer_specs(&mut handle, &branches, &identifiers, 2, -1, f64::NAN).unwrap();
        let schema = handle.resolve_schema(&branches).unwrap();
        let result = EventStream::new(handle, Arc::new(specs), schema, &identifiers, 2, false);
        assert!(matches!(result, Err(Error::Schema(_))));
    }

    #[test]
    fn test_draw_value_perturbs_within_ten_percent() {
        let dir = TempDir::new().unwrap();
        let mut stream = open_stream(&dir, 5);
        let value = stream.draw_value("a").unwrap();
        // flat `a` carries 0..=4; a ±10% perturbation stays within [0, 4.4]
        assert!((0.0..=4.4).contains(&value));
    }
}
