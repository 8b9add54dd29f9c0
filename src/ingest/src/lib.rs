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

//! Streaming ingest of columnar event trees.
//!
//! The pipeline is pull-based and single-threaded: a [`BatchGenerator`]
//! drives an [`EventStream`], which refills a bounded chunk buffer from
//! a [`TreeHandle`] and flattens each event into a normalized `(x, mask)`
//! pair shaped by the immutable [`Specs`]. Specs are either loaded from
//! a sidecar or inferred in a dedicated first pass.

pub mod batch;
pub mod file;
pub mod infer;
pub mod source;
pub mod specs;
pub mod stats;
pub mod stream;
pub mod vectorize;

pub use batch::{Batch, BatchGenerator, ReaderOptions};
pub use file::{TreeFileBuilder, TreeHandle};
pub use infer::{infer_specs, SpecsBuilder};
pub use source::{Locator, DEFAULT_REDIRECTOR};
pub use specs::Specs;
pub use stats::{Histogram, HistogramSet, ThroughputMeter};
pub use stream::{Event, EventStream};
pub use vectorize::RowVectorizer;
