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

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::sync::Arc;

use anyhow::anyhow;
use bytes::{Buf, Bytes};
use tracing::debug;
use treevec_common::array::{ArrayImpl, DataChunk, FlatArray, JaggedArray};
use treevec_common::catalog::{BranchDesc, BranchKind, Schema};
use treevec_common::{Error, Result};

use super::format::{BranchMeta, ContainerMeta, TreeMeta, FOOTER_LEN, MAGIC, VERSION};
use crate::source::Locator;

/// Where container bytes come from: a local file served with positioned
/// reads, or a remote body fetched once and served from memory.
enum ByteSource {
    File { file: File, path: String },
    Mem { data: Bytes, url: String },
}

impl ByteSource {
    fn open(locator: &Locator) -> Result<Self> {
        match locator {
            Locator::Local(path) => {
                let file = File::open(path).map_err(|e| Error::io(path, e))?;
                Ok(Self::File {
                    file,
                    path: path.display().to_string(),
                })
            }
            Locator::Remote(url) => {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(Error::Io {
                        path: url.clone(),
                        source: anyhow!("unsupported transport scheme"),
                    });
                }
                let data = reqwest::blocking::get(url)
                    .and_then(|response| response.error_for_status())
                    .and_then(|response| response.bytes())
                    .map_err(|e| Error::Io {
                        path: url.clone(),
                        source: e.into(),
                    })?;
                debug!(url = %url, bytes = data.len(), "fetched remote container");
                Ok(Self::Mem {
                    data,
                    url: url.clone(),
                })
            }
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::File { path, .. } => path,
            Self::Mem { url, .. } => url,
        }
    }

    fn len(&self) -> Result<u64> {
        match self {
            Self::File { file, path } => {
                let meta = file.metadata().map_err(|e| Error::io(path, e))?;
                Ok(meta.len())
            }
            Self::Mem { data, .. } => Ok(data.len() as u64),
        }
    }

    fn read_at(&mut self, offset: u64, len: usize) -> Result<Bytes> {
        match self {
            Self::File { file, path } => {
                file.seek(SeekFrom::Start(offset))
                    .map_err(|e| Error::io(&path, e))?;
                let mut buf = vec![0u8; len];
                file.read_exact(&mut buf).map_err(|e| Error::io(&path, e))?;
                Ok(Bytes::from(buf))
            }
            Self::Mem { data, url } => {
                let end = offset as usize + len;
                if end > data.len() {
                    return Err(Error::Io {
                        path: url.clone(),
                        source: anyhow!(
                            "short read: {} bytes at offset {}, body is {}",
                            len,
                            offset,
                            data.len()
                        ),
                    });
                }
                Ok(data.slice(offset as usize..end))
            }
        }
    }
}

/// An opened tree within a container file. Serves any row range of any
/// branch as a [`DataChunk`] without materializing the rest.
pub struct TreeHandle {
    source: ByteSource,
    meta: TreeMeta,
    schema: Arc<Schema>,
}

impl TreeHandle {
    /// Open `tree` inside the container behind `locator`. Fails with an
    /// I/O error if the container cannot be opened or the tree is
    /// absent.
    pub fn open(locator: &Locator, tree: &str) -> Result<Self> {
        let mut source = ByteSource::open(locator)?;
        let total = source.len()?;
        if total < FOOTER_LEN as u64 {
            return Err(corrupt(&source, "file too short for a footer"));
        }
        let mut footer = source.read_at(total - FOOTER_LEN as u64, FOOTER_LEN)?;
        let meta_offset = footer.get_u64_le();
        let meta_len = footer.get_u32_le() as usize;
        let version = footer.get_u32_le();
        let magic = footer.get_u32_le();
        if magic != MAGIC {
            return Err(corrupt(&source, "bad magic, not a tree container"));
        }
        if version != VERSION {
            return Err(Error::Io {
                path: source.name().to_owned(),
                source: anyhow!("unsupported container version {}", version),
            });
        }
        if meta_offset + meta_len as u64 + 4 > total {
            return Err(corrupt(&source, "meta block out of bounds"));
        }
        let meta_json = source.read_at(meta_offset, meta_len)?;
        let expected = source.read_at(meta_offset + meta_len as u64, 4)?.get_u32_le();
        if crc32fast::hash(&meta_json) != expected {
            return Err(corrupt(&source, "meta checksum mismatch"));
        }
        let container: ContainerMeta = serde_json::from_slice(&meta_json)
            .map_err(|e| Error::io(source.name(), e))?;
        let meta = container.tree(tree).cloned().ok_or_else(|| Error::Io {
            path: source.name().to_owned(),
            source: anyhow!("tree `{}` absent from container", tree),
        })?;
        debug!(
            source = source.name(),
            tree,
            rows = meta.rows,
            branches = meta.branches.len(),
            "opened tree"
        );
        let schema = Arc::new(meta.schema());
        Ok(Self {
            source,
            meta,
            schema,
        })
    }

    /// Total number of records.
    pub fn row_count(&self) -> u64 {
        self.meta.rows
    }

    pub fn tree_name(&self) -> &str {
        &self.meta.name
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Schema over all branches of the tree, in container order.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn branch_names(&self) -> impl Iterator<Item = &str> {
        self.meta.branches.iter().map(|b| b.name.as_str())
    }

    /// Project the tree onto the named branches, failing with a schema
    /// error on any absent one.
    pub fn resolve_schema(&self, branches: &[String]) -> Result<Arc<Schema>> {
        let descs = branches
            .iter()
            .map(|name| {
                self.meta
                    .branch(name)
                    .map(|b| BranchDesc::new(b.name.clone(), b.kind))
                    .ok_or_else(|| {
                        Error::Schema(format!(
                            "branch `{}` absent from tree `{}`",
                            name, self.meta.name
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Arc::new(Schema::new(descs)))
    }

    /// Decode rows `range` of the schema's branches into one chunk.
    pub fn read_rows(&mut self, range: Range<u64>, schema: &Arc<Schema>) -> Result<DataChunk> {
        if range.start > range.end || range.end > self.meta.rows {
            return Err(Error::Config(format!(
                "row range {}..{} out of bounds for {} rows",
                range.start, range.end, self.meta.rows
            )));
        }
        let mut columns = Vec::with_capacity(schema.len());
        for desc in schema.branches() {
            let branch = self
                .meta
                .branch(&desc.name)
                .cloned()
                .ok_or_else(|| {
                    Error::Schema(format!(
                        "branch `{}` absent from tree `{}`",
                        desc.name, self.meta.name
                    ))
                })?;
            let column = match branch.kind {
                BranchKind::Flat => self.read_flat(&branch, &range)?,
                BranchKind::Jagged => self.read_jagged(&branch, &range)?,
            };
            columns.push(column);
        }
        Ok(DataChunk::new(schema.clone(), columns))
    }

    /// Iterate the tree in chunks of `chunk_size` rows; the last chunk
    /// may be shorter.
    pub fn chunks(&mut self, schema: Arc<Schema>, chunk_size: u64) -> ChunkIter<'_> {
        ChunkIter {
            handle: self,
            schema,
            chunk_size: chunk_size.max(1),
            next_row: 0,
        }
    }

    /// Re-read every branch payload and check it against the recorded
    /// checksum.
    pub fn verify(&mut self) -> Result<()> {
        for branch in self.meta.branches.clone() {
            let payload = self.source.read_at(branch.offset, branch.bytes as usize)?;
            if crc32fast::hash(&payload) != branch.crc {
                return Err(Error::Io {
                    path: self.source.name().to_owned(),
                    source: anyhow!("checksum mismatch on branch `{}`", branch.name),
                });
            }
        }
        Ok(())
    }

    fn read_flat(&mut self, branch: &BranchMeta, range: &Range<u64>) -> Result<ArrayImpl> {
        let rows = (range.end - range.start) as usize;
        if range.end * 8 > branch.bytes {
            return Err(corrupt(&self.source, "flat block shorter than row count"));
        }
        let mut data = self
            .source
            .read_at(branch.offset + range.start * 8, rows * 8)?;
        let mut values = Vec::with_capacity(rows);
        for _ in 0..rows {
            values.push(data.get_f64_le());
        }
        Ok(FlatArray::from(values).into())
    }

    fn read_jagged(&mut self, branch: &BranchMeta, range: &Range<u64>) -> Result<ArrayImpl> {
        let rows = (range.end - range.start) as usize;
        let offsets_bytes = branch.offsets_bytes(self.meta.rows);
        if offsets_bytes > branch.bytes {
            return Err(corrupt(&self.source, "jagged block shorter than offsets"));
        }
        let mut data = self
            .source
            .read_at(branch.offset + range.start * 4, (rows + 1) * 4)?;
        let mut offsets = Vec::with_capacity(rows + 1);
        for _ in 0..rows + 1 {
            offsets.push(data.get_u32_le());
        }
        if offsets.windows(2).any(|w| w[0] > w[1]) {
            return Err(corrupt(&self.source, "jagged offsets not monotonic"));
        }
        let first = offsets[0];
        let last = offsets[rows];
        let values_base = branch.offset + offsets_bytes;
        if offsets_bytes + last as u64 * 8 > branch.bytes {
            return Err(corrupt(&self.source, "jagged values out of bounds"));
        }
        let count = (last - first) as usize;
        let mut data = self.source.read_at(values_base + first as u64 * 8, count * 8)?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(data.get_f64_le());
        }
        let rebased = offsets.iter().map(|o| o - first).collect();
        let array = JaggedArray::from_parts(values, rebased).map_err(|e| Error::Io {
            path: self.source.name().to_owned(),
            source: e,
        })?;
        Ok(array.into())
    }
}

fn corrupt(source: &ByteSource, reason: &str) -> Error {
    Error::Io {
        path: source.name().to_owned(),
        source: anyhow!("{}", reason),
    }
}

pub struct ChunkIter<'a> {
    handle: &'a mut TreeHandle,
    schema: Arc<Schema>,
    chunk_size: u64,
    next_row: u64,
}

impl Iterator for ChunkIter<'_> {
    type Item = Result<DataChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        let rows = self.handle.row_count();
        if self.next_row == rows {
            return None;
        }
        let take = self.chunk_size.min(rows - self.next_row);
        let chunk = self
            .handle
            .read_rows(self.next_row..self.next_row + take, &self.schema);
        self.next_row += take;
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use treevec_common::array::{FlatArray, JaggedArrayBuilder, ValueRef};

    use super::*;
    use crate::file::TreeFileBuilder;

    fn write_fixture(dir: &TempDir) -> std::path::PathBuf {
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
                        "a".to_owned(),
                        FlatArray::from(vec![0.0, 1.0, 2.0, 3.0, 4.0]).into(),
                    ),
                    ("j".to_owned(), jagged.finish().into()),
                ],
            )
            .unwrap();
        builder.write_to(&path).unwrap();
        path
    }

    #[test]
    fn test_open_and_read_ranges() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir);
        let locator = Locator::Local(path);
        let mut handle = TreeHandle::open(&locator, "Events").unwrap();
        assert_eq!(handle.row_count(), 5);
        handle.verify().unwrap();

        let schema = handle
            .resolve_schema(&["a".to_owned(), "j".to_owned()])
            .unwrap();
        let chunk = handle.read_rows(1..4, &schema).unwrap();
        assert_eq!(chunk.cardinality(), 3);
        let row = chunk.row_at(0);
        assert_eq!(row.value_at(0), ValueRef::Flat(1.0));
        assert_eq!(row.value_at(1), ValueRef::Jagged(&[]));
        let row = chunk.row_at(2);
        assert_eq!(row.value_at(1), ValueRef::Jagged(&[4.0, 5.0, 6.0]));
    }

    #[test]
    fn test_chunk_iteration_covers_partial_tail() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir);
        let mut handle = TreeHandle::open(&Locator::Local(path), "Events").unwrap();
        let schema = handle.resolve_schema(&["j".to_owned()]).unwrap();
        let sizes = handle
            .chunks(schema, 2)
            .map(|chunk| chunk.unwrap().cardinality())
            .collect::<Vec<_>>();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn test_absent_tree_is_io_error() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir);
        let result = TreeHandle::open(&Locator::Local(path), "NoSuchTree");
        assert!(matches!(result, Err(Error::Io { .. })));
    }

    #[test]
    fn test_absent_branch_is_schema_error() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir);
        let handle = TreeHandle::open(&Locator::Local(path), "Events").unwrap();
        let result = handle.resolve_schema(&["nope".to_owned()]);
        assert!(matches!(result, Err(Error::Schema(_))));
    }

    #[test]
    fn test_truncated_container_is_io_error() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir);
        let data = std::fs::read(&path).unwrap();
        let clipped = dir.path().join("clipped.tvf");
        std::fs::write(&clipped, &data[..data.len() - 6]).unwrap();
        let result = TreeHandle::open(&Locator::Local(clipped), "Events");
        assert!(matches!(result, Err(Error::Io { .. })));
    }

    #[test]
    fn test_corrupt_branch_fails_verify() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir);
        let mut data = std::fs::read(&path).unwrap();
        data[3] ^= 0xff;
        let mangled = dir.path().join("mangled.tvf");
        std::fs::write(&mangled, data).unwrap();
        let mut handle = TreeHandle::open(&Locator::Local(mangled), "Events").unwrap();
        assert!(matches!(handle.verify(), Err(Error::Io { .. })));
    }

    #[test]
    fn test_unsupported_scheme_is_io_error() {
        let locator = Locator::Remote("root://host//store/file.tvf".to_owned());
        let result = TreeHandle::open(&locator, "Events");
        assert!(matches!(result, Err(Error::Io { .. })));
    }
}
