//! Byte windows over a memory-mapped POD5 file and lazily decoded Arrow
//! tables.
//!
//! The reader maps the file once; every table section is a
//! `(map, offset, length)` window that can be cloned cheaply and shipped
//! to worker threads. Batch decode is lazy and cached: batches decode in
//! file order on first access and stay resident for the life of the
//! reader.

use std::{
    io::Cursor,
    sync::{Arc, Mutex},
};

use arrow::{array::RecordBatch, datatypes::SchemaRef, ipc::reader::FileReader};
use memmap2::Mmap;

use crate::error::Pod5Error;

/// A cheaply clonable window into the file mapping.
#[derive(Clone)]
pub(crate) struct TableBytes {
    map: Arc<Mmap>,
    offset: usize,
    length: usize,
}

impl TableBytes {
    /// Slice a window out of the mapping, validating bounds.
    pub fn new(map: Arc<Mmap>, offset: usize, length: usize) -> Result<Self, Pod5Error> {
        match offset.checked_add(length) {
            Some(end) if end <= map.len() => Ok(Self {
                map,
                offset,
                length,
            }),
            _ => Err(Pod5Error::TruncatedFooter),
        }
    }

}

impl AsRef<[u8]> for TableBytes {
    fn as_ref(&self) -> &[u8] {
        &self.map[self.offset..self.offset + self.length]
    }
}

/// Bytes backing a read-id index: either mapped from the file's index
/// section or rebuilt in memory by scanning the reads table.
#[derive(Clone)]
pub(crate) enum IndexBytes {
    Mapped(TableBytes),
    Owned(Arc<Vec<u8>>),
}

impl AsRef<[u8]> for IndexBytes {
    fn as_ref(&self) -> &[u8] {
        match self {
            IndexBytes::Mapped(bytes) => bytes.as_ref(),
            IndexBytes::Owned(bytes) => bytes.as_slice(),
        }
    }
}

struct DecodeState {
    reader: FileReader<Cursor<TableBytes>>,
    loaded: Vec<RecordBatch>,
}

/// One embedded Arrow table: schema plus lazily decoded, cached batches.
pub(crate) struct TableSource {
    schema: SchemaRef,
    num_batches: usize,
    state: Mutex<DecodeState>,
}

impl TableSource {
    pub fn open(bytes: TableBytes) -> Result<Self, Pod5Error> {
        let reader = FileReader::try_new(Cursor::new(bytes), None)?;
        let schema = reader.schema();
        let num_batches = reader.num_batches();
        Ok(Self {
            schema,
            num_batches,
            state: Mutex::new(DecodeState {
                reader,
                loaded: Vec::new(),
            }),
        })
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn num_batches(&self) -> usize {
        self.num_batches
    }

    /// Decode (or fetch from cache) the batch at `index`. Cloning a
    /// `RecordBatch` only bumps column refcounts.
    pub fn batch(&self, index: usize) -> Result<RecordBatch, Pod5Error> {
        if index >= self.num_batches {
            return Err(Pod5Error::SchemaMismatch(format!(
                "batch {index} out of range, table has {} batches",
                self.num_batches
            )));
        }
        let mut state = self.state.lock().expect("table decode lock poisoned");
        while state.loaded.len() <= index {
            match state.reader.next() {
                Some(Ok(batch)) => state.loaded.push(batch),
                Some(Err(err)) => return Err(err.into()),
                None => {
                    return Err(Pod5Error::SchemaMismatch(format!(
                        "table ended after {} batches, expected {}",
                        state.loaded.len(),
                        self.num_batches
                    )))
                }
            }
        }
        Ok(state.loaded[index].clone())
    }

    /// Total row count across all batches. Decodes every batch.
    pub fn total_rows(&self) -> Result<usize, Pod5Error> {
        let mut rows = 0;
        for index in 0..self.num_batches {
            rows += self.batch(index)?.num_rows();
        }
        Ok(rows)
    }
}
