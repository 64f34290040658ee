//! The persisted read-id index.
//!
//! The index section is a flat, sorted array of fixed-size entries so
//! that lookups can binary-search the memory-mapped bytes directly:
//!
//! ```text
//! u64 entry count | entries...
//! entry: [u8; 16] read id | u32 batch | u32 row   (24 bytes, little endian)
//! ```
//!
//! Entries are sorted by read id bytes, then batch, then row. Opening a
//! file therefore costs nothing for the index; each lookup is a binary
//! search over the mapped section.

use crate::error::Pod5Error;

const ENTRY_SIZE: usize = 24;
const HEADER_SIZE: usize = 8;

/// One index entry mapping a read id to its batch and in-batch row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IndexEntry {
    pub read_id: [u8; 16],
    pub batch: u32,
    pub row: u32,
}

/// Serialise entries into the on-disk index blob, sorting in place.
pub(crate) fn serialize_index(entries: &mut [IndexEntry]) -> Vec<u8> {
    entries.sort_unstable_by(|a, b| {
        a.read_id
            .cmp(&b.read_id)
            .then(a.batch.cmp(&b.batch))
            .then(a.row.cmp(&b.row))
    });
    let mut bytes = Vec::with_capacity(HEADER_SIZE + entries.len() * ENTRY_SIZE);
    bytes.extend_from_slice(&(entries.len() as u64).to_le_bytes());
    for entry in entries {
        bytes.extend_from_slice(&entry.read_id);
        bytes.extend_from_slice(&entry.batch.to_le_bytes());
        bytes.extend_from_slice(&entry.row.to_le_bytes());
    }
    bytes
}

/// A parsed (or mapped) read-id index.
pub(crate) struct ReadIndex<B> {
    bytes: B,
    count: usize,
}

impl<B: AsRef<[u8]>> ReadIndex<B> {
    /// Validate an index section. `bytes` is the exact section content.
    pub fn from_section(bytes: B) -> Result<Self, Pod5Error> {
        let raw = bytes.as_ref();
        if raw.len() < HEADER_SIZE {
            return Err(Pod5Error::TruncatedFooter);
        }
        let count = u64::from_le_bytes(raw[..8].try_into().expect("slice is 8 bytes")) as usize;
        if raw.len() < HEADER_SIZE + count * ENTRY_SIZE {
            return Err(Pod5Error::TruncatedFooter);
        }
        Ok(Self { bytes, count })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    fn entry(&self, idx: usize) -> IndexEntry {
        let raw = self.bytes.as_ref();
        let base = HEADER_SIZE + idx * ENTRY_SIZE;
        let read_id: [u8; 16] = raw[base..base + 16]
            .try_into()
            .expect("slice is 16 bytes");
        let batch = u32::from_le_bytes(
            raw[base + 16..base + 20]
                .try_into()
                .expect("slice is 4 bytes"),
        );
        let row = u32::from_le_bytes(
            raw[base + 20..base + 24]
                .try_into()
                .expect("slice is 4 bytes"),
        );
        IndexEntry {
            read_id,
            batch,
            row,
        }
    }

    /// Locate a read id. Returns its `(batch, row)` or `None`. When a
    /// file holds duplicate ids the entry with the lowest batch/row wins.
    pub fn lookup(&self, read_id: &[u8; 16]) -> Option<(u32, u32)> {
        let mut lo = 0usize;
        let mut hi = self.count;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.entry(mid).read_id < *read_id {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        if lo < self.count {
            let entry = self.entry(lo);
            if entry.read_id == *read_id {
                return Some((entry.batch, entry.row));
            }
        }
        None
    }

    #[cfg(test)]
    fn entries(&self) -> Vec<IndexEntry> {
        (0..self.count).map(|i| self.entry(i)).collect()
    }
}

#[cfg(test)]
impl ReadIndex<Vec<u8>> {
    /// Build an in-memory index from unsorted entries.
    fn from_entries(mut entries: Vec<IndexEntry>) -> Self {
        let bytes = serialize_index(&mut entries);
        Self {
            count: entries.len(),
            bytes,
        }
    }
}
