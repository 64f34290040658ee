//! Translating a set of read ids into a per-batch traversal plan.

use uuid::Uuid;

use crate::{index::ReadIndex, tables::IndexBytes};

/// How rows are ordered within each batch of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalOrder {
    /// Rows ascend within each batch, minimising seek backtracking on
    /// sequential storage.
    ReadEfficient,
    /// Rows keep the caller's input order within each batch, so a
    /// user-specified iteration can be reconstructed.
    OriginalOrder,
}

/// The output of planning: how many ids were found, how many selected
/// rows fall in each batch, and the flat row array grouped by batch in
/// ascending batch order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalPlan {
    /// Number of requested ids that were located. Less than the request
    /// size when ids were missing.
    pub successful_finds: usize,
    /// Selected row count per read batch; length equals the file's batch
    /// count.
    pub per_batch_counts: Vec<u32>,
    /// In-batch row indices, grouped by batch. Duplicated input ids
    /// yield duplicated entries.
    pub batch_rows: Vec<u32>,
}

impl TraversalPlan {
    /// Number of rows the plan selects.
    pub fn num_selected(&self) -> usize {
        self.batch_rows.len()
    }

    /// Split the flat row array into one slice per batch.
    pub fn rows_by_batch(&self) -> Vec<&[u32]> {
        let mut slices = Vec::with_capacity(self.per_batch_counts.len());
        let mut offset = 0usize;
        for &count in &self.per_batch_counts {
            slices.push(&self.batch_rows[offset..offset + count as usize]);
            offset += count as usize;
        }
        slices
    }

    /// A plan selecting every row of every batch, in file order.
    pub(crate) fn all_rows(batch_row_counts: &[usize]) -> Self {
        let total = batch_row_counts.iter().sum();
        let mut batch_rows = Vec::with_capacity(total);
        for &rows in batch_row_counts {
            batch_rows.extend(0..rows as u32);
        }
        TraversalPlan {
            successful_finds: total,
            per_batch_counts: batch_row_counts.iter().map(|&n| n as u32).collect(),
            batch_rows,
        }
    }
}

/// Plan a traversal of `read_ids` against a file index.
///
/// Ties on (batch, row) break by input position, and planning is not a
/// set operation: duplicate inputs produce duplicate plan entries.
/// Missing ids are simply absent from the plan and show up as a deficit
/// in `successful_finds`.
pub(crate) fn plan_traversal(
    index: &ReadIndex<IndexBytes>,
    batch_count: usize,
    read_ids: &[Uuid],
    order: TraversalOrder,
) -> TraversalPlan {
    let mut located = Vec::with_capacity(read_ids.len());
    for (input_idx, read_id) in read_ids.iter().enumerate() {
        if let Some((batch, row)) = index.lookup(read_id.as_bytes()) {
            located.push((batch, row, input_idx as u32));
        }
    }
    let successful_finds = located.len();

    match order {
        TraversalOrder::ReadEfficient => {
            located.sort_by_key(|&(batch, row, input_idx)| (batch, row, input_idx));
        }
        TraversalOrder::OriginalOrder => {
            // Stable sort keeps input order within each batch group.
            located.sort_by_key(|&(batch, _, _)| batch);
        }
    }

    let mut per_batch_counts = vec![0u32; batch_count];
    let mut batch_rows = Vec::with_capacity(located.len());
    for (batch, row, _) in located {
        per_batch_counts[batch as usize] += 1;
        batch_rows.push(row);
    }

    TraversalPlan {
        successful_finds,
        per_batch_counts,
        batch_rows,
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::index::{serialize_index, IndexEntry};

    fn index_for(entries: Vec<IndexEntry>) -> ReadIndex<IndexBytes> {
        let mut entries = entries;
        let bytes = serialize_index(&mut entries);
        ReadIndex::from_section(IndexBytes::Owned(Arc::new(bytes))).unwrap()
    }

    fn uuid(n: u8) -> Uuid {
        let mut bytes = [0u8; 16];
        bytes[15] = n;
        Uuid::from_bytes(bytes)
    }

    fn entry(n: u8, batch: u32, row: u32) -> IndexEntry {
        IndexEntry {
            read_id: *uuid(n).as_bytes(),
            batch,
            row,
        }
    }

    fn two_batch_index() -> ReadIndex<IndexBytes> {
        index_for(vec![
            entry(1, 0, 3),
            entry(2, 0, 5),
            entry(3, 1, 999),
            entry(4, 1, 500),
        ])
    }

    #[test]
    fn test_read_efficient_sorts_within_batch() {
        let index = two_batch_index();
        let plan = plan_traversal(
            &index,
            2,
            &[uuid(3), uuid(1), uuid(2), uuid(4)],
            TraversalOrder::ReadEfficient,
        );
        assert_eq!(plan.successful_finds, 4);
        assert_eq!(plan.per_batch_counts, vec![2, 2]);
        assert_eq!(plan.batch_rows, vec![3, 5, 500, 999]);
    }

    #[test]
    fn test_original_order_within_batch() {
        let index = two_batch_index();
        let plan = plan_traversal(
            &index,
            2,
            &[uuid(3), uuid(2), uuid(1), uuid(4)],
            TraversalOrder::OriginalOrder,
        );
        assert_eq!(plan.per_batch_counts, vec![2, 2]);
        // Batch 0 keeps input order (id 2 before id 1), batch 1 likewise.
        assert_eq!(plan.batch_rows, vec![5, 3, 999, 500]);
    }

    #[test]
    fn test_missing_ids_reduce_finds() {
        let index = two_batch_index();
        let plan = plan_traversal(
            &index,
            2,
            &[uuid(1), uuid(200), uuid(4)],
            TraversalOrder::ReadEfficient,
        );
        assert_eq!(plan.successful_finds, 2);
        assert_eq!(plan.num_selected(), 2);
        assert_eq!(plan.batch_rows, vec![3, 500]);
    }

    #[test]
    fn test_duplicates_survive() {
        let index = two_batch_index();
        let plan = plan_traversal(
            &index,
            2,
            &[uuid(1), uuid(1), uuid(1)],
            TraversalOrder::ReadEfficient,
        );
        assert_eq!(plan.successful_finds, 3);
        assert_eq!(plan.batch_rows, vec![3, 3, 3]);
    }

    #[test]
    fn test_all_rows_plan() {
        let plan = TraversalPlan::all_rows(&[2, 0, 3]);
        assert_eq!(plan.per_batch_counts, vec![2, 0, 3]);
        assert_eq!(plan.batch_rows, vec![0, 1, 0, 1, 2]);
        assert_eq!(plan.rows_by_batch()[2], &[0, 1, 2]);
    }
}
