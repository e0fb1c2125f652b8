//! Column ownership: which rank gets which columns, and where they sit in
//! the packed round buffer.
//!
//! Every rank receives one contiguous run of whole columns. The coordinator
//! packs a round's column window column-major, so rank `p`'s run is the
//! slice `offset[p]..offset[p] + count[p]` of that buffer and
//! `offset[p] = offset[p-1] + count[p-1]`.
//!
//! Two ways of choosing the runs are supported:
//!
//! - [`ColumnPartitioner::balanced`] (single unchunked round): rank `p` gets
//!   as many columns as there are indices `j < N` with `j mod P == p`, laid
//!   out as consecutive blocks rather than interleaved columns.
//! - [`ColumnPartitioner::window`] (one chunked round): rank `p` gets up to
//!   `cols_per_worker` columns starting at `start + p * cols_per_worker`,
//!   clipped at `N`.

use std::ops::Range;

use lincomb_comm::VarLayout;

use crate::job::JobError;

/// One rank's slice of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Share {
    pub rank: usize,
    /// Global index of the first owned column.
    pub first_col: usize,
    /// Number of owned columns.
    pub cols: usize,
    /// Number of scalars, `cols * N`.
    pub count: usize,
    /// Offset of the first scalar in the packed round buffer.
    pub offset: usize,
}

impl Share {
    /// Whether any payload travels to and from this rank. Both sides of a
    /// point-to-point exchange decide on this predicate alone.
    pub fn has_payload(&self) -> bool {
        self.count > 0
    }

    /// Range of the packed round buffer owned by this rank.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.count
    }

    /// Global column range owned by this rank.
    pub fn columns(&self) -> Range<usize> {
        self.first_col..self.first_col + self.cols
    }
}

/// Per-rank `(count, offset)` plan for a single round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnAssignment {
    rows: usize,
    window: Range<usize>,
    shares: Vec<Share>,
}

impl ColumnAssignment {
    /// Rows per column (`N`).
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Global column window covered by this round.
    pub fn window(&self) -> Range<usize> {
        self.window.clone()
    }

    /// Number of ranks the assignment was built for.
    pub fn workers(&self) -> usize {
        self.shares.len()
    }

    pub fn shares(&self) -> &[Share] {
        &self.shares
    }

    pub fn share(&self, rank: usize) -> Option<&Share> {
        self.shares.get(rank)
    }

    pub fn counts(&self) -> Vec<usize> {
        self.shares.iter().map(|s| s.count).collect()
    }

    pub fn offsets(&self) -> Vec<usize> {
        self.shares.iter().map(|s| s.offset).collect()
    }

    /// Sum of every rank's element count; equals the packed buffer length.
    pub fn total_elements(&self) -> usize {
        self.shares.iter().map(|s| s.count).sum()
    }

    /// Scatter/gather layout for the transport.
    pub fn layout(&self) -> VarLayout {
        VarLayout::contiguous(self.counts())
    }
}

/// Number of columns `j < n` with `j mod workers == rank`.
pub fn cyclic_column_count(n: usize, workers: usize, rank: usize) -> usize {
    if rank >= n {
        0
    } else {
        (n - rank).div_ceil(workers)
    }
}

/// Computes [`ColumnAssignment`]s for an `N x N` matrix over `P` ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnPartitioner {
    n: usize,
    workers: usize,
}

impl ColumnPartitioner {
    pub fn new(n: usize, workers: usize) -> Result<Self, JobError> {
        if workers == 0 {
            return Err(JobError::InvalidJob("worker count must be positive".into()));
        }
        Ok(Self { n, workers })
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Whole matrix in one round, column counts derived cyclically.
    pub fn balanced(&self) -> ColumnAssignment {
        let mut next_col = 0;
        let spans = (0..self.workers).map(|rank| {
            let cols = cyclic_column_count(self.n, self.workers, rank);
            let first_col = next_col;
            next_col += cols;
            (first_col, cols)
        });
        self.build(0..self.n, spans)
    }

    /// One chunked round starting at column `start`, each rank taking up to
    /// `cols_per_worker` columns. Ranks whose first column falls at or past
    /// `N` get an empty share.
    pub fn window(&self, start: usize, cols_per_worker: usize) -> ColumnAssignment {
        let n = self.n;
        let end = start
            .saturating_add(cols_per_worker.saturating_mul(self.workers))
            .min(n);
        let spans = (0..self.workers).map(|rank| {
            let first_col = start.saturating_add(rank.saturating_mul(cols_per_worker));
            if first_col >= n {
                (n, 0)
            } else {
                (first_col, cols_per_worker.min(n - first_col))
            }
        });
        self.build(start.min(n)..end, spans)
    }

    fn build(
        &self,
        window: Range<usize>,
        spans: impl Iterator<Item = (usize, usize)>,
    ) -> ColumnAssignment {
        let mut offset = 0;
        let shares = spans
            .enumerate()
            .map(|(rank, (first_col, cols))| {
                let count = cols * self.n;
                let share = Share {
                    rank,
                    first_col,
                    cols,
                    count,
                    offset,
                };
                offset += count;
                share
            })
            .collect();
        ColumnAssignment {
            rows: self.n,
            window,
            shares,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_contiguous(assignment: &ColumnAssignment) {
        let n = assignment.rows();
        let window = assignment.window();
        for share in assignment.shares().iter().filter(|s| s.has_payload()) {
            assert_eq!(share.offset, (share.first_col - window.start) * n);
            assert!(share.columns().end <= window.end);
        }
        for pair in assignment.shares().windows(2) {
            assert_eq!(pair[1].offset, pair[0].offset + pair[0].count);
        }
        assert_eq!(assignment.total_elements(), window.len() * n);
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(ColumnPartitioner::new(4, 0).is_err());
    }

    #[test]
    fn test_cyclic_counts() {
        assert_eq!(cyclic_column_count(5, 2, 0), 3);
        assert_eq!(cyclic_column_count(5, 2, 1), 2);
        assert_eq!(cyclic_column_count(2, 4, 3), 0);
        let total: usize = (0..3).map(|p| cyclic_column_count(7, 3, p)).sum();
        assert_eq!(total, 7);
    }

    #[test]
    fn test_balanced_n4_p2() {
        let assignment = ColumnPartitioner::new(4, 2).unwrap().balanced();
        assert_eq!(assignment.counts(), vec![8, 8]);
        assert_eq!(assignment.offsets(), vec![0, 8]);
        assert_eq!(assignment.shares()[1].columns(), 2..4);
        assert_contiguous(&assignment);
    }

    #[test]
    fn test_balanced_uneven_split_front_loads() {
        let assignment = ColumnPartitioner::new(5, 3).unwrap().balanced();
        let cols: Vec<usize> = assignment.shares().iter().map(|s| s.cols).collect();
        assert_eq!(cols, vec![2, 2, 1]);
        assert_eq!(assignment.total_elements(), 25);
        assert_contiguous(&assignment);
    }

    #[test]
    fn test_balanced_more_workers_than_columns() {
        let assignment = ColumnPartitioner::new(3, 5).unwrap().balanced();
        assert_eq!(assignment.counts(), vec![3, 3, 3, 0, 0]);
        assert!(!assignment.shares()[3].has_payload());
        assert_eq!(assignment.total_elements(), 9);
        assert_contiguous(&assignment);
    }

    #[test]
    fn test_window_full_round() {
        let assignment = ColumnPartitioner::new(6, 3).unwrap().window(0, 2);
        assert_eq!(assignment.window(), 0..6);
        let firsts: Vec<usize> = assignment.shares().iter().map(|s| s.first_col).collect();
        assert_eq!(firsts, vec![0, 2, 4]);
        assert_eq!(assignment.counts(), vec![12, 12, 12]);
        assert_contiguous(&assignment);
    }

    #[test]
    fn test_window_tail_leaves_workers_idle() {
        let assignment = ColumnPartitioner::new(5, 2).unwrap().window(4, 1);
        assert_eq!(assignment.window(), 4..5);
        assert_eq!(assignment.counts(), vec![5, 0]);
        assert_eq!(assignment.shares()[1].first_col, 5);
        assert_contiguous(&assignment);
    }

    #[test]
    fn test_window_clips_partial_run() {
        let assignment = ColumnPartitioner::new(5, 2).unwrap().window(0, 3);
        let cols: Vec<usize> = assignment.shares().iter().map(|s| s.cols).collect();
        assert_eq!(cols, vec![3, 2]);
        assert_eq!(assignment.window(), 0..5);
        assert_contiguous(&assignment);
    }

    #[test]
    fn test_layout_mirrors_assignment() {
        let assignment = ColumnPartitioner::new(5, 3).unwrap().balanced();
        let layout = assignment.layout();
        assert_eq!(layout.counts(), assignment.counts().as_slice());
        assert_eq!(layout.displs(), assignment.offsets().as_slice());
        assert_eq!(layout.extent(), 25);
    }
}
