//! Communicator trait and the types shared by every transport.
//!
//! The [`Communicator`] trait abstracts over how ranks talk to each other
//! (threads in one process, or MPI processes) so that the distribution code in
//! `lincomb-core` never depends on a concrete transport.

use std::ops::Range;

use thiserror::Error;

/// Message tag used to tell point-to-point messages apart.
pub type Tag = i32;

/// Rank that roots every collective and coordinates the job.
pub const ROOT: usize = 0;

/// Errors originating from a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("World aborted by rank {rank} with code {code}")]
    Aborted { rank: usize, code: i32 },

    #[error("Rank {rank} disconnected")]
    Disconnected { rank: usize },

    #[error("Rank {rank} is outside a world of size {size}")]
    InvalidRank { rank: usize, size: usize },

    #[error("Message from rank {peer} ({what}) carries {actual} values, expected {expected}")]
    LengthMismatch {
        peer: usize,
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("Layout describes {actual} ranks but the world has {expected}")]
    LayoutMismatch { expected: usize, actual: usize },

    #[error("Root rank {rank} called a collective without its buffer")]
    MissingBuffer { rank: usize },

    #[error("Message from rank {peer} ({what}) has an unexpected body")]
    Malformed { peer: usize, what: String },

    #[error("Transport not available: {0}")]
    Unavailable(String),
}

/// The kind of transport behind a communicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Local,
    Mpi,
}

/// Describes the world a communicator belongs to.
#[derive(Debug, Clone)]
pub struct WorldInfo {
    pub name: String,
    pub kind: TransportKind,
    pub size: usize,
}

/// Per-rank element counts and displacements for varcount collectives.
///
/// Rank `r` owns `buf[displs[r]..displs[r] + counts[r]]` of the root's
/// flattened buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarLayout {
    counts: Vec<usize>,
    displs: Vec<usize>,
}

impl VarLayout {
    /// Build a layout from explicit counts and displacements.
    pub fn new(counts: Vec<usize>, displs: Vec<usize>) -> Result<Self, TransportError> {
        if counts.len() != displs.len() {
            return Err(TransportError::LayoutMismatch {
                expected: counts.len(),
                actual: displs.len(),
            });
        }
        Ok(Self { counts, displs })
    }

    /// Build a layout whose blocks follow each other with no gaps.
    pub fn contiguous(counts: Vec<usize>) -> Self {
        let displs = counts
            .iter()
            .scan(0usize, |next, &count| {
                let displ = *next;
                *next += count;
                Some(displ)
            })
            .collect();
        Self { counts, displs }
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn displs(&self) -> &[usize] {
        &self.displs
    }

    /// Number of ranks described.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Smallest buffer length that holds every rank's block.
    pub fn extent(&self) -> usize {
        self.counts
            .iter()
            .zip(&self.displs)
            .map(|(count, displ)| count + displ)
            .max()
            .unwrap_or(0)
    }

    /// Buffer range owned by `rank`.
    pub fn range(&self, rank: usize) -> Range<usize> {
        self.displs[rank]..self.displs[rank] + self.counts[rank]
    }

    /// Check that this layout fits a world of `size` ranks and a buffer of
    /// `buf_len` elements.
    pub fn validate(&self, size: usize, buf_len: usize) -> Result<(), TransportError> {
        if self.len() != size {
            return Err(TransportError::LayoutMismatch {
                expected: size,
                actual: self.len(),
            });
        }
        if self.extent() > buf_len {
            return Err(TransportError::LengthMismatch {
                peer: ROOT,
                what: "root buffer".into(),
                expected: self.extent(),
                actual: buf_len,
            });
        }
        Ok(())
    }
}

/// Abstraction over rank-to-rank communication.
///
/// All operations block: a receive returns only once the matching message has
/// arrived, and a collective returns only once this rank's part of it is done.
/// A receive matches the oldest pending message with the given source and tag.
pub trait Communicator {
    /// Return information about the world.
    fn world_info(&self) -> WorldInfo;

    /// This rank's identity, `0..size()`.
    fn rank(&self) -> usize;

    /// Number of ranks in the world.
    fn size(&self) -> usize;

    /// Whether this rank roots collectives.
    fn is_root(&self) -> bool {
        self.rank() == ROOT
    }

    /// Send a payload to `dest` under `tag`.
    fn send(&self, dest: usize, tag: Tag, data: &[f64]) -> Result<(), TransportError>;

    /// Receive a payload from `source` under `tag` into `buf`.
    ///
    /// The message must carry exactly `buf.len()` values.
    fn recv_into(&self, source: usize, tag: Tag, buf: &mut [f64]) -> Result<(), TransportError>;

    /// Send a single count to `dest` under `tag`.
    fn send_header(&self, dest: usize, tag: Tag, value: u64) -> Result<(), TransportError>;

    /// Receive a single count from `source` under `tag`.
    fn recv_header(&self, source: usize, tag: Tag) -> Result<u64, TransportError>;

    /// Varcount scatter rooted at `root`.
    ///
    /// The root passes its full buffer and the layout; every rank (the root
    /// included) receives its block into `recv`, which must be exactly as
    /// long as the layout's count for that rank. Zero-count ranks still take
    /// part.
    fn scatterv(
        &self,
        root: usize,
        send: Option<(&[f64], &VarLayout)>,
        recv: &mut [f64],
    ) -> Result<(), TransportError>;

    /// Varcount gather rooted at `root`, the inverse of [`Self::scatterv`].
    fn gatherv(
        &self,
        root: usize,
        send: &[f64],
        recv: Option<(&mut [f64], &VarLayout)>,
    ) -> Result<(), TransportError>;

    /// Block until every rank has entered the barrier.
    fn barrier(&self) -> Result<(), TransportError>;

    /// Tear down the whole world. Every other rank's pending or future
    /// receive fails with [`TransportError::Aborted`].
    fn abort(&self, code: i32);
}

/// Reject ranks outside `0..size`.
pub(crate) fn check_rank(rank: usize, size: usize) -> Result<(), TransportError> {
    if rank < size {
        Ok(())
    } else {
        Err(TransportError::InvalidRank { rank, size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_layout_accumulates_displacements() {
        let layout = VarLayout::contiguous(vec![4, 0, 8, 4]);
        assert_eq!(layout.displs(), &[0, 4, 4, 12]);
        assert_eq!(layout.extent(), 16);
        assert_eq!(layout.range(2), 4..12);
        assert!(layout.range(1).is_empty());
    }

    #[test]
    fn test_explicit_layout_rejects_length_mismatch() {
        let err = VarLayout::new(vec![1, 2], vec![0]).unwrap_err();
        assert!(matches!(
            err,
            TransportError::LayoutMismatch { expected: 2, actual: 1 }
        ));
    }

    #[test]
    fn test_validate_checks_world_size_and_buffer() {
        let layout = VarLayout::contiguous(vec![2, 2]);
        assert!(layout.validate(2, 4).is_ok());
        assert!(layout.validate(3, 4).is_err());
        assert!(matches!(
            layout.validate(2, 3),
            Err(TransportError::LengthMismatch { expected: 4, actual: 3, .. })
        ));
    }

    #[test]
    fn test_empty_layout_has_zero_extent() {
        let layout = VarLayout::contiguous(Vec::new());
        assert!(layout.is_empty());
        assert_eq!(layout.extent(), 0);
    }
}
