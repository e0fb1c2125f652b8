//! Point-to-point strategy: tagged header and payload messages per rank.
//!
//! Per round, for each rank `p != 0` in order, the coordinator sends:
//!
//! 1. `TAG_HEADER`: the element count of `p`'s share;
//! 2. `TAG_A`, `TAG_B`: the packed A and B blocks, only if the count is
//!    non-zero.
//!
//! and then receives `TAG_RESULT` from every rank with a non-zero count.
//! Both sides decide whether payloads follow from [`Share::has_payload`] on
//! the same assignment, so an empty share exchanges the header and nothing
//! else in either direction.
//!
//! [`Share::has_payload`]: crate::partition::Share::has_payload

use lincomb_comm::{Communicator, ROOT};

use super::{
    check_block, check_buffer, own_share, ExchangeChannel, ExchangeError, RoundOperands, Strategy,
    TAG_A, TAG_B, TAG_HEADER, TAG_RESULT,
};
use crate::partition::ColumnAssignment;
use crate::types::LocalBlock;

/// Distributes with explicit per-rank sends and receives.
pub struct MessageChannel<'c, C> {
    comm: &'c C,
}

impl<'c, C: Communicator> MessageChannel<'c, C> {
    pub fn new(comm: &'c C) -> Self {
        Self { comm }
    }
}

impl<C: Communicator> ExchangeChannel for MessageChannel<'_, C> {
    fn strategy(&self) -> Strategy {
        Strategy::Message
    }

    fn distribute(
        &self,
        assignment: &ColumnAssignment,
        operands: Option<RoundOperands<'_>>,
    ) -> Result<(LocalBlock, LocalBlock), ExchangeError> {
        let share = own_share(self.comm, assignment)?;
        let rows = assignment.rows();

        let (a, b) = if self.comm.is_root() {
            let operands = operands.ok_or(ExchangeError::MissingRoundBuffers("distribute"))?;
            check_buffer(operands.a.len(), assignment)?;
            check_buffer(operands.b.len(), assignment)?;

            for peer in assignment.shares().iter().filter(|s| s.rank != ROOT) {
                self.comm.send_header(peer.rank, TAG_HEADER, peer.count as u64)?;
                if peer.has_payload() {
                    self.comm.send(peer.rank, TAG_A, &operands.a[peer.range()])?;
                    self.comm.send(peer.rank, TAG_B, &operands.b[peer.range()])?;
                }
            }
            (
                operands.a[share.range()].to_vec(),
                operands.b[share.range()].to_vec(),
            )
        } else {
            let announced = self.comm.recv_header(ROOT, TAG_HEADER)?;
            if announced != share.count as u64 {
                return Err(ExchangeError::ProtocolMismatch {
                    rank: share.rank,
                    expected: share.count,
                    announced,
                });
            }

            let mut a = vec![0.0; share.count];
            let mut b = vec![0.0; share.count];
            if share.has_payload() {
                self.comm.recv_into(ROOT, TAG_A, &mut a)?;
                self.comm.recv_into(ROOT, TAG_B, &mut b)?;
            }
            (a, b)
        };

        Ok((
            LocalBlock::from_packed(rows, share.first_col, share.cols, a)?,
            LocalBlock::from_packed(rows, share.first_col, share.cols, b)?,
        ))
    }

    fn collect(
        &self,
        assignment: &ColumnAssignment,
        block: &LocalBlock,
        result: Option<&mut [f64]>,
    ) -> Result<(), ExchangeError> {
        let share = own_share(self.comm, assignment)?;
        check_block(share, block)?;

        if !self.comm.is_root() {
            if share.has_payload() {
                self.comm.send(ROOT, TAG_RESULT, &block.packed())?;
            }
            return Ok(());
        }

        let result = result.ok_or(ExchangeError::MissingRoundBuffers("collect"))?;
        check_buffer(result.len(), assignment)?;
        result[share.range()].copy_from_slice(&block.packed());

        for peer in assignment
            .shares()
            .iter()
            .filter(|s| s.rank != ROOT && s.has_payload())
        {
            self.comm.recv_into(peer.rank, TAG_RESULT, &mut result[peer.range()])?;
        }
        Ok(())
    }
}
