//! Collective strategy: group-wide scatter and gather.

use lincomb_comm::{Communicator, ROOT};

use super::{
    check_block, check_buffer, own_share, ExchangeChannel, ExchangeError, RoundOperands, Strategy,
};
use crate::partition::ColumnAssignment;
use crate::types::LocalBlock;

/// Distributes with one varcount scatter per operand and collects with one
/// varcount gather. Ranks with an empty share still take part in every call.
pub struct CollectiveChannel<'c, C> {
    comm: &'c C,
}

impl<'c, C: Communicator> CollectiveChannel<'c, C> {
    pub fn new(comm: &'c C) -> Self {
        Self { comm }
    }
}

impl<C: Communicator> ExchangeChannel for CollectiveChannel<'_, C> {
    fn strategy(&self) -> Strategy {
        Strategy::Collective
    }

    fn distribute(
        &self,
        assignment: &ColumnAssignment,
        operands: Option<RoundOperands<'_>>,
    ) -> Result<(LocalBlock, LocalBlock), ExchangeError> {
        let share = own_share(self.comm, assignment)?;
        let layout = assignment.layout();
        let mut a = vec![0.0; share.count];
        let mut b = vec![0.0; share.count];

        if self.comm.is_root() {
            let operands = operands.ok_or(ExchangeError::MissingRoundBuffers("distribute"))?;
            check_buffer(operands.a.len(), assignment)?;
            check_buffer(operands.b.len(), assignment)?;
            self.comm.scatterv(ROOT, Some((operands.a, &layout)), &mut a)?;
            self.comm.scatterv(ROOT, Some((operands.b, &layout)), &mut b)?;
        } else {
            self.comm.scatterv(ROOT, None, &mut a)?;
            self.comm.scatterv(ROOT, None, &mut b)?;
        }

        let rows = assignment.rows();
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
        let packed = block.packed();

        if self.comm.is_root() {
            let result = result.ok_or(ExchangeError::MissingRoundBuffers("collect"))?;
            check_buffer(result.len(), assignment)?;
            let layout = assignment.layout();
            self.comm.gatherv(ROOT, &packed, Some((result, &layout)))?;
        } else {
            self.comm.gatherv(ROOT, &packed, None)?;
        }
        Ok(())
    }
}
