//! The local update applied by every rank to its own block.

use ndarray::{Array2, ShapeBuilder, Zip};

use crate::job::JobError;
use crate::types::LocalBlock;

/// Compute `c[row, col] = lambda * a[row, col] + b[row, col]` over the block.
///
/// Runs sequentially in a fixed order, so every strategy and schedule yields
/// the same bits for the same inputs.
pub fn scaled_sum(lambda: f64, a: &LocalBlock, b: &LocalBlock) -> Result<LocalBlock, JobError> {
    if a.view().dim() != b.view().dim() || a.first_col() != b.first_col() {
        return Err(JobError::InvalidJob(format!(
            "operand blocks disagree: A is {:?} at column {}, B is {:?} at column {}",
            a.view().dim(),
            a.first_col(),
            b.view().dim(),
            b.first_col()
        )));
    }

    let mut c = Array2::zeros(a.view().raw_dim().f());
    Zip::from(&mut c)
        .and(&a.view())
        .and(&b.view())
        .for_each(|c, &a, &b| *c = lambda * a + b);

    Ok(LocalBlock::from_array(a.first_col(), c))
}
