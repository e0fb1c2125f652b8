//! Writing collected round buffers back into the global result.

use crate::job::JobError;
use crate::partition::ColumnAssignment;
use crate::types::GlobalMatrix;

/// Accumulates round results into the coordinator's result matrix.
///
/// Tracks which columns have been written so a column is never written twice
/// and the result is only released once every column has arrived.
#[derive(Debug)]
pub struct ResultAssembler {
    result: GlobalMatrix,
    filled: Vec<bool>,
    rounds: usize,
}

impl ResultAssembler {
    pub fn new(n: usize) -> Self {
        Self {
            result: GlobalMatrix::zeros(n),
            filled: vec![false; n],
            rounds: 0,
        }
    }

    /// Copy every share of a collected round buffer into its columns.
    pub fn write_round(
        &mut self,
        assignment: &ColumnAssignment,
        packed: &[f64],
    ) -> Result<(), JobError> {
        let n = self.result.dim();
        if assignment.rows() != n {
            return Err(JobError::InvalidJob(format!(
                "round has {} rows, result has {}",
                assignment.rows(),
                n
            )));
        }
        if packed.len() < assignment.total_elements() {
            return Err(JobError::InvalidJob(format!(
                "round buffer holds {} values, assignment needs {}",
                packed.len(),
                assignment.total_elements()
            )));
        }

        for share in assignment.shares().iter().filter(|s| s.has_payload()) {
            let values = &packed[share.range()];
            for (k, col) in share.columns().enumerate() {
                match self.filled.get(col) {
                    None => {
                        return Err(JobError::InvalidJob(format!(
                            "rank {} returned column {col} outside a {n}-column result",
                            share.rank
                        )))
                    }
                    Some(true) => {
                        return Err(JobError::InvalidJob(format!(
                            "column {col} assembled twice (rank {})",
                            share.rank
                        )))
                    }
                    Some(false) => {}
                }
                self.result.write_column(col, &values[k * n..(k + 1) * n]);
                self.filled[col] = true;
            }
        }

        self.rounds += 1;
        Ok(())
    }

    /// Rounds written so far.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn columns_filled(&self) -> usize {
        self.filled.iter().filter(|&&f| f).count()
    }

    pub fn is_complete(&self) -> bool {
        self.filled.iter().all(|&f| f)
    }

    /// Release the result, refusing to surface a partially assembled matrix.
    pub fn finish(self) -> Result<GlobalMatrix, JobError> {
        if !self.is_complete() {
            return Err(JobError::Incomplete {
                filled: self.columns_filled(),
                total: self.filled.len(),
            });
        }
        Ok(self.result)
    }
}
