//! Splitting the column range into rounds.
//!
//! Without a budget the whole matrix moves in one balanced round. With a
//! budget `C_max`, each round hands every rank up to
//! `min(C_max, N - processed)` columns, and `processed` then advances by that
//! amount times `P`. The advance assumes every rank was busy, so the last
//! round may cover fewer columns than `cols_per_worker * P` and leave some
//! ranks idle, and `processed` may overshoot `N`.

use crate::job::JobError;
use crate::partition::{ColumnAssignment, ColumnPartitioner};

/// One bounded slice of the column range, processed end to end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round {
    pub index: usize,
    /// Columns handed to each busy rank this round.
    pub cols_per_worker: usize,
    pub assignment: ColumnAssignment,
}

/// Ordered rounds covering every column exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    budget: Option<usize>,
    rounds: Vec<Round>,
}

impl ChunkPlan {
    /// Plan rounds for `budget` columns per rank per round, or a single
    /// balanced round when `budget` is `None`.
    pub fn new(partitioner: &ColumnPartitioner, budget: Option<usize>) -> Result<Self, JobError> {
        match budget {
            None => Ok(Self::unchunked(partitioner)),
            Some(budget) => Self::chunked(partitioner, budget),
        }
    }

    /// The whole matrix in one round. An empty matrix needs no rounds.
    pub fn unchunked(partitioner: &ColumnPartitioner) -> Self {
        let rounds = if partitioner.n() == 0 {
            Vec::new()
        } else {
            let assignment = partitioner.balanced();
            let cols_per_worker = assignment.shares().iter().map(|s| s.cols).max().unwrap_or(0);
            vec![Round {
                index: 0,
                cols_per_worker,
                assignment,
            }]
        };
        Self {
            budget: None,
            rounds,
        }
    }

    pub fn chunked(partitioner: &ColumnPartitioner, budget: usize) -> Result<Self, JobError> {
        if budget == 0 {
            return Err(JobError::InvalidJob("chunk budget must be positive".into()));
        }

        let n = partitioner.n();
        let workers = partitioner.workers();
        let mut rounds = Vec::new();
        let mut processed = 0usize;

        while processed < n {
            let cols_per_worker = budget.min(n - processed);
            let assignment = partitioner.window(processed, cols_per_worker);
            log::debug!(
                "round {}: columns {:?}, {} per worker",
                rounds.len(),
                assignment.window(),
                cols_per_worker
            );
            rounds.push(Round {
                index: rounds.len(),
                cols_per_worker,
                assignment,
            });
            processed = processed.saturating_add(cols_per_worker * workers);
        }

        Ok(Self {
            budget: Some(budget),
            rounds,
        })
    }

    pub fn budget(&self) -> Option<usize> {
        self.budget
    }

    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Round> {
        self.rounds.iter()
    }

    /// Total columns covered across all rounds.
    pub fn columns_covered(&self) -> usize {
        self.rounds.iter().map(|r| r.assignment.window().len()).sum()
    }
}

impl<'a> IntoIterator for &'a ChunkPlan {
    type Item = &'a Round;
    type IntoIter = std::slice::Iter<'a, Round>;

    fn into_iter(self) -> Self::IntoIter {
        self.rounds.iter()
    }
}
