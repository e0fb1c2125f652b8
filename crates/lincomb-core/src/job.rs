//! Job parameters, the coordinator role and the per-rank driver.
//!
//! Every rank calls [`run_job`] (or [`run_job_with`]) with the same
//! [`JobSpec`]. Only rank 0 holds a [`Coordinator`], and with it the global
//! matrices; the other ranks only ever see the [`LocalBlock`]s the exchange
//! channel hands them.

use std::ops::Range;

use lincomb_comm::{Communicator, TransportError};
use ndarray::ShapeError;
use thiserror::Error;

use crate::assemble::ResultAssembler;
use crate::exchange::{channel_for, ExchangeError, RoundOperands, Strategy};
use crate::init::standard_operands;
use crate::kernel::scaled_sum;
use crate::partition::ColumnPartitioner;
use crate::schedule::ChunkPlan;
use crate::types::{GlobalMatrix, LocalBlock};

/// Errors that can end a job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Exchange failed: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Shape error: {0}")]
    Shape(#[from] ShapeError),

    #[error("Result incomplete: {filled} of {total} columns assembled")]
    Incomplete { filled: usize, total: usize },
}

/// What to compute: `C = lambda * A + B` over `n x n` matrices, optionally
/// moving at most `chunk_budget` columns per rank per round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobSpec {
    pub n: usize,
    pub lambda: f64,
    pub chunk_budget: Option<usize>,
}

impl JobSpec {
    pub fn new(n: usize, lambda: f64) -> Self {
        Self {
            n,
            lambda,
            chunk_budget: None,
        }
    }

    pub fn with_chunk_budget(mut self, budget: usize) -> Self {
        self.chunk_budget = Some(budget);
        self
    }

    pub fn validate(&self) -> Result<(), JobError> {
        if self.chunk_budget == Some(0) {
            return Err(JobError::InvalidJob("chunk budget must be positive".into()));
        }
        if !self.lambda.is_finite() {
            return Err(JobError::InvalidJob(format!(
                "lambda must be finite, got {}",
                self.lambda
            )));
        }
        Ok(())
    }
}

/// The rank-0 role: owns the operands and the result for the whole run.
#[derive(Debug)]
pub struct Coordinator {
    a: GlobalMatrix,
    b: GlobalMatrix,
    assembler: ResultAssembler,
}

impl Coordinator {
    /// Coordinator over caller-supplied operands of equal dimension.
    pub fn new(a: GlobalMatrix, b: GlobalMatrix) -> Result<Self, JobError> {
        if a.dim() != b.dim() {
            return Err(JobError::InvalidJob(format!(
                "operands differ in size: A is {0}x{0}, B is {1}x{1}",
                a.dim(),
                b.dim()
            )));
        }
        let assembler = ResultAssembler::new(a.dim());
        Ok(Self { a, b, assembler })
    }

    /// Coordinator over the standard operands `A[i,j] = i + j`, `B[i,j] = i - j`.
    pub fn standard(n: usize) -> Result<Self, JobError> {
        let (a, b) = standard_operands(n)?;
        Self::new(a, b)
    }

    pub fn n(&self) -> usize {
        self.a.dim()
    }

    pub fn a(&self) -> &GlobalMatrix {
        &self.a
    }

    pub fn b(&self) -> &GlobalMatrix {
        &self.b
    }

    /// Packed A and B for a round's column window.
    fn pack_round(&self, window: Range<usize>) -> (Vec<f64>, Vec<f64>) {
        (
            self.a.pack_columns(window.clone()),
            self.b.pack_columns(window),
        )
    }

    /// Release the assembled result.
    pub fn finish(self) -> Result<GlobalMatrix, JobError> {
        self.assembler.finish()
    }
}

/// Run a job on this rank with the standard operands.
///
/// Returns `Some(C)` on rank 0 and `None` elsewhere.
pub fn run_job<C: Communicator>(
    comm: &C,
    job: &JobSpec,
    strategy: Strategy,
) -> Result<Option<GlobalMatrix>, JobError> {
    let coordinator = if comm.is_root() {
        Some(Coordinator::standard(job.n)?)
    } else {
        None
    };
    run_job_with(comm, job, strategy, coordinator)
}

/// Run a job on this rank. `coordinator` must be `Some` on rank 0 and `None`
/// on every other rank.
pub fn run_job_with<C: Communicator>(
    comm: &C,
    job: &JobSpec,
    strategy: Strategy,
    mut coordinator: Option<Coordinator>,
) -> Result<Option<GlobalMatrix>, JobError> {
    job.validate()?;
    if comm.is_root() != coordinator.is_some() {
        return Err(JobError::InvalidJob(format!(
            "rank {} {} a coordinator",
            comm.rank(),
            if coordinator.is_some() { "must not hold" } else { "needs" }
        )));
    }
    if let Some(coord) = &coordinator {
        if coord.n() != job.n {
            return Err(JobError::InvalidJob(format!(
                "coordinator holds {0}x{0} operands for an {1}x{1} job",
                coord.n(),
                job.n
            )));
        }
    }

    let partitioner = ColumnPartitioner::new(job.n, comm.size())?;
    let plan = ChunkPlan::new(&partitioner, job.chunk_budget)?;
    let channel = channel_for(strategy, comm);
    let rank = comm.rank();

    if comm.is_root() {
        log::info!(
            "N={} lambda={} over {} with {} strategy: {} round(s)",
            job.n,
            job.lambda,
            comm.world_info().name,
            channel.strategy(),
            plan.len()
        );
    }

    for round in &plan {
        let assignment = &round.assignment;

        let outbound = coordinator
            .as_ref()
            .map(|coord| coord.pack_round(assignment.window()));
        let operands = outbound
            .as_ref()
            .map(|(a, b)| RoundOperands { a, b });
        let (a, b) = channel.distribute(assignment, operands)?;
        drop(outbound);
        trace_block(rank, "local_A", &a);
        trace_block(rank, "local_B", &b);

        let c = scaled_sum(job.lambda, &a, &b)?;
        trace_block(rank, "local_C", &c);

        let mut inbound = coordinator
            .as_ref()
            .map(|_| vec![0.0; assignment.total_elements()]);
        channel.collect(assignment, &c, inbound.as_deref_mut())?;

        if let (Some(coord), Some(packed)) = (coordinator.as_mut(), inbound) {
            coord.assembler.write_round(assignment, &packed)?;
        }

        round_barrier(comm, round.index)?;
    }

    coordinator.map(Coordinator::finish).transpose()
}

/// Close a round: no rank starts round `index + 1` before every rank has
/// finished round `index`.
fn round_barrier<C: Communicator>(comm: &C, index: usize) -> Result<(), JobError> {
    comm.barrier()?;
    log::debug!("rank {}: round {} complete", comm.rank(), index);
    Ok(())
}

fn trace_block(rank: usize, name: &str, block: &LocalBlock) {
    if log::log_enabled!(log::Level::Trace) {
        log::trace!(
            "rank {rank} {name}: columns {:?}\n{}",
            block.columns(),
            block.view()
        );
    }
}
