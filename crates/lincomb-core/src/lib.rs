//! # Lincomb Core
//!
//! Distribution and communication core for the dense linear combination
//! $C = \lambda A + B$ over $N \times N$ matrices, computed by ranks that
//! share no memory.
//!
//! ## Architecture
//!
//! Every rank walks the same [`schedule::ChunkPlan`]. For each round the
//! coordinator (rank 0) packs the round's column window, an
//! [`exchange::ExchangeChannel`] hands each rank its block, the rank applies
//! [`kernel::scaled_sum`], and the channel brings the blocks back for the
//! [`assemble::ResultAssembler`]. The two channel implementations
//! ([`exchange::CollectiveChannel`] and [`exchange::MessageChannel`]) produce
//! bit-identical results.
//!
//! ## Modules
//!
//! - [`types`] — Global matrices and per-rank column blocks.
//! - [`init`] — Standard operand initialisation.
//! - [`partition`] — Column ownership per rank and round.
//! - [`schedule`] — Splitting the column range into rounds.
//! - [`exchange`] — Collective and point-to-point distribution strategies.
//! - [`kernel`] — The local $\lambda a + b$ update.
//! - [`assemble`] — Writing returned blocks into the result.
//! - [`job`] — Job parameters, the coordinator role and the per-rank driver.

pub mod assemble;
pub mod exchange;
pub mod init;
pub mod job;
pub mod kernel;
pub mod partition;
pub mod schedule;
pub mod types;

pub use exchange::{ExchangeChannel, ExchangeError, Strategy};
pub use job::{run_job, run_job_with, Coordinator, JobError, JobSpec};
pub use types::{GlobalMatrix, LocalBlock};
