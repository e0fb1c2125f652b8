//! Per-rank run driver: job execution, timing and result persistence.

use std::time::Instant;

use anyhow::Context;
use lincomb_comm::Communicator;
use lincomb_core::{run_job_with, Coordinator};

use crate::config::Settings;
use crate::report;

/// Run the job on every rank of an in-process world and report the first
/// failure, lowest rank first.
#[cfg(feature = "local")]
pub fn run_local(settings: &Settings) -> anyhow::Result<()> {
    let world = lincomb_comm::LocalWorld::new(settings.workers)?;
    let results = world.run(|comm| abort_on_error(comm, run_rank(comm, settings)))?;

    let first_error = results
        .into_iter()
        .enumerate()
        .find_map(|(rank, result)| result.err().map(|e| e.context(format!("rank {rank} failed"))));
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Abort the whole world if this rank failed, so no peer stays blocked on a
/// message this rank will never send.
pub fn abort_on_error<C: Communicator, T>(comm: &C, result: anyhow::Result<T>) -> anyhow::Result<T> {
    if let Err(err) = &result {
        log::error!("rank {}: {err:#}", comm.rank());
        comm.abort(1);
    }
    result
}

/// Execute one rank's part of the run.
///
/// The coordinator prints the operands when asked, times the job, and appends
/// the result. Callers pass the outcome through [`abort_on_error`], so a
/// result file that cannot be written aborts the world with code 1.
pub fn run_rank<C: Communicator>(comm: &C, settings: &Settings) -> anyhow::Result<()> {
    let rank = comm.rank();
    let job = &settings.job;

    let coordinator = if comm.is_root() {
        let coord = Coordinator::standard(job.n)?;
        if settings.print {
            print!("{}", report::format_matrix(rank, "A", coord.a()));
            print!("{}", report::format_matrix(rank, "B", coord.b()));
        }
        Some(coord)
    } else {
        None
    };

    let start = Instant::now();
    let result = run_job_with(comm, job, settings.strategy, coordinator)
        .with_context(|| format!("job failed on rank {rank}"))?;

    if let Some(c) = result {
        log::info!(
            "Computed {0}x{0} result on {1} rank(s) in {2:.3?}",
            c.dim(),
            comm.size(),
            start.elapsed()
        );
        if settings.print {
            print!("{}", report::format_matrix(rank, "C", &c));
        }
        if settings.save {
            report::append_result(&settings.output, &c, comm.size())?;
        }
    }

    comm.barrier().context("shutdown barrier")?;
    Ok(())
}
