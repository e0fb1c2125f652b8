//! lincomb command-line interface.
//!
//! Compute `C = λ·A + B` for the standard `N x N` operands across ranks:
//! ```sh
//! lincomb 1000 2.5                      # one balanced round, collective strategy
//! lincomb 1000 2.5 64 --strategy message --workers 8
//! mpirun -np 4 lincomb 1000 2.5 64      # binary built with --features mpi
//! ```

#[cfg(not(any(feature = "local", feature = "mpi")))]
compile_error!("enable the `local` or `mpi` feature");

mod config;
mod report;
mod runner;

use std::path::PathBuf;

use clap::Parser;
use lincomb_core::{JobSpec, Strategy};

#[derive(Parser, Debug)]
#[command(name = "lincomb")]
#[command(about = "Distributed C = λ·A + B over column-partitioned ranks")]
#[command(version)]
struct Cli {
    /// Matrix dimension N.
    #[arg(value_parser = parse_positive)]
    n: usize,
    /// Scalar λ.
    #[arg(allow_negative_numbers = true)]
    lambda: f64,
    /// Maximum columns per rank per round. Omit to distribute in one round.
    #[arg(value_parser = parse_positive)]
    chunk: Option<usize>,
    /// Number of ranks for the in-process transport.
    #[arg(short, long, value_parser = parse_positive)]
    workers: Option<usize>,
    /// Communication strategy: collective or message.
    #[arg(short, long)]
    strategy: Option<Strategy>,
    /// File the result is appended to (default: resultado.txt).
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Do not append the result to the output file.
    #[arg(long)]
    no_save: bool,
    /// Print A and B before distribution and C after assembly.
    #[arg(long)]
    print: bool,
    /// TOML file with defaults for the options above.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn parse_positive(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be a positive integer".into()),
        Ok(v) => Ok(v),
        Err(e) => Err(e.to_string()),
    }
}

impl Cli {
    fn job(&self) -> JobSpec {
        JobSpec {
            n: self.n,
            lambda: self.lambda,
            chunk_budget: self.chunk,
        }
    }

    fn overrides(&self) -> config::Overrides {
        config::Overrides {
            strategy: self.strategy,
            workers: self.workers,
            output: self.output.clone(),
            no_save: self.no_save,
            print: self.print,
        }
    }
}

/// Parse the command line, reporting usage errors from the coordinator only.
fn parse_cli(is_coordinator: bool) -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            if is_coordinator {
                let _ = err.print();
            }
            std::process::exit(if err.use_stderr() { 1 } else { 0 });
        }
    }
}

#[cfg(not(feature = "mpi"))]
fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = parse_cli(true);
    let settings = config::Settings::resolve(cli.job(), cli.config.as_deref(), cli.overrides())?;
    runner::run_local(&settings)
}

#[cfg(feature = "mpi")]
fn main() -> anyhow::Result<()> {
    use lincomb_comm::Communicator;

    env_logger::init();
    let comm = lincomb_comm::MpiComm::initialize()?;
    let cli = parse_cli(comm.is_root());
    let settings = config::Settings::resolve(cli.job(), cli.config.as_deref(), cli.overrides())?;
    if cli.workers.is_some() {
        log::warn!("--workers is ignored under MPI; the world size comes from the launcher");
    }
    runner::abort_on_error(&comm, runner::run_rank(&comm, &settings))
}
