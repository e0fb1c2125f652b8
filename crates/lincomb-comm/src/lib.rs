//! # Lincomb Comm
//!
//! Rank-to-rank transport for the lincomb workspace. This crate provides a
//! [`Communicator`](comm::Communicator) trait that isolates the distribution
//! logic in `lincomb-core` from how ranks actually exchange bytes.
//!
//! ## Available transports
//!
//! | Transport | Feature flag | Ranks are |
//! |-----------|-------------|-----------|
//! | In-process ([`LocalWorld`]) | `local` (default) | OS threads joined only by channels |
//! | MPI ([`MpiComm`]) | `mpi` | Processes launched by `mpirun` |
//!
//! Both transports offer the same tagged point-to-point operations, the same
//! varcount scatter/gather collectives and an explicit barrier, so code written
//! against the trait runs unchanged on either.

pub mod comm;

#[cfg(feature = "local")]
pub mod local;

#[cfg(feature = "mpi")]
pub mod mpi_comm;

pub use comm::{Communicator, Tag, TransportError, TransportKind, VarLayout, WorldInfo, ROOT};

#[cfg(feature = "local")]
pub use local::{LocalComm, LocalWorld};

#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;
