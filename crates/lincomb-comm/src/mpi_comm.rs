//! MPI transport for running ranks as separate processes.
//!
//! Gated behind the `mpi` feature and requires an MPI installation. Launch
//! the binary with `mpirun -np <P>`; every process builds one [`MpiComm`]
//! and the world size comes from the launcher.
//!
//! Point-to-point messages map to tagged `MPI_Send`/`MPI_Recv`, the
//! collectives to `MPI_Scatterv`/`MPI_Gatherv`, and [`Communicator::abort`]
//! to `MPI_Abort`, which never returns.

use mpi::datatype::{Partition, PartitionMut};
use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::{Communicator as _, Destination, Root, Source};
use mpi::Count;

use crate::comm::{
    check_rank, Communicator, Tag, TransportError, TransportKind, VarLayout, WorldInfo,
};

/// Communicator over `MPI_COMM_WORLD`.
///
/// Owns the MPI universe; dropping it finalizes MPI.
pub struct MpiComm {
    world: SimpleCommunicator,
    rank: usize,
    size: usize,
    _universe: Universe,
}

impl MpiComm {
    /// Initialize MPI and attach to the world communicator.
    pub fn initialize() -> Result<Self, TransportError> {
        let universe = mpi::initialize()
            .ok_or_else(|| TransportError::Unavailable("MPI is already initialized".into()))?;
        let world = universe.world();
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        log::debug!("MPI rank {rank} of {size} attached");
        Ok(Self {
            world,
            rank,
            size,
            _universe: universe,
        })
    }
}

fn to_counts(values: &[usize]) -> Vec<Count> {
    values.iter().map(|&v| v as Count).collect()
}

impl Communicator for MpiComm {
    fn world_info(&self) -> WorldInfo {
        WorldInfo {
            name: format!("MPI ({} processes)", self.size),
            kind: TransportKind::Mpi,
            size: self.size,
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&self, dest: usize, tag: Tag, data: &[f64]) -> Result<(), TransportError> {
        check_rank(dest, self.size)?;
        self.world
            .process_at_rank(dest as i32)
            .send_with_tag(data, tag);
        Ok(())
    }

    fn recv_into(&self, source: usize, tag: Tag, buf: &mut [f64]) -> Result<(), TransportError> {
        check_rank(source, self.size)?;
        self.world
            .process_at_rank(source as i32)
            .receive_into_with_tag(buf, tag);
        Ok(())
    }

    fn send_header(&self, dest: usize, tag: Tag, value: u64) -> Result<(), TransportError> {
        check_rank(dest, self.size)?;
        self.world
            .process_at_rank(dest as i32)
            .send_with_tag(&value, tag);
        Ok(())
    }

    fn recv_header(&self, source: usize, tag: Tag) -> Result<u64, TransportError> {
        check_rank(source, self.size)?;
        let (value, _status) = self
            .world
            .process_at_rank(source as i32)
            .receive_with_tag::<u64>(tag);
        Ok(value)
    }

    fn scatterv(
        &self,
        root: usize,
        send: Option<(&[f64], &VarLayout)>,
        recv: &mut [f64],
    ) -> Result<(), TransportError> {
        check_rank(root, self.size)?;
        let root_process = self.world.process_at_rank(root as i32);

        if self.rank != root {
            root_process.scatter_varcount_into(recv);
            return Ok(());
        }

        let (buf, layout) = send.ok_or(TransportError::MissingBuffer { rank: root })?;
        layout.validate(self.size, buf.len())?;
        let partition = Partition::new(buf, to_counts(layout.counts()), to_counts(layout.displs()));
        root_process.scatter_varcount_into_root(&partition, recv);
        Ok(())
    }

    fn gatherv(
        &self,
        root: usize,
        send: &[f64],
        recv: Option<(&mut [f64], &VarLayout)>,
    ) -> Result<(), TransportError> {
        check_rank(root, self.size)?;
        let root_process = self.world.process_at_rank(root as i32);

        if self.rank != root {
            root_process.gather_varcount_into(send);
            return Ok(());
        }

        let (buf, layout) = recv.ok_or(TransportError::MissingBuffer { rank: root })?;
        layout.validate(self.size, buf.len())?;
        let mut partition =
            PartitionMut::new(buf, to_counts(layout.counts()), to_counts(layout.displs()));
        root_process.gather_varcount_into_root(send, &mut partition);
        Ok(())
    }

    fn barrier(&self) -> Result<(), TransportError> {
        self.world.barrier();
        Ok(())
    }

    fn abort(&self, code: i32) {
        log::error!("rank {} aborting MPI world with code {}", self.rank, code);
        self.world.abort(code)
    }
}
