//! In-process transport: one OS thread per rank, joined only by channels.
//!
//! Each [`LocalComm`] owns its own inbox and a sender into every other
//! rank's inbox. Ranks share no data; everything a rank learns about another
//! arrives as a message, which keeps the semantics of the MPI transport.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use crate::comm::{
    check_rank, Communicator, Tag, TransportError, TransportKind, VarLayout, WorldInfo,
};

/// What a message is for. Receives match on `(source, Kind)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Data(Tag),
    Header(Tag),
    Scatter,
    Gather,
    Barrier,
    Release,
    Abort { code: i32 },
}

#[derive(Debug)]
enum Body {
    Values(Vec<f64>),
    Count(u64),
    Signal,
}

#[derive(Debug)]
struct Envelope {
    source: usize,
    kind: Kind,
    body: Body,
}

/// A world of ranks running as threads of the current process.
#[derive(Debug, Clone, Copy)]
pub struct LocalWorld {
    size: usize,
}

impl LocalWorld {
    /// Create a world with `size` ranks.
    pub fn new(size: usize) -> Result<Self, TransportError> {
        if size == 0 {
            return Err(TransportError::Unavailable(
                "a world needs at least one rank".into(),
            ));
        }
        Ok(Self { size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `f` once per rank, each on its own thread, and return every
    /// rank's result in rank order.
    ///
    /// A rank whose closure returns `Err` or panics aborts the world, so no
    /// other rank is left waiting for a message that will never come. A rank
    /// that failed because it was itself aborted does not re-broadcast, so
    /// peers see the rank that failed first. Panics are re-raised on the
    /// calling thread after every rank has stopped.
    pub fn run<T, E, F>(&self, f: F) -> Result<Vec<Result<T, E>>, TransportError>
    where
        F: Fn(&LocalComm) -> Result<T, E> + Sync,
        T: Send,
        E: Send,
    {
        self.launch(f, |rank| {
            thread::Builder::new().name(format!("lincomb-rank-{rank}"))
        })
    }

    fn launch<T, E, F, B>(&self, f: F, builder: B) -> Result<Vec<Result<T, E>>, TransportError>
    where
        F: Fn(&LocalComm) -> Result<T, E> + Sync,
        T: Send,
        E: Send,
        B: Fn(usize) -> thread::Builder,
    {
        let (comms, injectors) = self.connect();
        let f = &f;

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.size);
            for comm in comms {
                let rank = comm.rank;
                let spawned = builder(rank).spawn_scoped(scope, move || {
                    let guard = AbortOnPanic(&comm);
                    let result = f(&comm);
                    if result.is_err() && comm.aborted.get().is_none() {
                        comm.abort(1);
                    }
                    drop(guard);
                    result
                });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(err) => {
                        log::error!("failed to start rank {rank}: {err}");
                        for tx in &injectors {
                            let _ = tx.send(Envelope {
                                source: rank,
                                kind: Kind::Abort { code: 1 },
                                body: Body::Signal,
                            });
                        }
                        return Err(TransportError::Unavailable(err.to_string()));
                    }
                }
            }
            // Ranks must see a disconnect once every peer is gone.
            drop(injectors);

            let mut results = Vec::with_capacity(handles.len());
            for handle in handles {
                match handle.join() {
                    Ok(result) => results.push(result),
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
            Ok(results)
        })
    }

    /// Wire up one inbox per rank and hand each rank senders to the others.
    /// The returned senders reach every inbox and are used to abort the world
    /// if a rank cannot be started.
    fn connect(&self) -> (Vec<LocalComm>, Vec<Sender<Envelope>>) {
        let (senders, inboxes): (Vec<Sender<Envelope>>, Vec<Receiver<Envelope>>) =
            (0..self.size).map(|_| mpsc::channel()).unzip();

        let comms = inboxes
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| LocalComm {
                rank,
                size: self.size,
                peers: senders
                    .iter()
                    .enumerate()
                    .map(|(peer, tx)| (peer != rank).then(|| tx.clone()))
                    .collect(),
                inbox,
                parked: RefCell::new(VecDeque::new()),
                aborted: Cell::new(None),
            })
            .collect();
        (comms, senders)
    }
}

struct AbortOnPanic<'a>(&'a LocalComm);

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.abort(101);
        }
    }
}

/// One rank's endpoint in a [`LocalWorld`].
pub struct LocalComm {
    rank: usize,
    size: usize,
    /// Sender into every other rank's inbox; `None` at our own rank.
    peers: Vec<Option<Sender<Envelope>>>,
    inbox: Receiver<Envelope>,
    /// Messages that arrived before anyone asked for them.
    parked: RefCell<VecDeque<Envelope>>,
    aborted: Cell<Option<(usize, i32)>>,
}

impl LocalComm {
    fn post(&self, dest: usize, kind: Kind, body: Body) -> Result<(), TransportError> {
        check_rank(dest, self.size)?;
        let envelope = Envelope {
            source: self.rank,
            kind,
            body,
        };
        match &self.peers[dest] {
            Some(tx) => tx
                .send(envelope)
                .map_err(|_| TransportError::Disconnected { rank: dest }),
            None => {
                // Loopback.
                self.parked.borrow_mut().push_back(envelope);
                Ok(())
            }
        }
    }

    fn take(&self, source: usize, kind: Kind) -> Result<Body, TransportError> {
        check_rank(source, self.size)?;
        if let Some((rank, code)) = self.aborted.get() {
            return Err(TransportError::Aborted { rank, code });
        }

        {
            let mut parked = self.parked.borrow_mut();
            let hit = parked
                .iter()
                .position(|env| env.source == source && env.kind == kind);
            if let Some(envelope) = hit.and_then(|pos| parked.remove(pos)) {
                return Ok(envelope.body);
            }
        }

        loop {
            let envelope = self
                .inbox
                .recv()
                .map_err(|_| TransportError::Disconnected { rank: source })?;
            if let Kind::Abort { code } = envelope.kind {
                self.aborted.set(Some((envelope.source, code)));
                return Err(TransportError::Aborted {
                    rank: envelope.source,
                    code,
                });
            }
            if envelope.source == source && envelope.kind == kind {
                return Ok(envelope.body);
            }
            self.parked.borrow_mut().push_back(envelope);
        }
    }

    fn take_values(
        &self,
        source: usize,
        kind: Kind,
        what: &str,
        expected: usize,
    ) -> Result<Vec<f64>, TransportError> {
        match self.take(source, kind)? {
            Body::Values(values) if values.len() == expected => Ok(values),
            Body::Values(values) => Err(TransportError::LengthMismatch {
                peer: source,
                what: what.into(),
                expected,
                actual: values.len(),
            }),
            _ => Err(TransportError::Malformed {
                peer: source,
                what: what.into(),
            }),
        }
    }
}

impl Communicator for LocalComm {
    fn world_info(&self) -> WorldInfo {
        WorldInfo {
            name: format!("local ({} ranks)", self.size),
            kind: TransportKind::Local,
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
        self.post(dest, Kind::Data(tag), Body::Values(data.to_vec()))
    }

    fn recv_into(&self, source: usize, tag: Tag, buf: &mut [f64]) -> Result<(), TransportError> {
        let values = self.take_values(source, Kind::Data(tag), &format!("tag {tag}"), buf.len())?;
        buf.copy_from_slice(&values);
        Ok(())
    }

    fn send_header(&self, dest: usize, tag: Tag, value: u64) -> Result<(), TransportError> {
        self.post(dest, Kind::Header(tag), Body::Count(value))
    }

    fn recv_header(&self, source: usize, tag: Tag) -> Result<u64, TransportError> {
        match self.take(source, Kind::Header(tag))? {
            Body::Count(value) => Ok(value),
            _ => Err(TransportError::Malformed {
                peer: source,
                what: format!("header tag {tag}"),
            }),
        }
    }

    fn scatterv(
        &self,
        root: usize,
        send: Option<(&[f64], &VarLayout)>,
        recv: &mut [f64],
    ) -> Result<(), TransportError> {
        check_rank(root, self.size)?;

        if self.rank != root {
            let values = self.take_values(root, Kind::Scatter, "scatterv", recv.len())?;
            recv.copy_from_slice(&values);
            return Ok(());
        }

        let (buf, layout) = send.ok_or(TransportError::MissingBuffer { rank: root })?;
        layout.validate(self.size, buf.len())?;
        for dest in (0..self.size).filter(|&r| r != root) {
            let block = buf[layout.range(dest)].to_vec();
            self.post(dest, Kind::Scatter, Body::Values(block))?;
        }

        let own = &buf[layout.range(root)];
        if own.len() != recv.len() {
            return Err(TransportError::LengthMismatch {
                peer: root,
                what: "scatterv".into(),
                expected: own.len(),
                actual: recv.len(),
            });
        }
        recv.copy_from_slice(own);
        Ok(())
    }

    fn gatherv(
        &self,
        root: usize,
        send: &[f64],
        recv: Option<(&mut [f64], &VarLayout)>,
    ) -> Result<(), TransportError> {
        check_rank(root, self.size)?;

        if self.rank != root {
            return self.post(root, Kind::Gather, Body::Values(send.to_vec()));
        }

        let (buf, layout) = recv.ok_or(TransportError::MissingBuffer { rank: root })?;
        layout.validate(self.size, buf.len())?;

        let own = layout.range(root);
        if own.len() != send.len() {
            return Err(TransportError::LengthMismatch {
                peer: root,
                what: "gatherv".into(),
                expected: own.len(),
                actual: send.len(),
            });
        }
        buf[own].copy_from_slice(send);

        for source in (0..self.size).filter(|&r| r != root) {
            let range = layout.range(source);
            let values = self.take_values(source, Kind::Gather, "gatherv", range.len())?;
            buf[range].copy_from_slice(&values);
        }
        Ok(())
    }

    fn barrier(&self) -> Result<(), TransportError> {
        let root = crate::comm::ROOT;
        if self.rank == root {
            for peer in (0..self.size).filter(|&r| r != root) {
                self.take(peer, Kind::Barrier)?;
            }
            for peer in (0..self.size).filter(|&r| r != root) {
                self.post(peer, Kind::Release, Body::Signal)?;
            }
        } else {
            self.post(root, Kind::Barrier, Body::Signal)?;
            self.take(root, Kind::Release)?;
        }
        Ok(())
    }

    fn abort(&self, code: i32) {
        // Once aborted, only ever pass on the first origin.
        let (origin, code) = match self.aborted.get() {
            Some(first) => first,
            None => {
                log::warn!("rank {} aborting the world with code {}", self.rank, code);
                self.aborted.set(Some((self.rank, code)));
                (self.rank, code)
            }
        };
        for tx in self.peers.iter().flatten() {
            // A peer that already finished has nothing left to wake up.
            let _ = tx.send(Envelope {
                source: origin,
                kind: Kind::Abort { code },
                body: Body::Signal,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_world_is_rejected() {
        assert!(LocalWorld::new(0).is_err());
    }

    #[test]
    fn test_results_come_back_in_rank_order() {
        let world = LocalWorld::new(4).unwrap();
        let ranks = world
            .run(|comm| Ok::<_, TransportError>(comm.rank()))
            .unwrap();
        let ranks: Vec<usize> = ranks.into_iter().map(Result::unwrap).collect();
        assert_eq!(ranks, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_receive_matches_by_tag_not_arrival_order() {
        let world = LocalWorld::new(2).unwrap();
        let results = world
            .run(|comm| {
                if comm.rank() == 0 {
                    comm.send(1, 7, &[7.0])?;
                    comm.send(1, 3, &[3.0, 3.0])?;
                    Ok(Vec::new())
                } else {
                    let mut three = [0.0; 2];
                    let mut seven = [0.0; 1];
                    comm.recv_into(0, 3, &mut three)?;
                    comm.recv_into(0, 7, &mut seven)?;
                    Ok::<_, TransportError>(vec![three[0], three[1], seven[0]])
                }
            })
            .unwrap();
        assert_eq!(results[1].as_ref().unwrap(), &vec![3.0, 3.0, 7.0]);
    }

    #[test]
    fn test_headers_and_payloads_with_same_tag_do_not_collide() {
        let world = LocalWorld::new(2).unwrap();
        let results = world
            .run(|comm| {
                if comm.rank() == 0 {
                    comm.send(1, 0, &[1.5])?;
                    comm.send_header(1, 0, 42)?;
                    Ok(0)
                } else {
                    let header = comm.recv_header(0, 0)?;
                    let mut payload = [0.0];
                    comm.recv_into(0, 0, &mut payload)?;
                    assert_eq!(payload[0], 1.5);
                    Ok::<_, TransportError>(header)
                }
            })
            .unwrap();
        assert_eq!(*results[1].as_ref().unwrap(), 42);
    }

    #[test]
    fn test_wrong_length_is_reported() {
        let world = LocalWorld::new(2).unwrap();
        let results = world
            .run(|comm| {
                if comm.rank() == 0 {
                    comm.send(1, 1, &[1.0, 2.0, 3.0])
                } else {
                    let mut buf = [0.0; 2];
                    comm.recv_into(0, 1, &mut buf)
                }
            })
            .unwrap();
        assert!(matches!(
            results[1],
            Err(TransportError::LengthMismatch { expected: 2, actual: 3, .. })
        ));
    }

    #[test]
    fn test_scatterv_and_gatherv_round_trip_uneven_blocks() {
        let world = LocalWorld::new(3).unwrap();
        let layout = VarLayout::contiguous(vec![3, 0, 2]);
        let results = world
            .run(|comm| {
                let global: Vec<f64> = (0..5).map(f64::from).collect();
                let mut local = vec![0.0; layout.counts()[comm.rank()]];
                let send = comm.is_root().then_some((&global[..], &layout));
                comm.scatterv(0, send, &mut local)?;

                for v in &mut local {
                    *v *= 10.0;
                }

                let mut gathered = vec![0.0; 5];
                let recv = comm.is_root().then_some((&mut gathered[..], &layout));
                comm.gatherv(0, &local, recv)?;
                Ok::<_, TransportError>((local, gathered))
            })
            .unwrap();

        let (root_local, gathered) = results[0].as_ref().unwrap();
        assert_eq!(root_local, &vec![0.0, 10.0, 20.0]);
        assert_eq!(gathered, &vec![0.0, 10.0, 20.0, 30.0, 40.0]);
        assert!(results[1].as_ref().unwrap().0.is_empty());
        assert_eq!(results[2].as_ref().unwrap().0, vec![30.0, 40.0]);
    }

    #[test]
    fn test_root_without_buffer_is_an_error() {
        let world = LocalWorld::new(1).unwrap();
        let results = world
            .run(|comm| {
                let mut recv: [f64; 0] = [];
                comm.scatterv(0, None, &mut recv)
            })
            .unwrap();
        assert!(matches!(
            results[0],
            Err(TransportError::MissingBuffer { rank: 0 })
        ));
    }

    #[test]
    fn test_barrier_completes_on_every_rank() {
        let world = LocalWorld::new(5).unwrap();
        let results = world
            .run(|comm| {
                comm.barrier()?;
                comm.barrier()
            })
            .unwrap();
        assert!(results.iter().all(Result::is_ok));
    }

    #[test]
    fn test_failing_rank_aborts_blocked_peers() {
        let world = LocalWorld::new(3).unwrap();
        let results = world
            .run(|comm| {
                if comm.rank() == 2 {
                    return Err(TransportError::Unavailable("rank 2 gave up".into()));
                }
                let mut buf = [0.0];
                comm.recv_into(2, 0, &mut buf)
            })
            .unwrap();
        for result in &results[..2] {
            assert!(matches!(
                result,
                Err(TransportError::Aborted { rank: 2, code: 1 })
            ));
        }
    }

    #[test]
    fn test_aborted_ranks_do_not_claim_the_abort() {
        // Rank 0 is woken first and fails too; neither peer may report it.
        for _ in 0..200 {
            let world = LocalWorld::new(3).unwrap();
            let results = world
                .run(|comm| {
                    if comm.rank() == 2 {
                        return Err(TransportError::Unavailable("rank 2 gave up".into()));
                    }
                    let mut buf = [0.0];
                    comm.recv_into(2, 0, &mut buf)
                })
                .unwrap();
            for result in &results[..2] {
                assert!(matches!(
                    result,
                    Err(TransportError::Aborted { rank: 2, code: 1 })
                ));
            }
        }
    }

    #[test]
    fn test_abort_after_being_aborted_forwards_origin() {
        let world = LocalWorld::new(3).unwrap();
        let results = world
            .run(|comm| match comm.rank() {
                2 => {
                    comm.abort(7);
                    Ok(())
                }
                0 => {
                    let mut buf = [0.0];
                    let received = comm.recv_into(2, 0, &mut buf);
                    comm.abort(1);
                    received
                }
                _ => {
                    let mut buf = [0.0];
                    comm.recv_into(0, 0, &mut buf)
                }
            })
            .unwrap();
        assert!(matches!(
            results[0],
            Err(TransportError::Aborted { rank: 2, code: 7 })
        ));
        assert!(matches!(
            results[1],
            Err(TransportError::Aborted { rank: 2, code: 7 })
        ));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_failed_spawn_releases_started_ranks() {
        let world = LocalWorld::new(3).unwrap();
        let outcome = world.launch(
            |comm| {
                let mut buf = [0.0];
                comm.recv_into(2, 0, &mut buf)
            },
            |rank| {
                let builder = thread::Builder::new();
                if rank == 2 {
                    // Larger than the address space, so the spawn fails.
                    builder.stack_size(1 << 50)
                } else {
                    builder
                }
            },
        );
        assert!(matches!(outcome, Err(TransportError::Unavailable(_))));
    }

    #[test]
    fn test_invalid_destination_is_rejected() {
        let world = LocalWorld::new(2).unwrap();
        let results = world.run(|comm| comm.send(9, 0, &[])).unwrap();
        assert!(matches!(
            results[0],
            Err(TransportError::InvalidRank { rank: 9, size: 2 })
        ));
    }

    #[test]
    fn test_loopback_send_is_received() {
        let world = LocalWorld::new(1).unwrap();
        let results = world
            .run(|comm| {
                comm.send(0, 5, &[2.0, 4.0])?;
                let mut buf = [0.0; 2];
                comm.recv_into(0, 5, &mut buf)?;
                Ok::<_, TransportError>(buf)
            })
            .unwrap();
        assert_eq!(results[0].as_ref().unwrap(), &[2.0, 4.0]);
    }
}
