//! Distribution strategies.
//!
//! An [`ExchangeChannel`] moves one round's blocks from the coordinator to
//! every rank and back. Two implementations exist and must agree bit for bit:
//!
//! - [`CollectiveChannel`]: one varcount scatter per operand and one varcount
//!   gather for the result, with every rank taking part.
//! - [`MessageChannel`]: the coordinator walks the ranks in order and sends
//!   a count header, then the A and B payloads when the count is non-zero;
//!   each rank answers with its result payload.

pub mod collective;
pub mod message;

use std::fmt;
use std::str::FromStr;

use lincomb_comm::{Communicator, Tag, TransportError};
use ndarray::ShapeError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::partition::{ColumnAssignment, Share};
use crate::types::LocalBlock;

pub use collective::CollectiveChannel;
pub use message::MessageChannel;

/// Tag of the count header sent before any payload.
pub const TAG_HEADER: Tag = 0;
/// Tag of the A-block payload.
pub const TAG_A: Tag = 1;
/// Tag of the B-block payload.
pub const TAG_B: Tag = 2;
/// Tag of the result payload sent back to the coordinator.
pub const TAG_RESULT: Tag = 3;

/// Errors raised while moving blocks between ranks.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Rank {rank} expects {expected} values but the coordinator announced {announced}")]
    ProtocolMismatch {
        rank: usize,
        expected: usize,
        announced: u64,
    },

    #[error("Assignment covers {assignment} ranks but the world has {world}")]
    WorldMismatch { assignment: usize, world: usize },

    #[error("Coordinator called {0} without its round buffers")]
    MissingRoundBuffers(&'static str),

    #[error("Round buffer holds {actual} values, the assignment needs {expected}")]
    ShortRoundBuffer { expected: usize, actual: usize },

    #[error("Block for rank {rank} holds {actual} values, expected {expected}")]
    BlockMismatch {
        rank: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Block shape error: {0}")]
    Shape(#[from] ShapeError),
}

/// Which communication discipline moves the blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Group-wide scatter and gather.
    #[default]
    Collective,
    /// Paired, tagged sends and receives per rank.
    Message,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Collective => f.write_str("collective"),
            Strategy::Message => f.write_str("message"),
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "collective" => Ok(Strategy::Collective),
            "message" | "p2p" | "point-to-point" => Ok(Strategy::Message),
            other => Err(format!(
                "unknown strategy '{other}' (expected 'collective' or 'message')"
            )),
        }
    }
}

/// The coordinator's packed operand buffers for one round.
#[derive(Debug, Clone, Copy)]
pub struct RoundOperands<'a> {
    pub a: &'a [f64],
    pub b: &'a [f64],
}

/// Moves a round's blocks between the coordinator and the ranks.
///
/// Every rank calls [`distribute`](Self::distribute) and then
/// [`collect`](Self::collect) once per round with the same assignment. Only
/// the coordinator passes buffers; on other ranks they are `None`.
pub trait ExchangeChannel {
    fn strategy(&self) -> Strategy;

    /// Hand this rank its A and B blocks for the round.
    fn distribute(
        &self,
        assignment: &ColumnAssignment,
        operands: Option<RoundOperands<'_>>,
    ) -> Result<(LocalBlock, LocalBlock), ExchangeError>;

    /// Return this rank's result block. On the coordinator, `result` receives
    /// every rank's block at its assignment offset.
    fn collect(
        &self,
        assignment: &ColumnAssignment,
        block: &LocalBlock,
        result: Option<&mut [f64]>,
    ) -> Result<(), ExchangeError>;
}

/// Build the channel for `strategy` over `comm`.
pub fn channel_for<'c, C: Communicator>(
    strategy: Strategy,
    comm: &'c C,
) -> Box<dyn ExchangeChannel + 'c> {
    match strategy {
        Strategy::Collective => Box::new(CollectiveChannel::new(comm)),
        Strategy::Message => Box::new(MessageChannel::new(comm)),
    }
}

/// This rank's share, after checking the assignment fits the world.
fn own_share<'a, C: Communicator>(
    comm: &C,
    assignment: &'a ColumnAssignment,
) -> Result<&'a Share, ExchangeError> {
    let world = comm.size();
    if assignment.workers() != world {
        return Err(ExchangeError::WorldMismatch {
            assignment: assignment.workers(),
            world,
        });
    }
    assignment
        .share(comm.rank())
        .ok_or(ExchangeError::WorldMismatch {
            assignment: assignment.workers(),
            world,
        })
}

fn check_buffer(len: usize, assignment: &ColumnAssignment) -> Result<(), ExchangeError> {
    let expected = assignment.total_elements();
    if len < expected {
        return Err(ExchangeError::ShortRoundBuffer {
            expected,
            actual: len,
        });
    }
    Ok(())
}

fn check_block(share: &Share, block: &LocalBlock) -> Result<(), ExchangeError> {
    if block.len() != share.count {
        return Err(ExchangeError::BlockMismatch {
            rank: share.rank,
            expected: share.count,
            actual: block.len(),
        });
    }
    Ok(())
}
