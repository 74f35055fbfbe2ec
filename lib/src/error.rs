//! Error types for the match model, the controller, and the store boundary.

use thiserror::Error;

use crate::{Rank, Role};

/// A match record that cannot be turned into a valid `Match`.
///
/// Produced when decoding a `MatchRecord` from the store or the push hub.
/// Callers log it and keep their current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("cell {index} holds {value}, expected -3..=3")]
    CellOutOfRange { index: usize, value: i64 },

    #[error("rank {0} is not one of 1, 2, 3")]
    InvalidRank(u8),

    #[error("{role} has {count} pieces of rank {rank} on the board, at most 3 exist")]
    SupplyOverdrawn { role: Role, rank: Rank, count: u8 },

    #[error("missing first player id")]
    MissingFirstPlayer,

    #[error("first player and opponent are both '{0}'")]
    SamePlayers(String),

    #[error("last mover '{0}' is not a participant")]
    UnknownMover(String),
}

/// Why `attempt_move` refused a move. Expected user-error path, never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IllegalMove {
    #[error("the match already has a winner")]
    GameOver,

    #[error("waiting for the opponent to move")]
    NotYourTurn,

    #[error("cell {0} is off the board")]
    CellOutOfRange(usize),

    #[error("rank {rank} cannot be placed on cell {cell}")]
    RankNotAllowed { cell: usize, rank: Rank },
}

/// Failure of the external persistence call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("store rejected the request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("store returned an undecodable body: {0}")]
    Decode(String),

    #[error("store returned a malformed match: {0}")]
    Malformed(#[from] MatchError),
}
