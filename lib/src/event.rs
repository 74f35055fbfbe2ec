//! Shared domain types carried on the bus: actor lifecycle and the
//! controller's read-only match view.
//!
//! Pure data with no channel affinity. The bus message types in
//! `message.rs` reference them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{Match, MatchStatus, PieceSupply, Rank, Role};

// ---------------------------------------------------------------------------
// MatchView: what a view renders
// ---------------------------------------------------------------------------

/// Snapshot of one controller, published after every state change.
///
/// Everything in here is derived from the current `Match` plus the
/// controller's transient hover/winner state; views never recompute rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchView {
    pub self_id: String,
    pub opponent_id: String,
    pub game: Match,
    pub status: MatchStatus,
    pub my_role: Role,
    pub my_supply: PieceSupply,
    pub my_turn: bool,
    pub board_disabled: bool,
    /// A submission is in flight; views should block input.
    #[serde(default)]
    pub pending: bool,
    #[serde(default)]
    pub hovered_cell: Option<usize>,
    /// Ranks offered on the hovered cell.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_ranks: Vec<Rank>,
    #[serde(default)]
    pub winner_announcement: Option<String>,
    /// Prompt shown on an empty board ("Start playing!").
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default)]
    pub winning_line: Option<[usize; 3]>,
}

// ---------------------------------------------------------------------------
// ActorStatus: generic actor lifecycle
// ---------------------------------------------------------------------------

/// Generic actor lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorStatus {
    Starting,
    Disconnected,
    Connected,
    Reconnecting,
}

impl std::fmt::Display for ActorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Actor state emitted on the bus. Carries lifecycle status and
/// actor-specific key/value telemetry (hub url, match id, etc.).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorState {
    pub status: ActorStatus,
    #[serde(default)]
    pub telemetry: HashMap<String, String>,
}

impl ActorState {
    pub fn new(status: ActorStatus, telemetry: HashMap<String, String>) -> Self {
        Self { status, telemetry }
    }
}
