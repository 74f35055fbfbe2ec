//! Unified `TicTacDogMessage` bus types.
//!
//! All events flow through a single `broadcast<TicTacDogMessage>` channel.
//! Each message has a source (global ID of the originator), a timestamp and
//! a typed event. Producers create messages; consumers subscribe and filter.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ActorState, Match, MatchView, Rank};

// ---------------------------------------------------------------------------
// Top-level message
// ---------------------------------------------------------------------------

/// A single event on the unified bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicTacDogMessage {
    #[serde(default)]
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub event: TicTacDogEvent,
}

impl TicTacDogMessage {
    /// Create a new message with the current UTC timestamp. Use `.source()`
    /// to stamp the originator when sending outside a `BusSender`.
    pub fn new(event: impl Into<TicTacDogEvent>) -> Self {
        Self {
            source: String::new(),
            timestamp: Utc::now(),
            event: event.into(),
        }
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

// ---------------------------------------------------------------------------
// From impls: inner event types -> TicTacDogEvent
// ---------------------------------------------------------------------------

impl From<MatchPushed> for TicTacDogEvent {
    fn from(pushed: MatchPushed) -> Self {
        TicTacDogEvent::MatchPushed(pushed)
    }
}

impl From<MatchCommitted> for TicTacDogEvent {
    fn from(committed: MatchCommitted) -> Self {
        TicTacDogEvent::MatchCommitted(committed)
    }
}

impl From<GameCommand> for TicTacDogEvent {
    fn from(cmd: GameCommand) -> Self {
        TicTacDogEvent::GameCommand(cmd)
    }
}

impl From<GameAction> for TicTacDogEvent {
    fn from(action: GameAction) -> Self {
        TicTacDogEvent::GameCommand(GameCommand {
            request_id: None,
            action,
        })
    }
}

impl From<GameOutcome> for TicTacDogEvent {
    fn from(outcome: GameOutcome) -> Self {
        TicTacDogEvent::GameOutcome(outcome)
    }
}

impl From<MatchView> for TicTacDogEvent {
    fn from(view: MatchView) -> Self {
        TicTacDogEvent::MatchView(Box::new(view))
    }
}

impl From<ActorState> for TicTacDogEvent {
    fn from(state: ActorState) -> Self {
        TicTacDogEvent::ActorStatus(state)
    }
}

impl From<AlertMessage> for TicTacDogEvent {
    fn from(alert: AlertMessage) -> Self {
        TicTacDogEvent::Alert(alert)
    }
}

// ---------------------------------------------------------------------------
// Event variants
// ---------------------------------------------------------------------------

/// The typed event payload carried by a `TicTacDogMessage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TicTacDogEvent {
    /// A full match record delivered by the push hub.
    MatchPushed(MatchPushed),
    /// A match the local controller successfully stored (notify-update).
    MatchCommitted(MatchCommitted),
    /// User intent for the game actor (from the REST API or a WS client).
    GameCommand(GameCommand),
    /// Reply to a `GameCommand` that carried a `request_id`.
    GameOutcome(GameOutcome),
    /// Controller snapshot, emitted after every state change.
    MatchView(Box<MatchView>),
    /// Generic actor status update.
    ActorStatus(ActorState),
    /// Alert for user-visible warn/error conditions.
    Alert(AlertMessage),
}

// ---------------------------------------------------------------------------
// Match records in and out
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchPushed {
    pub game: Match,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCommitted {
    pub game: Match,
}

// ---------------------------------------------------------------------------
// GameCommand / GameOutcome: request-reply with the game actor
// ---------------------------------------------------------------------------

/// A request for the game actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameCommand {
    /// Opaque correlation ID. When present, the game actor emits a
    /// `GameOutcome` with the same ID after processing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub action: GameAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameAction {
    PlaceMove { cell: usize, rank: Rank },
    Restart,
    Hover { cell: Option<usize> },
    /// Re-fetch the stored match.
    Reload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameOutcome {
    pub request_id: String,
    pub result: GameResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameResult {
    /// The command changed the match; carries the adopted record.
    Applied { game: Match },
    /// The move broke a rule. Nothing was submitted.
    Rejected { reason: String },
    /// The store call failed. Local state is unchanged; safe to retry.
    Failed { error: String },
}

// ---------------------------------------------------------------------------
// AlertMessage: user-visible warn/error notifications
// ---------------------------------------------------------------------------

/// Severity level for alert messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Warn,
    Error,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertLevel::Warn => write!(f, "warn"),
            AlertLevel::Error => write!(f, "error"),
        }
    }
}

/// A user-visible alert. Info/debug/trace stays in the tracing backend;
/// warn/error conditions surface here for views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertMessage {
    pub level: AlertLevel,
    pub message: String,
}
