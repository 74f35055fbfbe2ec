//! Game controller: turns user intent into validated match transitions.
//!
//! The controller owns the current `Match` for one pair of players plus the
//! transient hover/winner state a view needs. It never talks to the network
//! itself: persistence goes through an injected `MatchStore`, and every
//! adopted local change is reported to an injected `MatchListener`.
//!
//! Reconciliation with the opposing client is last-write-wins over the whole
//! record. A push that arrives while a local submission is in flight is
//! applied after the submission resolves, so whichever resolves last is what
//! the controller shows. There is no version check.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::game_state::{
    BOARD_CELLS, Cell, Match, PieceSupply, Rank, Role, allowed_ranks, empty_match,
    evaluate_winner, is_empty, is_turn_of, piece_supply, role, status, winning_line,
};
use crate::{IllegalMove, MatchView, StoreError};

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// External persistence for match records.
pub trait MatchStore {
    /// Persist a full replacement record. Returns the stored record.
    fn submit_match(&self, game: &Match)
    -> impl Future<Output = Result<Match, StoreError>> + Send;

    /// Look up the match between two users. `None` if none exists yet.
    fn fetch_match(
        &self,
        self_id: &str,
        opponent_id: &str,
    ) -> impl Future<Output = Result<Option<Match>, StoreError>> + Send;
}

impl<T: MatchStore + Send + Sync> MatchStore for Arc<T> {
    fn submit_match(
        &self,
        game: &Match,
    ) -> impl Future<Output = Result<Match, StoreError>> + Send {
        (**self).submit_match(game)
    }

    fn fetch_match(
        &self,
        self_id: &str,
        opponent_id: &str,
    ) -> impl Future<Output = Result<Option<Match>, StoreError>> + Send {
        (**self).fetch_match(self_id, opponent_id)
    }
}

/// Notified with every match the controller stored successfully.
pub trait MatchListener {
    fn match_updated(&self, game: &Match);
}

impl<F: Fn(&Match)> MatchListener for F {
    fn match_updated(&self, game: &Match) {
        self(game)
    }
}

/// Result of `attempt_move` when the store was not at fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Stored and adopted as the current match.
    Applied,
    /// Broke a rule. Nothing was submitted and nothing changed.
    Rejected(IllegalMove),
}

// ---------------------------------------------------------------------------
// GameController
// ---------------------------------------------------------------------------

pub struct GameController<S, L> {
    self_id: String,
    opponent_id: String,
    store: S,
    listener: L,
    current: Match,
    hovered_cell: Option<usize>,
    winner: Option<Role>,
}

impl<S: MatchStore, L: MatchListener> GameController<S, L> {
    /// Controller for the match between `self_id` and `opponent_id`, starting
    /// from an empty board until `load()` or a push says otherwise.
    pub fn new(
        self_id: impl Into<String>,
        opponent_id: impl Into<String>,
        store: S,
        listener: L,
    ) -> Self {
        let self_id = self_id.into();
        let opponent_id = opponent_id.into();
        let current = empty_match(&self_id).with_opponent(&opponent_id);
        Self {
            self_id,
            opponent_id,
            store,
            listener,
            current,
            hovered_cell: None,
            winner: None,
        }
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    pub fn opponent_id(&self) -> &str {
        &self.opponent_id
    }

    pub fn current(&self) -> &Match {
        &self.current
    }

    pub fn winner(&self) -> Option<Role> {
        self.winner
    }

    pub fn hovered_cell(&self) -> Option<usize> {
        self.hovered_cell
    }

    /// My role. Before the first move nobody holds a role yet, so the local
    /// player is provisionally first.
    pub fn my_role(&self) -> Role {
        if self.current.has_moves() {
            role(&self.current, &self.self_id)
        } else {
            Role::First
        }
    }

    pub fn my_supply(&self) -> PieceSupply {
        piece_supply(&self.current, self.my_role())
    }

    pub fn is_my_turn(&self) -> bool {
        is_turn_of(&self.current, &self.self_id)
    }

    /// Input is blocked once the match is won or while the opponent is to move.
    pub fn board_disabled(&self) -> bool {
        self.winner.is_some() || !self.is_my_turn()
    }

    /// Ranks the local player may place on `cell` right now.
    pub fn allowed_moves(&self, cell: usize) -> Vec<Rank> {
        match self.current.board.get(cell) {
            Some(&value) if !self.board_disabled() => allowed_ranks(value, &self.my_supply()),
            _ => Vec::new(),
        }
    }

    /// Track the hovered cell. Ignored while the board is disabled.
    pub fn hover(&mut self, cell: Option<usize>) {
        self.hovered_cell = match cell {
            Some(index) if index < BOARD_CELLS && !self.board_disabled() => Some(index),
            _ => None,
        };
    }

    /// Fetch the stored match for this pair and adopt it if one exists.
    /// Returns whether a stored match was adopted.
    pub async fn load(&mut self) -> Result<bool, StoreError> {
        match self
            .store
            .fetch_match(&self.self_id, &self.opponent_id)
            .await?
        {
            Some(game) => Ok(self.apply_remote_update(game)),
            None => {
                debug!(
                    "no stored match between '{}' and '{}'",
                    self.self_id, self.opponent_id
                );
                Ok(false)
            }
        }
    }

    /// Replace the current match with a pushed one (last-write-wins).
    ///
    /// Records for a different pair of players are ignored; returns whether
    /// the update was adopted.
    pub fn apply_remote_update(&mut self, incoming: Match) -> bool {
        if !incoming.is_between(&self.self_id, &self.opponent_id) {
            warn!(
                "ignoring match {} between '{}' and '{}': not ours",
                incoming.id, incoming.first_player_id, incoming.opponent_id
            );
            return false;
        }
        debug!(
            "remote update for match {}: {:?} (last mover '{}')",
            incoming.id,
            incoming.cells(),
            incoming.last_mover_id
        );
        self.adopt(incoming);
        true
    }

    /// Place `rank` on `cell` for the local player.
    ///
    /// Rule violations come back as `Ok(MoveOutcome::Rejected)` without
    /// touching the store. A store failure is returned as `Err` and leaves
    /// the current match exactly as it was, so the move can be retried.
    pub async fn attempt_move(
        &mut self,
        cell: usize,
        rank: Rank,
    ) -> Result<MoveOutcome, StoreError> {
        let next = match self.check_move(cell, rank) {
            Ok(next) => next,
            Err(reason) => {
                debug!("move {} on cell {cell} rejected: {reason}", rank.name());
                return Ok(MoveOutcome::Rejected(reason));
            }
        };

        let stored = match self.store.submit_match(&next).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("failed to store move on cell {cell}: {e}");
                return Err(e);
            }
        };

        let adopted = self.accept_echo(stored, next);
        info!(
            "{} placed {} on cell {cell} in match {}",
            self.self_id,
            rank.name(),
            adopted.id
        );
        self.adopt(adopted);
        self.listener.match_updated(&self.current);
        Ok(MoveOutcome::Applied)
    }

    /// Reset to an empty board with the local player first. Always allowed.
    /// The match keeps its external id.
    pub async fn restart(&mut self) -> Result<&Match, StoreError> {
        let mut fresh = empty_match(&self.self_id).with_opponent(&self.opponent_id);
        fresh.id = self.current.id;

        let stored = self
            .store
            .submit_match(&fresh)
            .await
            .inspect_err(|e| warn!("failed to store restart: {e}"))?;

        let adopted = self.accept_echo(stored, fresh);
        info!("{} restarted match {}", self.self_id, adopted.id);
        self.adopt(adopted);
        self.listener.match_updated(&self.current);
        Ok(&self.current)
    }

    /// The record to adopt after a successful submit. An echo for another
    /// pair keeps what was submitted, under the stored id.
    fn accept_echo(&self, stored: Match, submitted: Match) -> Match {
        if stored.is_between(&self.self_id, &self.opponent_id) {
            stored
        } else {
            warn!("store echoed match {} for another pair, keeping ours", stored.id);
            Match {
                id: stored.id,
                ..submitted
            }
        }
    }

    pub fn view(&self) -> MatchView {
        MatchView {
            self_id: self.self_id.clone(),
            opponent_id: self.opponent_id.clone(),
            game: self.current.clone(),
            status: status(&self.current),
            my_role: self.my_role(),
            my_supply: self.my_supply(),
            my_turn: self.is_my_turn(),
            board_disabled: self.board_disabled(),
            pending: false,
            hovered_cell: self.hovered_cell,
            allowed_ranks: self
                .hovered_cell
                .map(|cell| self.allowed_moves(cell))
                .unwrap_or_default(),
            winner_announcement: self
                .winner
                .map(|winner| format!("{} wins!", winner.color().to_uppercase())),
            hint: is_empty(&self.current.board).then(|| "Start playing!".to_string()),
            winning_line: winning_line(&self.current.board),
        }
    }

    /// Validate a move and build the match it would produce.
    fn check_move(&self, cell: usize, rank: Rank) -> Result<Match, IllegalMove> {
        if self.winner.is_some() {
            return Err(IllegalMove::GameOver);
        }
        if !self.is_my_turn() {
            return Err(IllegalMove::NotYourTurn);
        }
        let Some(&occupant) = self.current.board.get(cell) else {
            return Err(IllegalMove::CellOutOfRange(cell));
        };
        if !allowed_ranks(occupant, &self.my_supply()).contains(&rank) {
            return Err(IllegalMove::RankNotAllowed { cell, rank });
        }

        let mut next = self.current.clone();
        // The first piece on a fresh board fixes the roles.
        if !next.has_moves() {
            next.first_player_id = self.self_id.clone();
            next.opponent_id = self.opponent_id.clone();
        }
        if next.opponent_id.is_empty() {
            next.opponent_id = if next.first_player_id == self.self_id {
                self.opponent_id.clone()
            } else {
                self.self_id.clone()
            };
        }
        next.board[cell] = Cell::placed(role(&next, &self.self_id), rank);
        next.last_mover_id = self.self_id.clone();
        Ok(next)
    }

    fn adopt(&mut self, game: Match) {
        self.current = game;
        self.winner = evaluate_winner(&self.current.board);
        if let Some(winner) = self.winner {
            info!(
                "match {}: {} player wins",
                self.current.id,
                winner.color()
            );
        }
        if self.board_disabled() || is_empty(&self.current.board) {
            self.hovered_cell = None;
        }
    }
}
