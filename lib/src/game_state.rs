//! Match model: board, roles, piece supply, and win detection.
//!
//! Pure data plus derivations over it. Nothing here performs I/O or holds
//! mutable state; the controller produces new `Match` values and these
//! functions re-derive turn, supply and winner from them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{MatchError, MatchRecord};

/// Cells on the 3x3 board, row-major.
pub const BOARD_CELLS: usize = 9;

/// Pieces of each rank every player owns for the whole match.
pub const PIECES_PER_RANK: u8 = 3;

/// Winning lines in evaluation order: rows, columns, diagonals.
pub const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

// ---------------------------------------------------------------------------
// Rank / Role
// ---------------------------------------------------------------------------

/// Piece strength. A higher rank may be placed on top of a lower one.
///
/// Serializes as its integer value (`1`, `2`, `3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Rank {
    Mouse = 1,
    Cat = 2,
    Dog = 3,
}

impl Rank {
    /// All ranks, weakest first.
    pub const ALL: [Rank; 3] = [Rank::Mouse, Rank::Cat, Rank::Dog];

    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Rank::Mouse => "mouse",
            Rank::Cat => "cat",
            Rank::Dog => "dog",
        }
    }
}

impl TryFrom<u8> for Rank {
    type Error = MatchError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Rank::Mouse),
            2 => Ok(Rank::Cat),
            3 => Ok(Rank::Dog),
            other => Err(MatchError::InvalidRank(other)),
        }
    }
}

impl From<Rank> for u8 {
    fn from(rank: Rank) -> Self {
        rank.value()
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// Which side of the match a player is on. Fixed per match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    First,
    Second,
}

impl Role {
    /// Display color: the first player is red, the second blue.
    pub fn color(self) -> &'static str {
        match self {
            Role::First => "red",
            Role::Second => "blue",
        }
    }

    fn sign(self) -> i8 {
        match self {
            Role::First => 1,
            Role::Second => -1,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => write!(f, "first"),
            Self::Second => write!(f, "second"),
        }
    }
}

// ---------------------------------------------------------------------------
// Cell / Board
// ---------------------------------------------------------------------------

/// One board cell: 0 empty, sign = owner, magnitude = rank.
///
/// The inner value is private so a `Cell` is always within `-3..=3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Cell(i8);

impl Cell {
    pub const EMPTY: Cell = Cell(0);

    /// A piece of `rank` owned by `role`.
    pub fn placed(role: Role, rank: Rank) -> Cell {
        Cell(role.sign() * rank.value() as i8)
    }

    /// Validate a raw wire value for the cell at `index`.
    pub fn from_wire(index: usize, value: i64) -> Result<Cell, MatchError> {
        match value {
            -3..=3 => Ok(Cell(value as i8)),
            _ => Err(MatchError::CellOutOfRange { index, value }),
        }
    }

    pub fn value(self) -> i8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn owner(self) -> Option<Role> {
        match self.0.signum() {
            1 => Some(Role::First),
            -1 => Some(Role::Second),
            _ => None,
        }
    }

    /// Rank of the occupying piece, 0 for an empty cell.
    pub fn level(self) -> u8 {
        self.0.unsigned_abs()
    }

    pub fn rank(self) -> Option<Rank> {
        Rank::try_from(self.level()).ok()
    }
}

pub type Board = [Cell; BOARD_CELLS];

// ---------------------------------------------------------------------------
// Match
// ---------------------------------------------------------------------------

/// One game between two players.
///
/// Serializes through `MatchRecord`, so every JSON form of a match (store,
/// push hub, local API, bus) uses the same wire layout and is validated on
/// the way in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MatchRecord", into = "MatchRecord")]
pub struct Match {
    /// Assigned by the external store. 0 = not yet persisted.
    pub id: u64,
    pub board: Board,
    /// Player who made the most recent move. Empty before the first move.
    pub last_mover_id: String,
    /// The participant who is not `first_player_id`.
    pub opponent_id: String,
    pub first_player_id: String,
}

impl Match {
    /// Same match addressed to `opponent_id`.
    pub fn with_opponent(mut self, opponent_id: &str) -> Self {
        self.opponent_id = opponent_id.to_string();
        self
    }

    /// True iff the participants are exactly `{a, b}`, in either order.
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        let first = self.first_player_id.as_str();
        let second = self.opponent_id.as_str();
        (first == a && second == b) || (first == b && second == a)
    }

    /// True once any piece has been placed.
    pub fn has_moves(&self) -> bool {
        !self.last_mover_id.is_empty() || !is_empty(&self.board)
    }

    /// Raw cell values, row-major.
    pub fn cells(&self) -> [i8; BOARD_CELLS] {
        self.board.map(Cell::value)
    }
}

/// Remaining pieces per rank for one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceSupply {
    pub mouse: u8,
    pub cat: u8,
    pub dog: u8,
}

impl PieceSupply {
    pub const FULL: PieceSupply = PieceSupply {
        mouse: PIECES_PER_RANK,
        cat: PIECES_PER_RANK,
        dog: PIECES_PER_RANK,
    };

    pub fn remaining(&self, rank: Rank) -> u8 {
        match rank {
            Rank::Mouse => self.mouse,
            Rank::Cat => self.cat,
            Rank::Dog => self.dog,
        }
    }

    fn slot_mut(&mut self, rank: Rank) -> &mut u8 {
        match rank {
            Rank::Mouse => &mut self.mouse,
            Rank::Cat => &mut self.cat,
            Rank::Dog => &mut self.dog,
        }
    }
}

/// Derived match status. Whose turn it is inside `InProgress` is derived
/// separately by `is_turn_of`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MatchStatus {
    Empty,
    InProgress,
    Won { winner: Role },
}

// ---------------------------------------------------------------------------
// Derivations
// ---------------------------------------------------------------------------

/// A fresh match with `self_id` provisionally in the first role.
pub fn empty_match(self_id: &str) -> Match {
    Match {
        id: 0,
        board: [Cell::EMPTY; BOARD_CELLS],
        last_mover_id: String::new(),
        opponent_id: String::new(),
        first_player_id: self_id.to_string(),
    }
}

pub fn role(game: &Match, player_id: &str) -> Role {
    if player_id == game.first_player_id {
        Role::First
    } else {
        Role::Second
    }
}

/// Pieces of `rank` that `role` currently has on the board.
pub fn placed_count(board: &Board, role: Role, rank: Rank) -> u8 {
    board
        .iter()
        .filter(|cell| cell.owner() == Some(role) && cell.rank() == Some(rank))
        .count() as u8
}

/// Remaining supply for `role`. Saturates at 0 on an inconsistent board.
pub fn piece_supply(game: &Match, role: Role) -> PieceSupply {
    let mut supply = PieceSupply::FULL;
    for cell in &game.board {
        if cell.owner() == Some(role)
            && let Some(rank) = cell.rank()
        {
            let slot = supply.slot_mut(rank);
            *slot = slot.saturating_sub(1);
        }
    }
    supply
}

/// Ranks that may be placed on `cell`: still in supply and strictly above
/// the occupying rank. Ascending.
pub fn allowed_ranks(cell: Cell, supply: &PieceSupply) -> Vec<Rank> {
    Rank::ALL
        .into_iter()
        .filter(|&rank| supply.remaining(rank) > 0 && rank.value() > cell.level())
        .collect()
}

/// First line whose three cells are occupied by the same owner.
pub fn winning_line(board: &Board) -> Option<[usize; 3]> {
    LINES.into_iter().find(|&[a, b, c]| {
        let owner = board[a].owner();
        owner.is_some() && owner == board[b].owner() && owner == board[c].owner()
    })
}

pub fn evaluate_winner(board: &Board) -> Option<Role> {
    winning_line(board).and_then(|[a, _, _]| board[a].owner())
}

pub fn is_empty(board: &Board) -> bool {
    board.iter().all(|cell| cell.is_empty())
}

/// A player may move unless they made the most recent move.
pub fn is_turn_of(game: &Match, player_id: &str) -> bool {
    game.last_mover_id != player_id
}

pub fn status(game: &Match) -> MatchStatus {
    if let Some(winner) = evaluate_winner(&game.board) {
        MatchStatus::Won { winner }
    } else if is_empty(&game.board) {
        MatchStatus::Empty
    } else {
        MatchStatus::InProgress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(values: [i8; BOARD_CELLS]) -> Board {
        let mut board = [Cell::EMPTY; BOARD_CELLS];
        for (i, v) in values.into_iter().enumerate() {
            board[i] = Cell::from_wire(i, v as i64).unwrap();
        }
        board
    }

    #[test]
    fn empty_match_is_empty_and_owned_by_creator() {
        let game = empty_match("alice");
        assert!(is_empty(&game.board));
        assert!(!game.has_moves());
        assert_eq!(game.first_player_id, "alice");
        assert_eq!(game.last_mover_id, "");
        assert_eq!(role(&game, "alice"), Role::First);
        assert_eq!(role(&game, "bob"), Role::Second);
        assert_eq!(status(&game), MatchStatus::Empty);
    }

    #[test]
    fn winner_detected_on_every_line() {
        for line in LINES {
            for (role, value) in [(Role::First, 1), (Role::Second, -2)] {
                let mut values = [0; BOARD_CELLS];
                for i in line {
                    values[i] = value;
                }
                let b = board(values);
                assert_eq!(evaluate_winner(&b), Some(role), "line {line:?}");
                assert_eq!(winning_line(&b), Some(line));
            }
        }
    }

    #[test]
    fn mixed_ranks_of_one_owner_still_win() {
        let b = board([1, 3, 2, 0, -3, 0, 0, 0, -1]);
        assert_eq!(evaluate_winner(&b), Some(Role::First));
    }

    #[test]
    fn mixed_owners_or_gaps_do_not_win() {
        assert_eq!(evaluate_winner(&board([1, -1, 1, 0, 0, 0, 0, 0, 0])), None);
        assert_eq!(evaluate_winner(&board([1, 1, 0, 0, 0, 0, 0, 0, 0])), None);
        assert_eq!(evaluate_winner(&board([0; BOARD_CELLS])), None);
        assert_eq!(
            evaluate_winner(&board([1, -1, 1, 1, -1, -1, -1, 1, 1])),
            None
        );
    }

    #[test]
    fn first_line_in_order_is_reported() {
        // Top row and left column both belong to the first player.
        let b = board([1, 1, 1, 2, 0, 0, 3, 0, 0]);
        assert_eq!(winning_line(&b), Some([0, 1, 2]));
    }

    #[test]
    fn supply_counts_only_own_pieces() {
        let mut game = empty_match("alice");
        game.board = board([3, -3, 2, 0, 3, 0, -1, 0, 0]);
        assert_eq!(
            piece_supply(&game, Role::First),
            PieceSupply {
                mouse: 3,
                cat: 2,
                dog: 1
            }
        );
        assert_eq!(
            piece_supply(&game, Role::Second),
            PieceSupply {
                mouse: 2,
                cat: 3,
                dog: 2
            }
        );
    }

    #[test]
    fn supply_floors_at_zero_on_inconsistent_board() {
        let mut game = empty_match("alice");
        game.board = board([3, 3, 3, 3, 0, 0, 0, 0, 0]);
        assert_eq!(piece_supply(&game, Role::First).dog, 0);
        assert_eq!(placed_count(&game.board, Role::First, Rank::Dog), 4);
    }

    #[test]
    fn allowed_ranks_follow_capture_rule() {
        let full = PieceSupply::FULL;
        assert_eq!(allowed_ranks(Cell::EMPTY, &full), Rank::ALL.to_vec());
        assert_eq!(
            allowed_ranks(Cell::placed(Role::Second, Rank::Mouse), &full),
            vec![Rank::Cat, Rank::Dog]
        );
        assert_eq!(
            allowed_ranks(Cell::placed(Role::First, Rank::Cat), &full),
            vec![Rank::Dog]
        );
        assert!(allowed_ranks(Cell::placed(Role::Second, Rank::Dog), &full).is_empty());

        let no_dogs = PieceSupply { dog: 0, ..full };
        assert_eq!(
            allowed_ranks(Cell::placed(Role::First, Rank::Mouse), &no_dogs),
            vec![Rank::Cat]
        );
    }

    #[test]
    fn placement_allowed_iff_strictly_higher() {
        for occupant in Rank::ALL {
            for owner in [Role::First, Role::Second] {
                let cell = Cell::placed(owner, occupant);
                for rank in Rank::ALL {
                    let allowed = allowed_ranks(cell, &PieceSupply::FULL).contains(&rank);
                    assert_eq!(allowed, rank > occupant, "{rank} on {occupant}");
                }
            }
        }
    }

    #[test]
    fn cell_accessors() {
        let cell = Cell::placed(Role::Second, Rank::Cat);
        assert_eq!(cell.value(), -2);
        assert_eq!(cell.owner(), Some(Role::Second));
        assert_eq!(cell.rank(), Some(Rank::Cat));
        assert_eq!(Cell::EMPTY.rank(), None);
        assert_eq!(Cell::EMPTY.owner(), None);
        assert!(Cell::from_wire(2, 4).is_err());
        assert!(Cell::from_wire(2, -4).is_err());
    }

    #[test]
    fn turn_is_derived_from_last_mover() {
        let mut game = empty_match("alice").with_opponent("bob");
        assert!(is_turn_of(&game, "alice"));
        assert!(is_turn_of(&game, "bob"));
        game.last_mover_id = "alice".into();
        assert!(!is_turn_of(&game, "alice"));
        assert!(is_turn_of(&game, "bob"));
    }

    #[test]
    fn is_between_ignores_order() {
        let game = empty_match("alice").with_opponent("bob");
        assert!(game.is_between("alice", "bob"));
        assert!(game.is_between("bob", "alice"));
        assert!(!game.is_between("alice", "carol"));
        assert!(!empty_match("alice").is_between("alice", "bob"));
    }

    #[test]
    fn rank_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&Rank::Cat).unwrap(), "2");
        assert_eq!(serde_json::from_str::<Rank>("3").unwrap(), Rank::Dog);
        assert!(serde_json::from_str::<Rank>("4").is_err());
    }
}
