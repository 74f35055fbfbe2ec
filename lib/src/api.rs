//! Wire record for the external match store and push hub, plus the REST
//! request/response types of the local control API.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::game_state::{BOARD_CELLS, Cell, Match, Rank, Role, placed_count};
use crate::{ActorStatus, MatchError, MatchStatus, PIECES_PER_RANK};

// ---------------------------------------------------------------------------
// MatchRecord: external store / hub layout
// ---------------------------------------------------------------------------

/// A match as stored by the chat backend: nine flat cell fields and the
/// participant ids. Accepts both camelCase and the PascalCase keys older
/// backends emit; `null` strings decode as empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: u64,
    pub cell1: i64,
    pub cell2: i64,
    pub cell3: i64,
    pub cell4: i64,
    pub cell5: i64,
    pub cell6: i64,
    pub cell7: i64,
    pub cell8: i64,
    pub cell9: i64,
    /// Last mover.
    #[serde(default, alias = "SenderId", deserialize_with = "null_as_default")]
    pub sender_id: String,
    /// The participant who is not the first player.
    #[serde(default, alias = "ReceiverId", deserialize_with = "null_as_default")]
    pub receiver_id: String,
    #[serde(default, alias = "redId", deserialize_with = "null_as_default")]
    pub first_player_id: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl MatchRecord {
    pub fn cells(&self) -> [i64; BOARD_CELLS] {
        [
            self.cell1, self.cell2, self.cell3, self.cell4, self.cell5, self.cell6, self.cell7,
            self.cell8, self.cell9,
        ]
    }
}

impl TryFrom<MatchRecord> for Match {
    type Error = MatchError;

    fn try_from(record: MatchRecord) -> Result<Self, Self::Error> {
        let mut board = [Cell::EMPTY; BOARD_CELLS];
        for (index, value) in record.cells().into_iter().enumerate() {
            board[index] = Cell::from_wire(index, value)?;
        }

        for role in [Role::First, Role::Second] {
            for rank in Rank::ALL {
                let count = placed_count(&board, role, rank);
                if count > PIECES_PER_RANK {
                    return Err(MatchError::SupplyOverdrawn { role, rank, count });
                }
            }
        }

        if record.first_player_id.is_empty() {
            return Err(MatchError::MissingFirstPlayer);
        }
        if record.first_player_id == record.receiver_id {
            return Err(MatchError::SamePlayers(record.receiver_id));
        }
        if !record.sender_id.is_empty()
            && record.sender_id != record.first_player_id
            && record.sender_id != record.receiver_id
        {
            return Err(MatchError::UnknownMover(record.sender_id));
        }

        Ok(Match {
            id: record.id,
            board,
            last_mover_id: record.sender_id,
            opponent_id: record.receiver_id,
            first_player_id: record.first_player_id,
        })
    }
}

impl From<Match> for MatchRecord {
    fn from(game: Match) -> Self {
        let [cell1, cell2, cell3, cell4, cell5, cell6, cell7, cell8, cell9] =
            game.cells().map(i64::from);
        MatchRecord {
            id: game.id,
            cell1,
            cell2,
            cell3,
            cell4,
            cell5,
            cell6,
            cell7,
            cell8,
            cell9,
            sender_id: game.last_mover_id,
            receiver_id: game.opponent_id,
            first_player_id: game.first_player_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Local control API
// ---------------------------------------------------------------------------

/// GET /api/status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub actors: HashMap<String, ActorStatusResponse>,
    #[serde(default)]
    pub match_status: Option<MatchStatus>,
}

/// Per-actor status within the status response. Also the cached per-actor
/// state in the web layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorStatusResponse {
    #[serde(default)]
    pub name: String,
    pub status: ActorStatus,
    #[serde(default)]
    pub telemetry: HashMap<String, String>,
}

/// POST /api/move request body.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MoveRequest {
    pub cell: usize,
    pub rank: Rank,
}

/// POST /api/hover request body. `cell: null` clears the hover.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HoverRequest {
    #[serde(default)]
    pub cell: Option<usize>,
}

/// POST /api/move and POST /api/restart response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game: Option<Match>,
}
