//! REST endpoint handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use tokio::sync::broadcast;

use super::WebState;
use tictacdog::{
    CommandResponse, GameAction, GameCommand, GameResult, HoverRequest, MatchView, MoveRequest,
    StatusResponse, TicTacDogEvent, TicTacDogMessage,
};

/// Slack on top of the store calls a command may wait behind.
const REPLY_MARGIN: Duration = Duration::from_secs(5);

/// How long a command waits for the game actor's `GameOutcome` when one
/// store call may take `store_timeout`. Covers the command's own call plus
/// one already in flight, so a store timeout reaches the caller as a
/// failure instead of a reply timeout.
pub(crate) fn reply_timeout(store_timeout: Duration) -> Duration {
    store_timeout * 2 + REPLY_MARGIN
}

/// GET /api/status
pub async fn get_status(State(state): State<Arc<WebState>>) -> Json<StatusResponse> {
    let actors = state.actors.read().await.clone();
    let match_status = state.root.game.snapshot().map(|view| view.status);
    Json(StatusResponse {
        actors,
        match_status,
    })
}

/// GET /api/match. 503 until the game actor has published a view.
pub async fn get_match(
    State(state): State<Arc<WebState>>,
) -> Result<Json<MatchView>, StatusCode> {
    state
        .root
        .game
        .snapshot()
        .map(Json)
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)
}

/// POST /api/move
pub async fn post_move(
    State(state): State<Arc<WebState>>,
    Json(body): Json<MoveRequest>,
) -> (StatusCode, Json<CommandResponse>) {
    let action = GameAction::PlaceMove {
        cell: body.cell,
        rank: body.rank,
    };
    command_response(request_reply(&state, action, state.reply_timeout).await)
}

/// POST /api/restart
pub async fn post_restart(
    State(state): State<Arc<WebState>>,
) -> (StatusCode, Json<CommandResponse>) {
    command_response(request_reply(&state, GameAction::Restart, state.reply_timeout).await)
}

/// POST /api/reload: re-fetch the stored match.
pub async fn post_reload(
    State(state): State<Arc<WebState>>,
) -> (StatusCode, Json<CommandResponse>) {
    command_response(request_reply(&state, GameAction::Reload, state.reply_timeout).await)
}

/// POST /api/hover. Fire-and-forget; the new view arrives on the WebSocket.
pub async fn post_hover(
    State(state): State<Arc<WebState>>,
    Json(body): Json<HoverRequest>,
) -> StatusCode {
    let _ = state.bus_tx.send(
        TicTacDogMessage::new(GameAction::Hover { cell: body.cell }).source(&state.actor_id),
    );
    StatusCode::ACCEPTED
}

// ---------------------------------------------------------------------------
// Request-reply over the bus
// ---------------------------------------------------------------------------

/// Emit a `GameCommand` and wait for the `GameOutcome` carrying the same
/// request id. `None` if the game actor did not answer in time.
async fn request_reply(
    state: &WebState,
    action: GameAction,
    timeout: Duration,
) -> Option<GameResult> {
    let request_id = crate::state::config::generate_id();
    // Subscribe before sending so the reply cannot be missed.
    let mut bus_rx = state.bus_tx.subscribe();

    let sent = state.bus_tx.send(
        TicTacDogMessage::new(GameCommand {
            request_id: Some(request_id.clone()),
            action,
        })
        .source(&state.actor_id),
    );
    if sent.is_err() {
        return None;
    }

    let reply = tokio::time::timeout(timeout, async {
        loop {
            match bus_rx.recv().await {
                Ok(msg) => {
                    if let TicTacDogEvent::GameOutcome(outcome) = msg.event
                        && outcome.request_id == request_id
                    {
                        return Some(outcome.result);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
            }
        }
    })
    .await;

    match reply {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("game command {request_id}: timed out waiting for GameOutcome");
            None
        }
    }
}

fn command_response(result: Option<GameResult>) -> (StatusCode, Json<CommandResponse>) {
    let (status, response) = match result {
        Some(GameResult::Applied { game }) => (
            StatusCode::OK,
            CommandResponse {
                applied: true,
                reason: None,
                game: Some(game),
            },
        ),
        Some(GameResult::Rejected { reason }) => (
            StatusCode::CONFLICT,
            CommandResponse {
                applied: false,
                reason: Some(reason),
                game: None,
            },
        ),
        Some(GameResult::Failed { error }) => (
            StatusCode::BAD_GATEWAY,
            CommandResponse {
                applied: false,
                reason: Some(error),
                game: None,
            },
        ),
        None => (
            StatusCode::GATEWAY_TIMEOUT,
            CommandResponse {
                applied: false,
                reason: Some("game actor did not respond".into()),
                game: None,
            },
        ),
    };
    (status, Json(response))
}
