//! WebSocket handler: init handshake + unified bus event streaming.
//!
//! Protocol:
//!   1. Client sends:  `{ "type": "start", "name": "Board" }`
//!   2. Server sends:  `{ "type": "init", "source_id": "ws.abc123", "view": { ... } }`
//!   3. Server streams `TicTacDogMessage` events; the client may send
//!      commands such as `{ "cmd": "move", "cell": 4, "rank": 2 }`.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use super::{WebState, emit_telemetry};
use crate::state::config;
use tictacdog::{GameAction, Rank, TicTacDogMessage};

/// GET /api/ws: upgrade to WebSocket.
pub async fn ws_upgrade(
    State(state): State<Arc<WebState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(socket: WebSocket, state: Arc<WebState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Phase 1: Wait for "start" message from client
    let client_name = loop {
        match ws_rx.next().await {
            Some(Ok(Message::Text(text))) => {
                if let Some(name) = parse_start_message(&text) {
                    break name;
                }
            }
            Some(Ok(Message::Close(_))) | None => return,
            _ => continue,
        }
    };

    // Phase 2: Send "init" with source_id and the current view
    let source_id = format!("ws.{}", config::generate_id());
    state.ws_count.fetch_add(1, Ordering::Relaxed);
    emit_telemetry(&state, &state.bus_tx);
    tracing::info!("ws: client '{client_name}' connected (source_id={source_id})");

    let init_msg = serde_json::json!({
        "type": "init",
        "source_id": source_id,
        "view": state.root.game.snapshot(),
    });
    if ws_tx
        .send(Message::text(init_msg.to_string()))
        .await
        .is_err()
    {
        state.ws_count.fetch_sub(1, Ordering::Relaxed);
        return;
    }

    // Phase 3: Stream bus events + receive commands
    let mut bus_rx = state.bus_tx.subscribe();

    let mut send_task = tokio::spawn(async move {
        loop {
            match bus_rx.recv().await {
                Ok(msg) => {
                    if let Ok(json) = serde_json::to_string(&msg)
                        && ws_tx.send(Message::text(json)).await.is_err()
                    {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("ws: lagged {n}");
                }
            }
        }
    });

    let ws_source = source_id.clone();
    let bus_tx = state.bus_tx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => match parse_command(&text) {
                    Some(action) => {
                        let _ =
                            bus_tx.send(TicTacDogMessage::new(action).source(ws_source.as_str()));
                    }
                    None => tracing::debug!("ws: ignoring '{}' from {ws_source}", text.as_str()),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.ws_count.fetch_sub(1, Ordering::Relaxed);
    emit_telemetry(&state, &state.bus_tx);
    tracing::info!("ws: client '{client_name}' disconnected (source_id={source_id})");
}

/// Parse a "start" handshake message. Returns the client name if valid.
fn parse_start_message(text: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct StartMsg {
        #[serde(rename = "type")]
        msg_type: String,
        #[serde(default)]
        name: String,
    }
    let msg: StartMsg = serde_json::from_str(text).ok()?;
    if msg.msg_type == "start" {
        Some(if msg.name.is_empty() {
            "anonymous".to_string()
        } else {
            msg.name
        })
    } else {
        None
    }
}

/// Client command. Outcomes are not replied to directly; the client sees
/// the resulting `match_view` (or `alert`) on the stream.
#[derive(Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum WsCommand {
    Move {
        cell: usize,
        rank: Rank,
    },
    Restart,
    Hover {
        #[serde(default)]
        cell: Option<usize>,
    },
    Reload,
}

impl From<WsCommand> for GameAction {
    fn from(cmd: WsCommand) -> Self {
        match cmd {
            WsCommand::Move { cell, rank } => GameAction::PlaceMove { cell, rank },
            WsCommand::Restart => GameAction::Restart,
            WsCommand::Hover { cell } => GameAction::Hover { cell },
            WsCommand::Reload => GameAction::Reload,
        }
    }
}

fn parse_command(text: &str) -> Option<GameAction> {
    serde_json::from_str::<WsCommand>(text).ok().map(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_message_names_client() {
        assert_eq!(
            parse_start_message(r#"{"type":"start","name":"Board"}"#).as_deref(),
            Some("Board")
        );
        assert_eq!(
            parse_start_message(r#"{"type":"start"}"#).as_deref(),
            Some("anonymous")
        );
        assert_eq!(parse_start_message(r#"{"type":"move"}"#), None);
        assert_eq!(parse_start_message("hello"), None);
    }

    #[test]
    fn commands_map_to_game_actions() {
        assert!(matches!(
            parse_command(r#"{"cmd":"move","cell":4,"rank":2}"#),
            Some(GameAction::PlaceMove {
                cell: 4,
                rank: Rank::Cat
            })
        ));
        assert!(matches!(
            parse_command(r#"{"cmd":"restart"}"#),
            Some(GameAction::Restart)
        ));
        assert!(matches!(
            parse_command(r#"{"cmd":"hover","cell":null}"#),
            Some(GameAction::Hover { cell: None })
        ));
        assert!(matches!(
            parse_command(r#"{"cmd":"hover","cell":8}"#),
            Some(GameAction::Hover { cell: Some(8) })
        ));
        assert!(matches!(
            parse_command(r#"{"cmd":"reload"}"#),
            Some(GameAction::Reload)
        ));
    }

    #[test]
    fn bad_commands_are_ignored() {
        assert!(parse_command(r#"{"cmd":"move","cell":4,"rank":9}"#).is_none());
        assert!(parse_command(r#"{"cmd":"mode","mode":"putting"}"#).is_none());
        assert!(parse_command("not json").is_none());
    }
}
