//! Push hub subscription.
//!
//! Holds a SignalR JSON-protocol WebSocket to the chat backend and turns
//! every `ReceiveGame` invocation into a `MatchPushed` event on the bus.
//! Keeps the connection alive with pings and reconnects with exponential
//! backoff on failure.

pub(crate) mod proto;

use proto::*;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Url;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::Message;

use super::Actor;
use crate::bus::{BusReceiver, BusSender, PollError};
use crate::state::SystemState;
use tictacdog::{
    ActorState, ActorStatus, AlertLevel, AlertMessage, MatchPushed, TicTacDogMessage,
};

/// Hub-session error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum HubError {
    #[error("websocket error: {0}")]
    Socket(#[from] tungstenite::Error),
    #[error("handshake refused: {0}")]
    Handshake(String),
    #[error("hub closed the connection{}", .0.as_deref().map(|e| format!(": {e}")).unwrap_or_default())]
    Closed(Option<String>),
    #[error("shutdown")]
    Shutdown,
}

/// Push hub actor. Connects to `url` (already carrying the user id and
/// token) and pings every `keepalive`.
pub struct HubActor {
    pub url: Url,
    pub keepalive: Duration,
}

impl Actor for HubActor {
    fn start(&self, _state: Arc<SystemState>, sender: BusSender, receiver: BusReceiver) {
        let url = self.url.clone();
        let keepalive = self.keepalive;
        let thread_name = format!("hub:{}", sender.actor_id());

        if let Err(e) = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || run(url, keepalive, sender, receiver))
        {
            tracing::error!("failed to spawn hub thread: {e}");
        }
    }
}

/// Main subscription loop. Reconnects until shutdown.
fn run(url: Url, keepalive: Duration, sender: BusSender, mut receiver: BusReceiver) {
    let mut backoff = Duration::from_secs(1);
    let max_backoff = Duration::from_secs(30);

    loop {
        if receiver.is_shutdown() {
            tracing::info!("hub: shutting down");
            return;
        }
        let started = Instant::now();
        match connect_and_run(&url, keepalive, &sender, &mut receiver) {
            Ok(()) | Err(HubError::Shutdown) => {
                tracing::info!("hub: shutting down");
                return;
            }
            Err(e) => {
                // A session that stayed up for a while starts over at 1s.
                if started.elapsed() > max_backoff {
                    backoff = Duration::from_secs(1);
                }
                tracing::info!("hub: {e}, reconnecting in {backoff:?}");
                sender.send(TicTacDogMessage::new(AlertMessage {
                    level: AlertLevel::Error,
                    message: format!("Push hub connection failed: {e}"),
                }));
                sender.send(TicTacDogMessage::new(ActorState::new(
                    ActorStatus::Reconnecting,
                    telemetry(&url, 0),
                )));
                if sleep_unless_shutdown(backoff, &receiver) {
                    tracing::info!("hub: shutting down");
                    return;
                }
                backoff = (backoff * 2).min(max_backoff);
            }
        }
    }
}

/// Sleep in short slices. Returns true if shutdown was requested meanwhile.
fn sleep_unless_shutdown(duration: Duration, receiver: &BusReceiver) -> bool {
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        if receiver.is_shutdown() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    receiver.is_shutdown()
}

/// Telemetry shown in the status API. The token never leaves the process.
fn telemetry(url: &Url, pushes: u64) -> HashMap<String, String> {
    let mut shown = url.clone();
    shown.set_query(None);
    HashMap::from([
        ("url".into(), shown.to_string()),
        ("pushes".into(), pushes.to_string()),
    ])
}

fn connect_and_run(
    url: &Url,
    keepalive: Duration,
    sender: &BusSender,
    receiver: &mut BusReceiver,
) -> Result<(), HubError> {
    let (mut socket, _response) = tungstenite::connect(url.as_str())?;
    if let MaybeTlsStream::Plain(stream) = socket.get_ref() {
        stream
            .set_read_timeout(Some(Duration::from_millis(50)))
            .map_err(|e| HubError::Socket(e.into()))?;
    }
    socket.send(Message::text(handshake_request()))?;
    tracing::debug!("hub: handshake sent to {}", telemetry(url, 0)["url"]);

    let mut handshaken = false;
    let mut pushes = 0u64;
    let mut last_ping = Instant::now();

    loop {
        if receiver.is_shutdown() {
            let _ = socket.close(None);
            return Err(HubError::Shutdown);
        }

        // 1. Read whatever the hub sent
        match socket.read() {
            Ok(Message::Text(text)) => {
                for frame in parse_frames(text.as_str()) {
                    match frame {
                        Ok(HubFrame::Handshake(None)) if !handshaken => {
                            handshaken = true;
                            tracing::info!("hub: connected to {}", telemetry(url, 0)["url"]);
                            sender.send(TicTacDogMessage::new(ActorState::new(
                                ActorStatus::Connected,
                                telemetry(url, pushes),
                            )));
                        }
                        Ok(HubFrame::Handshake(Some(error))) => {
                            return Err(HubError::Handshake(error));
                        }
                        Ok(HubFrame::Handshake(None)) => {}
                        Ok(HubFrame::Game(game)) => {
                            pushes += 1;
                            tracing::info!(
                                "hub: match {} pushed (last mover '{}')",
                                game.id,
                                game.last_mover_id
                            );
                            sender.send(TicTacDogMessage::new(MatchPushed { game: *game }));
                            sender.send(TicTacDogMessage::new(ActorState::new(
                                ActorStatus::Connected,
                                telemetry(url, pushes),
                            )));
                        }
                        Ok(HubFrame::Ping) => tracing::trace!("hub: ping"),
                        Ok(HubFrame::Close(error)) => return Err(HubError::Closed(error)),
                        Ok(HubFrame::Other(what)) => tracing::debug!("hub: ignoring {what}"),
                        Err(e) => {
                            tracing::warn!("hub: dropping frame: {e}");
                            sender.send(TicTacDogMessage::new(AlertMessage {
                                level: AlertLevel::Warn,
                                message: format!("Ignored push update: {e}"),
                            }));
                        }
                    }
                }
            }
            Ok(Message::Close(_)) => return Err(HubError::Closed(None)),
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => return Err(e.into()),
        }

        // 2. Drain bus events. The hub only produces; this keeps the
        //    receiver from lagging and notices a closed bus.
        loop {
            match receiver.poll() {
                Err(PollError::Shutdown) => {
                    let _ = socket.close(None);
                    return Err(HubError::Shutdown);
                }
                Ok(None) => break,
                Ok(Some(_)) => {}
            }
        }

        // 3. Keepalive
        if handshaken && last_ping.elapsed() >= keepalive {
            last_ping = Instant::now();
            socket.send(Message::text(ping_frame()))?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telemetry_hides_credentials() {
        let url = hub_url("http://localhost:5266/chatHub", "alice", Some("secret")).unwrap();
        let shown = telemetry(&url, 4);
        assert_eq!(shown["url"], "ws://localhost:5266/chatHub");
        assert_eq!(shown["pushes"], "4");
    }

    #[test]
    fn close_error_message() {
        assert_eq!(
            HubError::Closed(Some("server restart".into())).to_string(),
            "hub closed the connection: server restart"
        );
        assert_eq!(
            HubError::Closed(None).to_string(),
            "hub closed the connection"
        );
    }
}
