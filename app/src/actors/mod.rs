//! Actor infrastructure: shared trait, actor resolution and startup.

pub mod game;
pub mod hub;
pub mod web;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::bus::{BusReceiver, BusSender};
use crate::state::SystemState;
use crate::state::config::{TicTacDogConfig, global_id};
use tictacdog::TicTacDogMessage;

// ---------------------------------------------------------------------------
// Actor trait
// ---------------------------------------------------------------------------

/// Common trait for self-managed actors. Each actor struct holds its own
/// config; `start()` clones what it needs and spawns a thread.
pub trait Actor: Send + Sync {
    /// Spawn the actor's run loop.
    fn start(&self, state: Arc<SystemState>, sender: BusSender, receiver: BusReceiver);

    /// Request the actor to stop. Default: no-op (actors check the shutdown
    /// flag via `BusReceiver::is_shutdown()`).
    fn stop(&self) {}
}

// ---------------------------------------------------------------------------
// Actor resolution
// ---------------------------------------------------------------------------

/// A concrete actor ready to be started, resolved from config.
pub struct ResolvedActor {
    pub id: String,
    pub name: String,
    pub actor: Box<dyn Actor>,
}

/// Build the actor list from config, in start order: the game actor first
/// so it is subscribed before the hub can push anything.
///
/// Without both session ids there is no match to play and neither the game
/// nor the hub actor is started; the web server still comes up.
pub fn resolve_actors(config: &TicTacDogConfig) -> Vec<ResolvedActor> {
    let mut actors = Vec::new();
    let session = &config.session;

    if session.user_id.is_empty() || session.opponent_id.is_empty() {
        tracing::warn!("session: user_id and opponent_id are required to play, game disabled");
    } else if session.user_id == session.opponent_id {
        tracing::warn!("session: cannot play against yourself ('{}')", session.user_id);
    } else {
        actors.push(ResolvedActor {
            id: global_id("game", "0"),
            name: format!("{} vs {}", session.user_id, session.opponent_id),
            actor: Box::new(game::GameActor::new(
                session.user_id.clone(),
                session.opponent_id.clone(),
                config.api.clone(),
                session.token.clone(),
            )),
        });

        if let Some(hub) = &config.hub {
            let id = global_id("hub", "0");
            match hub::proto::hub_url(&hub.url, &session.user_id, session.token.as_deref()) {
                Ok(url) => actors.push(ResolvedActor {
                    id,
                    name: "Push Hub".into(),
                    actor: Box::new(hub::HubActor {
                        url,
                        keepalive: Duration::from_secs(hub.keepalive_secs.max(1)),
                    }),
                }),
                Err(e) => tracing::warn!("hub '{id}': {e}"),
            }
        }
    }

    for (index, ws) in &config.webserver {
        let id = global_id("webserver", index);
        match ws.bind.parse::<SocketAddr>() {
            Ok(addr) => {
                actors.push(ResolvedActor {
                    id,
                    name: ws.name.clone(),
                    actor: Box::new(web::WebActor::new(
                        addr,
                        web::routes::reply_timeout(config.api.timeout()),
                    )),
                });
            }
            Err(e) => {
                tracing::warn!("webserver '{id}': invalid bind address '{}': {e}", ws.bind);
            }
        }
    }

    actors
}

/// Start a resolved actor: create bus wrappers, call start(), register in state.
pub fn start_actor(
    id: String,
    actor: Box<dyn Actor>,
    state: &Arc<SystemState>,
    bus_tx: &broadcast::Sender<TicTacDogMessage>,
) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let sender = BusSender::new(id.clone(), bus_tx.clone(), Arc::clone(&shutdown));
    let receiver = sender.subscribe();
    actor.start(Arc::clone(state), sender, receiver);
    state.register_actor(id, actor, shutdown);
}

/// Actor IDs mapped to display names (for the status API).
pub fn actor_names(config: &TicTacDogConfig) -> HashMap<String, String> {
    resolve_actors(config)
        .into_iter()
        .map(|ra| (ra.id, ra.name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tictacdog::HubSection;

    fn config(user: &str, opponent: &str) -> TicTacDogConfig {
        let mut config = TicTacDogConfig::default();
        config.session.user_id = user.into();
        config.session.opponent_id = opponent.into();
        config
    }

    fn ids(config: &TicTacDogConfig) -> Vec<String> {
        resolve_actors(config).into_iter().map(|ra| ra.id).collect()
    }

    #[test]
    fn full_session_starts_game_hub_and_web() {
        assert_eq!(ids(&config("alice", "bob")), ["game.0", "hub.0", "webserver.0"]);
        assert_eq!(actor_names(&config("alice", "bob"))["game.0"], "alice vs bob");
    }

    #[test]
    fn missing_or_equal_ids_disable_the_game() {
        assert_eq!(ids(&config("", "bob")), ["webserver.0"]);
        assert_eq!(ids(&config("alice", "")), ["webserver.0"]);
        assert_eq!(ids(&config("alice", "alice")), ["webserver.0"]);
    }

    #[test]
    fn bad_addresses_are_skipped() {
        let mut config = config("alice", "bob");
        config.hub = Some(HubSection {
            url: "ftp://nowhere".into(),
            keepalive_secs: 15,
        });
        config.webserver.get_mut("0").unwrap().bind = "localhost".into();
        assert_eq!(ids(&config), ["game.0"]);

        config.hub = Some(HubSection {
            url: "https://chat.example/chatHub".into(),
            keepalive_secs: 15,
        });
        assert_eq!(ids(&config), ["game.0"]);

        config.hub = None;
        assert_eq!(ids(&config), ["game.0"]);
    }
}
