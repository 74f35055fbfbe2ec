//! Axum web server: REST control endpoints + WebSocket event streaming.

pub mod routes;
pub mod ws;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use tokio::sync::{RwLock, broadcast};
use tower_http::cors::CorsLayer;

use crate::actors::{Actor, actor_names};
use crate::bus::{BusReceiver, BusSender};
use crate::state::SystemState;
use tictacdog::{ActorState, ActorStatus, ActorStatusResponse, TicTacDogEvent, TicTacDogMessage};

fn new_actor(name: String) -> ActorStatusResponse {
    ActorStatusResponse {
        name,
        status: ActorStatus::Disconnected,
        telemetry: HashMap::new(),
    }
}

/// Shared state for the web layer.
pub struct WebState {
    pub root: Arc<SystemState>,
    pub bus_tx: broadcast::Sender<TicTacDogMessage>,
    pub actors: RwLock<HashMap<String, ActorStatusResponse>>,
    pub addr: SocketAddr,
    pub actor_id: String,
    /// How long a command waits for the game actor's reply.
    pub reply_timeout: Duration,
    pub ws_count: AtomicU64,
    pub request_count: AtomicU64,
}

/// Emit current telemetry as an ActorStatus event on the bus.
fn emit_status(
    status: ActorStatus,
    state: &WebState,
    bus_tx: &broadcast::Sender<TicTacDogMessage>,
) {
    let mut telemetry = HashMap::from([
        ("bind".into(), state.addr.to_string()),
        (
            "websockets".into(),
            state.ws_count.load(Ordering::Relaxed).to_string(),
        ),
        (
            "requests".into(),
            state.request_count.load(Ordering::Relaxed).to_string(),
        ),
    ]);
    if status == ActorStatus::Disconnected {
        telemetry.insert("error".into(), "bind failed".into());
    }
    let _ = bus_tx
        .send(TicTacDogMessage::new(ActorState::new(status, telemetry)).source(&state.actor_id));
}

pub(super) fn emit_telemetry(state: &WebState, bus_tx: &broadcast::Sender<TicTacDogMessage>) {
    emit_status(ActorStatus::Connected, state, bus_tx);
}

// ---------------------------------------------------------------------------
// WebActor
// ---------------------------------------------------------------------------

/// Web server actor. Spawns a dedicated thread with its own tokio runtime
/// to run the axum server and the state updater task.
pub struct WebActor {
    addr: SocketAddr,
    reply_timeout: Duration,
    shutdown_tx: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
}

impl WebActor {
    pub fn new(addr: SocketAddr, reply_timeout: Duration) -> Self {
        Self {
            addr,
            reply_timeout,
            shutdown_tx: Mutex::new(None),
        }
    }
}

impl Actor for WebActor {
    fn start(&self, state: Arc<SystemState>, sender: BusSender, _receiver: BusReceiver) {
        let addr = self.addr;
        let reply_timeout = self.reply_timeout;
        let actor_id = sender.actor_id().to_string();
        let bus_tx = sender.raw_sender().clone();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        *self.shutdown_tx.lock().unwrap_or_else(|e| e.into_inner()) = Some(shutdown_tx);

        let thread_name = actor_id.clone();
        let spawned = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || match tokio::runtime::Runtime::new() {
                Ok(rt) => rt.block_on(run(
                    addr,
                    reply_timeout,
                    actor_id,
                    state,
                    bus_tx,
                    shutdown_rx,
                )),
                Err(e) => tracing::error!("web server: failed to create runtime: {e}"),
            });
        if let Err(e) = spawned {
            tracing::error!("failed to spawn webserver thread: {e}");
        }
    }

    fn stop(&self) {
        if let Some(tx) = self
            .shutdown_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            let _ = tx.send(());
        }
    }
}

// ---------------------------------------------------------------------------
// Web server run loop
// ---------------------------------------------------------------------------

pub(crate) fn router(state: Arc<WebState>) -> Router {
    // Request counter middleware
    let counter_state = Arc::clone(&state);
    let count_middleware = axum::middleware::from_fn(move |req, next: axum::middleware::Next| {
        let st = Arc::clone(&counter_state);
        async move {
            st.request_count.fetch_add(1, Ordering::Relaxed);
            next.run(req).await
        }
    });

    Router::new()
        .route("/api/status", get(routes::get_status))
        .route("/api/match", get(routes::get_match))
        .route("/api/move", post(routes::post_move))
        .route("/api/restart", post(routes::post_restart))
        .route("/api/reload", post(routes::post_reload))
        .route("/api/hover", post(routes::post_hover))
        .route("/api/ws", get(ws::ws_upgrade))
        .layer(count_middleware)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the web server. Blocks until shutdown signal.
async fn run(
    addr: SocketAddr,
    reply_timeout: Duration,
    actor_id: String,
    root: Arc<SystemState>,
    bus_tx: broadcast::Sender<TicTacDogMessage>,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) {
    // Pre-populate per-actor state from config
    let names = actor_names(&root.system.snapshot());
    let actors = names
        .into_iter()
        .map(|(id, name)| (id, new_actor(name)))
        .collect();

    let state = Arc::new(WebState {
        root,
        bus_tx: bus_tx.clone(),
        actors: RwLock::new(actors),
        addr,
        actor_id,
        reply_timeout,
        ws_count: AtomicU64::new(0),
        request_count: AtomicU64::new(0),
    });

    // Background task: subscribe to bus and update web state
    tokio::spawn(state_updater(Arc::clone(&state), bus_tx.subscribe()));

    // Periodic telemetry emitter (every 5s)
    let telemetry_state = Arc::clone(&state);
    let telemetry_bus = bus_tx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(5));
        loop {
            interval.tick().await;
            emit_telemetry(&telemetry_state, &telemetry_bus);
        }
    });

    let app = router(Arc::clone(&state));

    // Retry bind until success or shutdown
    let mut shutdown_rx = shutdown_rx;
    let listener = loop {
        match tokio::net::TcpListener::bind(addr).await {
            Ok(l) => break l,
            Err(e) => {
                tracing::warn!("web server: failed to bind {addr}: {e}, retrying in 3s");
                emit_status(ActorStatus::Disconnected, &state, &bus_tx);
                tokio::select! {
                    _ = tokio::time::sleep(std::time::Duration::from_secs(3)) => continue,
                    _ = &mut shutdown_rx => return,
                }
            }
        }
    };

    tracing::info!("web server listening on {addr}");
    emit_status(ActorStatus::Connected, &state, &bus_tx);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async { drop(shutdown_rx.await) })
        .await
    {
        tracing::warn!("web server: {e}");
    }
}

/// Background task that subscribes to the bus and keeps WebState current.
async fn state_updater(state: Arc<WebState>, mut bus_rx: broadcast::Receiver<TicTacDogMessage>) {
    loop {
        match bus_rx.recv().await {
            Ok(msg) => apply_bus_event(&state, &msg).await,
            Err(broadcast::error::RecvError::Closed) => break,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("web state updater: lagged, dropped {n} events");
            }
        }
    }
}

async fn apply_bus_event(state: &WebState, msg: &TicTacDogMessage) {
    if let TicTacDogEvent::ActorStatus(update) = &msg.event {
        let mut actors = state.actors.write().await;
        let actor = actors
            .entry(msg.source.clone())
            .or_insert_with(|| new_actor(String::new()));
        actor.status = update.status;
        actor.telemetry = update.telemetry.clone();
    }
}
