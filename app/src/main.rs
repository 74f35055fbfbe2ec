use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

mod actors;
mod bus;
mod state;
mod store;

use state::SystemState;
use tictacdog::TicTacDogMessage;

#[derive(Parser, Debug, Clone)]
#[command(name = "tictacdog", about = "Two-player rank-capture tic-tac-toe over a chat backend")]
struct Config {
    /// Config file path (default: ~/.config/tictacdog/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Play as this user id (overrides `[session] user_id`)
    #[arg(long)]
    user: Option<String>,

    /// Play against this user id (overrides `[session] opponent_id`)
    #[arg(long)]
    opponent: Option<String>,

    /// Bearer token for the game API and push hub (overrides `[session] token`)
    #[arg(long)]
    token: Option<String>,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new("tictacdog=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::debug!("debug logging enabled");

    let cli = Config::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(state::config::default_config_path);

    let rt = tokio::runtime::Runtime::new()?;
    let _guard = rt.enter();

    // Single unified bus
    let (bus_tx, _) = broadcast::channel::<TicTacDogMessage>(1024);

    // Build shared state root (loads or creates the config file)
    let state = Arc::new(SystemState::new(config_path));

    // Command-line session overrides apply to this run only
    if cli.user.is_some() || cli.opponent.is_some() || cli.token.is_some() {
        state.system.override_session(|session| {
            if let Some(user) = cli.user {
                session.user_id = user;
            }
            if let Some(opponent) = cli.opponent {
                session.opponent_id = opponent;
            }
            if let Some(token) = cli.token {
                session.token = Some(token);
            }
        });
    }

    // Start all actors from config (game, push hub, webserver)
    let snap = state.system.snapshot();
    for ra in actors::resolve_actors(&snap) {
        tracing::info!("starting actor '{}' ({})", ra.id, ra.name);
        actors::start_actor(ra.id, ra.actor, &state, &bus_tx);
    }

    // Drain bus (keeps broadcast channel healthy when no other subscriber)
    let mut drain_rx = bus_tx.subscribe();
    let drain_handle = tokio::spawn(async move {
        loop {
            match drain_rx.recv().await {
                Ok(_) => {}
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("drain subscriber lagged, dropped {n} events");
                }
            }
        }
    });

    rt.block_on(async { tokio::signal::ctrl_c().await })?;

    // Shutdown: stop all actors via registry
    tracing::info!("shutting down...");
    for id in state.actor_ids() {
        state.stop_actor(&id);
    }
    // Drop bus_tx closes the broadcast channel as secondary signal
    drop(bus_tx);
    drain_handle.abort();

    Ok(())
}
