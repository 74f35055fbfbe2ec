//! Game actor: owns the `GameController` for the configured pair of players.
//!
//! Runs the controller on its own thread with a single-threaded tokio
//! runtime, so all transitions for the match are sequential. Consumes
//! `MatchPushed` (from the hub) and `GameCommand` (from the web layer);
//! publishes a `MatchView` after every change, a `MatchCommitted` for every
//! stored match, and a `GameOutcome` for commands that carried a request id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use super::Actor;
use crate::bus::{BusReceiver, BusSender};
use crate::state::{MatchStateWriter, SystemState};
use crate::store::HttpMatchStore;
use tictacdog::{
    ActorState, ActorStatus, AlertLevel, AlertMessage, ApiSection, BOARD_CELLS, GameAction,
    GameController, GameOutcome, GameResult, IllegalMove, Match, MatchCommitted, MatchListener,
    MatchStore, MoveOutcome, StoreError, TicTacDogEvent, TicTacDogMessage,
};

pub struct GameActor {
    pub self_id: String,
    pub opponent_id: String,
    pub api: ApiSection,
    pub token: Option<String>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl GameActor {
    pub fn new(
        self_id: String,
        opponent_id: String,
        api: ApiSection,
        token: Option<String>,
    ) -> Self {
        Self {
            self_id,
            opponent_id,
            api,
            token,
            shutdown_tx: Mutex::new(None),
        }
    }
}

impl Actor for GameActor {
    fn start(&self, state: Arc<SystemState>, sender: BusSender, receiver: BusReceiver) {
        let Some(writer) = state.take_match_writer() else {
            tracing::error!("game actor: match state already has a writer, not starting");
            return;
        };
        let store = match HttpMatchStore::new(&self.api, self.token.clone()) {
            Ok(store) => store,
            Err(e) => {
                tracing::error!("game actor: invalid store config: {e}");
                sender.send(TicTacDogMessage::new(AlertMessage {
                    level: AlertLevel::Error,
                    message: format!("Match store unavailable: {e}"),
                }));
                return;
            }
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        *self.shutdown_tx.lock().unwrap_or_else(|e| e.into_inner()) = Some(shutdown_tx);

        let self_id = self.self_id.clone();
        let opponent_id = self.opponent_id.clone();
        let thread_name = sender.actor_id().to_string();
        let spawned = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        tracing::error!("game actor: failed to create runtime: {e}");
                        return;
                    }
                };
                let listener_tx = sender.clone();
                let listener = move |game: &Match| {
                    listener_tx.send(TicTacDogMessage::new(MatchCommitted { game: game.clone() }));
                };
                let controller = GameController::new(self_id, opponent_id, store, listener);
                rt.block_on(run(controller, writer, sender, receiver, shutdown_rx));
            });
        if let Err(e) = spawned {
            tracing::error!("failed to spawn game thread: {e}");
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
// Run loop
// ---------------------------------------------------------------------------

/// Process bus events until shutdown. A store call still in flight at
/// shutdown is dropped and its result ignored.
async fn run<S: MatchStore, L: MatchListener>(
    mut controller: GameController<S, L>,
    writer: MatchStateWriter,
    sender: BusSender,
    mut receiver: BusReceiver,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    sender.send(TicTacDogMessage::new(ActorState::new(
        ActorStatus::Starting,
        telemetry(&controller),
    )));

    let loaded = tokio::select! {
        loaded = controller.load() => loaded,
        _ = &mut shutdown_rx => return,
    };
    let status = match loaded {
        Ok(true) => {
            tracing::info!(
                "game: resumed match {} with '{}'",
                controller.current().id,
                controller.opponent_id()
            );
            ActorStatus::Connected
        }
        Ok(false) => {
            tracing::info!("game: no match with '{}' yet", controller.opponent_id());
            ActorStatus::Connected
        }
        Err(e) => {
            tracing::warn!("game: failed to load match: {e}");
            alert(&sender, AlertLevel::Warn, format!("Could not load the match: {e}"));
            ActorStatus::Disconnected
        }
    };
    publish(&controller, &writer, &sender, false);
    sender.send(TicTacDogMessage::new(ActorState::new(
        status,
        telemetry(&controller),
    )));

    loop {
        let msg = tokio::select! {
            msg = receiver.recv() => msg,
            _ = &mut shutdown_rx => break,
        };
        let Ok(msg) = msg else { break };

        match msg.event {
            TicTacDogEvent::MatchPushed(pushed) => {
                if controller.apply_remote_update(pushed.game) {
                    publish(&controller, &writer, &sender, false);
                    sender.send(TicTacDogMessage::new(ActorState::new(
                        ActorStatus::Connected,
                        telemetry(&controller),
                    )));
                }
            }
            TicTacDogEvent::GameCommand(cmd) => {
                if matches!(
                    cmd.action,
                    GameAction::PlaceMove { .. } | GameAction::Restart | GameAction::Reload
                ) {
                    publish(&controller, &writer, &sender, true);
                }
                let result = tokio::select! {
                    result = execute(&mut controller, cmd.action, &sender) => result,
                    _ = &mut shutdown_rx => break,
                };
                publish(&controller, &writer, &sender, false);
                if let Some(request_id) = cmd.request_id {
                    sender.send(TicTacDogMessage::new(GameOutcome { request_id, result }));
                }
            }
            _ => {}
        }
    }
    tracing::info!("game: shutting down");
}

/// Run one command against the controller.
async fn execute<S: MatchStore, L: MatchListener>(
    controller: &mut GameController<S, L>,
    action: GameAction,
    sender: &BusSender,
) -> GameResult {
    match action {
        GameAction::PlaceMove { cell, rank } => match controller.attempt_move(cell, rank).await {
            Ok(MoveOutcome::Applied) => GameResult::Applied {
                game: controller.current().clone(),
            },
            Ok(MoveOutcome::Rejected(reason)) => GameResult::Rejected {
                reason: reason.to_string(),
            },
            Err(e) => store_failed(sender, "Move not saved", e),
        },
        GameAction::Restart => match controller.restart().await {
            Ok(game) => GameResult::Applied { game: game.clone() },
            Err(e) => store_failed(sender, "Restart not saved", e),
        },
        GameAction::Hover { cell: Some(cell) } if cell >= BOARD_CELLS => GameResult::Rejected {
            reason: IllegalMove::CellOutOfRange(cell).to_string(),
        },
        GameAction::Hover { cell } => {
            controller.hover(cell);
            if cell.is_some() && controller.hovered_cell() != cell {
                GameResult::Rejected {
                    reason: "board is disabled".into(),
                }
            } else {
                GameResult::Applied {
                    game: controller.current().clone(),
                }
            }
        }
        GameAction::Reload => match controller.load().await {
            Ok(_) => GameResult::Applied {
                game: controller.current().clone(),
            },
            Err(e) => store_failed(sender, "Reload failed", e),
        },
    }
}

fn store_failed(sender: &BusSender, what: &str, e: StoreError) -> GameResult {
    alert(sender, AlertLevel::Warn, format!("{what}: {e}"));
    GameResult::Failed {
        error: e.to_string(),
    }
}

fn alert(sender: &BusSender, level: AlertLevel, message: String) {
    sender.send(TicTacDogMessage::new(AlertMessage { level, message }));
}

/// Store the controller's view for readers and broadcast it.
fn publish<S: MatchStore, L: MatchListener>(
    controller: &GameController<S, L>,
    writer: &MatchStateWriter,
    sender: &BusSender,
    pending: bool,
) {
    let mut view = controller.view();
    view.pending = pending;
    if pending {
        view.board_disabled = true;
    }
    writer.publish(view.clone());
    sender.send(TicTacDogMessage::new(view));
}

fn telemetry<S: MatchStore, L: MatchListener>(
    controller: &GameController<S, L>,
) -> HashMap<String, String> {
    HashMap::from([
        ("user".into(), controller.self_id().to_string()),
        ("opponent".into(), controller.opponent_id().to_string()),
        ("match_id".into(), controller.current().id.to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use tictacdog::{GameCommand, MatchPushed, MatchView, Rank, empty_match};
    use tokio::sync::broadcast;

    /// Store that keeps the last record and never fails.
    #[derive(Default)]
    struct EchoStore {
        stored: Mutex<Option<Match>>,
    }

    impl MatchStore for EchoStore {
        async fn submit_match(&self, game: &Match) -> Result<Match, StoreError> {
            let mut game = game.clone();
            game.id = 42;
            *self.stored.lock().unwrap() = Some(game.clone());
            Ok(game)
        }

        async fn fetch_match(&self, _: &str, _: &str) -> Result<Option<Match>, StoreError> {
            Ok(self.stored.lock().unwrap().clone())
        }
    }

    struct Harness {
        bus: broadcast::Sender<TicTacDogMessage>,
        observer: broadcast::Receiver<TicTacDogMessage>,
        shutdown: Option<oneshot::Sender<()>>,
        task: tokio::task::JoinHandle<()>,
        state: crate::state::MatchState,
    }

    /// Store whose every submit runs into a timeout.
    struct TimedOutStore;

    impl MatchStore for TimedOutStore {
        async fn submit_match(&self, _: &Match) -> Result<Match, StoreError> {
            Err(StoreError::Transport("operation timed out".into()))
        }

        async fn fetch_match(&self, _: &str, _: &str) -> Result<Option<Match>, StoreError> {
            Ok(None)
        }
    }

    fn spawn_actor() -> Harness {
        spawn_actor_with(EchoStore::default())
    }

    fn spawn_actor_with<S: MatchStore + Send + Sync + 'static>(store: S) -> Harness {
        let (bus, observer) = broadcast::channel(64);
        let sender = BusSender::new("game.0".into(), bus.clone(), Arc::new(AtomicBool::new(false)));
        let receiver = sender.subscribe();
        let (state, writer) = crate::state::MatchState::new();
        let listener_tx = sender.clone();
        let listener = move |game: &Match| {
            listener_tx.send(TicTacDogMessage::new(MatchCommitted { game: game.clone() }));
        };
        let controller = GameController::new("alice", "bob", store, listener);
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run(controller, writer, sender, receiver, shutdown_rx));
        Harness {
            bus,
            observer,
            shutdown: Some(shutdown),
            task,
            state,
        }
    }

    impl Harness {
        fn send(&self, event: impl Into<TicTacDogEvent>) {
            self.bus
                .send(TicTacDogMessage::new(event).source("test"))
                .unwrap();
        }

        /// Next event matching `pick`, skipping everything else.
        async fn next<T>(&mut self, pick: impl Fn(TicTacDogEvent) -> Option<T>) -> T {
            loop {
                let msg = self.observer.recv().await.unwrap();
                if let Some(found) = pick(msg.event) {
                    return found;
                }
            }
        }

        async fn next_view(&mut self) -> MatchView {
            self.next(|event| match event {
                TicTacDogEvent::MatchView(view) => Some(*view),
                _ => None,
            })
            .await
        }

        async fn stop(mut self) {
            if let Some(tx) = self.shutdown.take() {
                let _ = tx.send(());
            }
            self.task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn move_command_replies_and_commits() {
        let mut h = spawn_actor();
        let initial = h.next_view().await;
        assert!(initial.my_turn);
        assert_eq!(initial.hint.as_deref(), Some("Start playing!"));

        h.send(GameCommand {
            request_id: Some("r1".into()),
            action: GameAction::PlaceMove {
                cell: 4,
                rank: Rank::Cat,
            },
        });

        let pending = h.next_view().await;
        assert!(pending.pending);
        assert!(pending.board_disabled);

        let committed = h
            .next(|event| match event {
                TicTacDogEvent::MatchCommitted(c) => Some(c.game),
                _ => None,
            })
            .await;
        assert_eq!(committed.cells()[4], 2);
        assert_eq!(committed.id, 42);

        let settled = h.next_view().await;
        assert!(!settled.pending);
        assert!(!settled.my_turn);

        let outcome = h
            .next(|event| match event {
                TicTacDogEvent::GameOutcome(o) => Some(o),
                _ => None,
            })
            .await;
        assert_eq!(outcome.request_id, "r1");
        assert!(matches!(outcome.result, GameResult::Applied { .. }));
        let stored = h.state.snapshot().unwrap();
        assert_eq!(stored.game.cells()[4], 2);
        assert!(!stored.pending);
        h.stop().await;
    }

    #[tokio::test]
    async fn rejected_move_reports_reason() {
        let mut h = spawn_actor();
        h.next_view().await;

        h.send(GameCommand {
            request_id: Some("r2".into()),
            action: GameAction::PlaceMove {
                cell: 11,
                rank: Rank::Mouse,
            },
        });
        let outcome = h
            .next(|event| match event {
                TicTacDogEvent::GameOutcome(o) => Some(o),
                _ => None,
            })
            .await;
        let GameResult::Rejected { reason } = outcome.result else {
            panic!("expected a rejection");
        };
        assert_eq!(reason, "cell 11 is off the board");
        h.stop().await;
    }

    #[tokio::test]
    async fn failed_store_call_leaves_board_unchanged() {
        let mut h = spawn_actor_with(TimedOutStore);
        h.next_view().await;

        h.send(GameCommand {
            request_id: Some("r3".into()),
            action: GameAction::PlaceMove {
                cell: 4,
                rank: Rank::Cat,
            },
        });
        assert!(h.next_view().await.pending);

        let alert = h
            .next(|event| match event {
                TicTacDogEvent::Alert(a) => Some(a),
                _ => None,
            })
            .await;
        assert_eq!(alert.level, AlertLevel::Warn);
        assert!(alert.message.starts_with("Move not saved"), "{}", alert.message);

        let settled = h.next_view().await;
        assert!(!settled.pending);
        assert!(!settled.board_disabled);
        assert!(settled.my_turn);
        assert_eq!(settled.game.cells(), [0; 9]);

        let outcome = h
            .next(|event| match event {
                TicTacDogEvent::GameOutcome(o) => Some(o),
                _ => None,
            })
            .await;
        assert_eq!(outcome.request_id, "r3");
        let GameResult::Failed { error } = outcome.result else {
            panic!("expected a store failure");
        };
        assert!(error.contains("operation timed out"), "{error}");
        assert_eq!(h.state.snapshot().unwrap().game.cells(), [0; 9]);
        h.stop().await;
    }

    #[tokio::test]
    async fn hover_off_the_board_is_not_a_disabled_board() {
        let mut h = spawn_actor();
        h.next_view().await;

        h.send(GameCommand {
            request_id: Some("h1".into()),
            action: GameAction::Hover { cell: Some(12) },
        });
        let outcome = h
            .next(|event| match event {
                TicTacDogEvent::GameOutcome(o) => Some(o),
                _ => None,
            })
            .await;
        let GameResult::Rejected { reason } = outcome.result else {
            panic!("expected a rejection");
        };
        assert_eq!(reason, "cell 12 is off the board");
        h.stop().await;
    }

    #[tokio::test]
    async fn pushed_match_updates_view() {
        let mut h = spawn_actor();
        h.next_view().await;

        let mut game = empty_match("bob").with_opponent("alice");
        game.board[0] = tictacdog::Cell::placed(tictacdog::Role::First, Rank::Dog);
        game.last_mover_id = "bob".into();
        h.send(MatchPushed { game });

        let view = h.next_view().await;
        assert_eq!(view.game.cells()[0], 3);
        assert!(view.my_turn);
        assert_eq!(view.my_role, tictacdog::Role::Second);

        // A record for another pair is ignored: no new view is published.
        let stranger = empty_match("carol").with_opponent("dave");
        h.send(MatchPushed { game: stranger });
        h.send(GameAction::Hover { cell: Some(1) });
        let view = h.next_view().await;
        assert_eq!(view.hovered_cell, Some(1));
        assert_eq!(view.game.cells()[0], 3);
        h.stop().await;
    }
}
