//! Bus abstraction layer. Wraps `tokio::sync::broadcast` so actors never
//! touch the broadcast types directly.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;

use tictacdog::TicTacDogMessage;

// ---------------------------------------------------------------------------
// PollError
// ---------------------------------------------------------------------------

/// The bus is closed or the actor's shutdown flag is set.
#[derive(Debug)]
pub enum PollError {
    Shutdown,
}

// ---------------------------------------------------------------------------
// BusSender
// ---------------------------------------------------------------------------

/// Cloneable sender that stamps `source` on every outbound message.
#[derive(Clone)]
pub struct BusSender {
    actor_id: String,
    inner: broadcast::Sender<TicTacDogMessage>,
    shutdown: Arc<AtomicBool>,
}

impl BusSender {
    pub fn new(
        actor_id: String,
        inner: broadcast::Sender<TicTacDogMessage>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            actor_id,
            inner,
            shutdown,
        }
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    /// Underlying broadcast sender (the web layer hands it to handlers).
    pub fn raw_sender(&self) -> &broadcast::Sender<TicTacDogMessage> {
        &self.inner
    }

    /// Send a message with `source` set to this actor's ID.
    pub fn send(&self, mut msg: TicTacDogMessage) {
        msg.source = self.actor_id.clone();
        let _ = self.inner.send(msg);
    }

    /// New receiver on this bus sharing this sender's shutdown flag.
    pub fn subscribe(&self) -> BusReceiver {
        BusReceiver {
            inner: self.inner.subscribe(),
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

// ---------------------------------------------------------------------------
// BusReceiver
// ---------------------------------------------------------------------------

pub struct BusReceiver {
    inner: broadcast::Receiver<TicTacDogMessage>,
    shutdown: Arc<AtomicBool>,
}

impl BusReceiver {
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Non-blocking drain for thread-based actors: the next message,
    /// `Ok(None)` if empty, `Err(Shutdown)` once closed or flagged.
    pub fn poll(&mut self) -> Result<Option<TicTacDogMessage>, PollError> {
        if self.is_shutdown() {
            return Err(PollError::Shutdown);
        }
        loop {
            match self.inner.try_recv() {
                Ok(msg) => return Ok(Some(msg)),
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => return Err(PollError::Shutdown),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!("bus: lagged, dropped {n} events");
                }
            }
        }
    }

    /// Async receive for runtime-based actors. Lag is logged and skipped.
    pub async fn recv(&mut self) -> Result<TicTacDogMessage, PollError> {
        loop {
            if self.is_shutdown() {
                return Err(PollError::Shutdown);
            }
            match self.inner.recv().await {
                Ok(msg) => return Ok(msg),
                Err(broadcast::error::RecvError::Closed) => return Err(PollError::Shutdown),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("bus: lagged, dropped {n} events");
                }
            }
        }
    }
}

impl From<broadcast::Receiver<TicTacDogMessage>> for BusReceiver {
    fn from(inner: broadcast::Receiver<TicTacDogMessage>) -> Self {
        Self {
            inner,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tictacdog::{AlertLevel, AlertMessage, TicTacDogEvent};

    fn alert(text: &str) -> TicTacDogMessage {
        TicTacDogMessage::new(AlertMessage {
            level: AlertLevel::Warn,
            message: text.into(),
        })
    }

    #[test]
    fn sender_stamps_source() {
        let (tx, _) = broadcast::channel(8);
        let sender = BusSender::new("hub.0".into(), tx, Arc::new(AtomicBool::new(false)));
        let mut receiver = sender.subscribe();

        sender.send(alert("x").source("spoofed"));
        let msg = receiver.poll().unwrap().unwrap();
        assert_eq!(msg.source, "hub.0");
        assert!(matches!(msg.event, TicTacDogEvent::Alert(_)));
        assert!(receiver.poll().unwrap().is_none());
    }

    #[test]
    fn shutdown_flag_stops_polling() {
        let (tx, _) = broadcast::channel(8);
        let shutdown = Arc::new(AtomicBool::new(false));
        let sender = BusSender::new("game.0".into(), tx, Arc::clone(&shutdown));
        let mut receiver = sender.subscribe();
        sender.send(alert("pending"));

        shutdown.store(true, Ordering::Relaxed);
        assert!(matches!(receiver.poll(), Err(PollError::Shutdown)));
    }

    #[tokio::test]
    async fn recv_reports_closed_bus() {
        let (tx, rx) = broadcast::channel::<TicTacDogMessage>(8);
        let mut receiver = BusReceiver::from(rx);
        tx.send(alert("last")).unwrap();
        drop(tx);

        assert!(receiver.recv().await.is_ok());
        assert!(matches!(receiver.recv().await, Err(PollError::Shutdown)));
    }
}
