//! Match state: the latest controller snapshot, readable by every actor.
//!
//! `MatchView` itself lives in the `tictacdog` lib. The runtime store stays
//! here since it uses `RwLock` and is not part of the wire schema.

use std::sync::{Arc, RwLock};

pub use tictacdog::MatchView;

/// Read-only handle on the latest published view.
///
/// Lives on `SystemState.game`; the web layer serves it from here.
pub struct MatchState {
    inner: Arc<RwLock<Option<MatchView>>>,
}

/// Write handle. Only the game actor holds this, so every view a reader can
/// observe came out of the controller.
pub struct MatchStateWriter {
    inner: Arc<RwLock<Option<MatchView>>>,
}

impl MatchState {
    /// Create a new `MatchState` and its companion writer.
    pub fn new() -> (Self, MatchStateWriter) {
        let inner = Arc::new(RwLock::new(None));
        (
            Self {
                inner: Arc::clone(&inner),
            },
            MatchStateWriter { inner },
        )
    }

    /// Latest view, `None` until the game actor has loaded the match.
    pub fn snapshot(&self) -> Option<MatchView> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl MatchStateWriter {
    pub fn publish(&self, view: MatchView) {
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = Some(view);
    }
}
