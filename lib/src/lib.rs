mod api;
mod config;
mod controller;
mod error;
mod event;
mod game_state;
mod message;

pub use api::*;
pub use config::*;
pub use controller::*;
pub use error::*;
pub use event::*;
pub use game_state::*;
pub use message::*;
