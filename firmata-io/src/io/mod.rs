//! Defines the Firmata protocol plumbing used to talk to boards.
//!
//! The [`codec`] maps bytes to [`Message`] values, the registry mirrors the
//! pins a board advertised, the engine drives one session over a
//! [`Transport`].

pub mod codec;
pub mod constants;
pub(crate) mod engine;
mod registry;
mod transports;

pub use crate::io::codec::Message;
pub use crate::io::engine::{
    BoardState, ErrorObserver, DEFAULT_HANDSHAKE_TIMEOUT, HANDSHAKE_DESYNC_BUDGET,
};
pub use crate::io::registry::*;
pub use crate::io::transports::*;
