//! Defines the user facing handles over a Firmata connection.

mod board;
mod pin;

pub use board::Board;
pub use pin::PinHandle;
