use crate::errors::Error;
use async_trait::async_trait;
use std::fmt::{Debug, Display};

pub mod serial;

pub use serial::Serial;

/// Byte pipe between the engine and a Firmata device.
///
/// The engine owns its transport exclusively once the board starts: all
/// methods take `&mut self`.
#[async_trait]
pub trait Transport: Debug + Display + Send + Sync {
    /// Opens communication using the transport layer.
    ///
    /// # Notes
    /// The method may suspend until the connection is established.
    async fn open(&mut self) -> Result<(), Error>;

    /// Awaits the next chunk of incoming bytes.
    ///
    /// Chunk boundaries carry no meaning: a single Firmata message may arrive
    /// split across many chunks, or several messages packed into one.
    ///
    /// # Returns
    /// * `Ok(bytes)` - one non-empty chunk.
    /// * `Ok(vec![])` - the peer is gone for good (end of stream).
    ///
    /// # Notes
    /// The returned future must be cancel safe: dropping it before completion
    /// must not lose bytes. The engine awaits it inside a `select!`.
    async fn read(&mut self) -> Result<Vec<u8>, Error>;

    /// Writes the whole buffer to the connection.
    ///
    /// # Notes
    /// This suspends until every byte is handed to the device driver. Partial
    /// writes never surface: either all bytes go out or an error comes back.
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), Error>;

    /// Gracefully shuts down the transport layer.
    async fn close(&mut self) -> Result<(), Error>;
}
