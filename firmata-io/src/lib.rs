#![doc(html_root_url = "https://docs.rs/firmata-io/0.1.0")]

//! <h1 align="center">FIRMATA-IO - Asynchronous Firmata client for Rust</h1>
//! <div style="text-align:center;font-style:italic;">Talk to Arduino (and compatible) boards running a Firmata firmware.</div>
//! <br/>
//!
//! # Features
//!
//! **Firmata-IO** is a client-side implementation of the
//! [Firmata protocol](https://github.com/firmata/protocol): it connects to a
//! board running a Firmata firmware, discovers its pins and lets you drive
//! them from async Rust.
//!
//! - Connect to a [`Board`](hardware::Board) over a pluggable
//!   [`Transport`](io::Transport) ([`Serial`](io::Serial) provided)
//! - Discover pins, their supported modes and resolutions through the
//!   capability handshake
//! - Write digital or analog values, with local validation against the board
//!   capabilities
//! - Stream value reports and react to changes through per pin async
//!   callbacks
//!
//! # Prerequisites
//!
//! - A board attached to a serial port of the machine running your code.
//! - [StandardFirmata.ino](https://github.com/firmata/arduino) (or
//!   compatible) installed on the board. _This sketch ships with the Arduino
//!   IDE under the Firmata samples menu; uploading it needs to be done once
//!   only._
//!
//! # Getting Started
//!
//! Add the following to your `Cargo.toml`:
//! ```toml
//! [dependencies]
//! firmata-io = "0.1.0"
//! ```
//!
//! The following code demonstrates the simplest program we could imagine:
//! blink the embedded led on pin 13.
//! ```no_run
//! use firmata_io::hardware::Board;
//! use firmata_io::io::PinModeId;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect to the board on the first available serial port.
//!     let board = Board::default().setup().await?;
//!
//!     let led = board.pin(13)?;
//!     led.pin_mode(PinModeId::OUTPUT).await?;
//!
//!     loop {
//!         led.digital_write(true).await?;
//!         tokio::time::sleep(std::time::Duration::from_millis(500)).await;
//!         led.digital_write(false).await?;
//!         tokio::time::sleep(std::time::Duration::from_millis(500)).await;
//!     }
//! }
//! ```
//!
//! # Feature flags
//!
//! - **libudev** -- (enabled by default) Activates `serialport` crate _libudev_ feature under-the-hood (required on Linux only for port listing).
//! - **serde** -- Enables serialize/deserialize capabilities for most entities.
//! - **mocks** -- Provides mocked entities of all kinds (useful for tests mostly).

pub mod errors;
pub mod hardware;
pub mod io;
#[cfg(any(test, feature = "mocks"))]
pub mod mocks;
pub mod utils;
