use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::errors::{Error, TransportError};
use crate::io::Transport;

/// In-memory transport for engine and board tests.
///
/// Bytes written by the engine accumulate in a buffer the test can drain,
/// bytes sent through the paired [`MockDevice`] come back out of
/// [`Transport::read`] one chunk at a time.
#[derive(Debug)]
pub struct MockTransport {
    incoming: UnboundedReceiver<Vec<u8>>,
    written: Arc<Mutex<Vec<u8>>>,
    connected: Arc<AtomicBool>,
    /// When set, `open` fails with an IO error.
    pub refuse_open: bool,
}

/// Test-side handle of a [`MockTransport`]: plays the board role.
#[derive(Debug)]
pub struct MockDevice {
    outgoing: Mutex<Option<UnboundedSender<Vec<u8>>>>,
    written: Arc<Mutex<Vec<u8>>>,
    connected: Arc<AtomicBool>,
}

impl MockTransport {
    /// Creates a transport / device pair sharing the same wire.
    pub fn new() -> (Self, MockDevice) {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        let written = Arc::new(Mutex::new(Vec::new()));
        let connected = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: receiver,
            written: written.clone(),
            connected: connected.clone(),
            refuse_open: false,
        };
        let device = MockDevice {
            outgoing: Mutex::new(Some(sender)),
            written,
            connected,
        };
        (transport, device)
    }
}

impl Display for MockTransport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockTransport")
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&mut self) -> Result<(), Error> {
        match self.refuse_open {
            true => Err(TransportError::IoException {
                info: String::from("Mock refused to open"),
            }
            .into()),
            false => {
                self.connected.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    async fn read(&mut self) -> Result<Vec<u8>, Error> {
        match self.incoming.recv().await {
            Some(bytes) => Ok(bytes),
            None => Ok(vec![]),
        }
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.written.lock().extend_from_slice(bytes);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), Error> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl MockDevice {
    /// Queues bytes for the engine to read as a single chunk.
    pub fn send(&self, bytes: &[u8]) {
        if let Some(outgoing) = self.outgoing.lock().as_ref() {
            let _ = outgoing.send(bytes.to_vec());
        }
    }

    /// Drains and returns everything written to the transport so far.
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut *self.written.lock())
    }

    /// Whether the transport is currently open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Drops the board side of the wire: the engine sees end of stream.
    pub fn hang_up(&self) {
        *self.outgoing.lock() = None;
    }

    /// Answers the version query with protocol 2.5.
    pub fn complete_version(&self) {
        self.send(&[0xF9, 0x02, 0x05]);
    }

    /// Answers the firmware query with "MockFirmata" 2.5.
    pub fn complete_firmware(&self) {
        self.send(&[
            0xF0, 0x79, 0x02, 0x05, // firmware report, version 2.5
            0x4D, 0x00, 0x6F, 0x00, 0x63, 0x00, 0x6B, 0x00, // "Mock"
            0x46, 0x00, 0x69, 0x00, 0x72, 0x00, 0x6D, 0x00, // "Firm"
            0x61, 0x00, 0x74, 0x00, 0x61, 0x00, // "ata"
            0xF7,
        ]);
    }

    /// Answers the capability query with a three pin board: pin 0 supports
    /// INPUT, OUTPUT and PULLUP, pin 1 INPUT, OUTPUT and PWM, pin 2 INPUT
    /// and ANALOG.
    pub fn complete_capabilities(&self) {
        self.send(&[
            0xF0, 0x6C, // capability response
            0x00, 0x01, 0x01, 0x01, 0x0B, 0x01, 0x7F, // pin 0
            0x00, 0x01, 0x01, 0x01, 0x03, 0x08, 0x7F, // pin 1
            0x00, 0x01, 0x02, 0x0A, 0x7F, // pin 2
            0xF7,
        ]);
    }

    /// Answers the analog mapping query: pin 2 is channel 0.
    pub fn complete_analog_mapping(&self) {
        self.send(&[0xF0, 0x6A, 0x7F, 0x7F, 0x00, 0xF7]);
    }

    /// Plays the full board side of the handshake.
    pub fn complete_handshake(&self) {
        self.complete_version();
        self.complete_firmware();
        self.complete_capabilities();
        self.complete_analog_mapping();
    }
}
