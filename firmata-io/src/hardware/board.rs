use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::errors::Error;
use crate::hardware::PinHandle;
use crate::io::engine::{Command, Engine, EngineShared};
use crate::io::{BoardState, Pin, PinAddress, Serial, Transport, DEFAULT_HANDSHAKE_TIMEOUT};

/// Represents a physical board exposing the Firmata protocol over a
/// [`Transport`].
///
/// A board starts disconnected: [`Board::setup`] opens the transport, runs
/// the handshake and spawns the background engine driving the session.
/// Clones share the same session, so one clone may [`Board::close`] what
/// another one opened.
#[derive(Clone, Debug)]
pub struct Board {
    /// Transport waiting to be claimed by [`Board::setup`].
    transport: Arc<Mutex<Option<Box<dyn Transport>>>>,
    /// State shared with the engine task once it runs.
    shared: Arc<EngineShared>,
    /// Time allowed for the handshake to complete.
    handshake_timeout: Duration,
}

impl Default for Board {
    /// Creates a board over the default [`Serial`] transport.
    ///
    /// The port is auto-detected as the first available serial port. The
    /// board is NOT connected until [`Board::setup`] is called.
    ///
    /// # Example
    /// ```no_run
    /// use firmata_io::hardware::Board;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let board = Board::default().setup().await?;
    ///     println!("{}", board);
    ///     Ok(())
    /// }
    /// ```
    fn default() -> Self {
        Self::from(Serial::default())
    }
}

impl<T: Transport + 'static> From<T> for Board {
    fn from(transport: T) -> Self {
        Self {
            transport: Arc::new(Mutex::new(Some(Box::new(transport)))),
            shared: Arc::new(EngineShared::default()),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

impl Board {
    /// Changes the time allowed for the handshake
    /// (default: [`DEFAULT_HANDSHAKE_TIMEOUT`]).
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Connects the board: opens the transport, performs the Firmata
    /// handshake and spawns the engine driving the session.
    ///
    /// Resolves once the board capabilities are known and commands are
    /// accepted. Fails with [`Error::HandshakeTimeout`] when the board stays
    /// silent (or keeps talking garbage) past the configured timeout, and
    /// with [`Error::Closed`] when [`Board::close`] is called meanwhile.
    ///
    /// # Example
    /// ```no_run
    /// use firmata_io::hardware::Board;
    /// use firmata_io::io::Serial;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let board = Board::from(Serial::new("/dev/ttyACM0")).setup().await?;
    ///     println!("{} pins available", board.pins().len());
    ///     Ok(())
    /// }
    /// ```
    pub async fn setup(self) -> Result<Self, Error> {
        let transport = {
            let state = *self.shared.state.read();
            if state != BoardState::Uninitialized {
                return Err(Error::NotReady {
                    operation: "setup",
                    state,
                });
            }
            let Some(transport) = self.transport.lock().take() else {
                return Err(Error::NotReady {
                    operation: "setup",
                    state,
                });
            };
            transport
        };

        let (ready, resolved) = oneshot::channel();
        Engine::spawn(self.shared.clone(), transport, ready);

        match tokio::time::timeout(self.handshake_timeout, resolved).await {
            Ok(Ok(result)) => match result {
                Ok(()) => {
                    debug!("Board connected: {}", self);
                    Ok(self)
                }
                Err(error) => Err(error),
            },
            // The engine always resolves `ready` before dying: not receiving
            // it means the task panicked.
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => {
                self.shared.shutdown().await?;
                Err(Error::HandshakeTimeout)
            }
        }
    }

    /// Closes the session and releases the transport.
    ///
    /// Valid from any state and idempotent: closing a board that never
    /// connected, or closing twice, reports success. A concurrently pending
    /// [`Board::setup`] observes [`Error::Closed`].
    pub async fn close(self) -> Result<Self, Error> {
        self.shared.shutdown().await?;
        Ok(self)
    }

    /// Current lifecycle state of the session.
    pub fn state(&self) -> BoardState {
        *self.shared.state.read()
    }

    /// Whether the handshake completed and commands are accepted.
    pub fn is_connected(&self) -> bool {
        self.state() == BoardState::Ready
    }

    /// Returns a handle on the given pin.
    ///
    /// Accepts a digital index (`board.pin(13)`) or an explicit address
    /// (`board.pin(PinAddress::Analog(0))`). Fails when the board is not
    /// ready or when the board never advertised such a pin.
    pub fn pin<A: Into<PinAddress>>(&self, address: A) -> Result<PinHandle, Error> {
        let address = address.into();
        let state = self.state();
        if state != BoardState::Ready {
            return Err(Error::NotReady {
                operation: "pin",
                state,
            });
        }
        self.shared.registry.read().get_pin(address)?;
        Ok(PinHandle::new(Arc::downgrade(&self.shared), address))
    }

    /// Snapshot of all pins advertised by the board.
    pub fn pins(&self) -> Vec<Pin> {
        self.shared.registry.read().pins.clone()
    }

    /// Firmware name reported by the board. Empty until known.
    pub fn firmware_name(&self) -> String {
        self.shared.registry.read().firmware_name.clone()
    }

    /// Firmware version reported by the board. Empty until known.
    pub fn firmware_version(&self) -> String {
        self.shared.registry.read().firmware_version.clone()
    }

    /// Protocol version reported by the board. Empty until known.
    pub fn protocol_version(&self) -> String {
        self.shared.registry.read().protocol_version.clone()
    }

    /// Installs the handler notified when the session fails after setup, for
    /// instance when the board gets unplugged. Replaces any previous handler.
    pub fn set_error_observer<F>(&self, observer: F)
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        *self.shared.observer.write() = Some(Arc::new(observer));
    }

    /// Sets the interval (in ms) between two value reports from the board.
    pub async fn set_sampling_interval(&self, interval: u16) -> Result<(), Error> {
        self.shared
            .run_command("set_sampling_interval", |completion| {
                Command::SamplingInterval {
                    interval,
                    completion,
                }
            })
            .await
    }

    /// Asks the board to return to its power-up state: reports stop and pin
    /// modes return to their defaults. The session itself stays open.
    pub async fn system_reset(&self) -> Result<(), Error> {
        self.shared
            .run_command("system_reset", |completion| Command::SystemReset {
                completion,
            })
            .await
    }
}

impl Display for Board {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let registry = self.shared.registry.read();
        write!(
            f,
            "Board [firmware={} {}, protocol={}, state={}]",
            registry.firmware_name,
            registry.firmware_version,
            registry.protocol_version,
            *self.shared.state.read(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::transport_layer::{MockDevice, MockTransport};
    use crate::pause;

    async fn connected_board() -> (Board, MockDevice) {
        let (transport, device) = MockTransport::new();
        device.complete_handshake();
        let board = Board::from(transport).setup().await.expect("setup");
        device.take_written();
        (board, device)
    }

    #[test]
    fn test_default_board() {
        let board = Board::default();
        assert_eq!(board.state(), BoardState::Uninitialized);
        assert!(!board.is_connected());
    }

    #[tokio::test]
    async fn test_board_setup() {
        let (transport, device) = MockTransport::new();
        device.complete_handshake();

        let board = Board::from(transport).setup().await.expect("setup succeeds");
        assert!(board.is_connected());
        assert_eq!(board.protocol_version(), "2.5");
        assert_eq!(board.firmware_name(), "MockFirmata");
        assert_eq!(board.firmware_version(), "2.5");
        assert_eq!(board.pins().len(), 3);
        assert_eq!(
            board.to_string(),
            "Board [firmware=MockFirmata 2.5, protocol=2.5, state=ready]"
        );
    }

    #[tokio::test]
    async fn test_board_setup_timeout() {
        let (transport, _device) = MockTransport::new();
        let board = Board::from(transport).with_handshake_timeout(Duration::from_millis(50));
        let watcher = board.clone();

        let result = board.setup().await;
        assert!(matches!(result.unwrap_err(), Error::HandshakeTimeout));
        assert_eq!(watcher.state(), BoardState::Closed);
    }

    #[tokio::test]
    async fn test_board_setup_twice() {
        let (board, _device) = connected_board().await;
        let result = board.clone().setup().await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "Board not ready: 'setup' attempted while ready."
        );
    }

    #[tokio::test]
    async fn test_board_close() {
        let (board, device) = connected_board().await;

        let board = board.close().await.expect("close succeeds");
        assert_eq!(board.state(), BoardState::Closed);
        pause!(50);
        assert!(!device.is_connected(), "transport released");

        let board = board.close().await.expect("close is idempotent");
        assert_eq!(board.state(), BoardState::Closed);
    }

    #[tokio::test]
    async fn test_close_cancels_setup() {
        let (transport, _device) = MockTransport::new();
        let board = Board::from(transport);
        let closer = board.clone();

        let pending = tokio::spawn(async move { board.setup().await });
        pause!(50);
        closer.close().await.expect("close succeeds");

        let result = pending.await.expect("setup task completes");
        assert_eq!(
            result.unwrap_err().to_string(),
            "Connection has been closed."
        );
    }

    #[tokio::test]
    async fn test_board_commands() {
        let (board, device) = connected_board().await;

        board
            .set_sampling_interval(100)
            .await
            .expect("sampling interval");
        assert_eq!(device.take_written(), [0xF0, 0x7A, 0x64, 0x00, 0xF7]);

        board.system_reset().await.expect("system reset");
        assert_eq!(device.take_written(), [0xFF]);
    }

    #[tokio::test]
    async fn test_board_pin() {
        let (board, _device) = connected_board().await;

        assert!(board.pin(0).is_ok());
        assert!(board.pin(PinAddress::Analog(0)).is_ok());
        assert_eq!(
            board.pin(99).unwrap_err().to_string(),
            "Hardware error: Unknown pin (D99)."
        );

        let board = board.close().await.expect("close");
        assert_eq!(
            board.pin(0).unwrap_err().to_string(),
            "Board not ready: 'pin' attempted while closed."
        );
    }

    #[tokio::test]
    async fn test_board_pin_requires_setup() {
        let (transport, _device) = MockTransport::new();
        let board = Board::from(transport);
        assert_eq!(
            board.pin(0).unwrap_err().to_string(),
            "Board not ready: 'pin' attempted while uninitialized."
        );
    }

    #[tokio::test]
    async fn test_board_error_observer() {
        let (board, device) = connected_board().await;

        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(vec![]));
        let log = seen.clone();
        board.set_error_observer(move |error| log.lock().push(error.to_string()));

        device.hang_up();
        pause!(50);
        assert_eq!(*seen.lock(), ["Transport error: Connection lost."]);
        assert_eq!(board.state(), BoardState::Closed);
    }
}
