use crate::errors::Error;
use crate::errors::TransportError::{IoException, NotOpen};
use crate::io::transports::Transport;
use async_trait::async_trait;
use log::trace;
use parking_lot::Mutex;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::fmt::{Display, Formatter};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task;

/// Serial (USB, UART) transport layer.
///
/// The underlying `serialport` handle only exposes blocking reads, so a
/// dedicated reader thread drains the port and forwards chunks over a channel
/// the async side awaits on.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug)]
pub struct Serial {
    /// The connection port.
    port: String,
    /// A Read/Write io object.
    #[cfg_attr(feature = "serde", serde(skip))]
    io: Arc<Mutex<Option<Box<dyn SerialPort>>>>,
    /// Chunks forwarded by the reader thread.
    #[cfg_attr(feature = "serde", serde(skip))]
    incoming: Option<UnboundedReceiver<Vec<u8>>>,
    /// Tells the reader thread to stop on the next wakeup.
    #[cfg_attr(feature = "serde", serde(skip))]
    halted: Arc<AtomicBool>,
}

impl Serial {
    /// Constructs a new `Serial` transport layer instance for communication through the specified port.
    ///
    /// # Arguments
    /// * `port` - The serial port to use for communication.
    ///
    /// # Example
    /// ```no_run
    /// use firmata_io::hardware::Board;
    /// use firmata_io::io::Serial;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let board = Board::from(Serial::new("/dev/ttyACM0")).setup().await.unwrap();
    /// }
    /// ```
    pub fn new<P: Into<String>>(port: P) -> Self {
        Self {
            port: port.into(),
            io: Arc::new(Mutex::new(None)),
            incoming: None,
            halted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Retrieves the configured port.
    pub fn get_port(&self) -> String {
        self.port.clone()
    }

    /// Starts the thread draining the given handle into the incoming channel.
    ///
    /// The thread stops when the port errors out, when the channel closes, or
    /// when [`Serial::close`] raises the halt flag. Closing its sender is how
    /// it signals end of stream.
    fn spawn_reader(&mut self, mut handle: Box<dyn SerialPort>) {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel::<Vec<u8>>();
        self.incoming = Some(receiver);
        self.halted.store(false, Ordering::SeqCst);

        let halted = self.halted.clone();
        std::thread::spawn(move || {
            let mut scratch = [0u8; 256];
            loop {
                if halted.load(Ordering::SeqCst) {
                    break;
                }
                match handle.read(&mut scratch) {
                    Ok(0) => continue,
                    Ok(count) => {
                        if sender.send(scratch[..count].to_vec()).is_err() {
                            break;
                        }
                    }
                    // The port timeout paces this loop: not an error.
                    Err(error) if error.kind() == std::io::ErrorKind::TimedOut => continue,
                    Err(error) => {
                        trace!("Serial reader stopped: {}", error);
                        break;
                    }
                }
            }
        });
    }
}

impl Default for Serial {
    /// Creates a new serial transport connection with the first available port or an empty string if no ports are available.
    ///
    /// # Notes
    /// The first available port will be used, None otherwise, which will probably lead to an error
    /// during the open phase.
    #[cfg(not(tarpaulin_include))]
    fn default() -> Self {
        let ports = serialport::available_ports().unwrap_or_else(|_| vec![]);
        match ports.first() {
            Some(port) => Self::new(&port.port_name),
            None => Self::new(""),
        }
    }
}

impl Display for Serial {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Serial({})", self.port)
    }
}

#[async_trait]
impl Transport for Serial {
    async fn open(&mut self) -> Result<(), Error> {
        let port = self.port.clone();
        let connexion = task::spawn_blocking(move || {
            serialport::new(port, 57_600)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                // Short timeout: it paces the reader thread poll loop.
                .timeout(Duration::from_millis(100))
                .open_native()
        })
        .await
        .map_err(|err| IoException {
            info: err.to_string(),
        })??;
        trace!("Serial port is now opened: {:?}", connexion);

        let handle = connexion.try_clone()?;
        *self.io.lock() = Some(Box::new(connexion));
        self.spawn_reader(handle);

        Ok(())
    }

    async fn read(&mut self) -> Result<Vec<u8>, Error> {
        let Some(incoming) = self.incoming.as_mut() else {
            return Err(NotOpen.into());
        };
        // Cancel safe: recv either yields a whole chunk or leaves it queued.
        match incoming.recv().await {
            Some(bytes) => Ok(bytes),
            None => Ok(vec![]),
        }
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let io = self.io.clone();
        let bytes = bytes.to_vec();
        task::spawn_blocking(move || -> Result<(), Error> {
            let mut lock = io.lock();
            lock.as_mut().ok_or(NotOpen)?.write_all(&bytes)?;
            Ok(())
        })
        .await
        .map_err(|err| IoException {
            info: err.to_string(),
        })??;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), Error> {
        self.halted.store(true, Ordering::SeqCst);
        self.incoming = None;
        *self.io.lock() = None;
        Ok(())
    }
}

impl From<serialport::Error> for Error {
    fn from(value: serialport::Error) -> Self {
        std::io::Error::from(value).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::serial_port::SerialPortMock;
    use serialport::ErrorKind;

    fn get_test_transport() -> Serial {
        let transport = Serial::new("/dev/ttyACM0");
        *transport.io.lock() = Some(Box::new(SerialPortMock::default()));
        transport
    }

    fn get_test_failing_transport() -> Serial {
        let transport = Serial::new("/dev/ttyACM0");
        *transport.io.lock() = Some(Box::new(SerialPortMock::new(ErrorKind::InvalidInput)));
        transport
    }

    #[test]
    fn test_new_serial_transport() {
        let transport = Serial::new("/dev/ttyACM0");
        assert_eq!(transport.port, "/dev/ttyACM0");
        assert_eq!(transport.get_port(), "/dev/ttyACM0");
        assert!(transport.io.lock().is_none());
        assert!(transport.incoming.is_none());
    }

    #[test]
    fn test_default_serial_transport() {
        // No assumption on the machine's ports: either a real one or "".
        let _ = Serial::default();
    }

    #[tokio::test]
    async fn test_write_data() {
        let mut transport = get_test_transport();
        assert!(transport.write_all(&[1, 2, 3]).await.is_ok());
        assert!(transport.write_all(&[]).await.is_ok());

        let mut transport = get_test_failing_transport();
        assert!(transport.write_all(&[1, 2, 3]).await.is_err());
    }

    #[tokio::test]
    async fn test_write_requires_open() {
        let mut transport = Serial::new("/dev/ttyACM0");
        let result = transport.write_all(&[1, 2, 3]).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "Transport error: Transport has not been opened."
        );
    }

    #[tokio::test]
    async fn test_read_requires_open() {
        let mut transport = Serial::new("/dev/ttyACM0");
        assert!(transport.read().await.is_err());
    }

    #[tokio::test]
    async fn test_read_end_of_stream() {
        // A port in error ends the reader thread: reads then report EOF.
        let mut transport = Serial::new("/dev/ttyACM0");
        transport.spawn_reader(Box::new(SerialPortMock::new(ErrorKind::InvalidInput)));
        assert_eq!(transport.read().await.unwrap(), Vec::<u8>::new());
    }

    #[tokio::test]
    async fn test_close_serial_transport() {
        let mut transport = get_test_transport();
        transport.spawn_reader(Box::new(SerialPortMock::new(ErrorKind::InvalidInput)));
        assert!(transport.close().await.is_ok());
        assert!(transport.io.lock().is_none());
        assert!(transport.incoming.is_none());
        assert!(transport.halted.load(Ordering::SeqCst));
    }

    #[test]
    fn test_from_serial_error() {
        let serial_error = serialport::Error {
            kind: ErrorKind::Unknown,
            description: String::from("test error"),
        };
        let custom_error: Error = serial_error.into();
        assert_eq!(custom_error.to_string(), "Transport error: test error.");

        let serial_error = serialport::Error {
            kind: ErrorKind::Io(std::io::ErrorKind::NotFound),
            description: String::from("IO error"),
        };
        let custom_error: Error = serial_error.into();
        assert_eq!(
            custom_error.to_string(),
            "Transport error: Port not found or already in use."
        );

        let serial_error = serialport::Error {
            kind: ErrorKind::Io(std::io::ErrorKind::Other),
            description: String::from("IO error"),
        };
        let custom_error: Error = serial_error.into();
        assert_eq!(custom_error.to_string(), "Transport error: IO error.");
    }

    #[test]
    fn test_display_serial_transport() {
        let transport = Serial::new("/dev/ttyACM0");
        assert_eq!(format!("{}", transport), "Serial(/dev/ttyACM0)");
    }
}
