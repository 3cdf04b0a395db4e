use log::error;
use snafu::Snafu;

pub use crate::errors::Error::*;
use crate::errors::TransportError::{Disconnected, IoException};
use crate::io::{BoardState, PinAddress, PinModeId};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Transport error: {source}.
    TransportError { source: TransportError },
    /// Protocol error: {source}.
    ProtocolError { source: ProtocolError },
    /// Hardware error: {source}.
    HardwareError { source: HardwareError },
    /// Handshake error: the board did not complete its handshake within the allowed budget.
    HandshakeTimeout,
    /// Board not ready: '{operation}' attempted while {state}.
    NotReady {
        operation: &'static str,
        state: BoardState,
    },
    /// Connection has been closed.
    Closed,
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        error!("std::io error {:?}", error);
        let source = match error.kind() {
            std::io::ErrorKind::NotFound => IoException {
                info: String::from("Port not found or already in use"),
            },
            std::io::ErrorKind::PermissionDenied => IoException {
                info: String::from("Port access denied"),
            },
            std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::UnexpectedEof => Disconnected,
            _ => IoException {
                info: error.to_string(),
            },
        };
        Self::TransportError { source }
    }
}

impl From<TransportError> for Error {
    fn from(value: TransportError) -> Self {
        Self::TransportError { source: value }
    }
}

impl From<ProtocolError> for Error {
    fn from(value: ProtocolError) -> Self {
        Self::ProtocolError { source: value }
    }
}

impl From<HardwareError> for Error {
    fn from(value: HardwareError) -> Self {
        Self::HardwareError { source: value }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TransportError {
    /// {info}
    IoException { info: String },
    /// Transport has not been opened
    NotOpen,
    /// Connection lost
    Disconnected,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProtocolError {
    /// Unrecognized byte (0x{byte:02X}) in incoming stream
    UnexpectedByte { byte: u8 },
    /// Sysex message exceeded {limit} bytes without terminator
    SysexOverflow { limit: usize },
    /// Not enough bytes received - '{operation}' expected {expected} bytes, {received} received
    MessageTooShort {
        operation: &'static str,
        expected: usize,
        received: usize,
    },
    /// Unknown pin mode ({value})
    UnknownPinMode { value: u8 },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum HardwareError {
    /// Pin ({address}) mode has never been set - '{operation}' requires it
    ModeNotSet {
        address: PinAddress,
        operation: &'static str,
    },
    /// Pin ({address}) not compatible with mode ({mode}) - {context}
    IncompatibleMode {
        address: PinAddress,
        mode: PinModeId,
        context: &'static str,
    },
    /// Analog channel ({channel}) is outside the addressable range (0-15)
    ChannelOutOfRange { channel: u8 },
    /// Unknown pin ({address})
    UnknownPin { address: PinAddress },
}
