use std::io::{Read, Write};
use std::time::Duration;

use serialport::{
    ClearBuffer, DataBits, Error, ErrorKind, FlowControl, Parity, SerialPort, StopBits,
};

/// Fake serial handle: every call succeeds unless the mock was built with an
/// error kind, in which case every call fails with it.
#[derive(Debug, Default, Clone)]
pub struct SerialPortMock {
    error: Option<Error>,
}

impl SerialPortMock {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            error: Some(Error::new(kind, "Mock error reason")),
        }
    }

    fn outcome<T>(&self, value: T) -> serialport::Result<T> {
        match &self.error {
            None => Ok(value),
            Some(error) => Err(error.clone()),
        }
    }

    fn io_outcome<T>(&self, value: T) -> std::io::Result<T> {
        match &self.error {
            None => Ok(value),
            Some(_) => Err(std::io::Error::from(std::io::ErrorKind::InvalidData)),
        }
    }
}

impl SerialPort for SerialPortMock {
    fn name(&self) -> Option<String> {
        Some(String::from("SerialPortMock"))
    }

    fn baud_rate(&self) -> serialport::Result<u32> {
        self.outcome(57_600)
    }

    fn data_bits(&self) -> serialport::Result<DataBits> {
        self.outcome(DataBits::Eight)
    }

    fn flow_control(&self) -> serialport::Result<FlowControl> {
        self.outcome(FlowControl::None)
    }

    fn parity(&self) -> serialport::Result<Parity> {
        self.outcome(Parity::None)
    }

    fn stop_bits(&self) -> serialport::Result<StopBits> {
        self.outcome(StopBits::One)
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(100)
    }

    fn set_baud_rate(&mut self, _: u32) -> serialport::Result<()> {
        self.outcome(())
    }

    fn set_data_bits(&mut self, _: DataBits) -> serialport::Result<()> {
        self.outcome(())
    }

    fn set_flow_control(&mut self, _: FlowControl) -> serialport::Result<()> {
        self.outcome(())
    }

    fn set_parity(&mut self, _: Parity) -> serialport::Result<()> {
        self.outcome(())
    }

    fn set_stop_bits(&mut self, _: StopBits) -> serialport::Result<()> {
        self.outcome(())
    }

    fn set_timeout(&mut self, _: Duration) -> serialport::Result<()> {
        self.outcome(())
    }

    fn write_request_to_send(&mut self, _: bool) -> serialport::Result<()> {
        self.outcome(())
    }

    fn write_data_terminal_ready(&mut self, _: bool) -> serialport::Result<()> {
        self.outcome(())
    }

    fn read_clear_to_send(&mut self) -> serialport::Result<bool> {
        self.outcome(true)
    }

    fn read_data_set_ready(&mut self) -> serialport::Result<bool> {
        self.outcome(true)
    }

    fn read_ring_indicator(&mut self) -> serialport::Result<bool> {
        self.outcome(true)
    }

    fn read_carrier_detect(&mut self) -> serialport::Result<bool> {
        self.outcome(true)
    }

    fn bytes_to_read(&self) -> serialport::Result<u32> {
        self.outcome(0)
    }

    fn bytes_to_write(&self) -> serialport::Result<u32> {
        self.outcome(0)
    }

    fn clear(&self, _: ClearBuffer) -> serialport::Result<()> {
        self.outcome(())
    }

    fn try_clone(&self) -> serialport::Result<Box<dyn SerialPort>> {
        self.outcome(Box::new(self.clone()) as Box<dyn SerialPort>)
    }

    fn set_break(&self) -> serialport::Result<()> {
        self.outcome(())
    }

    fn clear_break(&self) -> serialport::Result<()> {
        self.outcome(())
    }
}

impl Read for SerialPortMock {
    fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
        match &self.error {
            // A healthy line with no traffic: the port timeout elapses.
            None => Err(std::io::Error::from(std::io::ErrorKind::TimedOut)),
            Some(_) => Err(std::io::Error::from(std::io::ErrorKind::InvalidData)),
        }
    }
}

impl Write for SerialPortMock {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.io_outcome(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.io_outcome(())
    }
}
