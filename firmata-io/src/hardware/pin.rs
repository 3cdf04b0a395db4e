use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::{Arc, Weak};

use crate::errors::Error;
use crate::errors::HardwareError::{ChannelOutOfRange, IncompatibleMode};
use crate::io::engine::{Command, EngineShared};
use crate::io::{BoardState, Pin, PinAddress, PinCallback, PinEvent, PinMode, PinModeId};

/// Handle on one pin of a connected [`Board`](crate::hardware::Board).
///
/// Cheap to clone. Holds only a weak reference to the session: a handle kept
/// around after its board is gone fails with [`Error::Closed`] instead of
/// keeping the engine alive.
///
/// Every command validates locally against the capability response before
/// anything is sent: an invalid request leaves the wire untouched.
#[derive(Clone, Debug)]
pub struct PinHandle {
    shared: Weak<EngineShared>,
    address: PinAddress,
}

impl PinHandle {
    pub(crate) fn new(shared: Weak<EngineShared>, address: PinAddress) -> Self {
        Self { shared, address }
    }

    fn shared(&self) -> Result<Arc<EngineShared>, Error> {
        self.shared.upgrade().ok_or(Error::Closed)
    }

    /// Upgrades the session reference and checks commands are accepted.
    fn ready(&self, operation: &'static str) -> Result<Arc<EngineShared>, Error> {
        let shared = self.shared()?;
        let state = *shared.state.read();
        match state {
            BoardState::Ready => Ok(shared),
            _ => Err(Error::NotReady { operation, state }),
        }
    }

    /// The address this handle was created with.
    pub fn address(&self) -> PinAddress {
        self.address
    }

    /// Snapshot of the pin as last seen: mode, value, reporting flag.
    pub fn pin(&self) -> Result<Pin, Error> {
        Ok(self.shared()?.registry.read().get_pin(self.address)?.clone())
    }

    /// Last value seen for this pin, written or reported.
    pub fn value(&self) -> Result<u16, Error> {
        Ok(self.pin()?.value)
    }

    /// Currently configured mode; `None` until [`PinHandle::pin_mode`] ran.
    pub fn mode(&self) -> Result<Option<PinMode>, Error> {
        Ok(self.pin()?.mode)
    }

    /// Configures the pin mode.
    ///
    /// The mode must be one the board advertised for this pin in its
    /// capability response, otherwise the call fails and nothing is sent.
    pub async fn pin_mode(&self, mode: PinModeId) -> Result<(), Error> {
        let shared = self.ready("pin_mode")?;
        let pin = {
            let registry = shared.registry.read();
            let pin = registry.get_pin(self.address)?;
            if pin.supports_mode(mode).is_none() {
                return Err(IncompatibleMode {
                    address: pin.address(),
                    mode,
                    context: "not in the capability response",
                }
                .into());
            }
            pin.id
        };
        shared
            .run_command("pin_mode", |completion| Command::SetMode {
                pin,
                mode,
                completion,
            })
            .await
    }

    /// Writes a digital level to the pin.
    ///
    /// A mode must have been configured first: writing to a pin that never
    /// got [`PinHandle::pin_mode`] fails and nothing is sent.
    pub async fn digital_write(&self, state: bool) -> Result<(), Error> {
        let shared = self.ready("digital_write")?;
        let pin = {
            let registry = shared.registry.read();
            let pin = registry.get_pin(self.address)?;
            pin.require_mode("digital_write")?;
            pin.id
        };
        shared
            .run_command("digital_write", |completion| Command::DigitalWrite {
                pin,
                state,
                completion,
            })
            .await
    }

    /// Writes an analog level (PWM duty, servo position, ...) to the pin.
    ///
    /// The value is clamped to the maximum the configured mode resolution
    /// allows: 255 for an 8 bit PWM pin for instance.
    pub async fn analog_write(&self, value: u16) -> Result<(), Error> {
        let shared = self.ready("analog_write")?;
        let (pin, value) = {
            let registry = shared.registry.read();
            let pin = registry.get_pin(self.address)?;
            let mode = pin.require_mode("analog_write")?;
            (pin.id, value.min(mode.get_max_possible_value()))
        };
        shared
            .run_command("analog_write", |completion| Command::AnalogWrite {
                pin,
                value,
                completion,
            })
            .await
    }

    /// Starts or stops value reports for this pin.
    ///
    /// A pin in ANALOG mode is reported through its analog channel. Any
    /// other mode goes through its digital port: the board then streams the
    /// whole port, which neighbour pins of the same port will observe.
    /// Channels above 15 cannot be addressed by the report command and are
    /// refused.
    pub async fn set_reporting(&self, state: bool) -> Result<(), Error> {
        let shared = self.ready("set_reporting")?;
        let address = {
            let registry = shared.registry.read();
            let pin = registry.get_pin(self.address)?;
            let mode = pin.require_mode("set_reporting")?;
            match (mode.id, pin.channel) {
                (PinModeId::ANALOG, Some(channel)) => {
                    // REPORT_ANALOG carries the channel in its low nibble.
                    if channel > 0x0F {
                        return Err(ChannelOutOfRange { channel }.into());
                    }
                    PinAddress::Analog(channel)
                }
                _ => PinAddress::Digital(pin.id),
            }
        };
        shared
            .run_command("set_reporting", |completion| Command::SetReporting {
                address,
                state,
                completion,
            })
            .await
    }

    /// Installs the change handler for this pin, replacing any previous one.
    ///
    /// The handler fires once per value change, in arrival order, from a
    /// dispatcher task: it may freely call back into the board.
    ///
    /// # Example
    /// ```no_run
    /// use firmata_io::hardware::Board;
    /// use firmata_io::io::PinModeId;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let board = Board::default().setup().await?;
    ///     let button = board.pin(2)?;
    ///     button.pin_mode(PinModeId::INPUT).await?;
    ///     button
    ///         .set_callback(|event| async move {
    ///             println!("button is now {}", event.value);
    ///         })
    ///         .await?;
    ///     button.set_reporting(true).await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn set_callback<F, Fut>(&self, callback: F) -> Result<(), Error>
    where
        F: Fn(PinEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let shared = self.ready("set_callback")?;
        let address = self.address;
        let callback: PinCallback = Arc::new(move |event| Box::pin(callback(event)));
        shared
            .run_command("set_callback", |completion| Command::SetCallback {
                address,
                callback: Some(callback),
                completion,
            })
            .await
    }

    /// Removes the change handler for this pin.
    pub async fn clear_callback(&self) -> Result<(), Error> {
        let shared = self.ready("clear_callback")?;
        let address = self.address;
        shared
            .run_command("clear_callback", |completion| Command::SetCallback {
                address,
                callback: None,
                completion,
            })
            .await
    }

    /// Asks the board for the authoritative mode and value of this pin. The
    /// snapshot refreshes when the response arrives.
    pub async fn query_state(&self) -> Result<(), Error> {
        let shared = self.ready("query_state")?;
        let pin = shared.registry.read().resolve(self.address)?;
        shared
            .run_command("query_state", |completion| Command::QueryState {
                pin,
                completion,
            })
            .await
    }
}

impl Display for PinHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Pin ({})", self.address)
    }
}
