use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::errors::HardwareError::{ModeNotSet, UnknownPin};
use crate::errors::*;
use crate::io::codec::Message;

/// Signature of a pin-change callback: a closure returning a boxed future,
/// stored in the pin's single callback slot.
pub type PinCallback = Arc<dyn Fn(PinEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Notification payload handed to pin callbacks when a report changes a value.
#[derive(Clone, Debug, PartialEq)]
pub struct PinEvent {
    /// Address the report targeted (digital pin or analog channel).
    pub address: PinAddress,
    /// The new value.
    pub value: u16,
}

/// Canonical state of every pin reported by the board.
///
/// The registry is populated once, from the capability response received
/// during the handshake, and the pin set never changes afterward. It performs
/// no I/O: the engine feeds decoded reports in via [`PinRegistry::apply_report`]
/// and reads pins back when encoding commands.
#[derive(Clone, Default)]
pub struct PinRegistry {
    /// All pins, indexed by their absolute id from the capability response.
    pub pins: Vec<Pin>,
    /// Analog channel number to absolute pin id.
    pub channels: Vec<u8>,
    /// A string indicating the version of the protocol.
    pub protocol_version: String,
    /// A string representing the name of the firmware.
    pub firmware_name: String,
    /// A string representing the version of the firmware.
    pub firmware_version: String,
}

impl PinRegistry {
    /// Builds the pin table from a decoded capability response.
    ///
    /// Every pin whose capability set contains [`PinModeId::ANALOG`] is
    /// assigned the next analog channel, in pin order; an analog mapping
    /// response can refine this later (see [`PinRegistry::apply_analog_mapping`]).
    pub fn populate(&mut self, capabilities: &[Vec<PinMode>]) {
        self.pins = Vec::with_capacity(capabilities.len());
        self.channels = vec![];
        for (id, supported_modes) in capabilities.iter().enumerate() {
            let id = id as u8;
            let channel = match supported_modes.iter().any(|m| m.id == PinModeId::ANALOG) {
                true => {
                    self.channels.push(id);
                    Some((self.channels.len() - 1) as u8)
                }
                false => None,
            };
            self.pins.push(Pin {
                id,
                name: match channel {
                    Some(channel) => format!("A{}", channel),
                    None => format!("D{}", id),
                },
                mode: None,
                supported_modes: supported_modes.clone(),
                channel,
                value: 0,
                reporting: false,
                callback: None,
            });
        }
    }

    /// Replaces the inferred channel table with the board's authoritative
    /// analog mapping (127 entries mark pins with no channel).
    pub fn apply_analog_mapping(&mut self, mapping: &[Option<u8>]) {
        let mut channels: Vec<u8> = vec![];
        for pin in self.pins.iter_mut() {
            pin.channel = None;
            pin.name = format!("D{}", pin.id);
        }
        for (id, entry) in mapping.iter().enumerate() {
            let (Some(channel), Some(pin)) = (entry, self.pins.get_mut(id)) else {
                continue;
            };
            pin.channel = Some(*channel);
            pin.name = format!("A{}", channel);
            if channels.len() <= *channel as usize {
                channels.resize(*channel as usize + 1, u8::MAX);
            }
            channels[*channel as usize] = pin.id;
        }
        self.channels = channels;
    }

    /// Retrieves a reference to a pin by address.
    ///
    /// # Errors
    /// * `UnknownPin` - the digital index or analog channel does not exist.
    pub fn get_pin(&self, address: PinAddress) -> Result<&Pin, Error> {
        let id = self.resolve(address)?;
        self.pins
            .get(id as usize)
            .ok_or(Error::from(UnknownPin { address }))
    }

    /// Retrieves a mutable reference to a pin by address.
    ///
    /// # Errors
    /// * `UnknownPin` - the digital index or analog channel does not exist.
    pub fn get_pin_mut(&mut self, address: PinAddress) -> Result<&mut Pin, Error> {
        let id = self.resolve(address)?;
        self.pins
            .get_mut(id as usize)
            .ok_or(Error::from(UnknownPin { address }))
    }

    /// Resolves an address to the absolute pin id used on the wire.
    pub fn resolve(&self, address: PinAddress) -> Result<u8, Error> {
        let id = match address {
            PinAddress::Digital(id) => id,
            PinAddress::Analog(channel) => *self
                .channels
                .get(channel as usize)
                .filter(|id| **id != u8::MAX)
                .ok_or(Error::from(UnknownPin { address }))?,
        };
        match (id as usize) < self.pins.len() {
            true => Ok(id),
            false => Err(Error::from(UnknownPin { address })),
        }
    }

    /// Applies a decoded report to the pin table.
    ///
    /// Returns one [`PinEvent`] per pin whose value actually changed; an empty
    /// list means the report carried nothing new and no callback should fire.
    /// Updates are atomic per message: the registry is never observed with a
    /// report partially applied.
    pub fn apply_report(&mut self, message: &Message) -> Vec<PinEvent> {
        let mut changes = vec![];
        match message {
            Message::DigitalPortReport { port, bits } => {
                for i in 0..8u8 {
                    let id = port * 8 + i;
                    let Some(pin) = self.pins.get_mut(id as usize) else {
                        continue;
                    };
                    // Only pins driven by the board report digital values:
                    // locally written output values stay authoritative.
                    if !matches!(
                        pin.mode,
                        Some(PinMode {
                            id: PinModeId::INPUT | PinModeId::PULLUP,
                            ..
                        })
                    ) {
                        continue;
                    }
                    let value = ((bits >> i) & 1) as u16;
                    if pin.value != value {
                        pin.value = value;
                        changes.push(PinEvent {
                            address: PinAddress::Digital(id),
                            value,
                        });
                    }
                }
            }
            Message::AnalogReport { channel, value } => {
                if let Ok(pin) = self.get_pin_mut(PinAddress::Analog(*channel)) {
                    if pin.value != *value {
                        pin.value = *value;
                        changes.push(PinEvent {
                            address: PinAddress::Analog(*channel),
                            value: *value,
                        });
                    }
                }
            }
            Message::PinStateResponse { pin, mode, value } => {
                if let Some(pin) = self.pins.get_mut(*pin as usize) {
                    if let Some(supported) = pin.supports_mode(*mode) {
                        pin.mode = Some(supported);
                    }
                    // The wire can carry up to 28 bits of state: saturate.
                    let value = (*value).min(u16::MAX as u32) as u16;
                    if pin.value != value {
                        pin.value = value;
                        let address = match (pin.mode.map(|m| m.id), pin.channel) {
                            (Some(PinModeId::ANALOG), Some(channel)) => {
                                PinAddress::Analog(channel)
                            }
                            _ => PinAddress::Digital(pin.id),
                        };
                        changes.push(PinEvent { address, value });
                    }
                }
            }
            _ => {}
        }
        changes
    }

    /// Stores (or clears) the callback slot of a pin. Overwriting replaces the
    /// previous handler.
    pub fn set_callback(
        &mut self,
        address: PinAddress,
        callback: Option<PinCallback>,
    ) -> Result<(), Error> {
        self.get_pin_mut(address)?.callback = callback;
        Ok(())
    }

    /// Records the protocol version reported by the board.
    pub fn set_protocol_version(&mut self, major: u8, minor: u8) {
        self.protocol_version = format!("{}.{}", major, minor);
    }

    /// Records the firmware name and version reported by the board.
    pub fn set_firmware(&mut self, major: u8, minor: u8, name: &str) {
        self.firmware_name = String::from(name);
        self.firmware_version = format!("{}.{}", major, minor);
    }
}

impl Debug for PinRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinRegistry")
            .field("pins", &self.pins)
            .field("channels", &self.channels)
            .field("protocol_version", &self.protocol_version)
            .field("firmware_name", &self.firmware_name)
            .field("firmware_version", &self.firmware_version)
            .finish()
    }
}

// ########################################

/// Represents the current state and configuration of a pin.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Default)]
pub struct Pin {
    /// The pin ID: the absolute index reported in the capability response.
    pub id: u8,
    /// The pin name: an alternative String representation of the pin: 'D13', 'A0' for instance.
    pub name: String,
    /// Currently configured mode; `None` until a mode command has been issued.
    pub mode: Option<PinMode>,
    /// All pin supported modes.
    pub supported_modes: Vec<PinMode>,
    /// For analog pin, this is the channel number ie "A0"=>0, "A1"=>1, etc...
    pub channel: Option<u8>,
    /// Pin value.
    pub value: u16,
    /// Whether the board was asked to stream reports for this pin.
    pub reporting: bool,
    /// Single-slot change handler.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub callback: Option<PinCallback>,
}

impl Pin {
    /// Verifies if a pin supports the given mode and returns it if it does.
    ///
    /// # Returns
    /// * `None` if the mode is not supported.
    /// * `PinMode` the `PinMode` configuration if supported
    pub fn supports_mode(&self, mode: PinModeId) -> Option<PinMode> {
        self.supported_modes.iter().find(|m| m.id == mode).copied()
    }

    /// Returns the configured mode, or `ModeNotSet` when no mode command was
    /// ever issued for this pin.
    pub fn require_mode(&self, operation: &'static str) -> Result<PinMode, Error> {
        self.mode.ok_or(Error::from(ModeNotSet {
            address: self.address(),
            operation,
        }))
    }

    /// The canonical address of this pin: its analog channel when it has one,
    /// its digital index otherwise.
    pub fn address(&self) -> PinAddress {
        match self.channel {
            Some(channel) => PinAddress::Analog(channel),
            None => PinAddress::Digital(self.id),
        }
    }
}

impl Debug for Pin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mode_str = match self.mode {
            Some(mode) => format!("{}", mode),
            None => String::from("(not set)"),
        };

        let mut debug_struct = f.debug_struct("Pin");
        debug_struct
            .field("id", &self.id)
            .field("name", &self.name)
            .field("mode", &mode_str)
            .field("supported modes", &self.supported_modes);
        if let Some(channel) = self.channel {
            debug_struct.field("channel", &channel);
        } else {
            debug_struct.field("channel", &None::<u8>);
        }
        debug_struct
            .field("value", &self.value)
            .field("reporting", &self.reporting)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

// ########################################

/// Addresses a pin by kind: a digital index or an analog channel.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum PinAddress {
    Digital(u8),
    Analog(u8),
}

impl Display for PinAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PinAddress::Digital(id) => write!(f, "D{}", id),
            PinAddress::Analog(channel) => write!(f, "A{}", channel),
        }
    }
}

/// A bare number addresses a pin by its digital index.
impl From<u8> for PinAddress {
    fn from(id: u8) -> Self {
        PinAddress::Digital(id)
    }
}

// ########################################

/// Represents a mode configuration for a pin.
///
/// # Fields
/// - `id`: The ID of the mode.
/// - `resolution`: The resolution (number of bits) this mode uses.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Default, PartialEq)]
pub struct PinMode {
    /// Currently configured mode.
    pub id: PinModeId,
    /// Resolution (number of bits) this mode uses.
    pub resolution: u8,
}

impl PinMode {
    /// Get the max value this pinMode can reach according to its resolution.
    ///
    /// The resolution byte comes unchecked from the capability response:
    /// anything past 16 bits of range saturates to `u16::MAX`.
    pub fn get_max_possible_value(&self) -> u16 {
        match 1u32.checked_shl(u32::from(self.resolution)) {
            Some(limit) => (limit - 1).min(u16::MAX as u32) as u16,
            None => u16::MAX,
        }
    }
}

impl Display for PinMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl Debug for PinMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.id {
            PinModeId::UNSUPPORTED => write!(f, "[{}]", self.id),
            _ => write!(f, "[id: {}, resolution: {}]", self.id, self.resolution),
        }
    }
}

// ########################################

/// Enumerates the possible modes for a pin.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[repr(u8)]
pub enum PinModeId {
    /// Same as INPUT defined in Arduino.h
    INPUT = 0,
    /// Same as OUTPUT defined in Arduino.h
    OUTPUT = 1,
    /// Analog pin in analogInput mode
    ANALOG = 2,
    /// Digital pin in PWM output mode
    PWM = 3,
    /// Digital pin in Servo output mode
    SERVO = 4,
    /// shiftIn/shiftOut mode
    SHIFT = 5,
    /// Pin included in I2C setup
    I2C = 6,
    /// Pin configured for 1-wire
    ONEWIRE = 7,
    /// Pin configured for stepper motor
    STEPPER = 8,
    /// Pin configured for rotary encoders
    ENCODER = 9,
    /// Pin configured for serial communication
    SERIAL = 0x0A,
    /// Enable internal pull-up resistor for pin
    PULLUP = 0x0B,
    /// Pin configured for SPI
    SPI = 0x0C,
    /// Pin configured for proximity sensors
    SONAR = 0x0D,
    /// Pin configured for piezzo buzzer tone generation
    TONE = 0x0E,
    /// Pin configured for DHT humidity and temperature sensors
    DHT = 0x0F,
    /// Pin configured to be ignored by digitalWrite and capabilityResponse
    #[default]
    UNSUPPORTED = 0x7F,
}

impl PinModeId {
    /// Converts a `u8` byte value into a `PinModeId`.
    ///
    /// # Errors
    /// * `UnknownPinMode`: The value does not match any known pin mode.
    pub fn from_u8(value: u8) -> Result<PinModeId, ProtocolError> {
        match value {
            0 => Ok(PinModeId::INPUT),
            1 => Ok(PinModeId::OUTPUT),
            2 => Ok(PinModeId::ANALOG),
            3 => Ok(PinModeId::PWM),
            4 => Ok(PinModeId::SERVO),
            5 => Ok(PinModeId::SHIFT),
            6 => Ok(PinModeId::I2C),
            7 => Ok(PinModeId::ONEWIRE),
            8 => Ok(PinModeId::STEPPER),
            9 => Ok(PinModeId::ENCODER),
            0x0A => Ok(PinModeId::SERIAL),
            0x0B => Ok(PinModeId::PULLUP),
            0x0C => Ok(PinModeId::SPI),
            0x0D => Ok(PinModeId::SONAR),
            0x0E => Ok(PinModeId::TONE),
            0x0F => Ok(PinModeId::DHT),
            0x7F => Ok(PinModeId::UNSUPPORTED),
            x => Err(ProtocolError::UnknownPinMode { value: x }),
        }
    }
}

impl From<PinModeId> for u8 {
    fn from(mode: PinModeId) -> u8 {
        mode as u8
    }
}

impl Display for PinModeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
