//! Firmata protocol constants

// ########################################
// Message command bytes (128-255/0x80-0xFF)

/// Send data for a digital port (collection of 8 pins)
pub const DIGITAL_MESSAGE: u8 = 0x90;
/// Digital message input range upper byte bound
pub const DIGITAL_MESSAGE_BOUND: u8 = 0x9F;
/// Send data for an analog pin (or PWM)
pub const ANALOG_MESSAGE: u8 = 0xE0;
/// Analog message input range upper byte bound
pub const ANALOG_MESSAGE_BOUND: u8 = 0xEF;
/// Enable analog input by pin #
pub const REPORT_ANALOG: u8 = 0xC0;
/// Report analog input range upper byte bound
pub const REPORT_ANALOG_BOUND: u8 = 0xCF;
/// Enable digital input by port pair
pub const REPORT_DIGITAL: u8 = 0xD0;
/// Report digital input range upper byte bound
pub const REPORT_DIGITAL_BOUND: u8 = 0xDF;
//
/// Set a pin to INPUT/OUTPUT/PWM/etc
pub const SET_PIN_MODE: u8 = 0xF4;
/// Set value of an individual digital pin
pub const SET_DIGITAL_PIN_VALUE: u8 = 0xF5;
//
/// Report protocol version
pub const REPORT_VERSION: u8 = 0xF9;
/// Reset from MIDI
pub const SYSTEM_RESET: u8 = 0xFF;
//
/// Start a MIDI Sysex message
pub const START_SYSEX: u8 = 0xF0;
/// End a MIDI Sysex message
pub const END_SYSEX: u8 = 0xF7;

// Extended command set using sysex (0-127/0x00-0x7F)

/// Ask for mapping of analog to pin numbers
pub const ANALOG_MAPPING_QUERY: u8 = 0x69;
/// Reply with mapping info
pub const ANALOG_MAPPING_RESPONSE: u8 = 0x6A;
/// Ask for supported modes and resolution of all pins
pub const CAPABILITY_QUERY: u8 = 0x6B;
/// Reply with supported modes and resolution
pub const CAPABILITY_RESPONSE: u8 = 0x6C;
/// Ask for a pin's current mode and value
pub const PIN_STATE_QUERY: u8 = 0x6D;
/// Reply with pin's current mode and value
pub const PIN_STATE_RESPONSE: u8 = 0x6E;
/// Analog write (PWM, Servo, etc) to any pin
pub const EXTENDED_ANALOG: u8 = 0x6F;
/// String message with 14-bits per char
pub const STRING_DATA: u8 = 0x71;
/// Report name and version of the firmware
pub const REPORT_FIRMWARE: u8 = 0x79;
/// Set the poll rate of the main loop
pub const SAMPLING_INTERVAL: u8 = 0x7A;
/// MIDI Reserved for realtime messages (capability list terminator)
pub const SYSEX_REALTIME: u8 = 0x7F;

// Other values

/// Largest accepted sysex payload; a sysex running past this without its
/// terminator is treated as line noise.
pub const MAX_SYSEX_BYTES: usize = 4096;
/// Sentinel in an analog mapping response marking a pin with no analog channel.
pub const NOT_ANALOG: u8 = 0x7F;
