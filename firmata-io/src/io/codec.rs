//! Firmata wire codec: stateless mapping between bytes and [`Message`] values.
//!
//! Official Firmata documentation: <https://github.com/firmata/protocol>
//! Helper unofficial documentation: <https://github.com/martin-eden/firmata_protocol/blob/main/protocol.md>

use crate::errors::ProtocolError;
use crate::io::constants::*;
use crate::io::registry::{PinMode, PinModeId};

/// A Firmata message, either direction.
///
/// Values wider than 7 bits travel split over several payload bytes
/// (`lsb | msb << 7`); the codec reassembles them so the rest of the crate
/// only ever sees plain integers.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    // ########################################
    // Reports (board to host).
    /// REPORT_VERSION response: protocol version implemented by the firmware.
    ProtocolVersion { major: u8, minor: u8 },
    /// DIGITAL_MESSAGE: packed values of the 8 pins of one port. The same
    /// bytes serve as a write when the host sends them.
    DigitalPortReport { port: u8, bits: u8 },
    /// ANALOG_MESSAGE report: current value of an analog channel.
    AnalogReport { channel: u8, value: u16 },
    /// REPORT_FIRMWARE response: firmware version and name.
    FirmwareReport { major: u8, minor: u8, name: String },
    /// CAPABILITY_RESPONSE: supported (mode, resolution) pairs, one list per pin.
    CapabilityResponse { pins: Vec<Vec<PinMode>> },
    /// ANALOG_MAPPING_RESPONSE: analog channel per pin, `None` for digital-only pins.
    AnalogMappingResponse { channels: Vec<Option<u8>> },
    /// PIN_STATE_RESPONSE: current mode and state of one pin.
    PinStateResponse { pin: u8, mode: PinModeId, value: u32 },
    /// STRING_DATA: free-form text from the firmware (diagnostics mostly).
    StringData { text: String },

    // ########################################
    // Commands (host to board).
    /// SET_PIN_MODE command.
    SetPinMode { pin: u8, mode: PinModeId },
    /// SET_DIGITAL_PIN_VALUE command: drive one pin without repacking its port.
    SetDigitalPinValue { pin: u8, state: bool },
    /// ANALOG_MESSAGE command (or EXTENDED_ANALOG sysex for pin >= 16).
    AnalogWrite { pin: u8, value: u16 },
    /// REPORT_ANALOG command: toggle streaming for an analog channel.
    ReportAnalog { channel: u8, state: bool },
    /// REPORT_DIGITAL command: toggle streaming for a whole digital port.
    ReportDigital { port: u8, state: bool },
    /// SAMPLING_INTERVAL command: board main loop poll rate, in milliseconds.
    SamplingInterval { interval: u16 },
    /// SYSTEM_RESET command.
    SystemReset,
    /// REPORT_VERSION query (a bare `0xF9`).
    VersionQuery,
    /// REPORT_FIRMWARE query.
    FirmwareQuery,
    /// CAPABILITY_QUERY.
    CapabilityQuery,
    /// ANALOG_MAPPING_QUERY.
    AnalogMappingQuery,
    /// PIN_STATE_QUERY for one pin.
    PinStateQuery { pin: u8 },
}

/// Attempts to decode one message from the head of `buffer`.
///
/// The buffer is append-only from the caller's point of view: this function
/// never blocks and never looks past the first complete message.
///
/// # Returns
/// * `Ok((Some(message), n))` - one message recognized, `n` bytes consumed.
/// * `Ok((None, 0))` - the head holds the beginning of a valid message whose
///   remaining bytes have not arrived yet; keep accumulating.
/// * `Ok((None, n))` with `n > 0` - a well-framed sysex this client has no use
///   for; skip it and continue.
///
/// # Errors
/// * `UnexpectedByte` - the leading byte matches no known command. The caller
///   decides how to resynchronize (dropping one byte and retrying tolerates
///   transient line noise).
/// * `SysexOverflow` - a sysex ran past [`MAX_SYSEX_BYTES`] without its
///   terminator.
/// * `MessageTooShort` / `UnknownPinMode` - a complete frame carried a
///   malformed payload. Nothing is consumed.
pub fn decode_next(buffer: &[u8]) -> Result<(Option<Message>, usize), ProtocolError> {
    let Some(&lead) = buffer.first() else {
        return Ok((None, 0));
    };
    match lead {
        DIGITAL_MESSAGE..=DIGITAL_MESSAGE_BOUND => {
            if buffer.len() < 3 {
                return Ok((None, 0));
            }
            let value = (buffer[1] as u16) | ((buffer[2] as u16) << 7);
            let message = Message::DigitalPortReport {
                port: lead & 0x0F,
                bits: value as u8,
            };
            Ok((Some(message), 3))
        }
        ANALOG_MESSAGE..=ANALOG_MESSAGE_BOUND => {
            if buffer.len() < 3 {
                return Ok((None, 0));
            }
            let message = Message::AnalogReport {
                channel: lead & 0x0F,
                value: (buffer[1] as u16) | ((buffer[2] as u16) << 7),
            };
            Ok((Some(message), 3))
        }
        REPORT_ANALOG..=REPORT_ANALOG_BOUND => {
            if buffer.len() < 2 {
                return Ok((None, 0));
            }
            let message = Message::ReportAnalog {
                channel: lead & 0x0F,
                state: buffer[1] != 0,
            };
            Ok((Some(message), 2))
        }
        REPORT_DIGITAL..=REPORT_DIGITAL_BOUND => {
            if buffer.len() < 2 {
                return Ok((None, 0));
            }
            let message = Message::ReportDigital {
                port: lead & 0x0F,
                state: buffer[1] != 0,
            };
            Ok((Some(message), 2))
        }
        SET_PIN_MODE => {
            if buffer.len() < 3 {
                return Ok((None, 0));
            }
            let message = Message::SetPinMode {
                pin: buffer[1],
                mode: PinModeId::from_u8(buffer[2])?,
            };
            Ok((Some(message), 3))
        }
        SET_DIGITAL_PIN_VALUE => {
            if buffer.len() < 3 {
                return Ok((None, 0));
            }
            let message = Message::SetDigitalPinValue {
                pin: buffer[1],
                state: buffer[2] != 0,
            };
            Ok((Some(message), 3))
        }
        REPORT_VERSION => {
            if buffer.len() < 3 {
                return Ok((None, 0));
            }
            let message = Message::ProtocolVersion {
                major: buffer[1],
                minor: buffer[2],
            };
            Ok((Some(message), 3))
        }
        SYSTEM_RESET => Ok((Some(Message::SystemReset), 1)),
        START_SYSEX => decode_sysex_frame(buffer),
        byte => Err(ProtocolError::UnexpectedByte { byte }),
    }
}

/// Renders a message into its exact wire bytes.
pub fn encode(message: &Message) -> Vec<u8> {
    match message {
        Message::ProtocolVersion { major, minor } => vec![REPORT_VERSION, *major, *minor],
        Message::DigitalPortReport { port, bits } => {
            let value = *bits as u16;
            vec![
                DIGITAL_MESSAGE | port,
                value as u8 & SYSEX_REALTIME,
                (value >> 7) as u8 & SYSEX_REALTIME,
            ]
        }
        Message::AnalogReport { channel, value } => vec![
            ANALOG_MESSAGE | channel,
            *value as u8 & SYSEX_REALTIME,
            (value >> 7) as u8 & SYSEX_REALTIME,
        ],
        Message::AnalogWrite { pin, value } => match *pin > 15 {
            true => {
                // Extended analog message
                let mut payload = vec![
                    START_SYSEX,
                    EXTENDED_ANALOG,
                    *pin,
                    *value as u8 & SYSEX_REALTIME,
                    (value >> 7) as u8 & SYSEX_REALTIME,
                ];
                if *value >= 1 << 14 {
                    payload.push((value >> 14) as u8 & SYSEX_REALTIME);
                }
                payload.push(END_SYSEX);
                payload
            }
            false => {
                // Standard analog message
                vec![
                    ANALOG_MESSAGE | pin,
                    *value as u8 & SYSEX_REALTIME,
                    (value >> 7) as u8 & SYSEX_REALTIME,
                ]
            }
        },
        Message::FirmwareReport { major, minor, name } => {
            let mut payload = vec![START_SYSEX, REPORT_FIRMWARE, *major, *minor];
            encode_string(name, &mut payload);
            payload.push(END_SYSEX);
            payload
        }
        Message::CapabilityResponse { pins } => {
            let mut payload = vec![START_SYSEX, CAPABILITY_RESPONSE];
            for modes in pins {
                for mode in modes {
                    payload.push(mode.id as u8);
                    payload.push(mode.resolution);
                }
                payload.push(SYSEX_REALTIME);
            }
            payload.push(END_SYSEX);
            payload
        }
        Message::AnalogMappingResponse { channels } => {
            let mut payload = vec![START_SYSEX, ANALOG_MAPPING_RESPONSE];
            for channel in channels {
                payload.push(channel.unwrap_or(NOT_ANALOG));
            }
            payload.push(END_SYSEX);
            payload
        }
        Message::PinStateResponse { pin, mode, value } => {
            let mut payload = vec![START_SYSEX, PIN_STATE_RESPONSE, *pin, *mode as u8];
            let mut value = *value;
            loop {
                payload.push(value as u8 & SYSEX_REALTIME);
                value >>= 7;
                if value == 0 {
                    break;
                }
            }
            payload.push(END_SYSEX);
            payload
        }
        Message::StringData { text } => {
            let mut payload = vec![START_SYSEX, STRING_DATA];
            encode_string(text, &mut payload);
            payload.push(END_SYSEX);
            payload
        }
        Message::SetPinMode { pin, mode } => vec![SET_PIN_MODE, *pin, *mode as u8],
        Message::SetDigitalPinValue { pin, state } => {
            vec![SET_DIGITAL_PIN_VALUE, *pin, u8::from(*state)]
        }
        Message::ReportAnalog { channel, state } => {
            vec![REPORT_ANALOG | channel, u8::from(*state)]
        }
        Message::ReportDigital { port, state } => vec![REPORT_DIGITAL | port, u8::from(*state)],
        Message::SamplingInterval { interval } => vec![
            START_SYSEX,
            SAMPLING_INTERVAL,
            *interval as u8 & SYSEX_REALTIME,
            (interval >> 7) as u8 & SYSEX_REALTIME,
            END_SYSEX,
        ],
        Message::SystemReset => vec![SYSTEM_RESET],
        Message::VersionQuery => vec![REPORT_VERSION],
        Message::FirmwareQuery => vec![START_SYSEX, REPORT_FIRMWARE, END_SYSEX],
        Message::CapabilityQuery => vec![START_SYSEX, CAPABILITY_QUERY, END_SYSEX],
        Message::AnalogMappingQuery => vec![START_SYSEX, ANALOG_MAPPING_QUERY, END_SYSEX],
        Message::PinStateQuery { pin } => vec![START_SYSEX, PIN_STATE_QUERY, *pin, END_SYSEX],
    }
}

/// Frames one sysex from the buffer head then parses its payload.
/// <https://github.com/firmata/protocol/blob/master/protocol.md#sysex-message-format>
fn decode_sysex_frame(buffer: &[u8]) -> Result<(Option<Message>, usize), ProtocolError> {
    match buffer.iter().position(|&byte| byte == END_SYSEX) {
        None => match buffer.len() > MAX_SYSEX_BYTES {
            true => Err(ProtocolError::SysexOverflow {
                limit: MAX_SYSEX_BYTES,
            }),
            false => Ok((None, 0)),
        },
        Some(end) => Ok((decode_sysex(&buffer[1..end])?, end + 1)),
    }
}

/// Parses a complete sysex payload (start and end markers stripped).
/// Unknown sysex commands yield `None`: well-framed but not ours to handle.
fn decode_sysex(payload: &[u8]) -> Result<Option<Message>, ProtocolError> {
    let Some(&command) = payload.first() else {
        return Ok(None);
    };
    let data = &payload[1..];
    match command {
        REPORT_FIRMWARE => {
            // An empty payload is the host-side query form.
            if data.is_empty() {
                return Ok(Some(Message::FirmwareQuery));
            }
            if data.len() < 2 {
                return Err(ProtocolError::MessageTooShort {
                    operation: "firmware report",
                    expected: 2,
                    received: data.len(),
                });
            }
            Ok(Some(Message::FirmwareReport {
                major: data[0],
                minor: data[1],
                name: decode_string(&data[2..]),
            }))
        }
        CAPABILITY_RESPONSE => Ok(Some(decode_capabilities(data)?)),
        ANALOG_MAPPING_RESPONSE => Ok(Some(Message::AnalogMappingResponse {
            channels: data
                .iter()
                .map(|&byte| match byte {
                    NOT_ANALOG => None,
                    channel => Some(channel),
                })
                .collect(),
        })),
        PIN_STATE_RESPONSE => {
            if data.len() < 2 {
                return Err(ProtocolError::MessageTooShort {
                    operation: "pin state response",
                    expected: 2,
                    received: data.len(),
                });
            }
            // State arrives in 7-bit groups, least significant first.
            let mut value: u32 = 0;
            for (i, byte) in data[2..].iter().take(4).enumerate() {
                value |= u32::from(byte & SYSEX_REALTIME) << (7 * i);
            }
            Ok(Some(Message::PinStateResponse {
                pin: data[0],
                mode: PinModeId::from_u8(data[1])?,
                value,
            }))
        }
        EXTENDED_ANALOG => {
            if data.len() < 2 {
                return Err(ProtocolError::MessageTooShort {
                    operation: "extended analog",
                    expected: 2,
                    received: data.len(),
                });
            }
            let mut value: u32 = 0;
            for (i, byte) in data[1..].iter().take(3).enumerate() {
                value |= u32::from(byte & SYSEX_REALTIME) << (7 * i);
            }
            Ok(Some(Message::AnalogWrite {
                pin: data[0],
                value: value.min(u16::MAX as u32) as u16,
            }))
        }
        SAMPLING_INTERVAL => {
            if data.len() < 2 {
                return Err(ProtocolError::MessageTooShort {
                    operation: "sampling interval",
                    expected: 2,
                    received: data.len(),
                });
            }
            Ok(Some(Message::SamplingInterval {
                interval: (data[0] as u16) | ((data[1] as u16) << 7),
            }))
        }
        STRING_DATA => Ok(Some(Message::StringData {
            text: decode_string(data),
        })),
        CAPABILITY_QUERY => Ok(Some(Message::CapabilityQuery)),
        ANALOG_MAPPING_QUERY => Ok(Some(Message::AnalogMappingQuery)),
        PIN_STATE_QUERY => match data.first() {
            Some(&pin) => Ok(Some(Message::PinStateQuery { pin })),
            None => Err(ProtocolError::MessageTooShort {
                operation: "pin state query",
                expected: 1,
                received: 0,
            }),
        },
        _ => Ok(None),
    }
}

/// Parses the body of a CAPABILITY_RESPONSE: (mode, resolution) pairs per pin,
/// each pin list closed by `0x7F`.
/// <https://github.com/firmata/protocol/blob/master/protocol.md#capability-query>
fn decode_capabilities(data: &[u8]) -> Result<Message, ProtocolError> {
    let mut pins: Vec<Vec<PinMode>> = vec![];
    let mut supported_modes: Vec<PinMode> = vec![];
    let mut i = 0;

    while i < data.len() {
        if data[i] == SYSEX_REALTIME {
            pins.push(supported_modes);
            supported_modes = vec![];
            i += 1;
            continue;
        }
        if i + 1 >= data.len() {
            return Err(ProtocolError::MessageTooShort {
                operation: "capability response",
                expected: i + 2,
                received: data.len(),
            });
        }
        supported_modes.push(PinMode {
            id: PinModeId::from_u8(data[i])?,
            resolution: data[i + 1],
        });
        i += 2;
    }
    // Tolerate a missing final terminator.
    if !supported_modes.is_empty() {
        pins.push(supported_modes);
    }
    Ok(Message::CapabilityResponse { pins })
}

/// Decodes sysex text sent as one character per 7-bit pair.
fn decode_string(data: &[u8]) -> String {
    data.chunks_exact(2)
        .map(|pair| (pair[0] as u16) | ((pair[1] as u16) << 7))
        .filter_map(|character| char::from_u32(character as u32))
        .collect()
}

/// Encodes text as sysex 7-bit character pairs.
fn encode_string(text: &str, payload: &mut Vec<u8>) {
    for character in text.chars() {
        let character = character as u32;
        payload.push(character as u8 & SYSEX_REALTIME);
        payload.push((character >> 7) as u8 & SYSEX_REALTIME);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::format_as_hex;

    #[test]
    fn test_decode_digital_report() {
        // Pins 0 and 2 of port 0 high.
        let (message, consumed) = decode_next(&[0x90, 0x05, 0x00]).unwrap();
        assert_eq!(
            message,
            Some(Message::DigitalPortReport {
                port: 0,
                bits: 0b0000_0101
            })
        );
        assert_eq!(consumed, 3);

        // Pin 15 (port 1, bit 7) travels in the second payload byte.
        let (message, _) = decode_next(&[0x91, 0x00, 0x01]).unwrap();
        assert_eq!(
            message,
            Some(Message::DigitalPortReport {
                port: 1,
                bits: 0b1000_0000
            })
        );
    }

    #[test]
    fn test_decode_analog_report() {
        let (message, consumed) = decode_next(&[0xE1, 0x48, 0x01]).unwrap();
        assert_eq!(
            message,
            Some(Message::AnalogReport {
                channel: 1,
                value: 200
            })
        );
        assert_eq!(consumed, 3);
    }

    #[test]
    fn test_decode_incomplete() {
        assert_eq!(decode_next(&[]).unwrap(), (None, 0));
        assert_eq!(decode_next(&[0x90]).unwrap(), (None, 0));
        assert_eq!(decode_next(&[0x90, 0x05]).unwrap(), (None, 0));
        assert_eq!(decode_next(&[0xF9, 0x02]).unwrap(), (None, 0));
        // Sysex still waiting for its terminator.
        assert_eq!(decode_next(&[0xF0, 0x6C, 0x00, 0x08]).unwrap(), (None, 0));
    }

    #[test]
    fn test_decode_protocol_version() {
        let (message, consumed) = decode_next(&[0xF9, 0x02, 0x05]).unwrap();
        assert_eq!(message, Some(Message::ProtocolVersion { major: 2, minor: 5 }));
        assert_eq!(consumed, 3);
    }

    #[test]
    fn test_decode_report_toggles() {
        let (message, consumed) = decode_next(&[0xC1, 0x01]).unwrap();
        assert_eq!(
            message,
            Some(Message::ReportAnalog {
                channel: 1,
                state: true
            })
        );
        assert_eq!(consumed, 2);

        let (message, _) = decode_next(&[0xD2, 0x00]).unwrap();
        assert_eq!(
            message,
            Some(Message::ReportDigital {
                port: 2,
                state: false
            })
        );
    }

    #[test]
    fn test_decode_set_pin_mode() {
        let (message, _) = decode_next(&[0xF4, 0x0D, 0x01]).unwrap();
        assert_eq!(
            message,
            Some(Message::SetPinMode {
                pin: 13,
                mode: PinModeId::OUTPUT
            })
        );

        // A mode code outside the capability space is malformed.
        let error = decode_next(&[0xF4, 0x0D, 0x63]).unwrap_err();
        assert_eq!(error.to_string(), "Unknown pin mode (99)");
    }

    #[test]
    fn test_decode_unexpected_byte() {
        let error = decode_next(&[0x42, 0xE1, 0x48]).unwrap_err();
        assert_eq!(
            error.to_string(),
            "Unrecognized byte (0x42) in incoming stream"
        );
        // An end marker with no start is noise too.
        assert!(decode_next(&[0xF7]).is_err());
    }

    /// Garbage ahead of a valid message costs exactly one dropped byte per
    /// garbage byte once the caller applies the drop-one-and-retry policy.
    #[test]
    fn test_resync_after_garbage() {
        let mut buffer = vec![0x01, 0x02, 0x03, 0xE1, 0x48, 0x01];
        let mut dropped = 0;
        let message = loop {
            match decode_next(&buffer) {
                Ok((Some(message), consumed)) => {
                    buffer.drain(..consumed);
                    break message;
                }
                Ok((None, 0)) => panic!("decoder starved"),
                Ok((None, consumed)) => {
                    buffer.drain(..consumed);
                }
                Err(_) => {
                    buffer.remove(0);
                    dropped += 1;
                }
            }
        };
        assert_eq!(dropped, 3);
        assert_eq!(
            message,
            Message::AnalogReport {
                channel: 1,
                value: 200
            }
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_decode_firmware_report() {
        // "Fake" as 14-bit character pairs.
        let bytes = [
            0xF0, 0x79, 0x01, 0x02, 0x46, 0x00, 0x61, 0x00, 0x6B, 0x00, 0x65, 0x00, 0xF7,
        ];
        let (message, consumed) = decode_next(&bytes).unwrap();
        assert_eq!(
            message,
            Some(Message::FirmwareReport {
                major: 1,
                minor: 2,
                name: String::from("Fake")
            })
        );
        assert_eq!(consumed, bytes.len());

        // Empty payload: this is the query form.
        let (message, consumed) = decode_next(&[0xF0, 0x79, 0xF7]).unwrap();
        assert_eq!(message, Some(Message::FirmwareQuery));
        assert_eq!(consumed, 3);

        // A version byte alone is malformed.
        assert!(decode_next(&[0xF0, 0x79, 0x01, 0xF7]).is_err());
    }

    #[test]
    fn test_decode_capability_response() {
        // Pin 0: [INPUT/1, OUTPUT/1]; pin 1: no modes; pin 2: [ANALOG/10].
        let bytes = [
            0xF0, 0x6C, 0x00, 0x01, 0x01, 0x01, 0x7F, 0x7F, 0x02, 0x0A, 0x7F, 0xF7,
        ];
        let (message, consumed) = decode_next(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        let Some(Message::CapabilityResponse { pins }) = message else {
            panic!("expected a capability response");
        };
        assert_eq!(pins.len(), 3);
        assert_eq!(pins[0].len(), 2);
        assert_eq!(pins[0][0].id, PinModeId::INPUT);
        assert_eq!(pins[0][1].id, PinModeId::OUTPUT);
        assert!(pins[1].is_empty());
        assert_eq!(pins[2][0].id, PinModeId::ANALOG);
        assert_eq!(pins[2][0].resolution, 10);

        // A dangling mode byte with no resolution is malformed.
        assert!(decode_next(&[0xF0, 0x6C, 0x00, 0xF7]).is_err());
    }

    #[test]
    fn test_decode_analog_mapping_response() {
        let bytes = [0xF0, 0x6A, 0x7F, 0x7F, 0x00, 0x01, 0xF7];
        let (message, _) = decode_next(&bytes).unwrap();
        assert_eq!(
            message,
            Some(Message::AnalogMappingResponse {
                channels: vec![None, None, Some(0), Some(1)]
            })
        );
    }

    #[test]
    fn test_decode_pin_state_response() {
        let (message, _) = decode_next(&[0xF0, 0x6E, 0x03, 0x01, 0x1E, 0xF7]).unwrap();
        assert_eq!(
            message,
            Some(Message::PinStateResponse {
                pin: 3,
                mode: PinModeId::OUTPUT,
                value: 30
            })
        );

        // Multi-byte state, least significant group first.
        let (message, _) = decode_next(&[0xF0, 0x6E, 0x0A, 0x03, 0x7F, 0x01, 0xF7]).unwrap();
        assert_eq!(
            message,
            Some(Message::PinStateResponse {
                pin: 10,
                mode: PinModeId::PWM,
                value: 255
            })
        );

        assert!(decode_next(&[0xF0, 0x6E, 0x03, 0xF7]).is_err());
    }

    #[test]
    fn test_decode_extended_analog() {
        let (message, _) = decode_next(&[0xF0, 0x6F, 0x16, 0x68, 0x04, 0x01, 0xF7]).unwrap();
        assert_eq!(
            message,
            Some(Message::AnalogWrite {
                pin: 22,
                value: 17000
            })
        );
    }

    #[test]
    fn test_decode_sampling_interval() {
        let (message, _) = decode_next(&[0xF0, 0x7A, 0x64, 0x00, 0xF7]).unwrap();
        assert_eq!(message, Some(Message::SamplingInterval { interval: 100 }));
    }

    #[test]
    fn test_decode_string_data() {
        let (message, _) =
            decode_next(&[0xF0, 0x71, 0x4F, 0x00, 0x6B, 0x00, 0xF7]).unwrap();
        assert_eq!(
            message,
            Some(Message::StringData {
                text: String::from("Ok")
            })
        );
    }

    #[test]
    fn test_decode_unknown_sysex_skipped() {
        // SERVO_CONFIG (0x70) is framed correctly but not handled: skip it.
        let bytes = [0xF0, 0x70, 0x09, 0x70, 0x04, 0x50, 0x11, 0xF7];
        assert_eq!(decode_next(&bytes).unwrap(), (None, bytes.len()));
        // Empty sysex frame: nothing to do either.
        assert_eq!(decode_next(&[0xF0, 0xF7]).unwrap(), (None, 2));
    }

    #[test]
    fn test_decode_sysex_overflow() {
        let mut bytes = vec![0xF0, 0x71];
        bytes.extend(std::iter::repeat(0x01).take(MAX_SYSEX_BYTES + 8));
        let error = decode_next(&bytes).unwrap_err();
        assert_eq!(
            error.to_string(),
            format!("Sysex message exceeded {} bytes without terminator", MAX_SYSEX_BYTES)
        );
    }

    #[test]
    fn test_decode_back_to_back() {
        // Two messages in a row: each decode consumes exactly one.
        let buffer = [0xF9, 0x02, 0x05, 0x90, 0x7F, 0x01];
        let (message, consumed) = decode_next(&buffer).unwrap();
        assert_eq!(message, Some(Message::ProtocolVersion { major: 2, minor: 5 }));
        let (message, _) = decode_next(&buffer[consumed..]).unwrap();
        assert_eq!(
            message,
            Some(Message::DigitalPortReport {
                port: 0,
                bits: 0xFF
            })
        );
    }

    #[test]
    fn test_encode_analog_write() {
        // 200 = 0x48 | (0x01 << 7)
        let payload = encode(&Message::AnalogWrite { pin: 1, value: 200 });
        assert_eq!(
            payload,
            [0xE1, 0x48, 0x01],
            "unexpected payload: {}",
            format_as_hex(&payload)
        );

        // Pin over 15: extended analog sysex.
        let payload = encode(&Message::AnalogWrite {
            pin: 22,
            value: 17000,
        });
        assert_eq!(payload, [0xF0, 0x6F, 0x16, 0x68, 0x04, 0x01, 0xF7]);

        // Exactly 14 bits of value still needs the third group.
        let payload = encode(&Message::AnalogWrite {
            pin: 20,
            value: 1 << 14,
        });
        assert_eq!(payload, [0xF0, 0x6F, 0x14, 0x00, 0x00, 0x01, 0xF7]);
    }

    #[test]
    fn test_encode_digital_port() {
        let payload = encode(&Message::DigitalPortReport {
            port: 1,
            bits: 0b0010_0000,
        });
        assert_eq!(payload, [0x91, 0x20, 0x00]);

        // Bit 7 moves into the second payload byte.
        let payload = encode(&Message::DigitalPortReport { port: 1, bits: 0xFF });
        assert_eq!(payload, [0x91, 0x7F, 0x01]);
    }

    #[test]
    fn test_encode_queries() {
        assert_eq!(encode(&Message::VersionQuery), [0xF9]);
        assert_eq!(encode(&Message::FirmwareQuery), [0xF0, 0x79, 0xF7]);
        assert_eq!(encode(&Message::CapabilityQuery), [0xF0, 0x6B, 0xF7]);
        assert_eq!(encode(&Message::AnalogMappingQuery), [0xF0, 0x69, 0xF7]);
        assert_eq!(
            encode(&Message::PinStateQuery { pin: 13 }),
            [0xF0, 0x6D, 0x0D, 0xF7]
        );
    }

    #[test]
    fn test_encode_settings() {
        assert_eq!(
            encode(&Message::ReportAnalog {
                channel: 1,
                state: true
            }),
            [0xC1, 0x01]
        );
        assert_eq!(
            encode(&Message::ReportDigital {
                port: 2,
                state: false
            }),
            [0xD2, 0x00]
        );
        assert_eq!(
            encode(&Message::SamplingInterval { interval: 100 }),
            [0xF0, 0x7A, 0x64, 0x00, 0xF7]
        );
        assert_eq!(
            encode(&Message::SetPinMode {
                pin: 13,
                mode: PinModeId::PWM
            }),
            [0xF4, 0x0D, 0x03]
        );
        assert_eq!(
            encode(&Message::SetDigitalPinValue {
                pin: 7,
                state: true
            }),
            [0xF5, 0x07, 0x01]
        );
        assert_eq!(encode(&Message::SystemReset), [0xFF]);
    }

    /// Encoding then decoding a command yields the message a peer would see.
    #[test]
    fn test_round_trip() {
        let cases: Vec<(Message, Message)> = vec![
            (
                Message::SetPinMode {
                    pin: 13,
                    mode: PinModeId::SERVO,
                },
                Message::SetPinMode {
                    pin: 13,
                    mode: PinModeId::SERVO,
                },
            ),
            (
                Message::SetDigitalPinValue {
                    pin: 5,
                    state: true,
                },
                Message::SetDigitalPinValue {
                    pin: 5,
                    state: true,
                },
            ),
            (
                Message::DigitalPortReport {
                    port: 2,
                    bits: 0xA5,
                },
                Message::DigitalPortReport {
                    port: 2,
                    bits: 0xA5,
                },
            ),
            // A narrow analog write reads back as a report: same bytes, the
            // direction is inferred from the sender's role.
            (
                Message::AnalogWrite {
                    pin: 1,
                    value: 200,
                },
                Message::AnalogReport {
                    channel: 1,
                    value: 200,
                },
            ),
            (
                Message::AnalogWrite {
                    pin: 22,
                    value: 17000,
                },
                Message::AnalogWrite {
                    pin: 22,
                    value: 17000,
                },
            ),
            (
                Message::ReportAnalog {
                    channel: 3,
                    state: true,
                },
                Message::ReportAnalog {
                    channel: 3,
                    state: true,
                },
            ),
            (
                Message::ReportDigital {
                    port: 1,
                    state: false,
                },
                Message::ReportDigital {
                    port: 1,
                    state: false,
                },
            ),
            (
                Message::SamplingInterval { interval: 19 },
                Message::SamplingInterval { interval: 19 },
            ),
            (Message::SystemReset, Message::SystemReset),
            (Message::CapabilityQuery, Message::CapabilityQuery),
            (Message::AnalogMappingQuery, Message::AnalogMappingQuery),
            (Message::FirmwareQuery, Message::FirmwareQuery),
            (
                Message::PinStateQuery { pin: 9 },
                Message::PinStateQuery { pin: 9 },
            ),
        ];
        for (command, expected) in cases {
            let bytes = encode(&command);
            let (message, consumed) = decode_next(&bytes)
                .unwrap_or_else(|e| panic!("{:?} failed to decode back: {}", command, e));
            assert_eq!(message, Some(expected), "bytes: {}", format_as_hex(&bytes));
            assert_eq!(consumed, bytes.len());
        }
    }

    /// Responses encode too, so tests and simulators can speak both roles.
    #[test]
    fn test_round_trip_responses() {
        let responses = vec![
            Message::ProtocolVersion { major: 2, minor: 5 },
            Message::FirmwareReport {
                major: 1,
                minor: 0,
                name: String::from("Fake.ino"),
            },
            Message::CapabilityResponse {
                pins: vec![
                    vec![
                        PinMode {
                            id: PinModeId::INPUT,
                            resolution: 1,
                        },
                        PinMode {
                            id: PinModeId::OUTPUT,
                            resolution: 1,
                        },
                    ],
                    vec![],
                    vec![PinMode {
                        id: PinModeId::ANALOG,
                        resolution: 10,
                    }],
                ],
            },
            Message::AnalogMappingResponse {
                channels: vec![None, Some(0), Some(1)],
            },
            Message::PinStateResponse {
                pin: 3,
                mode: PinModeId::PWM,
                value: 300,
            },
            Message::StringData {
                text: String::from("I2C: too many queries"),
            },
        ];
        for response in responses {
            let bytes = encode(&response);
            let (message, consumed) = decode_next(&bytes).unwrap();
            assert_eq!(message, Some(response));
            assert_eq!(consumed, bytes.len());
        }
    }
}
