//! ASID SysEx message decoding.
//!
//! Every ASID message travels as `0xF0 0x2D <sub-type> <payload> 0xF7`.
//! The decoder borrows the payload straight from the wire buffer; a
//! trailing end-of-exclusive byte is accepted but not required, since
//! some hosts hand the message over without it.

pub const SYSEX_START: u8 = 0xF0;
pub const SYSEX_END: u8 = 0xF7;
/// Manufacturer id the ASID protocol squats on.
pub const ASID_ID: u8 = 0x2D;

const PLAY_START: u8 = 0x4C;
const PLAY_STOP: u8 = 0x4D;
const REGISTERS_ONE: u8 = 0x4E;
const DISPLAY: u8 = 0x4F;
const REGISTERS_TWO: u8 = 0x50;
const REGISTERS_THREE: u8 = 0x51;
const WRITE_ORDER: u8 = 0x49;
const ENVIRONMENT: u8 = 0x4A;
const FMOPL: u8 = 0x60;

/// One decoded ASID message.
#[derive(Debug, PartialEq, Eq)]
pub enum AsidMessage<'a> {
    Start,
    Stop,
    /// Display text for players that have somewhere to put it.
    Display(&'a [u8]),
    /// Register payload for one chip: 4 mask bytes, 4 MSB bytes, then
    /// one value per set mask bit.
    Registers { chip: u8, payload: &'a [u8] },
    /// Pairs of (physical register, wait cycles) replacing the default
    /// write order and delays.
    WriteOrder(&'a [u8]),
    /// Broadcast standard index, explicit frame delta in microseconds
    /// (two septets, low first) and a speed multiplier.
    Environment {
        standard: u8,
        frame_delta_us: u16,
        speed: u8,
    },
    /// FMopl payload variant; flags the stream as driving the FM chip.
    FmOpl(&'a [u8]),
}

/// Decode one SysEx buffer. Non-ASID traffic and unknown sub-types
/// come back as `None`.
#[must_use]
pub fn decode(buffer: &[u8]) -> Option<AsidMessage<'_>> {
    if buffer.len() < 3 || buffer[0] != SYSEX_START || buffer[1] != ASID_ID {
        return None;
    }
    let body = match buffer.last() {
        Some(&SYSEX_END) => &buffer[..buffer.len() - 1],
        _ => buffer,
    };
    let payload = body.get(3..).unwrap_or(&[]);
    match buffer[2] {
        PLAY_START => Some(AsidMessage::Start),
        PLAY_STOP => Some(AsidMessage::Stop),
        DISPLAY => Some(AsidMessage::Display(payload)),
        REGISTERS_ONE => Some(AsidMessage::Registers { chip: 0, payload }),
        REGISTERS_TWO => Some(AsidMessage::Registers { chip: 1, payload }),
        REGISTERS_THREE => Some(AsidMessage::Registers { chip: 2, payload }),
        WRITE_ORDER => Some(AsidMessage::WriteOrder(payload)),
        ENVIRONMENT => {
            let standard = *payload.first()?;
            let low = u16::from(*payload.get(1)?);
            let high = u16::from(*payload.get(2)?);
            let speed = payload.get(3).copied().unwrap_or(1);
            Some(AsidMessage::Environment {
                standard,
                frame_delta_us: low | (high << 7),
                speed,
            })
        }
        FMOPL => Some(AsidMessage::FmOpl(payload)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_asid_traffic_is_rejected() {
        assert_eq!(decode(&[]), None);
        assert_eq!(decode(&[0xF0, 0x2D]), None, "sub-type byte is required");
        assert_eq!(decode(&[0xF0, 0x7E, 0x06, 0x01, 0xF7]), None, "wrong manufacturer");
        assert_eq!(decode(&[0xB0, 0x07, 0x7F]), None, "not system exclusive");
    }

    #[test]
    fn unknown_sub_types_are_rejected() {
        assert_eq!(decode(&[0xF0, 0x2D, 0x7F, 0xF7]), None);
    }

    #[test]
    fn start_and_stop_decode_without_payload() {
        assert_eq!(decode(&[0xF0, 0x2D, 0x4C, 0xF7]), Some(AsidMessage::Start));
        assert_eq!(decode(&[0xF0, 0x2D, 0x4D, 0xF7]), Some(AsidMessage::Stop));
        assert_eq!(decode(&[0xF0, 0x2D, 0x4C]), Some(AsidMessage::Start), "end byte is optional");
    }

    #[test]
    fn register_sub_types_map_to_chips() {
        let message = [0xF0, 0x2D, 0x4E, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x42, 0xF7];
        match decode(&message) {
            Some(AsidMessage::Registers { chip: 0, payload }) => {
                assert_eq!(payload.len(), 9, "trailing end byte must be stripped");
                assert_eq!(payload[8], 0x42);
            }
            other => panic!("expected a chip 0 register payload, got {other:?}"),
        }
        assert!(matches!(
            decode(&[0xF0, 0x2D, 0x50, 0xF7]),
            Some(AsidMessage::Registers { chip: 1, .. })
        ));
        assert!(matches!(
            decode(&[0xF0, 0x2D, 0x51, 0xF7]),
            Some(AsidMessage::Registers { chip: 2, .. })
        ));
    }

    #[test]
    fn environment_reassembles_the_septets() {
        // 1998 microseconds = 0x4E | 0x0F << 7.
        let message = [0xF0, 0x2D, 0x4A, 0x01, 0x4E, 0x0F, 0x02, 0xF7];
        assert_eq!(
            decode(&message),
            Some(AsidMessage::Environment {
                standard: 1,
                frame_delta_us: 1998,
                speed: 2,
            })
        );
    }

    #[test]
    fn environment_speed_defaults_to_one() {
        let message = [0xF0, 0x2D, 0x4A, 0x00, 0x00, 0x00, 0xF7];
        assert_eq!(
            decode(&message),
            Some(AsidMessage::Environment {
                standard: 0,
                frame_delta_us: 0,
                speed: 1,
            })
        );
    }

    #[test]
    fn truncated_environment_is_rejected() {
        assert_eq!(decode(&[0xF0, 0x2D, 0x4A, 0x01, 0x4E, 0xF7]), None);
    }

    #[test]
    fn write_order_payload_passes_through() {
        let message = [0xF0, 0x2D, 0x49, 0x18, 0x05, 0x00, 0x02, 0xF7];
        assert_eq!(
            decode(&message),
            Some(AsidMessage::WriteOrder(&[0x18, 0x05, 0x00, 0x02]))
        );
    }
}
