//! SID register tables.
//!
//! Register map per chip (29 registers, offsets `0x00`–`0x1C`):
//!
//! | offset      | register                                |
//! |-------------|-----------------------------------------|
//! | 0x00–0x06   | voice 1: freq, pulse width, control, envelope |
//! | 0x07–0x0D   | voice 2                                 |
//! | 0x0E–0x14   | voice 3                                 |
//! | 0x15–0x18   | filter cutoff, resonance/routing, mode/volume |
//! | 0x19–0x1A   | paddle inputs (read only)               |
//! | 0x1B–0x1C   | voice 3 oscillator and envelope (read only) |

/// Bytes per voice register block.
pub const VOICE_SIZE: u8 = 0x07;

/// Register offsets within one voice block.
pub const FREQ_LO: u8 = 0x00;
pub const FREQ_HI: u8 = 0x01;
pub const PW_LO: u8 = 0x02;
pub const PW_HI: u8 = 0x03;
pub const CONTROL: u8 = 0x04;
pub const ATTACK_DECAY: u8 = 0x05;
pub const SUSTAIN_RELEASE: u8 = 0x06;

/// Chip-global register offsets.
pub const FC_LO: u8 = 0x15;
pub const FC_HI: u8 = 0x16;
pub const RES_FILT: u8 = 0x17;
pub const MODE_VOL: u8 = 0x18;
pub const POT_X: u8 = 0x19;
pub const POT_Y: u8 = 0x1A;
pub const OSC3: u8 = 0x1B;
pub const ENV3: u8 = 0x1C;

/// All 29 chip registers in canonical order.
pub const SID_REGISTERS: [u8; 29] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, // voice 1
    0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, // voice 2
    0x0E, 0x0F, 0x10, 0x11, 0x12, 0x13, 0x14, // voice 3
    0x15, 0x16, 0x17, 0x18, // filter and volume
    0x19, 0x1A, // paddles (read only)
    0x1B, 0x1C, // osc 3 and env 3 (read only)
];

/// ASID logical register order.
///
/// The protocol packs register flags as four 7-bit mask bytes; logical
/// index `mask_index * 7 + bit` maps through this table to a physical
/// register. The 25 write registers come first, then the three control
/// registers repeat so a frame can retrigger a gate it just cleared.
pub const ASID_REGISTER_ORDER: [u8; 28] = [
    0x00, 0x01, 0x02, 0x03, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0C, 0x0D, 0x0E, 0x0F, 0x10,
    0x11, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x04, 0x0B, 0x12, 0x04, 0x0B, 0x12,
];
