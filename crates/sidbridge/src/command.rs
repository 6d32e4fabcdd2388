//! Command decoding.
//!
//! Every transport hands its packet to [`decode`] exactly once. The
//! top two bits of byte zero classify the packet: `00` register write
//! burst, `01` register read, `10` cycle-gated write burst, `11`
//! command. The decoder returns a borrowed view into the packet, so
//! burst payloads are never copied on the way to the bus.

use std::error::Error;
use std::fmt;

/// Top-level command opcodes, low five bits of byte zero.
const PAUSE: u8 = 0x0A;
const UNPAUSE: u8 = 0x0B;
const MUTE: u8 = 0x0C;
const UNMUTE: u8 = 0x0D;
const RESET_SID: u8 = 0x0E;
const DISABLE_SID: u8 = 0x0F;
const ENABLE_SID: u8 = 0x10;
const CLEAR_BUS: u8 = 0x11;
const CONFIG: u8 = 0x12;
const RESET_DEVICE: u8 = 0x13;
const BOOTLOADER: u8 = 0x14;

/// Configuration sub-buffer opcodes, byte one of a config packet.
const CFG_RESET_DEVICE: u8 = 0x20;
const CFG_READ: u8 = 0x30;
const CFG_APPLY: u8 = 0x31;
const CFG_SET_ITEM: u8 = 0x32;
const CFG_SAVE: u8 = 0x33;
const CFG_SAVE_NORESET: u8 = 0x34;
const CFG_RESET: u8 = 0x35;
const CFG_WRITE: u8 = 0x36;
const CFG_READ_SOCKET: u8 = 0x37;
const CFG_PRESET_FIRST: u8 = 0x40;
const CFG_PRESET_LAST: u8 = 0x45;
const CFG_SET_CLOCK: u8 = 0x50;
const CFG_DETECT_CHIPS: u8 = 0x51;
const CFG_TEST_ALL: u8 = 0x52;
const CFG_TEST_FIRST: u8 = 0x53;
const CFG_TEST_LAST: u8 = 0x56;
const CFG_STOP_TESTS: u8 = 0x59;
const CFG_AUTO_DETECT: u8 = 0x5B;
const CFG_VERSION: u8 = 0x80;

/// One decoded packet.
#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
    /// `(address, data)` pairs, written back to back.
    Write(&'a [u8]),
    /// Single register read; the reply byte goes back on the same
    /// transport.
    Read { address: u8 },
    /// `(address, data, cycles_hi, cycles_lo)` quads; each write waits
    /// out its cycle count first.
    CycledWrite(&'a [u8]),
    Pause,
    Unpause,
    Mute,
    Unmute,
    ResetSid,
    DisableSid,
    EnableSid,
    ClearBus,
    Config(ConfigCommand),
    ResetDevice,
    Bootloader,
}

/// Decoded configuration sub-command.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigCommand {
    ResetDevice,
    /// Reply: the runtime read-back array.
    ReadConfig,
    /// Reload the persisted configuration and route by it.
    ApplyConfig,
    /// Stage one field: `(group, item, value)`.
    SetItem { group: u8, item: u8, value: u8 },
    /// Persist, then restart the device.
    Save,
    /// Persist and re-apply without a restart.
    SaveNoReset,
    /// Back to compiled defaults, persisted and applied.
    ResetConfig,
    /// Commit whatever is staged.
    WriteConfig,
    /// Reply: the socket summary array.
    ReadSocketConfig,
    /// Raw preset byte, `0x40..=0x45`.
    Preset(u8),
    SetClock { index: u8 },
    /// Probe the configured sockets in place.
    DetectChips,
    TestAllChips,
    /// Scripted self-test on one chip; `kind` and `wave` select the
    /// battery and waveform, zero meaning everything.
    TestChip { chip: u8, kind: u8, wave: u8 },
    StopTests,
    /// Full scan-and-reconfigure detection pass.
    AutoDetect,
    /// Reply: the version string bytes.
    Version,
}

#[derive(Debug, PartialEq, Eq)]
pub enum DecodeError {
    Empty,
    Truncated { needed: usize, got: usize },
    UnknownCommand(u8),
    UnknownConfigCommand(u8),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty packet"),
            Self::Truncated { needed, got } => {
                write!(f, "packet truncated: needed {needed} bytes, got {got}")
            }
            Self::UnknownCommand(byte) => write!(f, "unknown command {byte:#04x}"),
            Self::UnknownConfigCommand(byte) => {
                write!(f, "unknown config command {byte:#04x}")
            }
        }
    }
}

impl Error for DecodeError {}

fn expect(packet: &[u8], needed: usize) -> Result<(), DecodeError> {
    if packet.len() < needed {
        return Err(DecodeError::Truncated {
            needed,
            got: packet.len(),
        });
    }
    Ok(())
}

/// Decode one packet into a [`Command`].
pub fn decode(packet: &[u8]) -> Result<Command<'_>, DecodeError> {
    let first = *packet.first().ok_or(DecodeError::Empty)?;
    match first >> 6 {
        0b00 => {
            // A zero count still carries one pair.
            let pairs = usize::from(first & 0x3F).max(1);
            let needed = 1 + pairs * 2;
            expect(packet, needed)?;
            Ok(Command::Write(&packet[1..needed]))
        }
        0b01 => {
            expect(packet, 3)?;
            Ok(Command::Read { address: packet[1] })
        }
        0b10 => {
            let quads = usize::from(first & 0x3F).max(1);
            let needed = 1 + quads * 4;
            expect(packet, needed)?;
            Ok(Command::CycledWrite(&packet[1..needed]))
        }
        _ => match first & 0x1F {
            PAUSE => Ok(Command::Pause),
            UNPAUSE => Ok(Command::Unpause),
            MUTE => Ok(Command::Mute),
            UNMUTE => Ok(Command::Unmute),
            RESET_SID => Ok(Command::ResetSid),
            DISABLE_SID => Ok(Command::DisableSid),
            ENABLE_SID => Ok(Command::EnableSid),
            CLEAR_BUS => Ok(Command::ClearBus),
            CONFIG => decode_config(packet).map(Command::Config),
            RESET_DEVICE => Ok(Command::ResetDevice),
            BOOTLOADER => Ok(Command::Bootloader),
            other => Err(DecodeError::UnknownCommand(other)),
        },
    }
}

fn decode_config(packet: &[u8]) -> Result<ConfigCommand, DecodeError> {
    expect(packet, 2)?;
    match packet[1] {
        CFG_RESET_DEVICE => Ok(ConfigCommand::ResetDevice),
        CFG_READ => Ok(ConfigCommand::ReadConfig),
        CFG_APPLY => Ok(ConfigCommand::ApplyConfig),
        CFG_SET_ITEM => {
            expect(packet, 5)?;
            Ok(ConfigCommand::SetItem {
                group: packet[2],
                item: packet[3],
                value: packet[4],
            })
        }
        CFG_SAVE => Ok(ConfigCommand::Save),
        CFG_SAVE_NORESET => Ok(ConfigCommand::SaveNoReset),
        CFG_RESET => Ok(ConfigCommand::ResetConfig),
        CFG_WRITE => Ok(ConfigCommand::WriteConfig),
        CFG_READ_SOCKET => Ok(ConfigCommand::ReadSocketConfig),
        preset @ CFG_PRESET_FIRST..=CFG_PRESET_LAST => Ok(ConfigCommand::Preset(preset)),
        CFG_SET_CLOCK => {
            expect(packet, 3)?;
            Ok(ConfigCommand::SetClock { index: packet[2] })
        }
        CFG_DETECT_CHIPS => Ok(ConfigCommand::DetectChips),
        CFG_TEST_ALL => Ok(ConfigCommand::TestAllChips),
        test @ CFG_TEST_FIRST..=CFG_TEST_LAST => Ok(ConfigCommand::TestChip {
            chip: test - CFG_TEST_FIRST,
            kind: packet.get(2).copied().unwrap_or(0),
            wave: packet.get(3).copied().unwrap_or(0),
        }),
        CFG_STOP_TESTS => Ok(ConfigCommand::StopTests),
        CFG_AUTO_DETECT => Ok(ConfigCommand::AutoDetect),
        CFG_VERSION => Ok(ConfigCommand::Version),
        other => Err(DecodeError::UnknownConfigCommand(other)),
    }
}
