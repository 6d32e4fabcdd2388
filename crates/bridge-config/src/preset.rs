//! Table-driven socket presets.
//!
//! A preset only touches the five socket flags; addresses and ids are
//! renumbered by the validate pass that follows every application.

use log::info;

use crate::error::ConfigError;
use crate::model::{ChipType, CloneType, Config};

/// The five flags a preset controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresetFlags {
    pub socket_one: bool,
    pub socket_one_dual: bool,
    pub socket_two: bool,
    pub socket_two_dual: bool,
    pub mirrored: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// Single SID in socket one only.
    SingleSid,
    /// Single SID in socket two only.
    SingleSidSocketTwo,
    /// One SID per socket.
    DualSid,
    /// Two SIDs in socket one, socket two off.
    DualSidSocketOne,
    /// Two SIDs in socket two, socket one off.
    DualSidSocketTwo,
    /// Two SIDs in socket one plus one in socket two.
    TripleSid,
    /// One SID in socket one plus two in socket two.
    TripleSidSocketTwo,
    /// Two SIDs in both sockets.
    QuadSid,
    /// Socket two mirrors socket one.
    MirroredSid,
    /// Socket two mirrors a dual socket one.
    MirroredDualSid,
}

impl Preset {
    pub const fn flags(self) -> PresetFlags {
        let (socket_one, socket_one_dual, socket_two, socket_two_dual, mirrored) = match self {
            Self::SingleSid => (true, false, false, false, false),
            Self::SingleSidSocketTwo => (false, false, true, false, false),
            Self::DualSid => (true, false, true, false, false),
            Self::DualSidSocketOne => (true, true, false, false, false),
            Self::DualSidSocketTwo => (false, false, true, true, false),
            Self::TripleSid => (true, true, true, false, false),
            Self::TripleSidSocketTwo => (true, false, true, true, false),
            Self::QuadSid => (true, true, true, true, false),
            Self::MirroredSid => (true, false, true, false, true),
            Self::MirroredDualSid => (true, true, true, true, true),
        };
        PresetFlags {
            socket_one,
            socket_one_dual,
            socket_two,
            socket_two_dual,
            mirrored,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::SingleSid => "Single S1",
            Self::SingleSidSocketTwo => "Single S2",
            Self::DualSid => "Dual Both",
            Self::DualSidSocketOne => "Dual S1",
            Self::DualSidSocketTwo => "Dual S2",
            Self::TripleSid => "Triple S1",
            Self::TripleSidSocketTwo => "Triple S2",
            Self::QuadSid => "Quad",
            Self::MirroredSid => "Mirrored",
            Self::MirroredDualSid => "Mirrored Dual",
        }
    }

    /// Decode a preset command byte.
    pub fn from_command(byte: u8) -> Result<Self, ConfigError> {
        match byte {
            0x40 => Ok(Self::SingleSid),
            0x41 => Ok(Self::DualSid),
            0x42 => Ok(Self::QuadSid),
            0x43 => Ok(Self::TripleSid),
            0x44 => Ok(Self::TripleSidSocketTwo),
            0x45 => Ok(Self::MirroredSid),
            other => Err(ConfigError::InvalidPreset(other)),
        }
    }
}

fn active_flags(config: &Config) -> PresetFlags {
    PresetFlags {
        socket_one: config.socket_one.enabled,
        socket_one_dual: config.socket_one.dualsid,
        socket_two: config.socket_two.enabled,
        socket_two_dual: config.socket_two.dualsid,
        mirrored: config.mirrored,
    }
}

/// Apply a preset's socket flags to `config`.
///
/// Returns [`ConfigError::PresetAlreadyActive`] without touching
/// anything when the flags already match. Dual sockets are forced to
/// chiptype clone since real silicon cannot decode two windows.
pub fn apply_preset(config: &mut Config, preset: Preset) -> Result<(), ConfigError> {
    let flags = preset.flags();
    if active_flags(config) == flags {
        return Err(ConfigError::PresetAlreadyActive);
    }
    info!("applying socket preset {}", preset.name());
    config.socket_one.enabled = flags.socket_one;
    config.socket_one.dualsid = flags.socket_one_dual;
    config.socket_two.enabled = flags.socket_two;
    config.socket_two.dualsid = flags.socket_two_dual;
    config.mirrored = flags.mirrored;
    for index in 0..2 {
        let socket = config.socket_mut(index);
        if socket.dualsid {
            socket.chiptype = ChipType::Clone;
            if socket.clonetype == CloneType::Disabled {
                socket.clonetype = CloneType::Other;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::validate;

    #[test]
    fn preset_matching_active_flags_is_rejected() {
        let mut cfg = Config::default();
        // The default config is one SID per socket.
        assert_eq!(
            apply_preset(&mut cfg, Preset::DualSid),
            Err(ConfigError::PresetAlreadyActive)
        );
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn quad_preset_forces_clone_chiptype() {
        let mut cfg = Config::default();
        assert!(apply_preset(&mut cfg, Preset::QuadSid).is_ok());
        assert!(cfg.socket_one.dualsid);
        assert!(cfg.socket_two.dualsid);
        assert_eq!(cfg.socket_one.chiptype, ChipType::Clone);
        assert_ne!(cfg.socket_one.clonetype, CloneType::Disabled);
        assert!(validate(&mut cfg).is_ok());
        assert_eq!(cfg.socket_two.sid2.addr, 0x60);
    }

    #[test]
    fn single_socket_two_preset_disables_socket_one() {
        let mut cfg = Config::default();
        assert!(apply_preset(&mut cfg, Preset::SingleSidSocketTwo).is_ok());
        assert!(validate(&mut cfg).is_ok());
        assert!(!cfg.socket_one.enabled);
        assert_eq!(cfg.socket_two.sid1.id, 0);
        assert_eq!(cfg.socket_two.sid1.addr, 0x00);
    }

    #[test]
    fn command_bytes_decode_to_table_entries() {
        assert_eq!(Preset::from_command(0x40), Ok(Preset::SingleSid));
        assert_eq!(Preset::from_command(0x45), Ok(Preset::MirroredSid));
        assert_eq!(
            Preset::from_command(0x46),
            Err(ConfigError::InvalidPreset(0x46))
        );
    }

    #[test]
    fn mirrored_preset_survives_validation() {
        let mut cfg = Config::default();
        assert!(apply_preset(&mut cfg, Preset::MirroredSid).is_ok());
        assert!(validate(&mut cfg).is_ok());
        assert!(cfg.mirrored);
        assert!(cfg.socket_one.enabled);
        assert!(cfg.socket_two.enabled);
    }
}
