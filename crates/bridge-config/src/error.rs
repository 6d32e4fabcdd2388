use std::fmt;

/// Hard configuration failures.
///
/// Repairable problems (dual chips on a real socket, an address clash,
/// a missing primary chip) never surface here: validation resets the
/// offending socket to its default and carries on. Only configurations
/// with nothing left to drive the bus are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    BothSocketsDisabled,
    NoValidSid,
    InvalidPreset(u8),
    PresetAlreadyActive,
    DetectionFailed,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BothSocketsDisabled => write!(f, "Both sockets disabled"),
            Self::NoValidSid => write!(f, "No valid SID found"),
            Self::InvalidPreset(value) => write!(f, "Invalid preset value: {value:#04x}"),
            Self::PresetAlreadyActive => write!(f, "Preset supplied matches preset active"),
            Self::DetectionFailed => write!(f, "Chip/SID detection failed"),
        }
    }
}

impl std::error::Error for ConfigError {}
