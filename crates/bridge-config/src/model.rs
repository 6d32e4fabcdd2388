//! Persisted configuration model.
//!
//! Two physical sockets, each hosting one or two logical chips, plus the
//! clock, LED and interface toggles that survive a power cycle. Everything
//! here round-trips through the 256-byte flash page in [`crate::blob`].
//! Derived routing state lives in [`crate::RuntimeCfg`], never here.

use bridge_core::ClockRate;

/// What is physically seated in a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChipType {
    Real = 0,
    Clone = 1,
    #[default]
    Unknown = 2,
}

impl ChipType {
    pub const fn from_wire(value: u8) -> Self {
        match value {
            0 => Self::Real,
            1 => Self::Clone,
            _ => Self::Unknown,
        }
    }

    pub const fn wire(self) -> u8 {
        self as u8
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Real => "Real",
            Self::Clone => "Clone",
            Self::Unknown => "Unknown",
        }
    }
}

/// Clone family, when [`ChipType::Clone`] is seated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloneType {
    #[default]
    Disabled = 0,
    Other = 1,
    SkPico = 2,
    ArmSid = 3,
    FpgaSid = 4,
    RedipSid = 5,
    BackSid = 6,
}

impl CloneType {
    pub const fn from_wire(value: u8) -> Self {
        match value {
            1 => Self::Other,
            2 => Self::SkPico,
            3 => Self::ArmSid,
            4 => Self::FpgaSid,
            5 => Self::RedipSid,
            6 => Self::BackSid,
            _ => Self::Disabled,
        }
    }

    pub const fn wire(self) -> u8 {
        self as u8
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Disabled => "Disabled",
            Self::Other => "Other",
            Self::SkPico => "SKPico",
            Self::ArmSid => "ARMSID",
            Self::FpgaSid => "FPGASID",
            Self::RedipSid => "RedipSID",
            Self::BackSid => "BackSID",
        }
    }
}

/// Detected or configured silicon revision of one logical chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SidType {
    #[default]
    Unknown = 0,
    NotApplicable = 1,
    Mos8580 = 2,
    Mos6581 = 3,
    FmOpl = 4,
}

impl SidType {
    pub const fn from_wire(value: u8) -> Self {
        match value {
            1 => Self::NotApplicable,
            2 => Self::Mos8580,
            3 => Self::Mos6581,
            4 => Self::FmOpl,
            _ => Self::Unknown,
        }
    }

    pub const fn wire(self) -> u8 {
        self as u8
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::NotApplicable => "N/A",
            Self::Mos8580 => "MOS8580",
            Self::Mos6581 => "MOS6581",
            Self::FmOpl => "FMopl",
        }
    }
}

/// One logical chip instance inside a socket.
///
/// `id` is the bus id a host addresses (0-3), `addr` the base address of
/// its 32-byte register window. Both carry 0xFF sentinels when the slot
/// is not populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SidSlot {
    pub id: u8,
    pub addr: u8,
    pub kind: SidType,
}

impl SidSlot {
    pub const NO_ID: u8 = 0xFF;
    pub const NO_ADDR: u8 = 0xFF;

    pub const ABSENT: Self = Self {
        id: Self::NO_ID,
        addr: Self::NO_ADDR,
        kind: SidType::NotApplicable,
    };

    pub const fn new(id: u8, addr: u8, kind: SidType) -> Self {
        Self { id, addr, kind }
    }

    pub const fn present(&self) -> bool {
        self.id != Self::NO_ID && self.addr != Self::NO_ADDR
    }
}

impl Default for SidSlot {
    fn default() -> Self {
        Self::ABSENT
    }
}

/// One physical expansion socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketConfig {
    pub enabled: bool,
    pub dualsid: bool,
    pub chiptype: ChipType,
    pub clonetype: CloneType,
    pub sid1: SidSlot,
    pub sid2: SidSlot,
}

impl SocketConfig {
    /// The documented fallback: enabled, one real chip of unknown
    /// revision, primary address per socket position.
    pub const fn default_for(index: usize) -> Self {
        let (id, addr) = if index == 0 { (0, 0x00) } else { (1, 0x20) };
        Self {
            enabled: true,
            dualsid: false,
            chiptype: ChipType::Real,
            clonetype: CloneType::Disabled,
            sid1: SidSlot::new(id, addr, SidType::Unknown),
            sid2: SidSlot::ABSENT,
        }
    }

    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            dualsid: false,
            chiptype: ChipType::Real,
            clonetype: CloneType::Disabled,
            sid1: SidSlot::ABSENT,
            sid2: SidSlot::ABSENT,
        }
    }

    /// Number of logical chips this socket contributes to the bus.
    pub const fn chip_count(&self) -> u8 {
        if !self.enabled {
            0
        } else if self.dualsid {
            2
        } else {
            1
        }
    }
}

/// Activity LED settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedConfig {
    pub enabled: bool,
    pub idle_breathe: bool,
}

impl Default for LedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            idle_breathe: true,
        }
    }
}

/// RGB volume-meter LED settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RgbConfig {
    pub enabled: bool,
    pub idle_breathe: bool,
    pub brightness: u8,
    /// Which chip (1-4) drives the meter.
    pub sid_to_use: u8,
}

impl Default for RgbConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            idle_breathe: true,
            brightness: 0x7F,
            sid_to_use: 1,
        }
    }
}

/// The full persisted configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Still the compiled default, never saved by the user.
    pub default_config: bool,
    /// Bumped on every save; drives the flash slot rotation.
    pub config_saveid: u8,
    pub external_clock: bool,
    pub clock_rate: ClockRate,
    pub lock_clockrate: bool,
    /// Raster interval in cycles, for hosts that pace on it.
    pub raster_rate: u16,
    pub socket_one: SocketConfig,
    pub socket_two: SocketConfig,
    /// Socket two echoes socket one when set.
    pub mirrored: bool,
    pub led: LedConfig,
    pub rgb: RgbConfig,
    pub cdc_enabled: bool,
    pub webusb_enabled: bool,
    pub asid_enabled: bool,
    pub midi_enabled: bool,
    pub audio_stereo: bool,
    pub lock_audio_switch: bool,
    pub fmopl_enabled: bool,
    /// Chip number (1-4) acting as FMopl, 0 when none.
    pub fmopl_sidno: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_config: true,
            config_saveid: 0,
            external_clock: false,
            clock_rate: ClockRate::Default,
            lock_clockrate: false,
            raster_rate: ClockRate::Default.raster_interval() as u16,
            socket_one: SocketConfig::default_for(0),
            socket_two: SocketConfig::default_for(1),
            mirrored: false,
            led: LedConfig::default(),
            rgb: RgbConfig::default(),
            cdc_enabled: true,
            webusb_enabled: true,
            asid_enabled: true,
            midi_enabled: true,
            audio_stereo: true,
            lock_audio_switch: false,
            fmopl_enabled: false,
            fmopl_sidno: 0,
        }
    }
}

impl Config {
    pub fn socket(&self, index: usize) -> &SocketConfig {
        if index == 0 {
            &self.socket_one
        } else {
            &self.socket_two
        }
    }

    pub fn socket_mut(&mut self, index: usize) -> &mut SocketConfig {
        if index == 0 {
            &mut self.socket_one
        } else {
            &mut self.socket_two
        }
    }

    /// All four logical chip slots in physical order.
    pub fn slots(&self) -> [&SidSlot; 4] {
        [
            &self.socket_one.sid1,
            &self.socket_one.sid2,
            &self.socket_two.sid1,
            &self.socket_two.sid2,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_round_trip() {
        for v in 0..=6 {
            assert_eq!(CloneType::from_wire(v).wire(), v);
        }
        for v in 0..=2 {
            assert_eq!(ChipType::from_wire(v).wire(), v);
        }
        for v in 0..=4 {
            assert_eq!(SidType::from_wire(v).wire(), v);
        }
    }

    #[test]
    fn unknown_wire_values_fall_back() {
        assert_eq!(ChipType::from_wire(0x7F), ChipType::Unknown);
        assert_eq!(CloneType::from_wire(0x7F), CloneType::Disabled);
        assert_eq!(SidType::from_wire(0x7F), SidType::Unknown);
    }

    #[test]
    fn default_config_has_two_single_sockets() {
        let cfg = Config::default();
        assert!(cfg.socket_one.enabled);
        assert!(cfg.socket_two.enabled);
        assert!(!cfg.socket_one.dualsid);
        assert!(!cfg.socket_two.dualsid);
        assert_eq!(cfg.socket_one.sid1.addr, 0x00);
        assert_eq!(cfg.socket_two.sid1.addr, 0x20);
        assert!(!cfg.socket_one.sid2.present());
        assert!(cfg.default_config);
    }

    #[test]
    fn chip_count_follows_flags() {
        let mut socket = SocketConfig::default_for(0);
        assert_eq!(socket.chip_count(), 1);
        socket.dualsid = true;
        assert_eq!(socket.chip_count(), 2);
        socket.enabled = false;
        assert_eq!(socket.chip_count(), 0);
    }

    #[test]
    fn absent_slot_is_not_present() {
        assert!(!SidSlot::ABSENT.present());
        assert!(SidSlot::new(0, 0x00, SidType::Unknown).present());
    }
}
