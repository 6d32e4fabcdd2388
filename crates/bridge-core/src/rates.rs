//! Chip clock rate selection.

/// The chip clock rates the bridge can generate.
///
/// Each rate carries the display refresh interval and raster interval (in
/// chip cycles) that players keyed to that video standard expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockRate {
    /// 1 MHz, the power-on default.
    #[default]
    Default,
    /// PAL C64 timing.
    Pal,
    /// NTSC C64 timing.
    Ntsc,
    /// Drean (PAL-N) C64 timing.
    Drean,
}

impl ClockRate {
    pub const COUNT: usize = 4;

    #[must_use]
    pub const fn hz(self) -> u32 {
        match self {
            Self::Default => 1_000_000,
            Self::Pal => 985_248,
            Self::Ntsc => 1_022_727,
            Self::Drean => 1_023_440,
        }
    }

    /// Display refresh interval in cycles at this rate.
    #[must_use]
    pub const fn refresh_interval(self) -> u32 {
        match self {
            Self::Default => 20_000,
            Self::Pal => 19_950,
            Self::Ntsc | Self::Drean => 16_715,
        }
    }

    /// Raster interval in cycles at this rate.
    #[must_use]
    pub const fn raster_interval(self) -> u32 {
        match self {
            Self::Default => 20_000,
            Self::Pal => 19_656,
            Self::Ntsc | Self::Drean => 17_096,
        }
    }

    /// Rate for a wire index; out-of-range indices fall back to `Default`.
    #[must_use]
    pub const fn from_index(index: u8) -> Self {
        match index {
            1 => Self::Pal,
            2 => Self::Ntsc,
            3 => Self::Drean,
            _ => Self::Default,
        }
    }

    #[must_use]
    pub const fn index(self) -> u8 {
        match self {
            Self::Default => 0,
            Self::Pal => 1,
            Self::Ntsc => 2,
            Self::Drean => 3,
        }
    }

    /// Rate for an exact frequency, if it is one of the known rates.
    #[must_use]
    pub const fn from_hz(hz: u32) -> Option<Self> {
        match hz {
            1_000_000 => Some(Self::Default),
            985_248 => Some(Self::Pal),
            1_022_727 => Some(Self::Ntsc),
            1_023_440 => Some(Self::Drean),
            _ => None,
        }
    }
}
