//! Arrival tracking and drain-rate shaping.
//!
//! The drain rate is an interval in chip cycles between buffer ticks. A
//! smaller interval drains faster. The tracker measures how fast frames
//! actually arrive; [`shape_rate`] then bends that measurement by buffer
//! pressure so the consumer neither overruns nor starves the ring.

use bridge_core::Cycles;

use crate::ring::{FRAME_BYTES, FrameRing, LOW_HEADROOM};

/// Arrival timestamps kept for the rolling average.
pub const HISTORY: usize = 8;
/// Rate changes smaller than this many cycles are not applied.
pub const RATE_HYSTERESIS: u32 = 50;

/// Chips the register sub-protocol can address.
const MAX_CHIPS: u8 = 3;
/// Frames without a multi-chip payload before the estimate drops to one.
const MULTI_CHIP_FRAMES: u32 = 30;

/// Rolling window over frame arrival times.
///
/// Reports nothing until the window has filled once; from then on every
/// tracked arrival yields the average inter-arrival interval divided by
/// the number of chips the stream appears to drive.
pub struct ArrivalTracker {
    history: [u32; HISTORY],
    index: usize,
    filled: usize,
    base_rate: u32,
    explicit: bool,
    chips: u8,
    frames_since_multi: u32,
}

impl ArrivalTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            history: [0; HISTORY],
            index: 0,
            filled: 0,
            base_rate: 0,
            explicit: false,
            chips: 1,
            frames_since_multi: 0,
        }
    }

    /// Record one frame arrival and return the target drain interval.
    ///
    /// Returns zero while the history window is still filling. Once
    /// full, the average delta across the window becomes the baseline
    /// unless an explicit rate was configured.
    pub fn track(&mut self, now: Cycles) -> u32 {
        self.history[self.index] = now.get();
        self.index = (self.index + 1) % HISTORY;
        if self.filled < HISTORY {
            self.filled += 1;
        }
        if self.chips > 1 {
            self.frames_since_multi += 1;
            if self.frames_since_multi > MULTI_CHIP_FRAMES {
                self.chips = 1;
            }
        }
        if self.filled < HISTORY {
            return 0;
        }
        // With a full window, index points at the oldest sample.
        let newest = self.history[(self.index + HISTORY - 1) % HISTORY];
        let oldest = self.history[self.index];
        let average = newest.wrapping_sub(oldest) / (HISTORY as u32 - 1);
        if !self.explicit && average > 0 {
            self.base_rate = average;
        }
        self.base_rate / u32::from(self.chips)
    }

    /// A register payload addressed a second or third chip.
    pub fn note_chip(&mut self, chip: u8) {
        if chip == 0 {
            return;
        }
        self.chips = self.chips.max((chip + 1).min(MAX_CHIPS));
        self.frames_since_multi = 0;
    }

    /// Pin the baseline from an environment-description message.
    pub fn set_explicit_rate(&mut self, rate: u32) {
        if rate > 0 {
            self.base_rate = rate;
            self.explicit = true;
        }
    }

    /// Forget the arrival window and chip estimate, keep the baseline.
    pub fn reset(&mut self) {
        self.index = 0;
        self.filled = 0;
        self.chips = 1;
        self.frames_since_multi = 0;
    }

    /// Full restart for a new tune; the baseline is re-detected.
    pub fn restart(&mut self) {
        self.reset();
        self.base_rate = 0;
        self.explicit = false;
    }

    #[must_use]
    pub fn base_rate(&self) -> u32 {
        self.base_rate
    }

    #[must_use]
    pub fn chips(&self) -> u8 {
        self.chips
    }
}

impl Default for ArrivalTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Bend a target drain interval by buffer pressure.
///
/// Above 90% full the interval tightens by a quarter; below half a
/// frame's worth it relaxes by an eighth; the result stays inside
/// `[base / 6, base * 6 / 5]`. When the ring is maxed out and within
/// four frames of overflow the current interval is cut by a quarter
/// outright; the returned flag tells the caller to skip hysteresis.
#[must_use]
pub fn shape_rate(target: u32, base: u32, current: u32, ring: &FrameRing) -> (u32, bool) {
    if ring.at_max() && ring.headroom() < LOW_HEADROOM {
        return (current.saturating_mul(3) / 4, true);
    }
    let mut rate = target;
    let fill = ring.fill();
    if fill * 10 > ring.size() * 9 {
        rate = rate.saturating_mul(3) / 4;
    } else if fill < FRAME_BYTES / 2 {
        rate = rate.saturating_mul(9) / 8;
    }
    (rate.clamp(base / 6, base.saturating_add(base / 5)), false)
}
