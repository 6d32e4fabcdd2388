//! LED level generation.
//!
//! While the host streams data the meter follows the three voice
//! frequencies of one chip out of shadow memory; idle, the level
//! breathes a triangle wave in a random colour. The runner also keeps
//! the silence watch: twenty seconds of a flat meter while the
//! activity flag is up means the stream died without a stop.

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use bridge_config::{LedConfig, RgbConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Silence-watch interval in milliseconds.
pub const CHECK_INTERVAL_MS: u32 = 100;
/// Silent checks before the activity flag is taken down; 200 checks
/// of 100 ms is twenty seconds.
pub const MAX_CHECKS: u32 = 200;
/// Meter and breathe update interval in milliseconds.
pub const TICK_INTERVAL_MS: u32 = 1;
/// Breathe ramp per update.
pub const BREATHE_STEP: u32 = 100;
/// Full-scale PWM level.
pub const VU_MAX: u16 = 65534;
/// Voice frequency (in Hz after scaling) that pins the meter.
pub const HZ_MAX: u32 = 40;

/// Frequency high bytes of the three voices of one chip.
pub type VoiceBytes = [u8; 3];

/// Colour columns: red, green, blue for odd chip numbers; yellow,
/// cyan, purple for even. Intensity runs in 43 steps of 6.
fn colour_level(level: u32, colour: usize) -> [u8; 3] {
    let i = (6 * level.min(42)) as u8;
    match colour {
        0 => [i, 0, 0],
        1 => [0, i, 0],
        2 => [0, 0, i],
        3 => [i, i, 0],
        4 => [0, i, i],
        _ => [i, 0, i],
    }
}

/// Linear 0-based range mapping.
const fn remap(value: u32, in_max: u32, out_max: u32) -> u32 {
    value * out_max / in_max
}

/// Voice frequency byte to meter units.
fn osc_level(byte: u8) -> u32 {
    (f32::from(byte) * 0.596) as u32
}

fn scale_brightness(channel: u32, brightness: u8) -> u8 {
    (channel * u32::from(brightness) / 255).min(255) as u8
}

/// What one tick decided to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedOutput {
    pub pwm: u16,
    pub pixel: [u8; 3],
}

/// Outcome of one runner pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedUpdate {
    /// New LED levels, absent when the tick was rate-limited.
    pub output: Option<LedOutput>,
    /// The silence watch expired; the caller takes the activity flag down.
    pub idle_timeout: bool,
}

pub struct LedTask {
    last_tick_ms: u32,
    last_check_ms: u32,
    breathe_level: u32,
    rising: bool,
    idle_colour: usize,
    idle_checks: u32,
    vu: u16,
    rng: StdRng,
}

impl LedTask {
    #[must_use]
    pub fn new() -> Self {
        Self::with_seed(rand::rng().random())
    }

    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let idle_colour = rng.random_range(0..6);
        Self {
            last_tick_ms: 0,
            last_check_ms: 0,
            breathe_level: 0,
            rising: true,
            idle_colour,
            idle_checks: 0,
            vu: 0,
            rng,
        }
    }

    /// Current meter level, full scale 0..=[`VU_MAX`].
    #[must_use]
    pub fn vu(&self) -> u16 {
        self.vu
    }

    /// One runner pass at `now_ms`.
    ///
    /// `first` carries the voice bytes of chip one, which always feeds
    /// the meter; `keyed` the bytes of the chip the RGB LED is keyed
    /// to. `active` is the data-activity flag.
    pub fn tick(
        &mut self,
        now_ms: u32,
        active: bool,
        first: VoiceBytes,
        keyed: VoiceBytes,
        led: &LedConfig,
        rgb: &RgbConfig,
    ) -> LedUpdate {
        let mut update = LedUpdate::default();

        if now_ms.wrapping_sub(self.last_tick_ms) >= TICK_INTERVAL_MS {
            self.last_tick_ms = now_ms;
            update.output = Some(if active {
                self.vumeter(first, keyed, led, rgb)
            } else {
                self.breathe(led, rgb)
            });
        }

        if now_ms.wrapping_sub(self.last_check_ms) >= CHECK_INTERVAL_MS {
            self.last_check_ms = now_ms;
            if self.vu == 0 && active {
                self.idle_checks += 1;
                if self.idle_checks >= MAX_CHECKS {
                    self.idle_checks = 0;
                    update.idle_timeout = true;
                }
            }
        }

        update
    }

    fn vumeter(
        &mut self,
        first: VoiceBytes,
        keyed: VoiceBytes,
        led: &LedConfig,
        rgb: &RgbConfig,
    ) -> LedOutput {
        let average = (osc_level(first[0]) + osc_level(first[1]) + osc_level(first[2])) / 3;
        self.vu = remap(average, HZ_MAX, u32::from(VU_MAX)).min(u32::from(VU_MAX)) as u16;

        let pwm = if led.enabled { self.vu } else { 0 };

        let pixel = if rgb.enabled {
            // Odd chip numbers light the red/green/blue columns, even
            // ones yellow/cyan/purple.
            let base = if rgb.sid_to_use % 2 == 1 { 0 } else { 3 };
            let mut channels = [0u32; 3];
            for (voice, &byte) in keyed.iter().enumerate() {
                let level = remap(osc_level(byte), 255, 43);
                let colour = colour_level(level, base + voice);
                for (sum, &part) in channels.iter_mut().zip(&colour) {
                    *sum += u32::from(part);
                }
            }
            [
                scale_brightness(channels[0], rgb.brightness),
                scale_brightness(channels[1], rgb.brightness),
                scale_brightness(channels[2], rgb.brightness),
            ]
        } else {
            [0, 0, 0]
        };

        LedOutput { pwm, pixel }
    }

    fn breathe(&mut self, led: &LedConfig, rgb: &RgbConfig) -> LedOutput {
        if self.breathe_level >= u32::from(VU_MAX) {
            self.rising = false;
        }
        if self.breathe_level == 0 {
            self.rising = true;
            self.idle_colour = self.rng.random_range(0..6);
        }
        if self.rising {
            self.breathe_level += BREATHE_STEP;
        } else {
            self.breathe_level = self.breathe_level.saturating_sub(BREATHE_STEP);
        }

        let level = self.breathe_level.min(u32::from(VU_MAX));
        let pwm = if led.enabled && led.idle_breathe {
            level as u16
        } else {
            0
        };

        let pixel = if rgb.enabled && rgb.idle_breathe {
            let step = remap(level, u32::from(VU_MAX), 43);
            let colour = colour_level(step, self.idle_colour);
            [
                scale_brightness(u32::from(colour[0]), rgb.brightness),
                scale_brightness(u32::from(colour[1]), rgb.brightness),
                scale_brightness(u32::from(colour[2]), rgb.brightness),
            ]
        } else {
            [0, 0, 0]
        };

        LedOutput { pwm, pixel }
    }
}

impl Default for LedTask {
    fn default() -> Self {
        Self::new()
    }
}
