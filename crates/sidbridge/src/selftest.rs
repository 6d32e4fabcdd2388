//! Scripted chip self-tests.
//!
//! Renditions of the classic hardware exercises: waveform sweeps per
//! voice, pulse-width sweeps, filter cutoff runs through all three
//! passes, envelope phases and ring modulation. Every register write
//! takes the device lock for just that write and every pause goes
//! through an injected sleep, so a stop request lands between any two
//! steps; the runner silences all registers on the way out.

use std::sync::{Arc, Mutex, PoisonError};

use bridge_core::{
    ATTACK_DECAY, BusPort, CONTROL, ClockPort, FC_HI, FREQ_HI, FlashSector, MODE_VOL, PW_HI,
    RES_FILT, SUSTAIN_RELEASE, VOICE_SIZE,
};
use log::{debug, info};

use crate::device::{Device, DeviceShared};

/// Control register values of the four waveforms, gate bit clear.
const WAVEFORMS: [u8; 4] = [16, 32, 64, 128];

/// Which battery to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TestKind {
    /// Every battery in sequence.
    #[default]
    All,
    Waveforms,
    Filter,
    Envelope,
    Modulation,
}

impl TestKind {
    /// Wire selector: ASCII digits `'2'` through `'5'`; anything else
    /// runs everything.
    pub fn from_wire(byte: u8) -> Self {
        match byte {
            b'2' => Self::Waveforms,
            b'3' => Self::Filter,
            b'4' => Self::Envelope,
            b'5' => Self::Modulation,
            _ => Self::All,
        }
    }
}

/// Waveform selector for the filter, envelope and modulation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaveSelect {
    /// Loop over all four waveforms.
    #[default]
    All,
    Triangle,
    Sawtooth,
    Pulse,
    Noise,
}

impl WaveSelect {
    /// Wire selector: `'T'`, `'S'`, `'P'` pick one waveform, zero or
    /// `'A'` loops everything, anything else means noise.
    pub fn from_wire(byte: u8) -> Self {
        match byte {
            0 | b'A' => Self::All,
            b'T' => Self::Triangle,
            b'S' => Self::Sawtooth,
            b'P' => Self::Pulse,
            _ => Self::Noise,
        }
    }

    fn control_values(self) -> &'static [u8] {
        match self {
            Self::All => &WAVEFORMS,
            Self::Triangle => &WAVEFORMS[0..1],
            Self::Sawtooth => &WAVEFORMS[1..2],
            Self::Pulse => &WAVEFORMS[2..3],
            Self::Noise => &WAVEFORMS[3..4],
        }
    }
}

/// Where a test run points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestTarget {
    AllChips,
    Chip(u8),
}

/// One queued test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestRequest {
    pub target: TestTarget,
    pub kind: TestKind,
    pub wave: WaveSelect,
}

/// Drives the batteries against the shared device.
pub struct SidTester<'a, P, F, S> {
    device: &'a Mutex<Device<P, F>>,
    shared: Arc<DeviceShared>,
    sleep: S,
}

impl<'a, P, F, S> SidTester<'a, P, F, S>
where
    P: BusPort + ClockPort,
    F: FlashSector,
    S: FnMut(u64),
{
    pub fn new(device: &'a Mutex<Device<P, F>>, shared: Arc<DeviceShared>, sleep: S) -> Self {
        Self {
            device,
            shared,
            sleep,
        }
    }

    /// Run one request to completion or to the first stop, then drop
    /// the run flag.
    pub fn run(&mut self, request: TestRequest) {
        info!("chip test start: {request:?}");
        let completed = match request.target {
            TestTarget::AllChips => {
                let chips = self.lock(|device| device.chip_count());
                let mut all = true;
                for chip in 0..chips {
                    if !self.chip_battery(chip, request.kind, request.wave) {
                        all = false;
                        break;
                    }
                }
                all
            }
            TestTarget::Chip(chip) => self.chip_battery(chip, request.kind, request.wave),
        };
        if completed {
            info!("chip test complete");
        } else {
            info!("chip test stopped");
        }
        self.shared.finish_tests();
    }

    fn lock<T>(&self, f: impl FnOnce(&mut Device<P, F>) -> T) -> T {
        let mut device = self.device.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut device)
    }

    /// The 5-cycle gated write every test step uses.
    fn write(&self, address: u8, data: u8) {
        self.lock(|device| device.test_write(address, data));
    }

    /// One cooperative step: true to keep going. A stop silences every
    /// register before the runner unwinds.
    fn step(&self) -> bool {
        if self.shared.tests_running() {
            return true;
        }
        self.lock(Device::clear_all_registers);
        false
    }

    fn pause(&mut self, millis: u64) {
        (self.sleep)(millis);
    }

    /// Check, then wait out one scripted rest.
    fn rest(&mut self, millis: u64) -> bool {
        if !self.step() {
            return false;
        }
        self.pause(millis);
        true
    }

    fn chip_battery(&mut self, chip: u8, kind: TestKind, wave: WaveSelect) -> bool {
        if !self.step() {
            return false;
        }
        self.lock(|device| device.clear_chip(chip));
        let base = chip * 0x20;
        let voices = [base, base + VOICE_SIZE, base + 2 * VOICE_SIZE];
        self.write(base + MODE_VOL, 0x0F);

        match kind {
            TestKind::All => {
                if !self.step() {
                    return false;
                }
                if !self.all_waveforms(base, voices) {
                    return false;
                }
                self.lock(|device| device.clear_chip(chip));
                for waveform in WAVEFORMS {
                    if !self.filter_sweep(base, voices, waveform) {
                        return false;
                    }
                }
                self.lock(|device| device.clear_chip(chip));
                for waveform in WAVEFORMS {
                    if !self.envelope_run(base, voices, waveform) {
                        return false;
                    }
                }
                self.lock(|device| device.clear_chip(chip));
                for waveform in WAVEFORMS {
                    if !self.modulation_run(base, voices, waveform) {
                        return false;
                    }
                }
                self.lock(|device| device.clear_chip(chip));
                true
            }
            TestKind::Waveforms => {
                if !self.step() {
                    return false;
                }
                self.all_waveforms(base, voices)
            }
            TestKind::Filter => {
                for &waveform in wave.control_values() {
                    if !self.step() {
                        return false;
                    }
                    if !self.filter_sweep(base, voices, waveform) {
                        return false;
                    }
                }
                true
            }
            TestKind::Envelope => {
                for &waveform in wave.control_values() {
                    if !self.step() {
                        return false;
                    }
                    if !self.envelope_run(base, voices, waveform) {
                        return false;
                    }
                }
                true
            }
            TestKind::Modulation => {
                if !self.step() {
                    return false;
                }
                self.write(base + MODE_VOL, 0x0F);
                for &waveform in wave.control_values() {
                    if !self.step() {
                        return false;
                    }
                    if !self.modulation_run(base, voices, waveform) {
                        return false;
                    }
                }
                true
            }
        }
    }

    /// Gate one waveform on and walk the voice frequency through its
    /// whole high-byte range.
    fn wave_sweep(&mut self, voice: u8, on: u8, off: u8) -> bool {
        if !self.step() {
            return false;
        }
        self.write(voice + CONTROL, on);
        for f in 1..=255u8 {
            if !self.step() {
                return false;
            }
            self.write(voice + FREQ_HI, f);
            self.pause(8);
        }
        self.write(voice + CONTROL, off);
        true
    }

    /// Six up-and-down runs through the pulse width high byte.
    fn pulse_sweep(&mut self, voice: u8, on: u8, off: u8) -> bool {
        if !self.step() {
            return false;
        }
        self.write(voice + CONTROL, on);
        for _ in 0..6 {
            if !self.step() {
                return false;
            }
            for width in 0..=15u8 {
                if !self.step() {
                    return false;
                }
                self.write(voice + PW_HI, width);
                self.pause(16);
            }
            for width in (0..=15u8).rev() {
                if !self.step() {
                    return false;
                }
                self.write(voice + PW_HI, width);
                self.pause(16);
            }
        }
        self.write(voice + CONTROL, off);
        true
    }

    fn all_waveforms(&mut self, base: u8, voices: [u8; 3]) -> bool {
        if !self.step() {
            return false;
        }
        self.write(base + MODE_VOL, 0x0F);
        for voice in voices {
            if !self.step() {
                return false;
            }
            debug!("waveform sweeps on voice at {voice:#04x}");
            self.write(voice + ATTACK_DECAY, 33);
            self.write(voice + SUSTAIN_RELEASE, 242);
            self.write(voice + PW_HI, 8);
            for waveform in WAVEFORMS {
                if !self.wave_sweep(voice, waveform + 1, waveform) {
                    return false;
                }
            }
            self.write(voice + FREQ_HI, 40);
            if !self.pulse_sweep(voice, 65, 64) {
                return false;
            }
        }
        true
    }

    /// Cutoff sweeps through the low, band and high pass filters at
    /// three base frequencies.
    fn filter_sweep(&mut self, base: u8, voices: [u8; 3], waveform: u8) -> bool {
        if !self.step() {
            return false;
        }
        self.write(base + MODE_VOL, 0x0F);
        for cutoff in [15u8, 30, 45] {
            if !self.step() {
                return false;
            }
            self.write(base + RES_FILT, 87);
            for pass in 1..=3u8 {
                if !self.step() {
                    return false;
                }
                let volume = match pass {
                    1 => 31,
                    2 => 47,
                    _ => 79,
                };
                self.write(base + MODE_VOL, volume);
                for voice in voices {
                    if !self.step() {
                        return false;
                    }
                    self.write(voice + FREQ_HI, cutoff);
                    self.write(voice + ATTACK_DECAY, 0);
                    self.write(voice + SUSTAIN_RELEASE, 240);
                    self.write(voice + PW_HI, 8);
                    self.write(voice + CONTROL, waveform + 1);
                    for f in 0..=255u8 {
                        if !self.step() {
                            return false;
                        }
                        self.write(base + FC_HI, f);
                        self.pause(8);
                    }
                    self.write(voice + CONTROL, waveform);
                }
            }
        }
        true
    }

    /// Three envelope phases per voice: full ADSR, sustain/release
    /// only, attack/decay only.
    fn envelope_run(&mut self, base: u8, voices: [u8; 3], waveform: u8) -> bool {
        if !self.step() {
            return false;
        }
        self.write(base + MODE_VOL, 0x0F);
        for voice in voices {
            if !self.step() {
                return false;
            }
            self.write(voice + ATTACK_DECAY, 170);
            self.write(voice + SUSTAIN_RELEASE, 58);
            self.write(voice + FREQ_HI, 40);
            self.write(voice + PW_HI, 8);
            self.write(voice + CONTROL, waveform + 1);
            if !self.rest(3000) {
                return false;
            }
            self.write(voice + CONTROL, waveform);
            if !self.rest(1000) {
                return false;
            }
            if !self.rest(600) {
                return false;
            }

            self.write(voice + ATTACK_DECAY, 0);
            self.write(voice + SUSTAIN_RELEASE, 250);
            self.write(voice + CONTROL, waveform + 1);
            if !self.rest(600) {
                return false;
            }
            self.write(voice + CONTROL, waveform);
            if !self.rest(600) {
                return false;
            }
            if !self.rest(600) {
                return false;
            }

            self.write(voice + ATTACK_DECAY, 170);
            self.write(voice + SUSTAIN_RELEASE, 0);
            self.write(voice + CONTROL, waveform + 1);
            if !self.rest(2000) {
                return false;
            }
            self.write(voice + CONTROL, waveform);
            if !self.rest(600) {
                return false;
            }
            if !self.rest(600) {
                return false;
            }
        }
        true
    }

    /// Ring modulation: each voice against its lower neighbour, voice
    /// one wrapping around to voice three.
    fn modulation_run(&mut self, base: u8, voices: [u8; 3], waveform: u8) -> bool {
        if !self.step() {
            return false;
        }
        self.write(base + MODE_VOL, 0x0F);
        for v in 0..3usize {
            if !self.step() {
                return false;
            }
            let carrier = voices[v];
            let modulator = voices[match v {
                1 => 0,
                2 => 1,
                _ => 2,
            }];
            self.write(carrier + PW_HI, 8);
            self.write(carrier + ATTACK_DECAY, 0);
            self.write(carrier + SUSTAIN_RELEASE, 250);
            self.write(modulator + FREQ_HI, 10);
            self.write(carrier + CONTROL, waveform + 3);
            for f in 0..=255u8 {
                if !self.step() {
                    return false;
                }
                self.write(carrier + FREQ_HI, f);
                self.pause(24);
            }
            self.write(carrier + CONTROL, 0);
        }
        true
    }
}
