//! The stream buffering engine.
//!
//! ASID players deliver register frames in bursts at whatever pace the
//! host transport manages; the chips want evenly spaced cycled writes.
//! The engine sits between the two: incoming frames are decoded into
//! 4-byte ring entries, a periodic tick drains up to one frame per
//! firing, and the drain interval chases the measured arrival rate.

use bridge_core::{ASID_REGISTER_ORDER, ClockRate, Cycles};
use log::{debug, trace};

use crate::ring::{FRAME_BYTES, FRAME_WRITES, FrameRing, LOW_HEADROOM};
use crate::sysex::{AsidMessage, decode};
use crate::timing::{ArrivalTracker, RATE_HYSTERESIS, shape_rate};

/// Cycle cost of the LDA/STA pair a real player spends per write.
pub const WRITE_CYCLES: u16 = 6;
/// Consecutive empty ticks before the buffering is torn down.
pub const IDLE_TICKS: u32 = 100;
/// Arrival gap treated as a new tune, in cycles.
const GAP_RESET_CYCLES: u32 = 500_000;
/// Register byte marking a ring entry as padding.
const PADDING: u8 = 0xFF;

#[derive(Debug, Clone, Copy)]
struct WriteStep {
    register: u8,
    cycles: u16,
}

const fn default_order() -> [WriteStep; FRAME_WRITES] {
    let mut order = [WriteStep { register: 0, cycles: 0 }; FRAME_WRITES];
    let mut i = 0;
    while i < FRAME_WRITES {
        order[i] = WriteStep {
            register: ASID_REGISTER_ORDER[i],
            cycles: 0,
        };
        i += 1;
    }
    order
}

/// Adaptive buffer between the ASID stream and the chip bus.
///
/// The drain interval is published through [`AsidEngine::take_rate_update`]
/// as a corrected value (one cycle shaved off for sequencer overhead);
/// the owner re-arms its tick source whenever a new value appears.
pub struct AsidEngine {
    ring: Option<FrameRing>,
    tracker: ArrivalTracker,
    order: [WriteStep; FRAME_WRITES],
    rate: u32,
    initial_rate: u32,
    rate_update: Option<u32>,
    idle_ticks: u32,
    last_arrival: Option<Cycles>,
    playing: bool,
    fmopl: bool,
}

impl AsidEngine {
    #[must_use]
    pub fn new(initial_rate: u32) -> Self {
        let rate = initial_rate.max(1);
        Self {
            ring: None,
            tracker: ArrivalTracker::new(),
            order: default_order(),
            rate,
            initial_rate: rate,
            rate_update: None,
            idle_ticks: 0,
            last_arrival: None,
            playing: false,
            fmopl: false,
        }
    }

    /// Feed one SysEx buffer. Returns false for traffic that is not an
    /// ASID message, so the caller can route it elsewhere.
    pub fn handle_message(&mut self, buffer: &[u8], now: Cycles) -> bool {
        let Some(message) = decode(buffer) else {
            return false;
        };
        match message {
            AsidMessage::Start => {
                debug!("play start");
                self.playing = true;
                self.restart(now);
            }
            AsidMessage::Stop => {
                debug!("play stop");
                self.playing = false;
            }
            AsidMessage::Display(text) => {
                trace!("display: {}", String::from_utf8_lossy(text));
            }
            AsidMessage::Registers { chip, payload } => self.queue_registers(chip, payload, now),
            AsidMessage::WriteOrder(pairs) => self.apply_write_order(pairs),
            AsidMessage::Environment {
                standard,
                frame_delta_us,
                speed,
            } => {
                let base = if frame_delta_us > 0 {
                    u32::from(frame_delta_us)
                } else {
                    ClockRate::from_index(standard).refresh_interval()
                };
                self.tracker.set_explicit_rate(base / u32::from(speed.max(1)));
                debug!(
                    "environment: standard {standard}, base rate {} cycles",
                    self.tracker.base_rate()
                );
            }
            AsidMessage::FmOpl(_) => {
                self.fmopl = true;
            }
        }
        true
    }

    /// Drain up to one frame of register writes into `sink` as
    /// `(register, value, wait_cycles)`. Returns the number of bus
    /// writes issued.
    ///
    /// Nothing is drained until more than one frame is buffered, so a
    /// tune that delivers exactly one frame per interval always has a
    /// frame in hand. Padding entries are consumed without a write.
    pub fn tick<F>(&mut self, mut sink: F) -> usize
    where
        F: FnMut(u8, u8, u16),
    {
        let Some(ring) = self.ring.as_mut() else {
            return 0;
        };
        let mut issued = 0;
        if ring.fill() > FRAME_BYTES {
            for _ in 0..FRAME_WRITES {
                let Some([register, value, delay_hi, delay_lo]) = ring.pop() else {
                    break;
                };
                if register == PADDING {
                    continue;
                }
                let wait = u16::from_be_bytes([delay_hi, delay_lo]);
                sink(register, value, wait.saturating_add(WRITE_CYCLES));
                issued += 1;
            }
        }
        if issued == 0 {
            self.idle_ticks += 1;
            if self.idle_ticks > IDLE_TICKS {
                debug!("stream idle, buffering torn down");
                self.ring = None;
                self.idle_ticks = 0;
            }
        } else {
            self.idle_ticks = 0;
        }
        issued
    }

    /// Newly shaped drain interval, if one was published since the last
    /// call. Already corrected for sequencer overhead.
    pub fn take_rate_update(&mut self) -> Option<u32> {
        self.rate_update.take()
    }

    /// Current drain interval with one cycle of sequencer overhead
    /// shaved off.
    #[must_use]
    pub fn drain_interval(&self) -> u32 {
        self.rate.saturating_sub(1)
    }

    /// Whether the buffering machinery is currently alive.
    #[must_use]
    pub fn active(&self) -> bool {
        self.ring.is_some()
    }

    #[must_use]
    pub fn playing(&self) -> bool {
        self.playing
    }

    #[must_use]
    pub fn fmopl(&self) -> bool {
        self.fmopl
    }

    /// Bytes currently buffered.
    #[must_use]
    pub fn buffered_bytes(&self) -> usize {
        self.ring.as_ref().map_or(0, FrameRing::fill)
    }

    /// Logical ring size in frames, zero when torn down.
    #[must_use]
    pub fn ring_frames(&self) -> usize {
        self.ring.as_ref().map_or(0, |ring| ring.size() / FRAME_BYTES)
    }

    fn restart(&mut self, now: Cycles) {
        let ring = self.ring.get_or_insert_with(FrameRing::new);
        ring.reset();
        self.tracker.restart();
        self.idle_ticks = 0;
        self.rate = self.initial_rate;
        self.rate_update = Some(self.drain_interval());
        self.last_arrival = Some(now);
    }

    fn ensure_ring(&mut self, now: Cycles) {
        if self.ring.is_none() {
            debug!("stream buffering initialized");
            self.ring = Some(FrameRing::new());
            self.tracker.reset();
            self.idle_ticks = 0;
            self.rate = self.initial_rate;
            self.rate_update = Some(self.drain_interval());
        } else if let Some(last) = self.last_arrival {
            if now.since(last) > GAP_RESET_CYCLES {
                debug!("arrival gap, ring reset");
                if let Some(ring) = self.ring.as_mut() {
                    ring.reset();
                }
                self.tracker.reset();
            }
        }
    }

    fn queue_registers(&mut self, chip: u8, payload: &[u8], now: Cycles) {
        self.ensure_ring(now);
        self.tracker.note_chip(chip);
        if chip == 0 {
            // Only the first chip's payloads pace the stream; counting
            // every chip would halve the measured interval per chip.
            self.adapt(now);
        }
        let offset = chip * 0x20;
        let mut value_index = 0usize;
        for mask in 0..4usize {
            let mask_bits = payload.get(mask).copied().unwrap_or(0);
            let msb_bits = payload.get(mask + 4).copied().unwrap_or(0);
            for bit in 0..7u8 {
                if mask_bits & (1 << bit) == 0 {
                    continue;
                }
                let mut value = payload.get(8 + value_index).copied().unwrap_or(0);
                value_index += 1;
                if msb_bits & (1 << bit) != 0 {
                    value |= 0x80;
                }
                let step = self.order[mask * 7 + bit as usize];
                self.push_entry(step.register | offset, value, step.cycles);
            }
        }
        self.last_arrival = Some(now);
    }

    fn adapt(&mut self, now: Cycles) {
        let target = self.tracker.track(now);
        if target == 0 {
            return;
        }
        let Some(ring) = self.ring.as_ref() else {
            return;
        };
        let (rate, forced) = shape_rate(target, self.tracker.base_rate(), self.rate, ring);
        if forced || rate.abs_diff(self.rate) > RATE_HYSTERESIS {
            debug!("drain interval {} -> {rate} cycles", self.rate);
            self.rate = rate.max(1);
            self.rate_update = Some(self.drain_interval());
        }
    }

    fn push_entry(&mut self, register: u8, value: u8, cycles: u16) {
        let Some(ring) = self.ring.as_mut() else {
            return;
        };
        if !ring.at_max() && ring.headroom() < LOW_HEADROOM && ring.grow() {
            debug!("ring grown to {} frames", ring.size() / FRAME_BYTES);
        }
        let [delay_hi, delay_lo] = cycles.to_be_bytes();
        ring.push([register, value, delay_hi, delay_lo]);
    }

    fn apply_write_order(&mut self, pairs: &[u8]) {
        for (step, pair) in self.order.iter_mut().zip(pairs.chunks_exact(2)) {
            step.register = pair[0];
            step.cycles = u16::from(pair[1]);
        }
        debug!("write order updated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sysex(subtype: u8, payload: &[u8]) -> Vec<u8> {
        let mut buffer = vec![0xF0, 0x2D, subtype];
        buffer.extend_from_slice(payload);
        buffer.push(0xF7);
        buffer
    }

    /// Payload carrying all 28 registers with values 0..28.
    fn full_registers() -> Vec<u8> {
        let mut payload = vec![0x7F, 0x7F, 0x7F, 0x7F, 0, 0, 0, 0];
        payload.extend(0..28u8);
        payload
    }

    /// Payload carrying only logical register 0.
    fn single_register(value: u8, msb: bool) -> Vec<u8> {
        vec![0x01, 0, 0, 0, u8::from(msb), 0, 0, 0, value]
    }

    fn drain(engine: &mut AsidEngine) -> Vec<(u8, u8, u16)> {
        let mut writes = Vec::new();
        engine.tick(|register, value, wait| writes.push((register, value, wait)));
        writes
    }

    #[test]
    fn non_asid_traffic_is_left_alone() {
        let mut engine = AsidEngine::new(20_000);
        assert!(!engine.handle_message(&[0xF0, 0x7E, 0x06, 0x01, 0xF7], Cycles::ZERO));
        assert!(!engine.active(), "foreign traffic must not allocate anything");
    }

    #[test]
    fn play_start_and_stop_toggle_the_claim() {
        let mut engine = AsidEngine::new(20_000);
        assert!(engine.handle_message(&sysex(0x4C, &[]), Cycles::ZERO));
        assert!(engine.playing());
        assert!(engine.active());
        assert_eq!(engine.take_rate_update(), Some(19_999));
        assert!(engine.handle_message(&sysex(0x4D, &[]), Cycles::ZERO));
        assert!(!engine.playing());
        assert!(engine.active(), "stop leaves the buffer to drain out");
    }

    #[test]
    fn one_buffered_frame_is_held_back() {
        let mut engine = AsidEngine::new(20_000);
        engine.handle_message(&sysex(0x4E, &full_registers()), Cycles::new(1_000));
        assert_eq!(drain(&mut engine).len(), 0, "a single frame stays in hand");
        engine.handle_message(&sysex(0x4E, &full_registers()), Cycles::new(2_000));
        assert_eq!(drain(&mut engine).len(), 28);
        assert_eq!(drain(&mut engine).len(), 0, "the last frame stays in hand again");
    }

    #[test]
    fn drained_writes_follow_the_canonical_order() {
        let mut engine = AsidEngine::new(20_000);
        engine.handle_message(&sysex(0x4E, &full_registers()), Cycles::new(1_000));
        engine.handle_message(&sysex(0x4E, &full_registers()), Cycles::new(2_000));
        let writes = drain(&mut engine);
        let registers: Vec<u8> = writes.iter().map(|w| w.0).collect();
        assert_eq!(registers, ASID_REGISTER_ORDER.to_vec());
        for (i, &(_, value, wait)) in writes.iter().enumerate() {
            assert_eq!(value, i as u8, "values map to mask bits in logical order");
            assert_eq!(wait, 6, "default wait is the LDA/STA cost");
        }
    }

    #[test]
    fn msb_mask_restores_bit_seven() {
        let mut engine = AsidEngine::new(20_000);
        for _ in 0..29 {
            engine.handle_message(&sysex(0x4E, &single_register(0x12, true)), Cycles::new(1_000));
        }
        let writes = drain(&mut engine);
        assert_eq!(writes.len(), 28);
        assert_eq!(writes[0], (0x00, 0x92, 6));
    }

    #[test]
    fn other_chips_take_their_address_offsets() {
        let mut engine = AsidEngine::new(20_000);
        for _ in 0..29 {
            engine.handle_message(&sysex(0x50, &single_register(0x30, false)), Cycles::new(1_000));
        }
        assert_eq!(drain(&mut engine)[0], (0x20, 0x30, 6));

        let mut engine = AsidEngine::new(20_000);
        for _ in 0..29 {
            engine.handle_message(&sysex(0x51, &single_register(0x30, false)), Cycles::new(1_000));
        }
        assert_eq!(drain(&mut engine)[0], (0x40, 0x30, 6));
    }

    #[test]
    fn padding_steps_never_reach_the_bus() {
        let mut engine = AsidEngine::new(20_000);
        // Remap logical register 0 to the padding marker.
        engine.handle_message(&sysex(0x49, &[0xFF, 0x00]), Cycles::ZERO);
        for _ in 0..29 {
            engine.handle_message(&sysex(0x4E, &single_register(0x55, false)), Cycles::new(1_000));
        }
        assert_eq!(drain(&mut engine).len(), 0);
        assert_eq!(engine.buffered_bytes(), 4, "padding is consumed, not skipped over");
    }

    #[test]
    fn write_order_overrides_register_and_delay() {
        let mut engine = AsidEngine::new(20_000);
        engine.handle_message(&sysex(0x49, &[0x04, 0x0A]), Cycles::ZERO);
        for _ in 0..29 {
            engine.handle_message(&sysex(0x4E, &single_register(0x41, false)), Cycles::new(1_000));
        }
        assert_eq!(drain(&mut engine)[0], (0x04, 0x41, 16));
    }

    #[test]
    fn fmopl_variant_raises_the_flag() {
        let mut engine = AsidEngine::new(20_000);
        assert!(!engine.fmopl());
        engine.handle_message(&sysex(0x60, &[0x01, 0x02]), Cycles::ZERO);
        assert!(engine.fmopl());
    }

    #[test]
    fn eighth_arrival_publishes_the_measured_interval() {
        let mut engine = AsidEngine::new(30_000);
        engine.handle_message(&sysex(0x4E, &full_registers()), Cycles::new(20_000));
        assert_eq!(engine.take_rate_update(), Some(29_999), "initial interval on wake-up");
        for i in 2..=7u32 {
            engine.handle_message(&sysex(0x4E, &full_registers()), Cycles::new(i * 20_000));
            assert_eq!(engine.take_rate_update(), None, "no rate before the window fills");
        }
        engine.handle_message(&sysex(0x4E, &full_registers()), Cycles::new(160_000));
        assert_eq!(engine.take_rate_update(), Some(19_999));
        assert_eq!(engine.drain_interval(), 19_999);
    }

    #[test]
    fn environment_message_pins_the_interval() {
        let mut engine = AsidEngine::new(20_000);
        // 1998 us explicit frame delta, speed 1.
        engine.handle_message(&sysex(0x4A, &[0x00, 0x4E, 0x0F, 0x01]), Cycles::ZERO);
        for i in 1..=8u32 {
            engine.handle_message(&sysex(0x4E, &full_registers()), Cycles::new(i * 20_000));
        }
        assert_eq!(engine.drain_interval(), 1_997, "explicit delta beats measurement");
    }

    #[test]
    fn environment_standard_index_is_the_fallback() {
        let mut engine = AsidEngine::new(20_000);
        // No delta; NTSC standard at double speed.
        engine.handle_message(&sysex(0x4A, &[0x02, 0x00, 0x00, 0x02]), Cycles::ZERO);
        for i in 1..=8u32 {
            engine.handle_message(&sysex(0x4E, &full_registers()), Cycles::new(i * 20_000));
        }
        assert_eq!(engine.drain_interval(), 16_715 / 2 - 1);
    }

    #[test]
    fn arrival_gap_resets_the_window() {
        let mut engine = AsidEngine::new(20_000);
        for _ in 0..17 {
            engine.handle_message(&sysex(0x4E, &full_registers()), Cycles::new(1_000));
        }
        assert_eq!(engine.ring_frames(), 40, "sustained input should have grown the ring");
        engine.handle_message(&sysex(0x4E, &full_registers()), Cycles::new(601_002));
        assert_eq!(engine.ring_frames(), 20);
        assert_eq!(engine.buffered_bytes(), 112, "only the post-gap frame survives");
    }

    #[test]
    fn idle_ticks_tear_the_buffering_down() {
        let mut engine = AsidEngine::new(20_000);
        engine.handle_message(&sysex(0x4C, &[]), Cycles::ZERO);
        assert!(engine.active());
        for _ in 0..100 {
            engine.tick(|_, _, _| {});
        }
        assert!(engine.active(), "still buffering at exactly IDLE_TICKS empty ticks");
        engine.tick(|_, _, _| {});
        assert!(!engine.active());
        assert_eq!(engine.ring_frames(), 0);
    }

    #[test]
    fn the_next_frame_reinitializes_lazily() {
        let mut engine = AsidEngine::new(20_000);
        engine.handle_message(&sysex(0x4C, &[]), Cycles::ZERO);
        engine.take_rate_update();
        for _ in 0..101 {
            engine.tick(|_, _, _| {});
        }
        assert!(!engine.active());
        engine.handle_message(&sysex(0x4E, &full_registers()), Cycles::new(5_000));
        assert!(engine.active());
        assert_eq!(engine.take_rate_update(), Some(19_999));
    }

    #[test]
    fn overfeeding_engages_the_emergency_cut() {
        let mut engine = AsidEngine::new(20_000);
        for i in 1..=160u32 {
            engine.handle_message(&sysex(0x4E, &full_registers()), Cycles::new(i * 20_000));
        }
        assert_eq!(engine.ring_frames(), 150, "the ring should be maxed out");
        assert!(
            engine.drain_interval() < 15_000,
            "emergency cuts must go below the ordinary slow-down"
        );
        assert_eq!(engine.take_rate_update(), Some(engine.drain_interval()));
    }
}
