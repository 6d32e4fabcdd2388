//! Silicon-revision probes.
//!
//! Three independent algorithms tell a 6581 from an 8580, none of them
//! reliable on every board. [`detect_revision`] runs them in fallback
//! order for real sockets; SIDKick-pico sockets get the slowed-down
//! variant the board's emulation timing requires. A routine reports
//! [`SidType::Unknown`] when its own success check never passed, so a
//! dead socket stays Unknown instead of turning into a phantom chip.

use std::thread;
use std::time::Duration;

use bridge_bus::BusEngine;
use bridge_config::{RuntimeCfg, SidType};
use bridge_core::BusPort;
use bridge_core::SID_REGISTERS;
use log::debug;

/// Retries per probe before it gives up on a stable answer.
const PROBE_ATTEMPTS: u32 = 4;

/// Waveform-based probe. Plays the test-bit trick against voice three
/// and reads the oscillator back: 0 means 8580, 1 means 6581. A second
/// read must return 3 or the answer is discarded.
pub fn detect_sid_model<P: BusPort>(
    engine: &mut BusEngine<P>,
    cfg: &RuntimeCfg,
    base: u8,
) -> SidType {
    engine.clear_bus();
    let mut raw = 0;
    let mut readback = 0;
    for _ in 0..PROBE_ATTEMPTS {
        engine.cycled_write(cfg, base + 0x12, 0x48, 6);
        engine.cycled_write(cfg, base + 0x0F, 0x48, 4);
        engine.cycled_write(cfg, base + 0x12, 0x24, 4);
        raw = engine.cycled_read(cfg, base + 0x1B, 3);
        readback = engine.cycled_read(cfg, base + 0x1B, 6);
        if raw == 0 || raw == 1 {
            break;
        }
    }
    debug!("model probe at {base:#04x} raw {raw:#04x} readback {readback:#04x}");
    if readback != 3 {
        return SidType::Unknown;
    }
    match raw {
        0 => SidType::Mos8580,
        1 => SidType::Mos6581,
        _ => SidType::Unknown,
    }
}

/// Oscillator-based probe. Saturates voice three's frequency with the
/// test bit held, releases it into a sawtooth and samples the
/// oscillator: 2 means 8580, 3 means 6581.
pub fn detect_sid_version<P: BusPort>(
    engine: &mut BusEngine<P>,
    cfg: &RuntimeCfg,
    base: u8,
) -> SidType {
    let mut raw = 0;
    for _ in 0..PROBE_ATTEMPTS {
        engine.cycled_write(cfg, base + 0x12, 0xFF, 6);
        engine.cycled_write(cfg, base + 0x0E, 0xFF, 4);
        engine.cycled_write(cfg, base + 0x0F, 0xFF, 4);
        engine.cycled_write(cfg, base + 0x12, 0x20, 6);
        raw = engine.cycled_read(cfg, base + 0x1B, 3);
        if raw == 2 || raw == 3 {
            break;
        }
    }
    debug!("version probe at {base:#04x} raw {raw:#04x}");
    match raw {
        2 => SidType::Mos8580,
        3 => SidType::Mos6581,
        _ => SidType::Unknown,
    }
}

/// Same oscillator trick, slowed down for the SIDKick-pico. Every
/// transfer is stretched to a thousand cycles and the board gets a
/// millisecond to settle between steps. Raw values pass through the
/// wire encoding unchanged.
pub fn detect_sid_version_skpico<P: BusPort>(
    engine: &mut BusEngine<P>,
    cfg: &RuntimeCfg,
    base: u8,
) -> SidType {
    let mut raw = 0;
    for _ in 0..PROBE_ATTEMPTS {
        engine.cycled_write(cfg, base + 0x12, 0xFF, 1000);
        engine.cycled_write(cfg, base + 0x0E, 0xFF, 1000);
        thread::sleep(Duration::from_millis(1));
        engine.cycled_write(cfg, base + 0x0F, 0xFF, 1000);
        thread::sleep(Duration::from_millis(1));
        engine.cycled_write(cfg, base + 0x12, 0x20, 1000);
        thread::sleep(Duration::from_millis(1));
        raw = engine.cycled_read(cfg, base + 0x1B, 1000);
        if raw == 2 || raw == 3 {
            break;
        }
    }
    debug!("skpico version probe at {base:#04x} raw {raw:#04x}");
    SidType::from_wire(if raw < 4 { raw } else { 0 })
}

/// Timing-based probe, single shot. Clears the first 25 registers to
/// settle the chip, pulses voice three and samples the oscillator.
pub fn detect_sid_unsafe<P: BusPort>(
    engine: &mut BusEngine<P>,
    cfg: &RuntimeCfg,
    base: u8,
) -> SidType {
    for &reg in &SID_REGISTERS[..SID_REGISTERS.len() - 4] {
        engine.cycled_write(cfg, base | reg, 0x00, 9);
    }
    engine.cycled_write(cfg, base + 0x0F, 0x02, 6);
    engine.cycled_write(cfg, base + 0x12, 0x30, 6);
    let raw = engine.cycled_read(cfg, base + 0x1B, 8);
    debug!("unsafe probe at {base:#04x} raw {raw:#04x}");
    match raw {
        2 => SidType::Mos8580,
        3 => SidType::Mos6581,
        _ => SidType::Unknown,
    }
}

/// Revision detection for one chip. Real sockets run the waveform,
/// oscillator and timing probes in fallback order; SIDKick-pico
/// sockets only answer the slowed oscillator variant.
pub fn detect_revision<P: BusPort>(
    engine: &mut BusEngine<P>,
    cfg: &RuntimeCfg,
    base: u8,
    skpico: bool,
) -> SidType {
    if skpico {
        return detect_sid_version_skpico(engine, cfg, base);
    }
    let kind = detect_sid_model(engine, cfg, base);
    if kind != SidType::Unknown {
        return kind;
    }
    let kind = detect_sid_version(engine, cfg, base);
    if kind != SidType::Unknown {
        return kind;
    }
    detect_sid_unsafe(engine, cfg, base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testbus::{quad_scan, ProbePort};

    fn engine_with(reads: &[u8]) -> BusEngine<ProbePort> {
        BusEngine::new(ProbePort::stage(reads))
    }

    #[test]
    fn model_probe_maps_oscillator_bits() {
        let cfg = quad_scan();
        let mut engine = engine_with(&[0, 3]);
        assert_eq!(detect_sid_model(&mut engine, &cfg, 0x00), SidType::Mos8580);

        let mut engine = engine_with(&[1, 3]);
        assert_eq!(detect_sid_model(&mut engine, &cfg, 0x00), SidType::Mos6581);
    }

    #[test]
    fn model_probe_discards_a_failed_read_test() {
        let cfg = quad_scan();
        let mut engine = engine_with(&[1, 0]);
        assert_eq!(detect_sid_model(&mut engine, &cfg, 0x00), SidType::Unknown);
    }

    #[test]
    fn model_probe_retries_on_noise() {
        let cfg = quad_scan();
        let mut engine = engine_with(&[5, 3, 5, 3, 1, 3]);
        assert_eq!(detect_sid_model(&mut engine, &cfg, 0x00), SidType::Mos6581);
        assert_eq!(engine.port().reads_served, 6, "two noisy attempts retried");
    }

    #[test]
    fn model_probe_attempts_are_bounded() {
        let cfg = quad_scan();
        let mut engine = engine_with(&[5, 3, 5, 3, 5, 3, 5, 3, 5, 3]);
        assert_eq!(detect_sid_model(&mut engine, &cfg, 0x00), SidType::Unknown);
        assert_eq!(engine.port().reads_served, 8, "four attempts, two reads each");
    }

    #[test]
    fn version_probe_maps_two_and_three() {
        let cfg = quad_scan();
        let mut engine = engine_with(&[2]);
        assert_eq!(
            detect_sid_version(&mut engine, &cfg, 0x00),
            SidType::Mos8580
        );

        let mut engine = engine_with(&[3]);
        assert_eq!(
            detect_sid_version(&mut engine, &cfg, 0x00),
            SidType::Mos6581
        );

        let mut engine = engine_with(&[]);
        assert_eq!(
            detect_sid_version(&mut engine, &cfg, 0x00),
            SidType::Unknown,
        );
        assert_eq!(engine.port().reads_served, 4);
    }

    #[test]
    fn unsafe_probe_clears_registers_before_sampling() {
        let cfg = quad_scan();
        let mut engine = engine_with(&[2]);
        assert_eq!(detect_sid_unsafe(&mut engine, &cfg, 0x00), SidType::Mos8580);
        let writes = engine.port().writes();
        assert_eq!(writes.len(), 27, "25 clears plus the two probe writes");
        assert!(
            writes[..25].iter().all(|&(_, data)| data == 0),
            "register clear runs first"
        );
    }

    #[test]
    fn skpico_variant_passes_raw_values_through() {
        let cfg = quad_scan();
        let mut engine = engine_with(&[2]);
        assert_eq!(
            detect_sid_version_skpico(&mut engine, &cfg, 0x00),
            SidType::Mos8580
        );

        let mut engine = engine_with(&[9, 9, 9, 9]);
        assert_eq!(
            detect_sid_version_skpico(&mut engine, &cfg, 0x00),
            SidType::Unknown
        );
    }

    #[test]
    fn fallback_chain_consults_the_oscillator_probe() {
        let cfg = quad_scan();
        // Waveform probe fails its read test, oscillator answers 8580.
        let mut engine = engine_with(&[0, 0, 2]);
        assert_eq!(
            detect_revision(&mut engine, &cfg, 0x00, false),
            SidType::Mos8580
        );
    }

    #[test]
    fn fallback_chain_reports_unknown_on_a_dead_socket() {
        let cfg = quad_scan();
        let mut engine = engine_with(&[]);
        assert_eq!(
            detect_revision(&mut engine, &cfg, 0x00, false),
            SidType::Unknown
        );
        // Two waveform reads, four oscillator attempts, one timing read.
        assert_eq!(engine.port().reads_served, 7);
    }

    #[test]
    fn skpico_socket_skips_the_real_chip_probes() {
        let cfg = quad_scan();
        let mut engine = engine_with(&[3]);
        assert_eq!(
            detect_revision(&mut engine, &cfg, 0x00, true),
            SidType::Mos6581
        );
        assert_eq!(engine.port().reads_served, 1);
    }
}
