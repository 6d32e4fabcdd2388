//! Clone-family probes.
//!
//! Every SID replacement board answers some out-of-band register
//! sequence a real MOS chip ignores. Each probe here speaks one of
//! those dialects at a socket's base address and reports whether the
//! board answered. Probes are safe to run against real silicon; the
//! register traffic they leave behind is cleaned up by the caller's
//! register reset.

use bridge_bus::BusEngine;
use bridge_config::RuntimeCfg;
use bridge_core::BusPort;
use log::{debug, info};

/// Identify register value of the FPGASID, MSB first.
const FPGASID_ID: u16 = 0xF51D;

/// BackSID answers this byte from its identity register.
const BACKSID_ID: u8 = 0xBA;

/// SIDKick-pico config-mode version readback. The firmware banner
/// carries "pico" at offset 2 once the dropped high bits are restored.
pub fn detect_skpico<P: BusPort>(engine: &mut BusEngine<P>, cfg: &RuntimeCfg, base: u8) -> bool {
    let mut banner = [0u8; 36];
    engine.cycled_write(cfg, base + 0x1F, 0xFF, 10);
    engine.cycled_write(cfg, base + 0x1D, 0xFA, 10);
    for (index, byte) in banner.iter_mut().enumerate() {
        engine.cycled_write(cfg, base + 0x1E, (0xE0 + index) as u8, 10);
        *byte = engine.cycled_read(cfg, base + 0x1D, 10);
        if (2..=5).contains(&index) {
            *byte |= 0x60;
        }
    }
    // Leaving config mode lets a real chip recover for the revision
    // probes that follow.
    engine.cycled_write(cfg, base + 0x1D, 0xFB, 10);
    if &banner[2..6] == b"pico" {
        let text = String::from_utf8_lossy(&banner);
        info!(
            "SIDKick-pico at {base:#04x}, firmware {}",
            text.trim_matches(char::from(0))
        );
        return true;
    }
    false
}

/// ARMSID identification handshake: spell "SID" into the extension
/// registers and read the two answer bytes back.
pub fn detect_armsid<P: BusPort>(engine: &mut BusEngine<P>, cfg: &RuntimeCfg, base: u8) -> bool {
    engine.cycled_write(cfg, base + 0x1D, b'S', 10);
    engine.cycled_write(cfg, base + 0x1E, b'I', 10);
    engine.cycled_write(cfg, base + 0x1F, b'D', 10);
    let first = engine.cycled_read(cfg, base + 0x1B, 10);
    let second = engine.cycled_read(cfg, base + 0x1C, 10);
    match (first, second) {
        (b'N', b'O') => {
            info!("ARMSID at {base:#04x}");
            true
        }
        (b'L', b'R') => {
            info!("ARM2SID at {base:#04x}");
            true
        }
        _ => false,
    }
}

/// FPGASID magic-cookie probe: enter config mode, raise the identify
/// bit and read the two-byte id, then drop back out.
pub fn detect_fpgasid<P: BusPort>(engine: &mut BusEngine<P>, cfg: &RuntimeCfg, base: u8) -> bool {
    engine.cycled_write(cfg, base + 0x19, 0x80, 6);
    engine.cycled_write(cfg, base + 0x1A, 0x65, 6);
    engine.cycled_write(cfg, base + 0x1E, 1 << 7, 6);
    let id_lo = engine.cycled_read(cfg, base + 0x19, 4);
    let id_hi = engine.cycled_read(cfg, base + 0x1A, 4);
    engine.cycled_write(cfg, base + 0x19, 0x00, 6);
    engine.cycled_write(cfg, base + 0x1A, 0x00, 6);
    let id = u16::from(id_hi) << 8 | u16::from(id_lo);
    debug!("fpgasid identify read {id:#06x} at {base:#04x}");
    if id == FPGASID_ID {
        info!("FPGASID at {base:#04x}");
        return true;
    }
    false
}

/// BackSID handshake: two magic bytes arm the extension interface,
/// selecting register zero then exposes the identity byte.
pub fn detect_backsid<P: BusPort>(engine: &mut BusEngine<P>, cfg: &RuntimeCfg, base: u8) -> bool {
    engine.cycled_write(cfg, base + 0x1D, 0xB5, 10);
    engine.cycled_write(cfg, base + 0x1E, 0x1D, 10);
    engine.cycled_write(cfg, base + 0x1B, 0x00, 10);
    let id = engine.cycled_read(cfg, base + 0x1F, 10);
    if id == BACKSID_ID {
        info!("BackSID at {base:#04x}");
        return true;
    }
    false
}

/// FMopl activation check for SIDKick-pico sockets. The opl test
/// pattern leaves status 0xC0 when an OPL core is listening.
pub fn detect_fmopl<P: BusPort>(engine: &mut BusEngine<P>, cfg: &RuntimeCfg, base: u8) -> bool {
    let mut status = 0;
    for _ in 0..4 {
        engine.cycled_write(cfg, base, 0x04, 10);
        engine.cycled_write(cfg, base + 0x10, 0x60, 10);
        engine.cycled_write(cfg, base, 0x04, 10);
        engine.cycled_write(cfg, base + 0x10, 0x80, 10);
        status = engine.cycled_read(cfg, base, 10);
        if status == 0xC0 {
            break;
        }
    }
    debug!("fmopl status {status:#04x} at {base:#04x}");
    status == 0xC0
}
