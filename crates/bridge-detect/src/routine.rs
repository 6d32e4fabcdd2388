//! Detection drivers.
//!
//! [`detect_clone_type`] walks the clone-family probes in priority
//! order for one socket. [`detect_sid_type`] resolves the silicon
//! revision of one chip slot. [`auto_detect`] strings both together
//! across a quad scan layout and lands the result through the config
//! manager, so the routing the host sees afterwards went through the
//! same validation as any manual edit.

use std::thread;
use std::time::Duration;

use bridge_bus::BusEngine;
use bridge_config::{
    verify_detection, ChipType, CloneType, Config, ConfigError, ConfigManager, RuntimeCfg,
    SidSlot, SidType, SocketConfig,
};
use bridge_core::BusPort;
use log::{error, info, warn};

use crate::clone::{detect_armsid, detect_backsid, detect_fmopl, detect_fpgasid, detect_skpico};
use crate::revision::detect_revision;

/// What detection concluded about one socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketDetection {
    /// A usable chip answered; the socket stays enabled.
    pub present: bool,
    pub chiptype: ChipType,
    pub clonetype: CloneType,
    pub dualsid: bool,
    pub kinds: [SidType; 2],
}

/// Outcome of a full [`auto_detect`] run, taken from the installed
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionResult {
    pub sockets: [SocketDetection; 2],
    pub numsids: u8,
}

impl DetectionResult {
    fn from_state(config: &Config, runtime: &RuntimeCfg) -> Self {
        let socket = |index: usize| {
            let socket = config.socket(index);
            SocketDetection {
                present: socket.enabled,
                chiptype: socket.chiptype,
                clonetype: socket.clonetype,
                dualsid: socket.dualsid,
                kinds: [socket.sid1.kind, socket.sid2.kind],
            }
        };
        Self {
            sockets: [socket(0), socket(1)],
            numsids: runtime.numsids,
        }
    }
}

/// Probe one socket for a clone board, highest-priority dialect first.
///
/// On a match the socket is marked as that clone family. When nothing
/// answers the socket falls back to real silicon and loses its second
/// chip slot, since only clones can serve two.
pub fn detect_clone_type<P: BusPort>(
    engine: &mut BusEngine<P>,
    cfg: &RuntimeCfg,
    socket: &mut SocketConfig,
) -> CloneType {
    if !socket.enabled {
        return CloneType::Disabled;
    }
    let base = socket.sid1.addr;
    let clone = if detect_skpico(engine, cfg, base) {
        CloneType::SkPico
    } else if detect_armsid(engine, cfg, base) {
        CloneType::ArmSid
    } else if detect_fpgasid(engine, cfg, base) {
        CloneType::FpgaSid
    } else if detect_backsid(engine, cfg, base) {
        CloneType::BackSid
    } else {
        socket.chiptype = ChipType::Real;
        socket.clonetype = CloneType::Disabled;
        socket.dualsid = false;
        socket.sid2 = SidSlot::ABSENT;
        return CloneType::Disabled;
    };
    socket.chiptype = ChipType::Clone;
    socket.clonetype = clone;
    clone
}

/// Resolve the revision of one chip slot in an enabled socket.
///
/// A disabled socket is normalised to an empty real socket instead.
/// SIDKick-pico slots that stay Unknown get the FMopl activation
/// check; the returned flag reports a hit so the caller can raise the
/// config toggle.
pub fn detect_sid_type<P: BusPort>(
    engine: &mut BusEngine<P>,
    cfg: &RuntimeCfg,
    socket: &mut SocketConfig,
    second: bool,
) -> (SidType, bool) {
    if !socket.enabled {
        socket.chiptype = ChipType::Real;
        socket.clonetype = CloneType::Disabled;
        let slot = if second { &mut socket.sid2 } else { &mut socket.sid1 };
        slot.kind = SidType::NotApplicable;
        return (SidType::NotApplicable, false);
    }

    let skpico = socket.clonetype == CloneType::SkPico;
    let addr = if second { socket.sid2.addr } else { socket.sid1.addr };
    let mut kind = if addr == SidSlot::NO_ADDR {
        SidType::Unknown
    } else {
        detect_revision(engine, cfg, addr, skpico)
    };

    let mut fmopl = false;
    if skpico && kind == SidType::Unknown && addr != SidSlot::NO_ADDR && detect_fmopl(engine, cfg, addr)
    {
        kind = SidType::FmOpl;
        fmopl = true;
    }

    let slot = if second { &mut socket.sid2 } else { &mut socket.sid1 };
    slot.kind = kind;
    info!("chip at {addr:#04x} detected as {}", kind.label());
    (kind, fmopl)
}

/// The scan layout one socket starts from: enabled, dual, a generic
/// clone, chips at consecutive windows.
fn scan_socket(index: u8) -> SocketConfig {
    let first = index * 2;
    SocketConfig {
        enabled: true,
        dualsid: true,
        chiptype: ChipType::Clone,
        clonetype: CloneType::Other,
        sid1: SidSlot::new(first, first * 0x20, SidType::Unknown),
        sid2: SidSlot::new(first + 1, (first + 1) * 0x20, SidType::Unknown),
    }
}

fn settle(enabled: bool, millis: u64) {
    if enabled {
        thread::sleep(Duration::from_millis(millis));
    }
}

fn install_or_restore(
    manager: &mut ConfigManager,
    candidate: Config,
    snapshot: &Config,
) -> Result<(), ConfigError> {
    match manager.install(candidate) {
        Ok(()) => Ok(()),
        Err(err) => {
            warn!("detection produced an unusable config: {err}");
            if let Err(restore) = manager.install(*snapshot) {
                error!("previous config did not restore: {restore}");
            }
            Err(err)
        }
    }
}

/// Full auto-detection pass.
///
/// With `auto_config` the current socket layout is replaced by a quad
/// scan layout first, and the results are cross-checked before the
/// final install; without it the probes run over the sockets as
/// configured. `with_delay` inserts the settling pauses SIDKick-pico
/// boards need right after power-up. On failure the configuration
/// from before the call is restored.
pub fn auto_detect<P: BusPort>(
    engine: &mut BusEngine<P>,
    manager: &mut ConfigManager,
    auto_config: bool,
    with_delay: bool,
) -> Result<DetectionResult, ConfigError> {
    let snapshot = *manager.config();

    if auto_config {
        let mut scan = snapshot;
        scan.mirrored = false;
        scan.socket_one = scan_socket(0);
        scan.socket_two = scan_socket(1);
        install_or_restore(manager, scan, &snapshot)
            .map_err(|_| ConfigError::DetectionFailed)?;
        settle(with_delay, 250);
    }

    let mut working = *manager.config();
    let routing = *manager.runtime();

    // Clone probes, a second attempt per socket when nothing answers.
    settle(with_delay, 500);
    if detect_clone_type(engine, &routing, &mut working.socket_one) == CloneType::Disabled {
        detect_clone_type(engine, &routing, &mut working.socket_one);
    }
    settle(with_delay, 500);
    if detect_clone_type(engine, &routing, &mut working.socket_two) == CloneType::Disabled {
        detect_clone_type(engine, &routing, &mut working.socket_two);
    }

    install_or_restore(manager, working, &snapshot).map_err(|_| ConfigError::DetectionFailed)?;
    working = *manager.config();
    let routing = *manager.runtime();

    // Revision probes per populated chip slot.
    settle(with_delay, 250);
    let mut fmopl = false;
    for index in 0..2 {
        let socket = working.socket_mut(index);
        let (_, hit) = detect_sid_type(engine, &routing, socket, false);
        fmopl |= hit;
        if socket.dualsid {
            let (_, hit) = detect_sid_type(engine, &routing, socket, true);
            fmopl |= hit;
        }
    }
    if fmopl {
        working.fmopl_enabled = true;
    }

    if auto_config {
        verify_detection(&mut working);
    }
    install_or_restore(manager, working, &snapshot).map_err(|_| ConfigError::DetectionFailed)?;

    // Probing leaves voices half-programmed; start from silence.
    engine.clear_registers(manager.runtime());

    let result = DetectionResult::from_state(manager.config(), manager.runtime());
    info!(
        "detection done, {} chip(s): socket one {} {}, socket two {} {}",
        result.numsids,
        manager.config().socket_one.chiptype.label(),
        manager.config().socket_one.clonetype.label(),
        manager.config().socket_two.chiptype.label(),
        manager.config().socket_two.clonetype.label(),
    );
    Ok(result)
}
