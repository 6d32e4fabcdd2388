//! Validation and repair of socket configurations.
//!
//! Runs before every runtime derivation. Sockets with repairable
//! problems are reset to their documented default in place; only a
//! configuration with nothing left to drive the bus is rejected.

use log::{info, warn};

use crate::error::ConfigError;
use crate::model::{ChipType, CloneType, Config, SidSlot, SidType, SocketConfig};

const SOCKET_NAMES: [&str; 2] = ["socket one", "socket two"];

/// Check, repair and renumber a configuration.
///
/// On return the socket flags are internally consistent and every
/// enabled chip slot carries its cascade-assigned bus id and address.
/// Hard errors leave `config` untouched.
pub fn validate(config: &mut Config) -> Result<(), ConfigError> {
    check_usable(config)?;
    repair_sockets(config);
    let conflict = if config.mirrored {
        None
    } else {
        address_conflict(config)
    };
    if let Some(addr) = conflict {
        warn!("address conflict at {addr:#04x}, socket two reset to default");
        config.socket_two = SocketConfig::default_for(1);
        repair_sockets(config);
    }
    assign_addresses(config);
    Ok(())
}

/// Post-detection cleanup. Downgrades dual sockets whose second chip
/// did not respond, and disables a socket where nothing responded and
/// no clone is configured.
pub fn verify_detection(config: &mut Config) {
    for index in 0..2 {
        let socket = config.socket_mut(index);
        if socket.sid1.kind != SidType::Unknown && socket.sid2.kind == SidType::NotApplicable {
            if socket.dualsid {
                info!("{}: no second chip found, dualsid off", SOCKET_NAMES[index]);
            }
            socket.dualsid = false;
        }
        if socket.sid1.kind == SidType::Unknown
            && socket.sid2.kind == SidType::NotApplicable
            && socket.chiptype == ChipType::Real
            && socket.clonetype == CloneType::Disabled
        {
            if socket.enabled {
                info!("{}: no chip detected, socket disabled", SOCKET_NAMES[index]);
            }
            socket.enabled = false;
        }
    }
}

fn check_usable(config: &Config) -> Result<(), ConfigError> {
    if !config.socket_one.enabled && !config.socket_two.enabled {
        return Err(ConfigError::BothSocketsDisabled);
    }
    let slots = config.slots();
    if slots.iter().all(|slot| slot.id == SidSlot::NO_ID)
        || slots.iter().all(|slot| slot.addr == SidSlot::NO_ADDR)
        || slots.iter().all(|slot| slot.kind == SidType::NotApplicable)
    {
        return Err(ConfigError::NoValidSid);
    }
    Ok(())
}

fn repair_sockets(config: &mut Config) {
    for index in 0..2 {
        let socket = config.socket_mut(index);
        if socket.enabled && socket.dualsid && socket.chiptype == ChipType::Real {
            warn!(
                "{}: dualsid requires clone chip, reset to default",
                SOCKET_NAMES[index]
            );
            *socket = SocketConfig::default_for(index);
            continue;
        }
        if socket.enabled
            && (socket.sid1.addr == SidSlot::NO_ADDR || socket.sid1.kind == SidType::NotApplicable)
        {
            warn!(
                "{}: primary SID disabled on enabled socket, reset to default",
                SOCKET_NAMES[index]
            );
            *socket = SocketConfig::default_for(index);
            continue;
        }
        if !socket.enabled {
            continue;
        }
        // Clonetype must agree with chiptype for routing and detection.
        if socket.dualsid {
            socket.chiptype = ChipType::Clone;
            if socket.clonetype == CloneType::Disabled {
                socket.clonetype = CloneType::Other;
            }
        } else if socket.chiptype == ChipType::Clone {
            if socket.clonetype == CloneType::Disabled {
                socket.clonetype = CloneType::Other;
            }
        } else {
            socket.clonetype = CloneType::Disabled;
        }
    }
}

fn address_conflict(config: &Config) -> Option<u8> {
    let mut addrs = [0u8; 4];
    let mut count = 0;
    for index in 0..2 {
        let socket = config.socket(index);
        if !socket.enabled {
            continue;
        }
        let slots = [socket.sid1, socket.sid2];
        for slot in slots.iter().take(if socket.dualsid { 2 } else { 1 }) {
            if slot.addr != SidSlot::NO_ADDR {
                addrs[count] = slot.addr;
                count += 1;
            }
        }
    }
    for i in 0..count {
        for j in (i + 1)..count {
            if addrs[i] == addrs[j] {
                return Some(addrs[i]);
            }
        }
    }
    None
}

/// Renumber every chip slot from the socket flags.
///
/// Socket one always claims the low windows; socket two continues from
/// the next free id. Disabled sockets and absent second chips get the
/// 0xFF sentinels.
fn assign_addresses(config: &mut Config) {
    let one = &mut config.socket_one;
    if one.enabled {
        one.sid1.id = 0;
        one.sid1.addr = 0x00;
        if one.dualsid {
            one.sid2.id = 1;
            one.sid2.addr = 0x20;
        } else {
            one.sid2.id = SidSlot::NO_ID;
            one.sid2.addr = SidSlot::NO_ADDR;
        }
    } else {
        one.sid1.id = SidSlot::NO_ID;
        one.sid1.addr = SidSlot::NO_ADDR;
        one.sid2.id = SidSlot::NO_ID;
        one.sid2.addr = SidSlot::NO_ADDR;
    }
    let base = config.socket_one.chip_count();
    let two = &mut config.socket_two;
    if two.enabled {
        two.sid1.id = base;
        two.sid1.addr = base * 0x20;
        if two.dualsid {
            two.sid2.id = base + 1;
            two.sid2.addr = (base + 1) * 0x20;
        } else {
            two.sid2.id = SidSlot::NO_ID;
            two.sid2.addr = SidSlot::NO_ADDR;
        }
    } else {
        two.sid1.id = SidSlot::NO_ID;
        two.sid1.addr = SidSlot::NO_ADDR;
        two.sid2.id = SidSlot::NO_ID;
        two.sid2.addr = SidSlot::NO_ADDR;
    }
}
