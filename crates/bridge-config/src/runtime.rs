//! Derived runtime routing state.
//!
//! [`RuntimeCfg`] is the only structure the bus engine and detection
//! code read. It is rebuilt from scratch whenever the persisted
//! [`Config`] changes and swapped in whole, never patched.

use bridge_core::SlotRoute;

use crate::model::{ChipType, Config, SidType};

/// Per-window routing plus chip tallies, derived from a validated
/// [`Config`].
///
/// Index everywhere is the bus id a host addresses (0-3). `id_to_chip`
/// maps back to the physical chip position (socket one sid1/sid2,
/// socket two sid1/sid2 = 0-3), 0xFF where no chip serves the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeCfg {
    pub slots: [SlotRoute; 4],
    pub id_to_chip: [u8; 4],
    pub sid_types: [SidType; 4],
    pub sids_one: u8,
    pub sids_two: u8,
    pub numsids: u8,
    pub mirrored: bool,
    /// Chip number (1-4) answering as FMopl, 0 when none.
    pub fmopl_sid: u8,
}

pub const NO_CHIP: u8 = 0xFF;

impl RuntimeCfg {
    pub fn derive(config: &Config) -> Self {
        let mut slots = [SlotRoute::INACTIVE; 4];
        let mut id_to_chip = [NO_CHIP; 4];
        let mut sid_types = [SidType::NotApplicable; 4];

        for chip in 0..4usize {
            let socket = config.socket(chip / 2);
            if !socket.enabled {
                continue;
            }
            let second = chip % 2 == 1;
            if second && !socket.dualsid {
                continue;
            }
            let slot = if second { &socket.sid2 } else { &socket.sid1 };
            let window = slot.id as usize;
            if window >= slots.len() {
                continue;
            }
            let chip_select = if chip < 2 { 0b100 } else { 0b010 };
            let address_mask = if second { 0x3F } else { 0x1F };
            slots[window] = SlotRoute::new(chip_select, address_mask);
            id_to_chip[window] = chip as u8;
            sid_types[window] = slot.kind;
        }

        let mut sids_one = config.socket_one.chip_count();
        let mut sids_two = config.socket_two.chip_count();

        // Mirroring drives both sockets from socket one's layout and
        // asserts both chip selects on every window.
        let mirrored = config.mirrored && config.socket_one.enabled;
        if mirrored {
            let dual = config.socket_one.dualsid;
            sids_one = if dual { 2 } else { 1 };
            sids_two = sids_one;
            for window in 0..4 {
                let second = dual && window % 2 == 1;
                let address_mask = if second { 0x3F } else { 0x1F };
                slots[window] = SlotRoute::new(0b000, address_mask);
                let chip = if second { 1 } else { 0 };
                id_to_chip[window] = chip;
                let slot = if second {
                    &config.socket_one.sid2
                } else {
                    &config.socket_one.sid1
                };
                sid_types[window] = slot.kind;
            }
        }

        let numsids = if mirrored { sids_one } else { sids_one + sids_two };

        Self {
            slots,
            id_to_chip,
            sid_types,
            sids_one,
            sids_two,
            numsids,
            mirrored,
            fmopl_sid: fmopl_sid(config, sids_one),
        }
    }
}

/// Which chip number (1-4) serves FMopl duty. Only clone sockets can.
fn fmopl_sid(config: &Config, sids_one: u8) -> u8 {
    let one = &config.socket_one;
    if one.enabled && one.chiptype == ChipType::Clone {
        if one.sid1.kind == SidType::FmOpl {
            return 1;
        }
        if one.dualsid && one.sid2.kind == SidType::FmOpl {
            return 2;
        }
    }
    let two = &config.socket_two;
    if two.enabled && two.chiptype == ChipType::Clone {
        if two.sid1.kind == SidType::FmOpl {
            return sids_one + 1;
        }
        if two.dualsid && two.sid2.kind == SidType::FmOpl {
            return sids_one + 2;
        }
    }
    0
}
