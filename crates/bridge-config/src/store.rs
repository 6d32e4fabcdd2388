//! Wear-leveling configuration persistence.
//!
//! One 4096-byte flash sector holds 16 page-sized slots. Saves rotate
//! through the slots so the sector erase only happens once per 16
//! writes; the monotonically increasing `config_saveid` marks which
//! slot is newest.

use bridge_core::{FLASH_PAGE_SIZE, FLASH_SECTOR_SIZE, FlashSector};
use log::{info, warn};

use crate::blob;
use crate::model::Config;

pub const CONFIG_SLOTS: usize = FLASH_SECTOR_SIZE / FLASH_PAGE_SIZE;

pub struct ConfigStore<F> {
    flash: F,
    slot: usize,
}

impl<F: FlashSector> ConfigStore<F> {
    pub fn new(flash: F) -> Self {
        Self {
            flash,
            // Next save rolls over to slot 0 until a load says otherwise.
            slot: CONFIG_SLOTS - 1,
        }
    }

    /// Scan the sector and return the newest stored configuration.
    ///
    /// Walks forward from slot 0 while each slot's saveid continues the
    /// chain `slot0.saveid + index`; the slot before the first break is
    /// the live one. A sector whose slot 0 fails the magic check yields
    /// compiled defaults.
    pub fn load(&mut self) -> Config {
        let mut page = [0u8; FLASH_PAGE_SIZE];
        self.flash.read(0, &mut page);
        let Some(first) = blob::deserialize(&page) else {
            warn!("no valid config in flash, using compiled defaults");
            self.slot = CONFIG_SLOTS - 1;
            return Config::default();
        };
        let base = first.config_saveid;
        let mut newest = first;
        self.slot = 0;
        for slot in 1..CONFIG_SLOTS {
            self.flash.read(slot, &mut page);
            match blob::deserialize(&page) {
                Some(config) if config.config_saveid == base.wrapping_add(slot as u8) => {
                    newest = config;
                    self.slot = slot;
                }
                _ => break,
            }
        }
        info!(
            "config loaded from flash slot {} (saveid {})",
            self.slot, newest.config_saveid
        );
        newest
    }

    /// Persist `config` into the next slot of the rotation.
    ///
    /// Bumps the saveid and clears the default-config flag on the way
    /// out. Only a write to slot 0 pays for a sector erase.
    pub fn save(&mut self, config: &mut Config) {
        config.config_saveid = config.config_saveid.wrapping_add(1);
        config.default_config = false;
        let slot = (self.slot + 1) % CONFIG_SLOTS;
        if slot == 0 {
            self.flash.erase();
        }
        self.flash.program(slot, &blob::serialize(config));
        self.slot = slot;
        info!(
            "config saved to flash slot {slot} (saveid {})",
            config.config_saveid
        );
    }

    /// Erase the sector outright; the next load yields defaults.
    pub fn wipe(&mut self) {
        self.flash.erase();
        self.slot = CONFIG_SLOTS - 1;
    }

    /// Give the flash handle back, for a device restart.
    pub fn into_flash(self) -> F {
        self.flash
    }
}
