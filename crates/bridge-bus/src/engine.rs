//! Bus transaction engine.
//!
//! Every chip access flows through here: the engine resolves the
//! 7-bit address against the active routing, composes the control and
//! data words and pushes them at the [`BusPort`] sequencers. A shadow
//! copy of all 128 register bytes is kept for write-data readback,
//! mute masking and the volume meter.
//!
//! Operations are not reentrant; each runs to completion before the
//! next starts. Cycled operations block by design.

use bridge_config::RuntimeCfg;
use bridge_core::{BusPort, ControlWord, DataWord, MODE_VOL, SID_REGISTERS};

/// Shadow image of the four 32-byte register windows.
pub const SHADOW_SIZE: usize = 128;

pub struct BusEngine<P> {
    port: P,
    shadow: [u8; SHADOW_SIZE],
    muted: bool,
}

impl<P: BusPort> BusEngine<P> {
    pub fn new(port: P) -> Self {
        Self {
            port,
            shadow: [0; SHADOW_SIZE],
            muted: false,
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Give the port back, for a device restart.
    pub fn into_port(self) -> P {
        self.port
    }

    /// Last byte written to (or read from) `address`.
    pub fn shadow(&self, address: u8) -> u8 {
        self.shadow[(address & 0x7F) as usize]
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    /// While muted, outgoing volume writes are masked to zero. Shadow
    /// memory keeps the unmasked byte.
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Immediate write, no delay transfer.
    pub fn write(&mut self, cfg: &RuntimeCfg, address: u8, data: u8) {
        let address = address & 0x7F;
        self.shadow[address as usize] = data;
        let Some((control, data_word)) = self.compose_write(cfg, address) else {
            return;
        };
        self.port.push_control(control);
        self.port.push_data(data_word);
    }

    /// Write gated by a delay of `cycles` chip clocks. The delay
    /// transfer is queued first; it holds back the control and data
    /// sequencers until it expires.
    pub fn cycled_write(&mut self, cfg: &RuntimeCfg, address: u8, data: u8, cycles: u16) {
        let address = address & 0x7F;
        self.shadow[address as usize] = data;
        let Some((control, data_word)) = self.compose_write(cfg, address) else {
            return;
        };
        self.port.push_delay(cycles);
        self.port.push_control(control);
        self.port.push_data(data_word);
    }

    /// Read gated by a delay of `cycles` chip clocks. Blocks until the
    /// read byte latches; the byte also lands in shadow memory.
    pub fn cycled_read(&mut self, cfg: &RuntimeCfg, address: u8, cycles: u16) -> u8 {
        let address = address & 0x7F;
        let window = (address >> 5) as usize;
        let route = cfg.slots[window];
        if !route.is_active() {
            return 0;
        }
        self.port.push_delay(cycles);
        self.port
            .push_control(ControlWord::read(route.chip_select));
        self.port
            .push_data(DataWord::read(route.bus_address(address)));
        let data = self.port.pull_read();
        self.shadow[address as usize] = data;
        data
    }

    /// Block for `cycles` chip clocks. A zero count returns at once.
    pub fn cycled_delay(&mut self, cycles: u16) -> u16 {
        if cycles == 0 {
            return 0;
        }
        self.port.push_delay(cycles);
        cycles
    }

    /// Raise the reset line and restore full volume on every chip.
    pub fn enable_sids(&mut self, cfg: &RuntimeCfg) {
        self.port.set_reset(true);
        for chip in 0..cfg.numsids {
            self.write(cfg, 0x20 * chip + MODE_VOL, 0x0F);
        }
    }

    /// Silence every chip, deselect both sockets, drop the reset line.
    pub fn disable_sids(&mut self, cfg: &RuntimeCfg) {
        for chip in 0..cfg.numsids {
            self.write(cfg, 0x20 * chip + MODE_VOL, 0x00);
        }
        self.port.deselect_all();
        self.port.set_reset(false);
    }

    /// Full reset cycle: disable, clear the bus, enable.
    pub fn reset_sids(&mut self, cfg: &RuntimeCfg) {
        self.disable_sids(cfg);
        self.clear_bus();
        self.enable_sids(cfg);
    }

    /// Drive all address and data pins out and low.
    pub fn clear_bus(&mut self) {
        self.port.push_data(DataWord::CLEAR);
    }

    /// Park the bus: both chip selects high, write direction.
    pub fn pause_sids(&mut self) {
        self.port.push_control(ControlWord::PAUSE);
    }

    /// Zero all 29 registers of every chip, then clear the bus.
    pub fn clear_registers(&mut self, cfg: &RuntimeCfg) {
        for chip in 0..cfg.numsids {
            for reg in SID_REGISTERS {
                self.write(cfg, 0x20 * chip + reg, 0x00);
            }
        }
        self.clear_bus();
    }

    /// Resolve `address` and compose the write-direction word pair.
    /// `None` when no chip serves the window; the caller drops the
    /// operation silently.
    fn compose_write(&self, cfg: &RuntimeCfg, address: u8) -> Option<(ControlWord, DataWord)> {
        let window = (address >> 5) as usize;
        let route = cfg.slots[window];
        if !route.is_active() {
            return None;
        }
        let mut data = self.shadow[address as usize];
        if self.muted && (address & 0x1F) == MODE_VOL {
            data &= 0xF0;
        }
        Some((
            ControlWord::write(route.chip_select),
            DataWord::write(route.bus_address(address), data),
        ))
    }
}
