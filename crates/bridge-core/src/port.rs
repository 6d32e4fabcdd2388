//! Hardware seams.
//!
//! The bridge core is portable: everything that touches real silicon sits
//! behind one of these traits. The firmware build implements them over the
//! PIO state machines and flash controller; the test suite and the demo
//! binary implement them over virtual hardware.

use crate::{ControlWord, Cycles, DataWord};

/// One programmable flash page.
pub const FLASH_PAGE_SIZE: usize = 256;

/// Smallest erasable flash unit; holds 16 config pages.
pub const FLASH_SECTOR_SIZE: usize = 4096;

/// The bus sequencer front end.
///
/// Models the transfer FIFOs of the cycle-exact bus sequencers. A queued
/// delay gates the control/data pair queued after it by that many chip
/// cycles; the sequencers consume transfers strictly in push order.
pub trait BusPort {
    /// Queue a control transfer (R/W plus chip-select lines).
    fn push_control(&mut self, word: ControlWord);

    /// Queue a data transfer (pin directions, bus address, data byte).
    fn push_data(&mut self, word: DataWord);

    /// Queue a delay of the given number of chip cycles.
    fn push_delay(&mut self, cycles: u16);

    /// Block until the pending read transfer latches; returns the byte.
    fn pull_read(&mut self) -> u8;

    /// Drive the chip reset line (high = run, low = hold in reset).
    fn set_reset(&mut self, high: bool);

    /// Drive both chip-select lines high (deasserted) directly, bypassing
    /// the sequencers.
    fn deselect_all(&mut self);
}

/// The clock generator and free-running cycle counter.
pub trait ClockPort {
    /// Current value of the cycle counter. Wraps modulo 2^32, never resets.
    fn cycles(&mut self) -> Cycles;

    /// Reprogram the clock divider for a new chip clock rate in Hz.
    fn set_clock_hz(&mut self, hz: u32);

    /// Restart the clock output and every sequencer that derives from it.
    fn restart_sequencers(&mut self);

    /// True when the board carries an external crystal on the clock pin.
    /// With an external oscillator the divider must not be programmed.
    fn external_oscillator(&mut self) -> bool;
}

/// One flash sector used for configuration persistence.
///
/// Only the load/save contract is modeled: erasure works on the whole
/// sector, programming on one page inside it.
pub trait FlashSector {
    /// Erase the whole sector to `0xFF`.
    fn erase(&mut self);

    /// Program one page. `page` indexes pages within the sector.
    fn program(&mut self, page: usize, data: &[u8; FLASH_PAGE_SIZE]);

    /// Read one page.
    fn read(&self, page: usize, out: &mut [u8; FLASH_PAGE_SIZE]);
}
