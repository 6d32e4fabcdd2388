//! Virtual hardware.
//!
//! RAM-backed stand-ins for the silicon side of the port traits: a bus
//! double with scripted chip personalities behind the chip-select lines,
//! and a flash sector that erases to `0xFF`. The demo binary and the
//! integration tests boot the complete device over these.
//!
//! Transfers land instantly; virtual time moves only through queued
//! delays and [`VirtualBus::advance`].

use std::collections::VecDeque;

use bridge_core::{
    BusPort, ClockPort, ControlWord, Cycles, DataWord, FLASH_PAGE_SIZE, FLASH_SECTOR_SIZE,
    FlashSector,
};

/// What answers behind one 32-byte chip window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChipModel {
    /// Nothing fitted; reads float low.
    #[default]
    Empty,
    Mos6581,
    Mos8580,
}

impl ChipModel {
    const fn present(self) -> bool {
        !matches!(self, Self::Empty)
    }

    /// Oscillator byte for the waveform probe (test bit released into
    /// a sawtooth): 1 on a 6581, 0 on an 8580.
    const fn model_bit(self) -> u8 {
        match self {
            Self::Mos6581 => 1,
            Self::Mos8580 | Self::Empty => 0,
        }
    }

    /// Oscillator byte for the saturated-frequency probes: 3 on a
    /// 6581, 2 on an 8580.
    const fn version_byte(self) -> u8 {
        match self {
            Self::Mos6581 => 3,
            Self::Mos8580 => 2,
            Self::Empty => 0,
        }
    }
}

/// One virtual chip: a register file plus the staged oscillator bytes
/// the revision probes read back.
#[derive(Debug, Default)]
struct VirtualSid {
    model: ChipModel,
    ram: [u8; 32],
    staged: VecDeque<u8>,
}

impl VirtualSid {
    fn write(&mut self, register: u8, data: u8) {
        let register = (register & 0x1F) as usize;
        self.ram[register] = data;
        if register != 0x12 || !self.model.present() {
            return;
        }
        // The voice-three control register drives the probe dialogue.
        match data {
            0x24 => {
                self.staged.clear();
                self.staged.push_back(self.model.model_bit());
                self.staged.push_back(3);
            }
            0x20 | 0x30 => {
                self.staged.clear();
                self.staged.push_back(self.model.version_byte());
            }
            _ => self.staged.clear(),
        }
    }

    fn read(&mut self, register: u8) -> u8 {
        if !self.model.present() {
            return 0;
        }
        match register & 0x1F {
            // Unloaded paddle inputs read back high.
            0x19 | 0x1A => 0xFF,
            0x1B => self.staged.pop_front().unwrap_or(0),
            0x1C => 0,
            register => self.ram[register as usize],
        }
    }

    fn reset(&mut self) {
        self.ram = [0; 32];
        self.staged.clear();
    }
}

/// Bus and clock double. Four chip windows sit behind the two
/// chip-select lines, two windows per socket.
pub struct VirtualBus {
    chips: [[VirtualSid; 2]; 2],
    control: Option<ControlWord>,
    pending_read: Option<u8>,
    clock: u32,
    hz: u32,
    external: bool,
    reset_high: bool,
    restarts: u32,
    writes_seen: u64,
    reads_seen: u64,
    clears: u64,
}

impl VirtualBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            chips: Default::default(),
            control: None,
            pending_read: None,
            clock: 0,
            hz: 1_000_000,
            external: false,
            reset_high: false,
            restarts: 0,
            writes_seen: 0,
            reads_seen: 0,
            clears: 0,
        }
    }

    /// Fit chips into the four windows: socket one primary and
    /// secondary, then socket two primary and secondary.
    #[must_use]
    pub fn with_chips(models: [ChipModel; 4]) -> Self {
        let mut bus = Self::new();
        for (index, model) in models.into_iter().enumerate() {
            bus.chips[index / 2][index % 2].model = model;
        }
        bus
    }

    /// Mark the clock pin as carrying an external crystal.
    pub fn set_external_oscillator(&mut self, external: bool) {
        self.external = external;
    }

    /// Move virtual time forward.
    pub fn advance(&mut self, cycles: u32) {
        self.clock = self.clock.wrapping_add(cycles);
    }

    #[must_use]
    pub fn chip_ram(&self, socket: usize, window: usize) -> &[u8; 32] {
        &self.chips[socket & 1][window & 1].ram
    }

    #[must_use]
    pub fn clock_hz(&self) -> u32 {
        self.hz
    }

    #[must_use]
    pub fn reset_line(&self) -> bool {
        self.reset_high
    }

    #[must_use]
    pub fn sequencer_restarts(&self) -> u32 {
        self.restarts
    }

    #[must_use]
    pub fn writes_seen(&self) -> u64 {
        self.writes_seen
    }

    #[must_use]
    pub fn reads_seen(&self) -> u64 {
        self.reads_seen
    }

    #[must_use]
    pub fn bus_clears(&self) -> u64 {
        self.clears
    }

    /// Sockets addressed by a control word. `0b100` socket one,
    /// `0b010` socket two, `0b000` both, anything else nobody.
    fn selected(control: ControlWord) -> (bool, bool) {
        match control.get() & 0b110 {
            0b100 => (true, false),
            0b010 => (false, true),
            0b000 => (true, true),
            _ => (false, false),
        }
    }

    fn route_write(&mut self, control: ControlWord, address: u8, data: u8) {
        let (one, two) = Self::selected(control);
        let window = ((address >> 5) & 1) as usize;
        if one {
            self.chips[0][window].write(address, data);
        }
        if two {
            self.chips[1][window].write(address, data);
        }
        self.writes_seen += 1;
    }

    fn route_read(&mut self, control: ControlWord, address: u8) -> u8 {
        let (one, two) = Self::selected(control);
        let window = ((address >> 5) & 1) as usize;
        self.reads_seen += 1;
        if one {
            self.chips[0][window].read(address)
        } else if two {
            self.chips[1][window].read(address)
        } else {
            0
        }
    }
}

impl Default for VirtualBus {
    fn default() -> Self {
        Self::new()
    }
}

impl BusPort for VirtualBus {
    fn push_control(&mut self, word: ControlWord) {
        self.control = Some(word);
    }

    fn push_data(&mut self, word: DataWord) {
        let Some(control) = self.control.take() else {
            // A bare data word clears the bus lines.
            self.clears += 1;
            return;
        };
        if control.is_read() {
            let byte = self.route_read(control, word.bus_address());
            self.pending_read = Some(byte);
        } else {
            self.route_write(control, word.bus_address(), word.data());
        }
    }

    fn push_delay(&mut self, cycles: u16) {
        self.clock = self.clock.wrapping_add(u32::from(cycles));
    }

    fn pull_read(&mut self) -> u8 {
        self.pending_read.take().unwrap_or(0)
    }

    fn set_reset(&mut self, high: bool) {
        if self.reset_high && !high {
            for socket in &mut self.chips {
                for chip in socket {
                    chip.reset();
                }
            }
        }
        self.reset_high = high;
    }

    fn deselect_all(&mut self) {
        self.control = None;
    }
}

impl ClockPort for VirtualBus {
    fn cycles(&mut self) -> Cycles {
        Cycles::new(self.clock)
    }

    fn set_clock_hz(&mut self, hz: u32) {
        self.hz = hz;
    }

    fn restart_sequencers(&mut self) {
        self.restarts += 1;
    }

    fn external_oscillator(&mut self) -> bool {
        self.external
    }
}

/// Flash sector double. Programming can only clear bits, exactly like
/// the real article; erased cells read `0xFF`.
pub struct VirtualFlash {
    sector: Box<[u8; FLASH_SECTOR_SIZE]>,
}

impl VirtualFlash {
    /// A factory-fresh, fully erased sector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sector: Box::new([0xFF; FLASH_SECTOR_SIZE]),
        }
    }

    #[must_use]
    pub fn with_page(page: usize, data: &[u8; FLASH_PAGE_SIZE]) -> Self {
        let mut flash = Self::new();
        flash.program(page, data);
        flash
    }
}

impl Default for VirtualFlash {
    fn default() -> Self {
        Self::new()
    }
}

impl FlashSector for VirtualFlash {
    fn erase(&mut self) {
        self.sector.fill(0xFF);
    }

    fn program(&mut self, page: usize, data: &[u8; FLASH_PAGE_SIZE]) {
        let start = (page % (FLASH_SECTOR_SIZE / FLASH_PAGE_SIZE)) * FLASH_PAGE_SIZE;
        for (cell, byte) in self.sector[start..start + FLASH_PAGE_SIZE]
            .iter_mut()
            .zip(data)
        {
            *cell &= byte;
        }
    }

    fn read(&self, page: usize, out: &mut [u8; FLASH_PAGE_SIZE]) {
        let start = (page % (FLASH_SECTOR_SIZE / FLASH_PAGE_SIZE)) * FLASH_PAGE_SIZE;
        out.copy_from_slice(&self.sector[start..start + FLASH_PAGE_SIZE]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_pair(bus: &mut VirtualBus, chip_select: u8, address: u8, data: u8) {
        bus.push_control(ControlWord::write(chip_select));
        bus.push_data(DataWord::write(address, data));
    }

    fn read_pair(bus: &mut VirtualBus, chip_select: u8, address: u8) -> u8 {
        bus.push_control(ControlWord::read(chip_select));
        bus.push_data(DataWord::read(address));
        bus.pull_read()
    }

    #[test]
    fn chip_select_routes_to_the_right_socket() {
        let mut bus = VirtualBus::with_chips([
            ChipModel::Mos6581,
            ChipModel::Empty,
            ChipModel::Mos8580,
            ChipModel::Empty,
        ]);
        write_pair(&mut bus, 0b100, 0x00, 0x11);
        write_pair(&mut bus, 0b010, 0x00, 0x22);
        assert_eq!(bus.chip_ram(0, 0)[0], 0x11);
        assert_eq!(bus.chip_ram(1, 0)[0], 0x22);
    }

    #[test]
    fn mirrored_select_hits_both_sockets() {
        let mut bus = VirtualBus::with_chips([
            ChipModel::Mos6581,
            ChipModel::Empty,
            ChipModel::Mos6581,
            ChipModel::Empty,
        ]);
        write_pair(&mut bus, 0b000, 0x18, 0x0F);
        assert_eq!(bus.chip_ram(0, 0)[0x18], 0x0F);
        assert_eq!(bus.chip_ram(1, 0)[0x18], 0x0F);
    }

    #[test]
    fn secondary_window_reaches_the_second_chip() {
        let mut bus = VirtualBus::with_chips([
            ChipModel::Mos6581,
            ChipModel::Mos6581,
            ChipModel::Empty,
            ChipModel::Empty,
        ]);
        write_pair(&mut bus, 0b100, 0x22, 0x55);
        assert_eq!(bus.chip_ram(0, 1)[0x02], 0x55);
        assert_eq!(bus.chip_ram(0, 0)[0x02], 0);
    }

    #[test]
    fn waveform_probe_dialogue_identifies_the_model() {
        let mut bus = VirtualBus::with_chips([
            ChipModel::Mos6581,
            ChipModel::Empty,
            ChipModel::Mos8580,
            ChipModel::Empty,
        ]);
        for (select, expected) in [(0b100u8, 1u8), (0b010, 0)] {
            write_pair(&mut bus, select, 0x12, 0x48);
            write_pair(&mut bus, select, 0x0F, 0x48);
            write_pair(&mut bus, select, 0x12, 0x24);
            assert_eq!(read_pair(&mut bus, select, 0x1B), expected);
            assert_eq!(read_pair(&mut bus, select, 0x1B), 3, "second read confirms");
        }
    }

    #[test]
    fn empty_window_reads_as_zero() {
        let mut bus = VirtualBus::new();
        write_pair(&mut bus, 0b100, 0x12, 0x24);
        assert_eq!(read_pair(&mut bus, 0b100, 0x1B), 0);
        assert_eq!(read_pair(&mut bus, 0b100, 0x19), 0);
    }

    #[test]
    fn dropping_the_reset_line_clears_the_register_files() {
        let mut bus = VirtualBus::with_chips([
            ChipModel::Mos6581,
            ChipModel::Empty,
            ChipModel::Empty,
            ChipModel::Empty,
        ]);
        bus.set_reset(true);
        write_pair(&mut bus, 0b100, 0x05, 0xAD);
        bus.set_reset(false);
        assert_eq!(bus.chip_ram(0, 0)[0x05], 0);
        assert!(!bus.reset_line());
    }

    #[test]
    fn delays_advance_the_cycle_counter() {
        let mut bus = VirtualBus::new();
        bus.push_delay(100);
        bus.advance(50);
        assert_eq!(bus.cycles().get(), 150);
    }

    #[test]
    fn bare_data_words_count_as_bus_clears() {
        let mut bus = VirtualBus::new();
        bus.push_data(DataWord::CLEAR);
        write_pair(&mut bus, 0b100, 0x00, 0x01);
        assert_eq!(bus.bus_clears(), 1);
        assert_eq!(bus.writes_seen(), 1);
    }

    #[test]
    fn flash_programming_only_clears_bits() {
        let mut flash = VirtualFlash::new();
        let mut page = [0xFFu8; FLASH_PAGE_SIZE];
        page[0] = 0xF0;
        flash.program(0, &page);
        page[0] = 0x0F;
        flash.program(0, &page);
        let mut out = [0u8; FLASH_PAGE_SIZE];
        flash.read(0, &mut out);
        assert_eq!(out[0], 0x00, "two programs AND together");
        flash.erase();
        flash.read(0, &mut out);
        assert_eq!(out[0], 0xFF);
    }
}
