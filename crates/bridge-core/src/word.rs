//! Bus transfer words.
//!
//! The bus sequencers consume two kinds of transfer: a six-bit control word
//! driving the R/W and chip-select lines, and a 32-bit data word carrying
//! the pin direction mask, the bus address and the data byte. The bit
//! layouts here are fixed by the sequencer programs and must not change.

/// Six-bit control transfer.
///
/// Bit 0 is the R/W line (1 = read). Bits 1 and 2 are the chip-select
/// lines for socket one and socket two; the lines are active low, so a set
/// bit deasserts the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlWord(pub u8);

impl ControlWord {
    /// Both chip selects deasserted, write direction. Parks the bus.
    pub const PAUSE: Self = Self(0b11_0110);

    #[must_use]
    pub const fn write(chip_select: u8) -> Self {
        Self(0b11_1000 | chip_select)
    }

    #[must_use]
    pub const fn read(chip_select: u8) -> Self {
        Self(0b11_1001 | chip_select)
    }

    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn is_read(self) -> bool {
        self.0 & 1 == 1
    }
}

/// 32-bit data transfer: `(dir_mask << 16) | (bus_address << 8) | data`.
///
/// `dir_mask` is `0xFFFF` for writes (every pin driven out) and `0xFF00`
/// for reads (the data pins turn around to inputs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataWord(pub u32);

impl DataWord {
    /// All pins out, address and data zeroed. Clears the bus.
    pub const CLEAR: Self = Self(0xFFFF << 16);

    #[must_use]
    pub const fn write(bus_address: u8, data: u8) -> Self {
        Self((0xFFFF << 16) | ((bus_address as u32) << 8) | data as u32)
    }

    #[must_use]
    pub const fn read(bus_address: u8) -> Self {
        Self((0xFF00 << 16) | ((bus_address as u32) << 8))
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn bus_address(self) -> u8 {
        (self.0 >> 8) as u8
    }

    #[must_use]
    pub const fn data(self) -> u8 {
        self.0 as u8
    }

    #[must_use]
    pub const fn dir_mask(self) -> u16 {
        (self.0 >> 16) as u16
    }
}

/// Routing for one of the four 32-byte bus address windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRoute {
    /// Three-bit chip-select pattern OR-ed into the control word:
    /// `0b100` socket one, `0b010` socket two, `0b000` both (mirrored),
    /// `0b110` or `0b111` nothing.
    pub chip_select: u8,
    /// Address decode mask: `0x1F` primary window, `0x3F` secondary
    /// window, `0x00` when the slot is off.
    pub address_mask: u8,
}

impl SlotRoute {
    pub const INACTIVE: Self = Self {
        chip_select: 0b110,
        address_mask: 0x00,
    };

    #[must_use]
    pub const fn new(chip_select: u8, address_mask: u8) -> Self {
        Self {
            chip_select,
            address_mask,
        }
    }

    /// An inactive slot silently swallows operations addressed to it.
    #[must_use]
    pub const fn is_active(self) -> bool {
        self.chip_select != 0b110 && self.chip_select != 0b111
    }

    /// The address put on the wire for a register inside this window.
    ///
    /// A secondary-decode slot (mask `0x3F`) answers on the upper half of
    /// its chip's 64-byte decode, so the register moves up by `0x20`.
    #[must_use]
    pub const fn bus_address(self, address: u8) -> u8 {
        if self.address_mask == 0x3F {
            (address & 0x1F) + 0x20
        } else {
            address & 0x1F
        }
    }
}

impl Default for SlotRoute {
    fn default() -> Self {
        Self::INACTIVE
    }
}
