//! Core traits and types for the SID bus bridge.
//!
//! Everything the hardware does is reached through the port traits in this
//! crate. All timing is expressed in chip clock cycles. No exceptions.

mod cycles;
mod port;
mod rates;
mod registers;
mod word;

pub use cycles::Cycles;
pub use port::{BusPort, ClockPort, FLASH_PAGE_SIZE, FLASH_SECTOR_SIZE, FlashSector};
pub use rates::ClockRate;
pub use registers::{
    ASID_REGISTER_ORDER, ATTACK_DECAY, CONTROL, ENV3, FC_HI, FC_LO, FREQ_HI, FREQ_LO, MODE_VOL,
    OSC3, POT_X, POT_Y, PW_HI, PW_LO, RES_FILT, SID_REGISTERS, SUSTAIN_RELEASE, VOICE_SIZE,
};
pub use word::{ControlWord, DataWord, SlotRoute};
