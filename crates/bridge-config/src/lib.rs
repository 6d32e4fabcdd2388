//! Configuration model, validation and persistence.
//!
//! The persisted [`Config`] describes what is plugged into the two
//! sockets; the derived [`RuntimeCfg`] is what the bus engine routes
//! by. Everything between them is a pipeline: repair, renumber, derive,
//! swap. [`ConfigStore`] keeps the whole thing in one flash sector with
//! a 16-slot wear-leveling rotation.

mod blob;
mod error;
mod manager;
mod model;
mod preset;
mod runtime;
mod store;
mod validate;

pub use blob::{MAGIC, READBACK_SIZE, deserialize, readback, serialize};
pub use error::ConfigError;
pub use manager::ConfigManager;
pub use model::{
    ChipType, CloneType, Config, LedConfig, RgbConfig, SidSlot, SidType, SocketConfig,
};
pub use preset::{Preset, PresetFlags, apply_preset};
pub use runtime::{NO_CHIP, RuntimeCfg};
pub use store::{CONFIG_SLOTS, ConfigStore};
pub use validate::{validate, verify_detection};
