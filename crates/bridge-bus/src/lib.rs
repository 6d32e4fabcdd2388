//! Bus transaction engine and clock control.
//!
//! [`BusEngine`] turns register-level operations into the control,
//! data and delay transfers a [`bridge_core::BusPort`] carries out;
//! [`ClockController`] owns the chip clock rate. Both route through
//! the active [`bridge_config::RuntimeCfg`] and never touch the
//! persisted configuration.

mod clock;
mod engine;

pub use clock::ClockController;
pub use engine::{BusEngine, SHADOW_SIZE};
