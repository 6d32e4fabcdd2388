//! Portable USB-to-SID bridge device core.
//!
//! The device sits between a host byte stream and up to four SID chips
//! across two sockets. Packets decode into bus operations, configuration
//! commands, chip detection runs and self tests; an ASID SysEx layer
//! buffers register frames and drains them on a frame timer. The whole
//! core runs against the port traits from `bridge-core`, so the same
//! code drives real pins or the [`virtual_hw`] test rig.

pub mod boot;
pub mod command;
pub mod device;
pub mod selftest;
#[cfg(feature = "native")]
pub mod state;
pub mod virtual_hw;
pub mod vu;

pub use boot::{BootGate, BootStage, Runtime};
pub use command::{Command, ConfigCommand, DecodeError, decode};
pub use device::{Device, DeviceShared, Reply, SOCKET_READBACK_SIZE, VERSION};
pub use selftest::{SidTester, TestKind, TestRequest, TestTarget, WaveSelect};
#[cfg(feature = "native")]
pub use state::DeviceState;
pub use virtual_hw::{ChipModel, VirtualBus, VirtualFlash};
pub use vu::{LedOutput, LedTask, LedUpdate};
