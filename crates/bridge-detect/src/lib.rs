//! Chip and revision detection.
//!
//! Clone boards (SIDKick-pico, ARMSID, FPGASID, BackSID) each answer a
//! private register dialect; real chips answer none of them but betray
//! their revision to timing tricks. [`detect_clone_type`] and
//! [`detect_sid_type`] probe one socket or chip slot at a time,
//! [`auto_detect`] runs the whole routine and installs the outcome
//! through the configuration manager.

mod clone;
mod revision;
mod routine;

pub use clone::{detect_armsid, detect_backsid, detect_fmopl, detect_fpgasid, detect_skpico};
pub use revision::{
    detect_revision, detect_sid_model, detect_sid_unsafe, detect_sid_version,
    detect_sid_version_skpico,
};
pub use routine::{DetectionResult, SocketDetection, auto_detect, detect_clone_type, detect_sid_type};

#[cfg(test)]
pub(crate) mod testbus {
    //! Scripted bus double shared by the probe tests.

    use std::collections::VecDeque;

    use bridge_config::{Config, RuntimeCfg};
    use bridge_core::{BusPort, ControlWord, DataWord};

    /// Records every transfer and serves staged read bytes, zero once
    /// the stage runs dry.
    ///
    /// A data word with no control word in front of it is a bus
    /// clear, not a register access; those are tallied separately.
    pub struct ProbePort {
        reads: VecDeque<u8>,
        pending_control: bool,
        pub reads_served: usize,
        pub controls: Vec<u8>,
        pub data: Vec<u32>,
        pub delays: Vec<u16>,
        pub clears: usize,
    }

    impl ProbePort {
        pub fn stage(reads: &[u8]) -> Self {
            Self {
                reads: reads.iter().copied().collect(),
                pending_control: false,
                reads_served: 0,
                controls: Vec::new(),
                data: Vec::new(),
                delays: Vec::new(),
                clears: 0,
            }
        }

        /// Write transfers as (bus address, data) pairs, read setups
        /// filtered out.
        pub fn writes(&self) -> Vec<(u8, u8)> {
            self.data
                .iter()
                .filter(|&&word| word >> 16 == 0xFFFF)
                .map(|&word| ((word >> 8) as u8, word as u8))
                .collect()
        }
    }

    impl BusPort for ProbePort {
        fn push_control(&mut self, word: ControlWord) {
            self.controls.push(word.get());
            self.pending_control = true;
        }

        fn push_data(&mut self, word: DataWord) {
            if self.pending_control {
                self.data.push(word.get());
            } else {
                self.clears += 1;
            }
            self.pending_control = false;
        }

        fn push_delay(&mut self, cycles: u16) {
            self.delays.push(cycles);
        }

        fn pull_read(&mut self) -> u8 {
            self.reads_served += 1;
            self.reads.pop_front().unwrap_or(0)
        }

        fn set_reset(&mut self, _high: bool) {}

        fn deselect_all(&mut self) {}
    }

    /// Routing for the quad scan layout all probes run against.
    pub fn quad_scan() -> RuntimeCfg {
        let mut config = Config::default();
        config.socket_one.dualsid = true;
        config.socket_two.dualsid = true;
        config.socket_one.sid2.id = 1;
        config.socket_one.sid2.addr = 0x20;
        config.socket_two.sid1.id = 2;
        config.socket_two.sid1.addr = 0x40;
        config.socket_two.sid2.id = 3;
        config.socket_two.sid2.addr = 0x60;
        RuntimeCfg::derive(&config)
    }
}
