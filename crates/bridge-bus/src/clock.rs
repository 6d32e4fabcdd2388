//! Chip clock control.
//!
//! Owns the selected [`ClockRate`] and the external-oscillator flag.
//! Rate changes follow the safe sequence: suspend the chips, reprogram
//! the divider and restart the dependent sequencers, re-enable the
//! chips. Switching while playing is audible on real chips.

use bridge_config::RuntimeCfg;
use bridge_core::{BusPort, ClockPort, ClockRate};
use log::{debug, info};

use crate::engine::BusEngine;

#[derive(Default)]
pub struct ClockController {
    rate: ClockRate,
    external: bool,
}

impl ClockController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rate(&self) -> ClockRate {
        self.rate
    }

    /// A board crystal overrides the generated clock entirely.
    pub fn external(&self) -> bool {
        self.external
    }

    /// Probe the oscillator hook and start the clock at `rate`.
    ///
    /// With an external crystal present the rate is pinned to the
    /// 1 MHz default and the divider is left unprogrammed.
    pub fn init<P>(&mut self, engine: &mut BusEngine<P>, rate: ClockRate)
    where
        P: BusPort + ClockPort,
    {
        self.external = engine.port_mut().external_oscillator();
        if self.external {
            self.rate = ClockRate::Default;
            info!("external oscillator present, clock pinned at {} Hz", self.rate.hz());
        } else {
            self.rate = rate;
            engine.port_mut().set_clock_hz(rate.hz());
            info!("clock started at {} Hz", rate.hz());
        }
    }

    /// Switch the chip clock, returning whether anything changed.
    pub fn set_rate<P>(&mut self, engine: &mut BusEngine<P>, cfg: &RuntimeCfg, rate: ClockRate) -> bool
    where
        P: BusPort + ClockPort,
    {
        if self.external {
            info!("external oscillator, clock rate change ignored");
            return false;
        }
        if rate == self.rate {
            debug!("clock already at {} Hz", rate.hz());
            return false;
        }
        info!("switching clock from {} Hz to {} Hz", self.rate.hz(), rate.hz());
        engine.disable_sids(cfg);
        engine.port_mut().set_clock_hz(rate.hz());
        engine.port_mut().restart_sequencers();
        engine.enable_sids(cfg);
        self.rate = rate;
        true
    }
}
