//! The device core.
//!
//! [`Device`] owns the configuration manager, flash store, bus engine,
//! clock controller and ASID engine, and maps every decoded
//! [`Command`] onto them. Transports stay dumb: they decode, call
//! [`Device::dispatch`], and ship the [`Reply`] back.
//!
//! State shared with the runtime loops (LED, self-tests, ASID drain)
//! lives in [`DeviceShared`] behind atomics, so the loops can observe
//! activity and test requests without holding the device lock.

use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};

use bridge_asid::AsidEngine;
use bridge_bus::{BusEngine, ClockController};
use bridge_config::{
    ChipType, CloneType, Config, ConfigManager, ConfigStore, Preset, SidType, apply_preset,
    readback,
};
use bridge_core::{
    BusPort, ClockPort, FREQ_HI, FlashSector, MODE_VOL, SID_REGISTERS, VOICE_SIZE,
};
use bridge_detect::auto_detect;
use log::{debug, info, warn};

use crate::boot::{BootGate, BootStage};
use crate::command::{Command, ConfigCommand};
use crate::selftest::{TestKind, TestRequest, TestTarget, WaveSelect};

/// Version string sent back for the version command.
pub const VERSION: &str = concat!("sidbridge-v", env!("CARGO_PKG_VERSION"));

/// Socket summary reply length: marker byte plus six bytes per socket.
pub const SOCKET_READBACK_SIZE: usize = 13;

/// What a dispatched command sends back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    None,
    Byte(u8),
    Data(Vec<u8>),
    /// The hosting loop should tear the device down and boot it again.
    Reset,
    /// The hosting loop should hand control to the bootloader.
    Bootloader,
}

/// State the runtime loops poll without locking the device.
#[derive(Debug)]
pub struct DeviceShared {
    pub gate: BootGate,
    usbdata: AtomicBool,
    tests_running: AtomicBool,
    pending_test: Mutex<Option<TestRequest>>,
    led_pwm: AtomicU16,
    led_pixel: AtomicU32,
    live: AtomicBool,
}

impl DeviceShared {
    pub fn new() -> Self {
        Self {
            gate: BootGate::new(),
            usbdata: AtomicBool::new(false),
            tests_running: AtomicBool::new(false),
            pending_test: Mutex::new(None),
            led_pwm: AtomicU16::new(0),
            led_pixel: AtomicU32::new(0),
            live: AtomicBool::new(true),
        }
    }

    /// Whether host traffic has been seen since the last idle timeout.
    pub fn data_activity(&self) -> bool {
        self.usbdata.load(Ordering::Relaxed)
    }

    pub fn set_data_activity(&self, active: bool) {
        self.usbdata.store(active, Ordering::Relaxed);
    }

    pub fn tests_running(&self) -> bool {
        self.tests_running.load(Ordering::Relaxed)
    }

    /// Park a test request for the runner loop. Refused while one is
    /// already running.
    pub fn queue_test(&self, request: TestRequest) -> bool {
        if self.tests_running.swap(true, Ordering::Relaxed) {
            return false;
        }
        *self
            .pending_test
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(request);
        true
    }

    pub fn take_test_request(&self) -> Option<TestRequest> {
        self.pending_test
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Drop the run flag; the runner notices at its next step and
    /// unwinds.
    pub fn stop_tests(&self) {
        *self
            .pending_test
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.tests_running.store(false, Ordering::Relaxed);
    }

    pub fn finish_tests(&self) {
        self.tests_running.store(false, Ordering::Relaxed);
    }

    pub fn set_led(&self, pwm: u16, pixel: [u8; 3]) {
        self.led_pwm.store(pwm, Ordering::Relaxed);
        let packed =
            (u32::from(pixel[0]) << 16) | (u32::from(pixel[1]) << 8) | u32::from(pixel[2]);
        self.led_pixel.store(packed, Ordering::Relaxed);
    }

    pub fn led_pwm(&self) -> u16 {
        self.led_pwm.load(Ordering::Relaxed)
    }

    pub fn led_pixel(&self) -> [u8; 3] {
        let packed = self.led_pixel.load(Ordering::Relaxed);
        [(packed >> 16) as u8, (packed >> 8) as u8, packed as u8]
    }

    pub fn live(&self) -> bool {
        self.live.load(Ordering::Relaxed)
    }

    /// Ask every runtime loop to wind down.
    pub fn shutdown(&self) {
        self.live.store(false, Ordering::Relaxed);
        self.stop_tests();
    }
}

impl Default for DeviceShared {
    fn default() -> Self {
        Self::new()
    }
}

/// The assembled bridge device.
pub struct Device<P, F> {
    manager: ConfigManager,
    store: ConfigStore<F>,
    engine: BusEngine<P>,
    clock: ClockController,
    asid: AsidEngine,
    shared: std::sync::Arc<DeviceShared>,
}

impl<P, F> Device<P, F>
where
    P: BusPort + ClockPort,
    F: FlashSector,
{
    /// Bring the device up in dependency order: flash, configuration,
    /// clock, then the chip bus. Each completed step releases the
    /// matching boot stage so waiting loops may proceed.
    pub fn boot(port: P, flash: F, shared: std::sync::Arc<DeviceShared>) -> Self {
        shared.gate.advance(BootStage::FlashSafe);

        let mut store = ConfigStore::new(flash);
        let config = store.load();
        let manager = ConfigManager::new_or_default(config);
        shared.gate.advance(BootStage::ConfigReady);

        let mut engine = BusEngine::new(port);
        let mut clock = ClockController::new();
        clock.init(&mut engine, manager.config().clock_rate);
        shared.gate.advance(BootStage::ClockReady);

        engine.clear_bus();
        let asid = AsidEngine::new(manager.config().clock_rate.refresh_interval());

        let mut device = Self {
            manager,
            store,
            engine,
            clock,
            asid,
            shared,
        };
        let cfg = *device.manager.runtime();
        device.engine.reset_sids(&cfg);
        device.shared.gate.advance(BootStage::HardwareReady);
        info!(
            "device up: {} chips, {} Hz",
            cfg.numsids,
            device.clock.rate().hz()
        );
        device
    }

    pub fn shared(&self) -> &std::sync::Arc<DeviceShared> {
        &self.shared
    }

    pub fn config(&self) -> &Config {
        self.manager.config()
    }

    pub fn runtime(&self) -> &bridge_config::RuntimeCfg {
        self.manager.runtime()
    }

    pub fn chip_count(&self) -> u8 {
        self.manager.runtime().numsids
    }

    pub fn clock(&self) -> &ClockController {
        &self.clock
    }

    pub fn muted(&self) -> bool {
        self.engine.muted()
    }

    pub fn shadow(&self, address: u8) -> u8 {
        self.engine.shadow(address)
    }

    pub fn port(&self) -> &P {
        self.engine.port()
    }

    pub fn port_mut(&mut self) -> &mut P {
        self.engine.port_mut()
    }

    pub fn asid(&self) -> &AsidEngine {
        &self.asid
    }

    /// Tear the device down into its hardware handles so a host-driven
    /// reset can boot it again on the same bus and flash.
    pub fn into_parts(self) -> (P, F) {
        (self.engine.into_port(), self.store.into_flash())
    }

    /// Map one decoded command onto the engines.
    pub fn dispatch(&mut self, command: Command<'_>) -> Reply {
        let cfg = *self.manager.runtime();
        match command {
            Command::Write(pairs) => {
                self.shared.set_data_activity(true);
                for pair in pairs.chunks_exact(2) {
                    self.engine.write(&cfg, pair[0], pair[1]);
                }
                Reply::None
            }
            Command::Read { address } => {
                self.shared.set_data_activity(true);
                Reply::Byte(self.engine.cycled_read(&cfg, address, 0))
            }
            Command::CycledWrite(quads) => {
                self.shared.set_data_activity(true);
                for quad in quads.chunks_exact(4) {
                    let cycles = u16::from_be_bytes([quad[2], quad[3]]);
                    self.engine.cycled_write(&cfg, quad[0], quad[1], cycles);
                }
                Reply::None
            }
            Command::Pause => {
                self.engine.pause_sids();
                Reply::None
            }
            Command::Unpause => {
                self.engine.enable_sids(&cfg);
                Reply::None
            }
            Command::Mute => {
                self.set_muted(true);
                Reply::None
            }
            Command::Unmute => {
                self.set_muted(false);
                Reply::None
            }
            Command::ResetSid => {
                self.engine.reset_sids(&cfg);
                Reply::None
            }
            Command::DisableSid => {
                self.engine.disable_sids(&cfg);
                Reply::None
            }
            Command::EnableSid => {
                self.engine.enable_sids(&cfg);
                Reply::None
            }
            Command::ClearBus => {
                self.engine.clear_bus();
                Reply::None
            }
            Command::Config(sub) => self.handle_config(sub),
            Command::ResetDevice => Reply::Reset,
            Command::Bootloader => Reply::Bootloader,
        }
    }

    fn handle_config(&mut self, command: ConfigCommand) -> Reply {
        match command {
            ConfigCommand::ResetDevice => Reply::Reset,
            ConfigCommand::ReadConfig => {
                debug!("config read-back requested");
                Reply::Data(readback(self.manager.config(), self.manager.runtime()).to_vec())
            }
            ConfigCommand::ApplyConfig => {
                info!("reloading persisted configuration");
                let loaded = self.store.load();
                self.install(loaded);
                Reply::None
            }
            ConfigCommand::SetItem { group, item, value } => {
                self.set_config_item(group, item, value);
                Reply::None
            }
            ConfigCommand::Save => {
                info!("saving configuration, restart follows");
                let mut candidate = *self.manager.stage();
                self.store.save(&mut candidate);
                Reply::Reset
            }
            ConfigCommand::SaveNoReset => {
                info!("saving configuration");
                let mut candidate = *self.manager.stage();
                self.store.save(&mut candidate);
                let loaded = self.store.load();
                self.install(loaded);
                Reply::None
            }
            ConfigCommand::ResetConfig => {
                info!("restoring default configuration");
                let mut defaults = Config::default();
                self.store.save(&mut defaults);
                let loaded = self.store.load();
                self.install(loaded);
                Reply::None
            }
            ConfigCommand::WriteConfig => {
                if let Err(err) = self.manager.commit() {
                    warn!("staged configuration rejected: {err}");
                }
                Reply::None
            }
            ConfigCommand::ReadSocketConfig => Reply::Data(self.socket_readback().to_vec()),
            ConfigCommand::Preset(byte) => {
                self.apply_preset_command(byte);
                Reply::None
            }
            ConfigCommand::SetClock { index } => {
                self.set_clock(index);
                Reply::None
            }
            ConfigCommand::DetectChips => {
                self.run_detection(false, false);
                Reply::None
            }
            ConfigCommand::TestAllChips => {
                self.request_test(TestRequest {
                    target: TestTarget::AllChips,
                    kind: TestKind::All,
                    wave: WaveSelect::All,
                });
                Reply::None
            }
            ConfigCommand::TestChip { chip, kind, wave } => {
                if chip >= self.chip_count() {
                    warn!("chip {chip} not configured, test ignored");
                } else {
                    self.request_test(TestRequest {
                        target: TestTarget::Chip(chip),
                        kind: TestKind::from_wire(kind),
                        wave: WaveSelect::from_wire(wave),
                    });
                }
                Reply::None
            }
            ConfigCommand::StopTests => {
                info!("stopping chip tests");
                self.shared.stop_tests();
                Reply::None
            }
            ConfigCommand::AutoDetect => {
                self.run_detection(true, true);
                Reply::Data(self.socket_readback().to_vec())
            }
            ConfigCommand::Version => Reply::Data(VERSION.as_bytes().to_vec()),
        }
    }

    /// Feed one SysEx buffer to the ASID engine. Returns false when
    /// ASID is disabled or the buffer is not an ASID message.
    pub fn handle_sysex(&mut self, buffer: &[u8]) -> bool {
        if !self.manager.config().asid_enabled {
            return false;
        }
        let now = self.engine.port_mut().cycles();
        let handled = self.asid.handle_message(buffer, now);
        if handled {
            self.shared.set_data_activity(true);
        }
        handled
    }

    /// Flush due ASID writes onto the bus. Returns the number of
    /// register writes performed.
    pub fn drain_asid(&mut self) -> usize {
        let Self {
            asid,
            engine,
            manager,
            ..
        } = self;
        let cfg = *manager.runtime();
        asid.tick(|address, data, cycles| {
            engine.cycled_write(&cfg, address, data, cycles);
        })
    }

    /// A refresh-rate change measured from the incoming frame stream,
    /// if one is pending.
    pub fn take_drain_update(&mut self) -> Option<u32> {
        self.asid.take_rate_update()
    }

    pub fn drain_interval(&self) -> u32 {
        self.asid.drain_interval()
    }

    /// Shadowed frequency-high bytes of one chip's three voices, the
    /// meter's input.
    pub fn voice_bytes(&self, chip: u8) -> [u8; 3] {
        let base = chip * 0x20;
        [
            self.engine.shadow(base + FREQ_HI),
            self.engine.shadow(base + VOICE_SIZE + FREQ_HI),
            self.engine.shadow(base + 2 * VOICE_SIZE + FREQ_HI),
        ]
    }

    /// Cycle-gated write used by the self-test scripts.
    pub fn test_write(&mut self, address: u8, data: u8) {
        let cfg = *self.manager.runtime();
        self.engine.cycled_write(&cfg, address, data, 5);
    }

    /// Zero every register of one chip.
    pub fn clear_chip(&mut self, chip: u8) {
        let cfg = *self.manager.runtime();
        let base = chip * 0x20;
        for register in SID_REGISTERS {
            self.engine.write(&cfg, base + register, 0);
        }
    }

    /// Zero every register of every configured chip and release the
    /// bus.
    pub fn clear_all_registers(&mut self) {
        let cfg = *self.manager.runtime();
        self.engine.clear_registers(&cfg);
    }

    /// Mute or unmute, rewriting each chip's volume register so the
    /// wire reflects the change while the shadow keeps the host value.
    fn set_muted(&mut self, muted: bool) {
        self.engine.set_muted(muted);
        let cfg = *self.manager.runtime();
        for chip in 0..cfg.numsids {
            let address = chip * 0x20 + MODE_VOL;
            let data = self.engine.shadow(address);
            self.engine.write(&cfg, address, data);
        }
    }

    fn install(&mut self, config: Config) {
        if let Err(err) = self.manager.install(config) {
            warn!("configuration rejected, keeping previous: {err}");
        }
    }

    fn set_config_item(&mut self, group: u8, item: u8, value: u8) {
        debug!("config item {group}/{item} = {value}");
        let staged = self.manager.stage();
        match group {
            // The clock rate index rides in the item slot.
            0 => staged.clock_rate = bridge_core::ClockRate::from_index(item),
            1 => set_socket_item(&mut staged.socket_one, item, value),
            2 => set_socket_item(&mut staged.socket_two, item, value),
            3 => match item {
                0 => set_flag(&mut staged.led.enabled, value),
                1 => set_flag(&mut staged.led.idle_breathe, value),
                _ => warn!("unknown LED item {item}"),
            },
            4 => match item {
                0 => set_flag(&mut staged.rgb.enabled, value),
                1 => set_flag(&mut staged.rgb.idle_breathe, value),
                2 => staged.rgb.brightness = value,
                3 => {
                    if value <= 3 {
                        staged.rgb.sid_to_use = value;
                    }
                }
                _ => warn!("unknown RGB item {item}"),
            },
            5 => set_flag(&mut staged.cdc_enabled, value),
            6 => set_flag(&mut staged.webusb_enabled, value),
            7 => set_flag(&mut staged.asid_enabled, value),
            8 => set_flag(&mut staged.midi_enabled, value),
            _ => warn!("unknown config group {group}"),
        }
    }

    /// Runtime clock change. Never persisted; locked or externally
    /// clocked devices ignore it.
    fn set_clock(&mut self, index: u8) {
        let config = self.manager.config();
        if config.external_clock || config.lock_clockrate {
            info!("clock rate locked, change ignored");
            return;
        }
        let rate = bridge_core::ClockRate::from_index(index);
        let cfg = *self.manager.runtime();
        if self.clock.set_rate(&mut self.engine, &cfg, rate) {
            self.manager.stage().clock_rate = rate;
            if let Err(err) = self.manager.commit() {
                warn!("clock rate commit failed: {err}");
            }
        }
    }

    /// Presets act on the active configuration; staged edits do not
    /// carry over.
    fn apply_preset_command(&mut self, byte: u8) {
        let preset = match Preset::from_command(byte) {
            Ok(preset) => preset,
            Err(err) => {
                warn!("preset rejected: {err}");
                return;
            }
        };
        let mut candidate = *self.manager.config();
        if let Err(err) = apply_preset(&mut candidate, preset) {
            warn!("preset {} not applied: {err}", preset.name());
            return;
        }
        info!("applying preset {}", preset.name());
        self.store.save(&mut candidate);
        let loaded = self.store.load();
        self.install(loaded);
    }

    fn run_detection(&mut self, auto_config: bool, with_delay: bool) {
        match auto_detect(&mut self.engine, &mut self.manager, auto_config, with_delay) {
            Ok(result) => info!("detection done: {} chips", result.numsids),
            Err(err) => warn!("detection failed: {err}"),
        }
    }

    fn request_test(&mut self, request: TestRequest) {
        if !self.shared.queue_test(request) {
            warn!("chip test already running, request ignored");
        }
    }

    fn socket_readback(&self) -> [u8; SOCKET_READBACK_SIZE] {
        let config = self.manager.config();
        let mut out = [0u8; SOCKET_READBACK_SIZE];
        out[0] = 0x7F;
        for (index, offset) in [(0usize, 1usize), (1, 7)] {
            let socket = config.socket(index);
            out[offset] = u8::from(socket.enabled);
            out[offset + 1] = u8::from(socket.dualsid);
            out[offset + 2] = socket.chiptype.wire();
            out[offset + 3] = socket.clonetype.wire();
            out[offset + 4] = socket.sid1.kind.wire();
            out[offset + 5] = socket.sid2.kind.wire();
        }
        out
    }
}

fn set_flag(flag: &mut bool, value: u8) {
    if value <= 1 {
        *flag = value == 1;
    }
}

fn set_socket_item(socket: &mut bridge_config::SocketConfig, item: u8, value: u8) {
    match item {
        0 => set_flag(&mut socket.enabled, value),
        1 => set_flag(&mut socket.dualsid, value),
        2 => socket.chiptype = ChipType::from_wire(value),
        3 => socket.clonetype = CloneType::from_wire(value),
        4 => socket.sid1.kind = SidType::from_wire(value),
        5 => socket.sid2.kind = SidType::from_wire(value),
        _ => warn!("unknown socket item {item}"),
    }
}
