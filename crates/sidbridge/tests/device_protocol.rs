//! End-to-end protocol flows over the virtual bus.

use std::sync::{Arc, Mutex};

use bridge_core::ClockPort;
use sidbridge::{
    BootStage, ChipModel, Device, DeviceShared, Reply, Runtime, SOCKET_READBACK_SIZE, TestKind,
    TestTarget, VirtualBus, VirtualFlash, WaveSelect, decode,
};

fn booted() -> Device<VirtualBus, VirtualFlash> {
    let bus = VirtualBus::with_chips([
        ChipModel::Mos6581,
        ChipModel::Empty,
        ChipModel::Mos8580,
        ChipModel::Empty,
    ]);
    Device::boot(bus, VirtualFlash::new(), Arc::new(DeviceShared::new()))
}

fn run(device: &mut Device<VirtualBus, VirtualFlash>, packet: &[u8]) -> Reply {
    let command = decode(packet).expect("packet decodes");
    device.dispatch(command)
}

#[test]
fn protocol_session_end_to_end() {
    let mut device = booted();

    // version handshake
    let Reply::Data(version) = run(&mut device, &[0xD2, 0x80]) else {
        panic!("version should reply with data");
    };
    assert!(String::from_utf8_lossy(&version).starts_with("sidbridge-v"));

    // detect what is in the sockets
    run(&mut device, &[0xD2, 0x51]);
    let config = device.config();
    assert_eq!(config.socket_one.sid1.kind.label(), "MOS6581");
    assert_eq!(config.socket_two.sid1.kind.label(), "MOS8580");
    assert_eq!(device.chip_count(), 2);

    // write a voice on each chip in one burst
    run(&mut device, &[0x02, 0x01, 0x44, 0x21, 0x55]);
    assert_eq!(device.port().chip_ram(0, 0)[0x01], 0x44);
    assert_eq!(device.port().chip_ram(1, 0)[0x01], 0x55);

    // pot registers always read back full scale
    assert_eq!(run(&mut device, &[0x40, 0x19, 0x00]), Reply::Byte(0xFF));

    // a cycled write paces the virtual clock
    let before = device.port_mut().cycles();
    run(&mut device, &[0x81, 0x04, 0x41, 0x01, 0x00]);
    let after = device.port_mut().cycles();
    assert_eq!(after.since(before), 0x100);

    // mute masks the wire but the shadow keeps the level
    run(&mut device, &[0x02, 0x18, 0x5F, 0x38, 0x5F]);
    run(&mut device, &[0xCC]);
    assert_eq!(device.port().chip_ram(0, 0)[0x18], 0x50);
    assert_eq!(device.shadow(0x18), 0x5F);
    run(&mut device, &[0xCD]);
    assert_eq!(device.port().chip_ram(0, 0)[0x18], 0x5F);

    // both readback flavours are marked chunks
    let Reply::Data(blob) = run(&mut device, &[0xD2, 0x30]) else {
        panic!("config readback should reply with data");
    };
    assert_eq!(blob.len(), 64);
    assert_eq!(blob[0], 0x7F);
    let Reply::Data(sockets) = run(&mut device, &[0xD2, 0x37]) else {
        panic!("socket readback should reply with data");
    };
    assert_eq!(sockets.len(), SOCKET_READBACK_SIZE);
}

#[test]
fn saved_configuration_survives_a_restart() {
    let mut device = booted();

    // stage a brightness change, then save; the reply asks the host to
    // restart the device
    run(&mut device, &[0xD2, 0x32, 4, 2, 0x22]);
    assert_eq!(device.config().rgb.brightness, 0x7F, "staged, not live");
    assert_eq!(run(&mut device, &[0xD2, 0x33]), Reply::Reset);

    let (port, flash) = device.into_parts();
    let device = Device::boot(port, flash, Arc::new(DeviceShared::new()));
    assert_eq!(device.config().rgb.brightness, 0x22);
    assert!(!device.config().default_config);
}

#[test]
fn save_without_reset_applies_in_place() {
    let mut device = booted();
    run(&mut device, &[0xD2, 0x32, 4, 2, 0x19]);
    assert_eq!(run(&mut device, &[0xD2, 0x34]), Reply::None);
    assert_eq!(device.config().rgb.brightness, 0x19);

    // wiping back to defaults also lands immediately
    run(&mut device, &[0xD2, 0x35]);
    assert_eq!(device.config().rgb.brightness, 0x7F);
}

#[test]
fn mirrored_preset_fans_writes_to_both_sockets() {
    let mut device = booted();
    run(&mut device, &[0xD2, 0x45]);
    assert!(device.config().mirrored);

    run(&mut device, &[0x01, 0x06, 0xA8]);
    assert_eq!(device.port().chip_ram(0, 0)[0x06], 0xA8);
    assert_eq!(device.port().chip_ram(1, 0)[0x06], 0xA8);
}

#[test]
fn asid_stream_plays_through_the_device() {
    let mut device = booted();

    // 29 single-register frames overfill the hold-one-frame ring
    let frame = [0xF0, 0x2D, 0x4E, 0x01, 0, 0, 0, 0, 0, 0, 0, 0x33, 0xF7];
    for _ in 0..29 {
        assert!(device.handle_sysex(&frame));
    }
    assert!(device.asid().active());

    let mut written = 0;
    for _ in 0..64 {
        written += device.drain_asid();
    }
    assert!(written >= 1);
    assert_eq!(device.port().chip_ram(0, 0)[0x00], 0x33);

    // a stop frame tears the stream down
    assert!(device.handle_sysex(&[0xF0, 0x2D, 0x4D, 0xF7]));
    assert!(!device.asid().playing());
}

#[test]
fn boot_walks_the_stage_ladder() {
    let bus = VirtualBus::with_chips([
        ChipModel::Mos6581,
        ChipModel::Empty,
        ChipModel::Empty,
        ChipModel::Empty,
    ]);
    let shared = Arc::new(DeviceShared::new());
    let device = Device::boot(bus, VirtualFlash::new(), Arc::clone(&shared));
    assert_eq!(shared.gate.current(), BootStage::HardwareReady);

    let device = Arc::new(Mutex::new(device));
    let runtime = Runtime::start(Arc::clone(&device), Arc::clone(&shared));
    assert_eq!(shared.gate.current(), BootStage::Running);
    runtime.shutdown();
    assert!(!shared.live());
}

#[test]
fn chip_test_command_queues_a_request() {
    let mut device = booted();
    // chip 1, waveform battery
    run(&mut device, &[0xD2, 0x54, b'2', b'A']);
    let shared = Arc::clone(device.shared());
    let request = shared.take_test_request().expect("request queued");
    assert_eq!(request.target, TestTarget::Chip(1));
    assert_eq!(request.kind, TestKind::Waveforms);
    assert_eq!(request.wave, WaveSelect::All);
    assert!(shared.tests_running());

    // a second request is refused while one is pending
    assert_eq!(run(&mut device, &[0xD2, 0x55]), Reply::None);
    assert!(shared.take_test_request().is_none());

    run(&mut device, &[0xD2, 0x59]);
    assert!(!shared.tests_running());
}
