//! JSON state capture for inspection and scripting.
//!
//! A [`DeviceState`] is a point-in-time copy of everything observable:
//! configuration, the routing the validator derived from it, the shadow
//! registers, stream and LED status. Built for the `--state` dump and
//! for regression tests that want to diff device state.

use serde::Serialize;

use bridge_bus::SHADOW_SIZE;
use bridge_config::{Config, SidSlot, SocketConfig};
use bridge_core::{BusPort, ClockPort, FlashSector};

use crate::device::{Device, VERSION};

/// Complete observable device state.
#[derive(Debug, Serialize)]
pub struct DeviceState {
    pub version: &'static str,
    pub stage: String,
    pub clock: ClockState,
    pub sockets: [SocketState; 2],
    pub chips: Vec<ChipState>,
    pub mirrored: bool,
    pub muted: bool,
    pub asid: AsidState,
    pub led: LedState,
    /// All four 32-byte register windows as last written.
    pub shadow: Vec<u8>,
}

#[derive(Debug, Serialize)]
pub struct ClockState {
    pub hz: u32,
    pub external: bool,
    pub locked: bool,
}

#[derive(Debug, Serialize)]
pub struct SocketState {
    pub enabled: bool,
    pub dualsid: bool,
    pub chiptype: &'static str,
    pub clonetype: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid1: Option<SlotState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid2: Option<SlotState>,
}

#[derive(Debug, Serialize)]
pub struct SlotState {
    pub id: u8,
    pub address: u8,
    pub kind: &'static str,
}

/// One logical chip as the bus router sees it.
#[derive(Debug, Serialize)]
pub struct ChipState {
    pub chip: u8,
    pub kind: &'static str,
    pub address: u8,
    /// Frequency high bytes of the three voices, out of shadow.
    pub voices: [u8; 3],
}

#[derive(Debug, Serialize)]
pub struct AsidState {
    pub enabled: bool,
    pub active: bool,
    pub playing: bool,
    pub fmopl: bool,
    pub buffered_bytes: usize,
    pub frames: usize,
}

#[derive(Debug, Serialize)]
pub struct LedState {
    pub pwm: u16,
    pub pixel: [u8; 3],
    pub activity: bool,
}

impl DeviceState {
    pub fn capture<P, F>(device: &Device<P, F>) -> Self
    where
        P: BusPort + ClockPort,
        F: FlashSector,
    {
        let config = device.config();
        let runtime = device.runtime();
        let shared = device.shared();

        let chips = (0..runtime.numsids)
            .map(|chip| ChipState {
                chip,
                kind: runtime.sid_types[usize::from(chip)].label(),
                address: chip * 0x20,
                voices: device.voice_bytes(chip),
            })
            .collect();

        let mut shadow = Vec::with_capacity(SHADOW_SIZE);
        for address in 0..SHADOW_SIZE {
            shadow.push(device.shadow(address as u8));
        }

        Self {
            version: VERSION,
            stage: format!("{:?}", shared.gate.current()),
            clock: ClockState {
                hz: config.clock_rate.hz(),
                external: device.clock().external(),
                locked: config.lock_clockrate,
            },
            sockets: [
                SocketState::from_socket(&config.socket_one),
                SocketState::from_socket(&config.socket_two),
            ],
            chips,
            mirrored: config.mirrored,
            muted: device.muted(),
            asid: AsidState::from_device(config, device),
            led: LedState {
                pwm: shared.led_pwm(),
                pixel: shared.led_pixel(),
                activity: shared.data_activity(),
            },
            shadow,
        }
    }

    /// Pretty JSON rendition.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

impl SocketState {
    fn from_socket(socket: &SocketConfig) -> Self {
        Self {
            enabled: socket.enabled,
            dualsid: socket.dualsid,
            chiptype: socket.chiptype.label(),
            clonetype: socket.clonetype.label(),
            sid1: SlotState::from_slot(&socket.sid1),
            sid2: SlotState::from_slot(&socket.sid2),
        }
    }
}

impl SlotState {
    fn from_slot(slot: &SidSlot) -> Option<Self> {
        slot.present().then(|| Self {
            id: slot.id,
            address: slot.addr,
            kind: slot.kind.label(),
        })
    }
}

impl AsidState {
    fn from_device<P, F>(config: &Config, device: &Device<P, F>) -> Self
    where
        P: BusPort + ClockPort,
        F: FlashSector,
    {
        let asid = device.asid();
        Self {
            enabled: config.asid_enabled,
            active: asid.active(),
            playing: asid.playing(),
            fmopl: asid.fmopl(),
            buffered_bytes: asid.buffered_bytes(),
            frames: asid.ring_frames(),
        }
    }
}
