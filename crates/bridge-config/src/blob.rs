//! Flash page codec and the host-facing read-back array.
//!
//! One [`Config`] serializes into one 256-byte flash page. Offsets are
//! fixed wire format shared with the config tools; the
//! (magic, default_config, config_saveid) prefix ordering is what the
//! slot-scan in [`crate::store`] keys on. All multi-byte fields are
//! little-endian except the read-back clock rate, which travels as
//! three big-endian bytes.

use bridge_core::{ClockRate, FLASH_PAGE_SIZE};
use log::warn;

use crate::model::{ChipType, CloneType, Config, LedConfig, RgbConfig, SidSlot, SidType, SocketConfig};
use crate::runtime::RuntimeCfg;

pub const MAGIC: u32 = 19_700_101;
pub const READBACK_SIZE: usize = 64;

pub fn serialize(config: &Config) -> [u8; FLASH_PAGE_SIZE] {
    let mut page = [0u8; FLASH_PAGE_SIZE];
    page[0..4].copy_from_slice(&MAGIC.to_le_bytes());
    page[4] = u8::from(config.default_config);
    page[5] = config.config_saveid;
    page[6] = u8::from(config.external_clock);
    page[7..11].copy_from_slice(&config.clock_rate.hz().to_le_bytes());
    page[11] = u8::from(config.lock_clockrate);
    write_socket(&mut page[12..20], &config.socket_one);
    write_socket(&mut page[20..28], &config.socket_two);
    page[28] = u8::from(config.mirrored);
    page[29] = u8::from(config.led.enabled);
    page[30] = u8::from(config.led.idle_breathe);
    page[31] = u8::from(config.rgb.enabled);
    page[32] = u8::from(config.rgb.idle_breathe);
    page[33] = config.rgb.brightness;
    page[34] = config.rgb.sid_to_use;
    page[35] = u8::from(config.cdc_enabled);
    page[36] = u8::from(config.webusb_enabled);
    page[37] = u8::from(config.asid_enabled);
    page[38] = u8::from(config.midi_enabled);
    page[39] = u8::from(config.audio_stereo);
    page[40] = u8::from(config.lock_audio_switch);
    page[41] = u8::from(config.fmopl_enabled);
    page[42] = config.fmopl_sidno;
    page[55] = config.clock_rate.index();
    page[56..58].copy_from_slice(&config.raster_rate.to_le_bytes());
    page
}

/// Decode a flash page. `None` on magic mismatch, which callers treat
/// as "use compiled defaults".
pub fn deserialize(page: &[u8; FLASH_PAGE_SIZE]) -> Option<Config> {
    let magic = u32::from_le_bytes([page[0], page[1], page[2], page[3]]);
    if magic != MAGIC {
        return None;
    }
    let hz = u32::from_le_bytes([page[7], page[8], page[9], page[10]]);
    let clock_rate = match ClockRate::from_hz(hz) {
        Some(rate) => rate,
        None => {
            warn!("unconventional clock rate {hz} in flash, reverting to default");
            ClockRate::Default
        }
    };
    let raster = u16::from_le_bytes([page[56], page[57]]);
    Some(Config {
        default_config: page[4] != 0,
        config_saveid: page[5],
        external_clock: page[6] != 0,
        clock_rate,
        lock_clockrate: page[11] != 0,
        raster_rate: if raster == 0 {
            clock_rate.raster_interval() as u16
        } else {
            raster
        },
        socket_one: read_socket(&page[12..20]),
        socket_two: read_socket(&page[20..28]),
        mirrored: page[28] != 0,
        led: LedConfig {
            enabled: page[29] != 0,
            idle_breathe: page[30] != 0,
        },
        rgb: RgbConfig {
            enabled: page[31] != 0,
            idle_breathe: page[32] != 0,
            brightness: page[33],
            sid_to_use: page[34],
        },
        cdc_enabled: page[35] != 0,
        webusb_enabled: page[36] != 0,
        asid_enabled: page[37] != 0,
        midi_enabled: page[38] != 0,
        audio_stereo: page[39] != 0,
        lock_audio_switch: page[40] != 0,
        fmopl_enabled: page[41] != 0,
        fmopl_sidno: page[42],
    })
}

/// Build the ReadConfig reply array.
pub fn readback(config: &Config, runtime: &RuntimeCfg) -> [u8; READBACK_SIZE] {
    let mut out = [0u8; READBACK_SIZE];
    out[0] = 0x7F;
    out[6] = u8::from(config.external_clock);
    let hz = config.clock_rate.hz();
    out[7] = (hz >> 16) as u8;
    out[8] = (hz >> 8) as u8;
    out[9] = hz as u8;
    out[10] = u8::from(config.socket_one.enabled);
    out[11] = u8::from(config.socket_one.dualsid);
    out[12] = config.socket_one.sid1.kind.wire();
    out[13] = config.socket_one.clonetype.wire();
    out[14] = config.socket_one.chiptype.wire();
    out[20] = u8::from(config.socket_two.enabled);
    out[21] = u8::from(config.socket_two.dualsid);
    out[22] = config.socket_two.sid1.kind.wire();
    out[23] = u8::from(config.mirrored);
    out[24] = config.socket_two.clonetype.wire();
    out[25] = config.socket_two.chiptype.wire();
    out[30] = u8::from(config.led.enabled);
    out[31] = u8::from(config.led.idle_breathe);
    out[40] = u8::from(config.rgb.enabled);
    out[41] = u8::from(config.rgb.idle_breathe);
    out[42] = config.rgb.brightness;
    out[43] = config.rgb.sid_to_use;
    out[51] = u8::from(config.cdc_enabled);
    out[52] = u8::from(config.webusb_enabled);
    out[53] = u8::from(config.asid_enabled);
    out[54] = u8::from(config.midi_enabled);
    out[55] = runtime.numsids;
    out[56] = runtime.fmopl_sid;
    out
}

fn write_socket(buf: &mut [u8], socket: &SocketConfig) {
    buf[0] = u8::from(socket.enabled);
    buf[1] = u8::from(socket.dualsid);
    buf[2] = socket.chiptype.wire();
    buf[3] = socket.clonetype.wire();
    buf[4] = socket.sid1.kind.wire();
    buf[5] = socket.sid1.addr;
    buf[6] = socket.sid2.kind.wire();
    buf[7] = socket.sid2.addr;
}

fn read_socket(buf: &[u8]) -> SocketConfig {
    SocketConfig {
        enabled: buf[0] != 0,
        dualsid: buf[1] != 0,
        chiptype: ChipType::from_wire(buf[2]),
        clonetype: CloneType::from_wire(buf[3]),
        sid1: SidSlot::new(addr_to_id(buf[5]), buf[5], SidType::from_wire(buf[4])),
        sid2: SidSlot::new(addr_to_id(buf[7]), buf[7], SidType::from_wire(buf[6])),
    }
}

/// Bus ids are not persisted; they follow from the base address.
const fn addr_to_id(addr: u8) -> u8 {
    match addr {
        0x00 => 0,
        0x20 => 1,
        0x40 => 2,
        0x60 => 3,
        _ => SidSlot::NO_ID,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_round_trips_the_default_config() {
        let cfg = Config::default();
        let page = serialize(&cfg);
        let back = deserialize(&page).expect("magic matches");
        assert_eq!(back, cfg);
    }

    #[test]
    fn prefix_ordering_is_fixed() {
        let mut cfg = Config::default();
        cfg.default_config = false;
        cfg.config_saveid = 7;
        let page = serialize(&cfg);
        assert_eq!(&page[0..4], &MAGIC.to_le_bytes());
        assert_eq!(page[4], 0);
        assert_eq!(page[5], 7);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut page = serialize(&Config::default());
        page[0] ^= 0xFF;
        assert!(deserialize(&page).is_none());
    }

    #[test]
    fn unknown_clock_rate_reverts_to_default() {
        let mut page = serialize(&Config::default());
        page[7..11].copy_from_slice(&123_456u32.to_le_bytes());
        let back = deserialize(&page).expect("magic matches");
        assert_eq!(back.clock_rate, ClockRate::Default);
    }

    #[test]
    fn ids_are_rebuilt_from_addresses() {
        let mut cfg = Config::default();
        cfg.socket_two.sid1.addr = 0x40;
        cfg.socket_two.sid1.id = 9; // not persisted, must not survive
        let back = deserialize(&serialize(&cfg)).expect("magic matches");
        assert_eq!(back.socket_two.sid1.id, 2);
        assert_eq!(back.socket_two.sid1.addr, 0x40);
    }

    #[test]
    fn readback_carries_verification_byte_and_clock() {
        let cfg = Config::default();
        let mut rt_cfg = cfg;
        crate::validate::validate(&mut rt_cfg).expect("config validates");
        let runtime = RuntimeCfg::derive(&rt_cfg);
        let out = readback(&cfg, &runtime);
        assert_eq!(out[0], 0x7F);
        // 1 MHz = 0x0F4240, big-endian across three bytes.
        assert_eq!(out[7], 0x0F);
        assert_eq!(out[8], 0x42);
        assert_eq!(out[9], 0x40);
        assert_eq!(out[55], 2);
    }

    #[test]
    fn socket_fields_round_trip() {
        let mut cfg = Config::default();
        cfg.socket_one.dualsid = true;
        cfg.socket_one.chiptype = ChipType::Clone;
        cfg.socket_one.clonetype = CloneType::SkPico;
        cfg.socket_one.sid2 = SidSlot::new(1, 0x20, SidType::Mos8580);
        let back = deserialize(&serialize(&cfg)).expect("magic matches");
        assert_eq!(back.socket_one.clonetype, CloneType::SkPico);
        assert_eq!(back.socket_one.sid2.kind, SidType::Mos8580);
        assert_eq!(back.socket_one.sid2.addr, 0x20);
    }
}
