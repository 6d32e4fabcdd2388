//! Bridge device binary.
//!
//! Runs the device core against the virtual bus: a short scripted demo
//! by default, a hex-packet console on stdin, or a JSON state dump.
//! Real hardware ports plug in through the same traits the virtual rig
//! implements.

use std::io::{self, BufRead, Write};
use std::process;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use sidbridge::{
    ChipModel, Device, DeviceShared, Reply, Runtime, VirtualBus, VirtualFlash, decode,
};

type VirtualDevice = Device<VirtualBus, VirtualFlash>;

// ---------------------------------------------------------------------------
// CLI argument parsing
// ---------------------------------------------------------------------------

struct CliArgs {
    console: bool,
    state_dump: bool,
    millis: u64,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        console: false,
        state_dump: false,
        millis: 600,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--stdin" => {
                cli.console = true;
            }
            "--state" => {
                cli.state_dump = true;
            }
            "--millis" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    cli.millis = s.parse().unwrap_or(600);
                }
            }
            "--help" | "-h" => {
                eprintln!("Usage: sidbridge [OPTIONS]");
                eprintln!();
                eprintln!("Options:");
                eprintln!("  --stdin        Read hex packets from stdin, one per line");
                eprintln!("  --state        Boot, detect chips, print JSON state, exit");
                eprintln!("  --millis <n>   Demo play time in milliseconds [default: 600]");
                process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Boot the device on the virtual bus: a 6581 in socket one, an 8580
/// in socket two.
fn boot_virtual() -> (Arc<Mutex<VirtualDevice>>, Arc<DeviceShared>) {
    let bus = VirtualBus::with_chips([
        ChipModel::Mos6581,
        ChipModel::Empty,
        ChipModel::Mos8580,
        ChipModel::Empty,
    ]);
    let shared = Arc::new(DeviceShared::new());
    let device = Device::boot(bus, VirtualFlash::new(), Arc::clone(&shared));
    (Arc::new(Mutex::new(device)), shared)
}

fn dispatch(device: &Arc<Mutex<VirtualDevice>>, packet: &[u8]) -> Reply {
    match decode(packet) {
        Ok(command) => {
            let mut device = device.lock().unwrap_or_else(PoisonError::into_inner);
            device.dispatch(command)
        }
        Err(e) => {
            eprintln!("bad packet: {e}");
            Reply::None
        }
    }
}

/// Whitespace-tolerant hex line to bytes.
fn parse_hex(line: &str) -> Option<Vec<u8>> {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() || compact.len() % 2 != 0 {
        return None;
    }
    let mut bytes = Vec::with_capacity(compact.len() / 2);
    for pair in compact.as_bytes().chunks_exact(2) {
        let text = std::str::from_utf8(pair).ok()?;
        bytes.push(u8::from_str_radix(text, 16).ok()?);
    }
    Some(bytes)
}

fn to_hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        out.push_str(&format!("{byte:02X}"));
    }
    out
}

// ---------------------------------------------------------------------------
// Demo mode
// ---------------------------------------------------------------------------

fn run_demo(millis: u64) {
    let (device, shared) = boot_virtual();
    let runtime = Runtime::start(Arc::clone(&device), Arc::clone(&shared));

    if let Reply::Data(version) = dispatch(&device, &[0xD2, 0x80]) {
        eprintln!("{}", String::from_utf8_lossy(&version));
    }

    // probe both sockets
    dispatch(&device, &[0xD2, 0x51]);
    {
        let device = device.lock().unwrap_or_else(PoisonError::into_inner);
        let config = device.config();
        eprintln!(
            "socket one: {}, socket two: {}, {} chips on the bus",
            config.socket_one.sid1.kind.label(),
            config.socket_two.sid1.kind.label(),
            device.chip_count()
        );
    }

    // a little arpeggio on voice one of the first chip
    dispatch(&device, &[0x03, 0x05, 0x09, 0x06, 0x00, 0x18, 0x0F]);
    let notes: [(u8, u8); 3] = [(0x11, 0x25), (0x15, 0x9A), (0x19, 0xB1)];
    let note_ms = (millis / notes.len() as u64).max(1);
    for (hi, lo) in notes {
        dispatch(&device, &[0x03, 0x00, lo, 0x01, hi, 0x04, 0x21]);
        thread::sleep(Duration::from_millis(note_ms));
        dispatch(&device, &[0x01, 0x04, 0x20]);
    }
    eprintln!(
        "meter pwm {}, pixel {:?}",
        shared.led_pwm(),
        shared.led_pixel()
    );

    // stream ASID frames; the drain timer plays them out
    let frame = [0xF0, 0x2D, 0x4E, 0x01, 0, 0, 0, 0, 0, 0, 0, 0x2F, 0xF7];
    {
        let mut device = device.lock().unwrap_or_else(PoisonError::into_inner);
        for _ in 0..29 {
            device.handle_sysex(&frame);
        }
    }
    thread::sleep(Duration::from_millis(60));
    {
        let device = device.lock().unwrap_or_else(PoisonError::into_inner);
        eprintln!("asid frame drained: register 0 reads {:#04x}", device.shadow(0));
    }

    dispatch(&device, &[0xCE]);
    runtime.shutdown();
}

// ---------------------------------------------------------------------------
// Hex-packet console
// ---------------------------------------------------------------------------

fn run_console() {
    let (mut device, mut shared) = boot_virtual();
    let mut runtime = Some(Runtime::start(Arc::clone(&device), Arc::clone(&shared)));

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut stdout = stdout.lock();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(packet) = parse_hex(line) else {
            let _ = writeln!(stdout, "parse error");
            let _ = stdout.flush();
            continue;
        };

        // MIDI SysEx goes to the ASID layer, everything else decodes
        if packet.first() == Some(&0xF0) {
            let handled = device
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .handle_sysex(&packet);
            let _ = writeln!(stdout, "{}", if handled { "sysex" } else { "dropped" });
            let _ = stdout.flush();
            continue;
        }

        let reply = match decode(&packet) {
            Ok(command) => device
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .dispatch(command),
            Err(e) => {
                let _ = writeln!(stdout, "error: {e}");
                let _ = stdout.flush();
                continue;
            }
        };

        match reply {
            Reply::None => {
                let _ = writeln!(stdout, "ok");
            }
            Reply::Byte(byte) => {
                let _ = writeln!(stdout, "{byte:02X}");
            }
            Reply::Data(data) => {
                let _ = writeln!(stdout, "{}", to_hex(&data));
            }
            Reply::Reset => {
                let _ = writeln!(stdout, "reset");
                // wind the runtime down, then boot again on the same
                // bus and flash
                if let Some(runtime) = runtime.take() {
                    runtime.shutdown();
                }
                let Ok(mutex) = Arc::try_unwrap(device) else {
                    eprintln!("device still shared, cannot restart");
                    process::exit(1);
                };
                let (port, flash) = mutex
                    .into_inner()
                    .unwrap_or_else(PoisonError::into_inner)
                    .into_parts();
                shared = Arc::new(DeviceShared::new());
                device = Arc::new(Mutex::new(Device::boot(port, flash, Arc::clone(&shared))));
                runtime = Some(Runtime::start(Arc::clone(&device), Arc::clone(&shared)));
            }
            Reply::Bootloader => {
                let _ = writeln!(stdout, "bootloader");
                break;
            }
        }
        let _ = stdout.flush();
    }

    if let Some(runtime) = runtime.take() {
        runtime.shutdown();
    }
}

// ---------------------------------------------------------------------------
// State dump
// ---------------------------------------------------------------------------

#[cfg(feature = "native")]
fn run_state_dump() {
    let (device, _shared) = boot_virtual();
    dispatch(&device, &[0xD2, 0x51]);
    let device = device.lock().unwrap_or_else(PoisonError::into_inner);
    println!("{}", sidbridge::DeviceState::capture(&device).to_json());
}

#[cfg(not(feature = "native"))]
fn run_state_dump() {
    eprintln!("state dumps need the native feature");
    process::exit(1);
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();
    let cli = parse_args();

    if cli.console {
        run_console();
        return;
    }

    if cli.state_dump {
        run_state_dump();
        return;
    }

    run_demo(cli.millis);
}
