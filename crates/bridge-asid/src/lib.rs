//! ASID stream buffering.
//!
//! ASID is a SysEx-wrapped protocol for streaming SID register frames
//! in real time. Hosts deliver it in bursts; [`AsidEngine`] smooths
//! the bursts through a growable [`FrameRing`] and paces the drain
//! with an [`ArrivalTracker`] so the chips see register writes at the
//! tune's own frame rate.

mod engine;
mod ring;
mod sysex;
mod timing;

pub use engine::{AsidEngine, IDLE_TICKS, WRITE_CYCLES};
pub use ring::{
    FRAME_BYTES, FRAME_WRITES, FrameRing, LOW_HEADROOM, RING_DEFAULT_FRAMES, RING_MAX_FRAMES,
};
pub use sysex::{ASID_ID, AsidMessage, SYSEX_END, SYSEX_START, decode};
pub use timing::{ArrivalTracker, shape_rate};
