//! Raw MIDI messages as they travel through the bridge queues.

use smallvec::SmallVec;

/// Raw message bytes. Channel messages stay inline; sysex spills to the heap.
pub type MidiBytes = SmallVec<[u8; 3]>;

pub const ACTIVE_SENSING: u8 = 0xFE;
const PITCH_BEND: u8 = 0xE0;
const PITCH_BEND_CENTER: u16 = 8192;

/// A raw message paired with a timestamp. The clock domain (device µs or
/// graph frames) is fixed by the queue holding the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedMessage {
    pub bytes: MidiBytes,
    pub timestamp: u64,
}

impl TimedMessage {
    pub fn new(bytes: impl Into<MidiBytes>, timestamp: u64) -> Self {
        Self {
            bytes: bytes.into(),
            timestamp,
        }
    }
}

pub fn is_active_sensing(msg: &[u8]) -> bool {
    msg.first() == Some(&ACTIVE_SENSING)
}

pub fn is_pitch_bend(msg: &[u8]) -> bool {
    msg.len() >= 3 && msg[0] & 0xF0 == PITCH_BEND
}

/// Flips the polarity of a 14-bit bend value around the center.
pub fn fix_pitch_bend(bend: u16) -> u16 {
    let bend = bend & 0x3FFF;
    let fixed = if bend > PITCH_BEND_CENTER - 1 {
        bend - PITCH_BEND_CENTER
    } else {
        bend + PITCH_BEND_CENTER
    };
    fixed & 0x3FFF
}

/// Receive-path filter: drops empty and active-sensing messages and, when
/// `fix_bend` is set, rewrites pitch bend values.
pub fn inbound(msg: &[u8], fix_bend: bool) -> Option<MidiBytes> {
    if msg.is_empty() || is_active_sensing(msg) {
        return None;
    }

    let mut bytes = MidiBytes::from_slice(msg);
    if fix_bend && is_pitch_bend(msg) {
        let bend = ((msg[2] as u16 & 0x7F) << 7) | (msg[1] as u16 & 0x7F); // 14-bit
        let fixed = fix_pitch_bend(bend);
        bytes[1] = (fixed & 0x7F) as u8;
        bytes[2] = ((fixed >> 7) & 0x7F) as u8;
    }
    Some(bytes)
}

/// Graph→device accepts single channel/system messages only.
pub fn message_len_supported(len: usize) -> bool {
    (1..=3).contains(&len)
}
