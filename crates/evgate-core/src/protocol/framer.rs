//! Byte-stream framing with resynchronisation.
//!
//! TCP gives the gateway an arbitrary byte stream: frames can straddle read
//! boundaries, and a misbehaving terminal (or TCP-level corruption) can put
//! junk between frames. The framer extracts one checksum-valid frame per
//! step and guarantees forward progress on any input:
//!
//! - junk before the earliest start marker is discarded in one step;
//! - a "frame" whose declared length is absurd, or whose checksum fails, is
//!   assumed to start at a coincidental marker; only the two marker bytes are
//!   skipped, and a real frame hiding behind the garbage is still found;
//! - with no marker in the buffer, everything but the final byte is dropped
//!   (the last byte may be the first half of a marker split across reads).
//!
//! The framer holds no state; the connection owns the buffer and applies
//! `advance` itself.

use super::{HEADER_LEN, START_2016, START_2025};

/// Result of one framing step.
#[derive(Debug, PartialEq, Eq)]
pub struct FrameStep {
    /// Bytes to drop from the front of the buffer.
    pub advance: usize,
    /// A complete, checksum-valid frame, if one was found.
    ///
    /// Owned copy: the caller is free to advance (and so overwrite) the
    /// connection buffer immediately.
    pub frame: Option<Vec<u8>>,
}

impl FrameStep {
    fn need_more() -> Self {
        FrameStep { advance: 0, frame: None }
    }

    fn skip(advance: usize) -> Self {
        FrameStep { advance, frame: None }
    }
}

/// Stateless frame extractor with a configurable frame-size cap.
#[derive(Debug, Clone, Copy)]
pub struct Framer {
    max_packet_size: usize,
}

impl Framer {
    /// Create a framer. Frames whose declared total length exceeds
    /// `max_packet_size` are treated as noise.
    pub fn new(max_packet_size: usize) -> Self {
        Self { max_packet_size }
    }

    /// Try to extract one frame from the front of `buf`.
    ///
    /// `advance == 0 && frame.is_none()` means "need more data"; any other
    /// combination makes progress.
    pub fn step(&self, buf: &[u8]) -> FrameStep {
        scan(buf, self.max_packet_size)
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new(crate::DEFAULT_MAX_PACKET_SIZE)
    }
}

/// XOR checksum over `data`.
pub fn bcc(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, b| acc ^ b)
}

/// Verify the trailing BCC of a complete frame.
///
/// The checksum covers everything after the start marker up to the checksum
/// byte itself.
pub fn verify_checksum(frame: &[u8]) -> bool {
    if frame.len() < super::MIN_PACKET_LEN {
        return false;
    }
    frame[frame.len() - 1] == bcc(&frame[2..frame.len() - 1])
}

/// One framing step over `buf`. See [`Framer::step`].
pub fn scan(buf: &[u8], max_packet_size: usize) -> FrameStep {
    let start = match find_marker(buf) {
        Some(idx) => idx,
        None => {
            // Keep the last byte: it may be half a marker.
            return FrameStep::skip(buf.len().saturating_sub(1));
        }
    };

    if start > 0 {
        return FrameStep::skip(start);
    }

    if buf.len() < HEADER_LEN {
        return FrameStep::need_more();
    }

    let payload_len = u16::from_be_bytes([buf[22], buf[23]]) as usize;
    let total_len = HEADER_LEN + payload_len + 1;

    if total_len > max_packet_size {
        // Declared length is nonsense; the marker was coincidental.
        return FrameStep::skip(2);
    }

    if buf.len() < total_len {
        return FrameStep::need_more();
    }

    if !verify_checksum(&buf[..total_len]) {
        return FrameStep::skip(2);
    }

    FrameStep {
        advance: total_len,
        frame: Some(buf[..total_len].to_vec()),
    }
}

/// Offset of the earliest start marker (either revision), if any.
fn find_marker(buf: &[u8]) -> Option<usize> {
    buf.windows(2)
        .position(|w| w == START_2016 || w == START_2025)
}
