//! Resynchronizing frame decoder
//!
//! Turns an unbounded byte stream into distance readings. The decoder is a
//! plain synchronous value owned by the reader worker; it never blocks and
//! never fails, malformed input only produces [`DistanceEvent::InvalidFrame`].

use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

use super::frame::{DistanceFrame, InvalidReason, FRAME_HEADER_1, FRAME_HEADER_2, FRAME_LENGTH};

/// Rolling buffer capacity in bytes
pub const BUFFER_CAPACITY: usize = 1024;

/// Event produced by the ultrasonic link
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DistanceEvent {
    /// Valid distance reading
    Reading {
        /// Distance in centimeters
        distance_cm: u16,
    },
    /// Candidate frame rejected
    InvalidFrame {
        /// Raw frame as uppercase hex
        frame_hex: String,
        /// Rejection reason
        #[serde(serialize_with = "serialize_reason")]
        reason: InvalidReason,
    },
    /// Terminal stream error, the link has stopped
    Error {
        /// Error description
        message: String,
    },
}

fn serialize_reason<S: serde::Serializer>(reason: &InvalidReason, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(reason.as_str())
}

impl DistanceEvent {
    /// Distance if this is a reading
    pub fn distance(&self) -> Option<u16> {
        match self {
            Self::Reading { distance_cm } => Some(*distance_cm),
            _ => None,
        }
    }

    /// Whether this is an invalid-frame report
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::InvalidFrame { .. })
    }
}

impl fmt::Display for DistanceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reading { distance_cm } => write!(f, "distance: {} cm", distance_cm),
            Self::InvalidFrame { frame_hex, reason } => {
                write!(f, "invalid frame: {} ({})", frame_hex, reason)
            }
            Self::Error { message } => write!(f, "error: {}", message),
        }
    }
}

/// Decoder counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecoderStats {
    /// Bytes fed into the decoder
    pub bytes_received: u64,
    /// Candidate frames extracted
    pub frames: u64,
    /// Valid readings emitted
    pub readings: u64,
    /// Invalid frames reported
    pub invalid_frames: u64,
    /// Bytes dropped while searching for a header
    pub resync_bytes: u64,
    /// Buffer resets caused by overflow
    pub overflow_resets: u64,
}

/// Sliding-window frame decoder
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    capacity: usize,
    stats: DecoderStats,
}

impl FrameDecoder {
    /// Create a decoder with the default buffer capacity
    pub fn new() -> Self {
        Self::with_capacity(BUFFER_CAPACITY)
    }

    /// Create a decoder with a custom buffer capacity (at least one frame)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(FRAME_LENGTH + 1);
        Self {
            buffer: Vec::with_capacity(capacity),
            capacity,
            stats: DecoderStats::default(),
        }
    }

    /// Feed bytes, passing every resulting event to `emit` in arrival order
    pub fn push_with(&mut self, data: &[u8], mut emit: impl FnMut(DistanceEvent)) {
        self.stats.bytes_received += data.len() as u64;

        for &byte in data {
            // Safety net only: frames are extracted after every byte, so the
            // window never grows past one partial frame
            if self.buffer.len() >= self.capacity - 1 {
                warn!("Frame buffer overflow, discarding {} bytes", self.buffer.len());
                self.buffer.clear();
                self.stats.overflow_resets += 1;
            }
            self.buffer.push(byte);
            self.extract_frames(&mut emit);
        }
    }

    /// Feed bytes and collect the resulting events
    pub fn push(&mut self, data: &[u8]) -> Vec<DistanceEvent> {
        let mut events = Vec::new();
        self.push_with(data, |e| events.push(e));
        events
    }

    /// Drop buffered bytes
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Number of bytes waiting for a complete frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Decoder counters
    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    fn extract_frames(&mut self, emit: &mut impl FnMut(DistanceEvent)) {
        while self.buffer.len() >= FRAME_LENGTH {
            // Only offsets from which a whole frame fits are searched
            let last_start = self.buffer.len() - FRAME_LENGTH;
            let header = (0..=last_start).find(|&i| {
                self.buffer[i] == FRAME_HEADER_1 && self.buffer[i + 1] == FRAME_HEADER_2
            });

            match header {
                None => {
                    self.buffer.drain(..1);
                    self.stats.resync_bytes += 1;
                }
                Some(start) if start > 0 => {
                    self.buffer.drain(..start);
                    self.stats.resync_bytes += start as u64;
                }
                Some(_) => {
                    let mut raw = [0u8; FRAME_LENGTH];
                    raw.copy_from_slice(&self.buffer[..FRAME_LENGTH]);
                    // The candidate leaves the window whether or not it is valid
                    self.buffer.drain(..FRAME_LENGTH);
                    self.stats.frames += 1;
                    emit(self.parse(DistanceFrame::from_bytes(raw)));
                }
            }
        }
    }

    fn parse(&mut self, frame: DistanceFrame) -> DistanceEvent {
        let frame_hex = frame.to_hex();
        match frame.validate() {
            Ok(distance_cm) => {
                debug!("[valid frame] {} | distance: {} cm", frame_hex, distance_cm);
                self.stats.readings += 1;
                DistanceEvent::Reading { distance_cm }
            }
            Err(reason) => {
                warn!("[invalid frame] {} -> {}", frame_hex, reason);
                self.stats.invalid_frames += 1;
                DistanceEvent::InvalidFrame { frame_hex, reason }
            }
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(d: u16) -> Vec<u8> {
        DistanceFrame::encode(d).into()
    }

    #[test]
    fn test_single_frame() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.push(&frame(150));
        assert_eq!(events, vec![DistanceEvent::Reading { distance_cm: 150 }]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_partial_frame_waits() {
        let mut decoder = FrameDecoder::new();
        let data = frame(300);
        assert!(decoder.push(&data[..4]).is_empty());
        assert_eq!(decoder.buffered(), 4);
        assert_eq!(decoder.push(&data[4..]), vec![DistanceEvent::Reading { distance_cm: 300 }]);
    }

    #[test]
    fn test_garbage_prefix_resync() {
        let mut decoder = FrameDecoder::new();
        let mut data = vec![0x01, 0x02, 0x03, 0x5A, 0x00];
        data.extend(frame(99));
        let events = decoder.push(&data);
        assert_eq!(events, vec![DistanceEvent::Reading { distance_cm: 99 }]);
        assert_eq!(decoder.stats().resync_bytes, 5);
    }

    #[test]
    fn test_corrupt_frame_is_consumed() {
        let mut decoder = FrameDecoder::new();
        let mut bad = frame(200);
        bad[6] ^= 0x01;
        let mut data = bad.clone();
        data.extend(frame(201));

        let events = decoder.push(&data);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            DistanceEvent::InvalidFrame {
                frame_hex: crate::core::codec::frame_hex(&bad),
                reason: InvalidReason::Checksum,
            }
        );
        assert_eq!(events[1].distance(), Some(201));
    }

    #[test]
    fn test_sentinel_is_invalid() {
        let mut decoder = FrameDecoder::new();
        let mut data = frame(20);
        data.extend(frame(720));
        let events = decoder.push(&data);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| matches!(
            e,
            DistanceEvent::InvalidFrame { reason: InvalidReason::OutOfRange, .. }
        )));
        assert_eq!(decoder.stats().readings, 0);
    }

    #[test]
    fn test_tiny_capacity_still_assembles_frames() {
        // Capacity below a frame is raised to frame length + 1, so a single
        // frame can still be assembled byte by byte.
        let mut decoder = FrameDecoder::with_capacity(1);
        assert_eq!(decoder.push(&frame(42)), vec![DistanceEvent::Reading { distance_cm: 42 }]);
        assert_eq!(decoder.stats().overflow_resets, 0);
    }

    #[test]
    fn test_event_json() {
        let event = DistanceEvent::InvalidFrame {
            frame_hex: "5A".to_string(),
            reason: InvalidReason::OutOfRange,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"invalid_frame\""));
        assert!(json.contains("\"reason\":\"out of range\""));
    }
}
