//! Ultrasonic distance frame format
//!
//! Fixed 7-byte frame, big-endian data field:
//!
//! | Offset | Field          | Value                    |
//! |--------|----------------|--------------------------|
//! | 0      | header 1       | `0x5A`                   |
//! | 1      | header 2       | `0x5A`                   |
//! | 2      | type           | `0x45` (distance)        |
//! | 3      | length         | `0x02`                   |
//! | 4      | data high byte |                          |
//! | 5      | data low byte  |                          |
//! | 6      | checksum       | sum(bytes[0..6]) mod 256 |

use std::fmt;

use super::codec::frame_hex;

/// First header byte
pub const FRAME_HEADER_1: u8 = 0x5A;
/// Second header byte
pub const FRAME_HEADER_2: u8 = 0x5A;
/// Type byte of a distance frame
pub const DATA_TYPE_DISTANCE: u8 = 0x45;
/// Length byte of a distance frame
pub const DATA_LENGTH: u8 = 0x02;
/// Total frame length in bytes
pub const FRAME_LENGTH: usize = 7;

/// Decoded distances the sensor uses as "out of range" markers
pub const SENTINEL_DISTANCES: [u16; 2] = [20, 720];

/// Why a candidate frame was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvalidReason {
    /// Header bytes are not `5A 5A`
    BadHeader,
    /// Type byte is not the distance type
    NotDistance,
    /// Length byte is not 2
    BadLength,
    /// Checksum byte does not match the sum of the first six bytes
    Checksum,
    /// Checksum is valid but the distance is a sentinel value
    OutOfRange,
}

impl InvalidReason {
    /// Short human-readable reason
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadHeader => "bad header",
            Self::NotDistance => "not a distance frame",
            Self::BadLength => "unexpected data length",
            Self::Checksum => "checksum mismatch",
            Self::OutOfRange => "out of range",
        }
    }
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw 7-byte candidate frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistanceFrame {
    bytes: [u8; FRAME_LENGTH],
}

impl DistanceFrame {
    /// Wrap raw bytes without validating them
    pub fn from_bytes(bytes: [u8; FRAME_LENGTH]) -> Self {
        Self { bytes }
    }

    /// Build a well-formed frame carrying `distance_cm`
    pub fn encode(distance_cm: u16) -> Self {
        let [hi, lo] = distance_cm.to_be_bytes();
        let mut bytes = [
            FRAME_HEADER_1,
            FRAME_HEADER_2,
            DATA_TYPE_DISTANCE,
            DATA_LENGTH,
            hi,
            lo,
            0,
        ];
        bytes[6] = checksum(&bytes[..6]);
        Self { bytes }
    }

    /// Raw frame bytes
    pub fn as_bytes(&self) -> &[u8; FRAME_LENGTH] {
        &self.bytes
    }

    /// Big-endian data field, regardless of validity
    pub fn raw_distance(&self) -> u16 {
        u16::from_be_bytes([self.bytes[4], self.bytes[5]])
    }

    /// Uppercase, space-separated hex of the frame
    pub fn to_hex(&self) -> String {
        frame_hex(&self.bytes)
    }

    /// Validate the frame and return the distance in centimeters.
    ///
    /// Checks run in a fixed order and stop at the first failure:
    /// header, type, length, checksum, then sentinel filtering.
    pub fn validate(&self) -> Result<u16, InvalidReason> {
        let b = &self.bytes;

        if b[0] != FRAME_HEADER_1 || b[1] != FRAME_HEADER_2 {
            return Err(InvalidReason::BadHeader);
        }
        if b[2] != DATA_TYPE_DISTANCE {
            return Err(InvalidReason::NotDistance);
        }
        if b[3] != DATA_LENGTH {
            return Err(InvalidReason::BadLength);
        }
        if checksum(&b[..6]) != b[6] {
            return Err(InvalidReason::Checksum);
        }

        let distance = self.raw_distance();
        if is_sentinel(distance) {
            return Err(InvalidReason::OutOfRange);
        }

        Ok(distance)
    }
}

impl From<DistanceFrame> for Vec<u8> {
    fn from(frame: DistanceFrame) -> Self {
        frame.bytes.to_vec()
    }
}

/// Sum of bytes mod 256
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Whether a decoded distance is a reserved "no reading" marker
pub fn is_sentinel(distance_cm: u16) -> bool {
    SENTINEL_DISTANCES.contains(&distance_cm)
}
