// Servo board serial protocol
//
// One fixed-size frame sets all 18 servo angles:
// [0xAA, 0x55, LEN=41, CMD=0x01, SEQ(le u16), ANGLES[18](le u16, 0.1°), CRC16(le)]
// CRC16-IBM (poly 0xA001 reflected, init 0xFFFF) covers CMD..ANGLES.

use crate::robot::{CHANNEL_COUNT, Channel};

/// Frame start bytes
pub const START: [u8; 2] = [0xAA, 0x55];

/// Bytes from CMD through CRC
pub const LEN_FIXED: u8 = 41;

/// Command: set all 18 angles
pub const CMD_SET_ANGLES: u8 = 0x01;

/// Total frame size on the wire
pub const FRAME_LEN: usize = 3 + LEN_FIXED as usize;

/// Servo travel (degrees)
pub const MAX_ANGLE_DEG: f64 = 180.0;

const CRC_OFFSET: usize = FRAME_LEN - 2;
const ANGLES_OFFSET: usize = 6;

/// Error types for servo communication
#[derive(Debug, thiserror::Error)]
pub enum ServoError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial channel is not connected")]
    NotConnected,

    #[error("{channel} angle {value} is not a finite number")]
    InvalidAngle { channel: Channel, value: f64 },
}

/// Reasons a received frame is rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("Frame is {0} bytes, expected 44")]
    Length(usize),

    #[error("Invalid header: {0:02X?}")]
    Header([u8; 3]),

    #[error("Unknown command 0x{0:02X}")]
    Command(u8),

    #[error("Checksum mismatch: frame says 0x{received:04X}, computed 0x{computed:04X}")]
    Checksum { received: u16, computed: u16 },
}

/// Angle (degrees) to wire units of 0.1°, clamped to the servo travel.
///
/// NaN has no meaningful position and encodes as 0.
pub fn degrees_to_fixed(deg: f64) -> u16 {
    (deg.clamp(0.0, MAX_ANGLE_DEG) * 10.0).round() as u16
}

pub fn fixed_to_degrees(fixed: u16) -> f64 {
    f64::from(fixed) / 10.0
}

/// CRC16-IBM / Modbus
pub fn crc16_ibm(data: &[u8]) -> u16 {
    data.iter().fold(0xFFFF, |mut crc, &byte| {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            crc = if crc & 0x0001 != 0 {
                (crc >> 1) ^ 0xA001
            } else {
                crc >> 1
            };
        }
        crc
    })
}

/// One "set 18 angles" command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServoFrame {
    pub seq: u16,
    pub angles: [u16; CHANNEL_COUNT],
}

impl ServoFrame {
    /// Build from angles in send order (degrees)
    pub fn from_degrees(seq: u16, degrees: &[f64; CHANNEL_COUNT]) -> Self {
        Self {
            seq,
            angles: degrees.map(degrees_to_fixed),
        }
    }

    pub fn degrees(&self) -> [f64; CHANNEL_COUNT] {
        self.angles.map(fixed_to_degrees)
    }

    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut frame = [0u8; FRAME_LEN];
        frame[..2].copy_from_slice(&START);
        frame[2] = LEN_FIXED;
        frame[3] = CMD_SET_ANGLES;
        frame[4..6].copy_from_slice(&self.seq.to_le_bytes());

        for (i, angle) in self.angles.iter().enumerate() {
            let at = ANGLES_OFFSET + 2 * i;
            frame[at..at + 2].copy_from_slice(&angle.to_le_bytes());
        }

        // Checksum over CMD..ANGLES (skip start bytes and LEN)
        let crc = crc16_ibm(&frame[3..CRC_OFFSET]);
        frame[CRC_OFFSET..].copy_from_slice(&crc.to_le_bytes());
        frame
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() != FRAME_LEN {
            return Err(FrameError::Length(bytes.len()));
        }
        if bytes[..2] != START || bytes[2] != LEN_FIXED {
            return Err(FrameError::Header([bytes[0], bytes[1], bytes[2]]));
        }
        if bytes[3] != CMD_SET_ANGLES {
            return Err(FrameError::Command(bytes[3]));
        }

        let received = u16::from_le_bytes([bytes[CRC_OFFSET], bytes[CRC_OFFSET + 1]]);
        let computed = crc16_ibm(&bytes[3..CRC_OFFSET]);
        if received != computed {
            return Err(FrameError::Checksum { received, computed });
        }

        let mut angles = [0u16; CHANNEL_COUNT];
        for (i, angle) in angles.iter_mut().enumerate() {
            let at = ANGLES_OFFSET + 2 * i;
            *angle = u16::from_le_bytes([bytes[at], bytes[at + 1]]);
        }

        Ok(Self {
            seq: u16::from_le_bytes([bytes[4], bytes[5]]),
            angles,
        })
    }
}
