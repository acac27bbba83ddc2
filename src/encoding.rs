//! Byte-level codec for 26A message framing.
//!
//! This module implements the pure transformations of the wire protocol:
//! the 7-bit rotation that obscures LED and button IDs, the seeded XOR
//! checksum, outbound frame assembly, and the bit packing used by bulk
//! LED range writes.
//!
//! ## Framing
//!
//! An outbound frame is `payload ++ [checksum] ++ [0xFF]`. The checksum is
//! `0x7F` XORed with every payload byte *except the first* (the category
//! byte), so a one-byte payload carries a checksum of exactly `0x7F`. The
//! `0xFF` terminator is also the device's keep-alive byte, which is why it
//! may never occur inside a payload.
//!
//! ## ID rotation
//!
//! IDs travel rotated left by one within the low 7 bits; the high bit is
//! always forced to zero. The rotation is self-inverse over `0..=127`:
//! [`rotr7`] undoes [`rotl7`] exactly.
//!
//! ## Functions
//!
//! - [`rotl7`] / [`rotr7`]: the 7-bit rotation and its inverse
//! - [`checksum`]: seeded XOR fold
//! - [`frame`]: validate and wrap a command payload
//! - [`pack_states`] / [`unpack_states`]: LED range bitmap conversion

use crate::consts::{CHECKSUM_SEED, FRAME_END, MAX_FRAME_PAYLOAD};
use crate::error::{Error, Result};

/// Rotates the low 7 bits of `b` left by one; the high bit is forced to 0.
pub const fn rotl7(b: u8) -> u8 {
    ((b << 1) & 0x7E) | ((b & 0x40) >> 6)
}

/// Rotates the low 7 bits of `b` right by one; inverse of [`rotl7`] over
/// `0..=127`.
pub const fn rotr7(b: u8) -> u8 {
    ((b & 0x7E) >> 1) | ((b & 0x01) << 6)
}

/// Folds the frame checksum over `tail`, the payload bytes after the
/// category byte.
pub fn checksum(tail: &[u8]) -> u8 {
    tail.iter().fold(CHECKSUM_SEED, |h, b| h ^ b)
}

/// Wraps a command payload into a complete wire frame.
///
/// # Arguments
/// - `payload`: 1 to 15 command bytes, none of which may be `0xFF`.
///
/// # Returns
/// `payload ++ [checksum] ++ [0xFF]`, two bytes longer than the input.
///
/// # Errors
/// [`Error::InvalidArgument`] if the payload is empty, longer than 15 bytes,
/// or contains the `0xFF` sentinel.
pub fn frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.is_empty() {
        return Err(Error::InvalidArgument(
            "message must be at least one byte long".into(),
        ));
    }
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(Error::InvalidArgument(format!(
            "message may not be longer than {MAX_FRAME_PAYLOAD} bytes, got {}",
            payload.len()
        )));
    }
    if payload.contains(&FRAME_END) {
        return Err(Error::InvalidArgument(
            "message may not contain a byte of value 0xFF".into(),
        ));
    }

    let mut out = Vec::with_capacity(payload.len() + 2);
    out.extend_from_slice(payload);
    out.push(checksum(&payload[1..]));
    out.push(FRAME_END);
    Ok(out)
}

/// Packs LED on/off states into range-write data bytes.
///
/// Top bit always 0, up to 7 states per byte, high bit to low bit.
pub fn pack_states(states: &[bool]) -> Vec<u8> {
    let mut data = vec![0u8; states.len().div_ceil(7)];
    for (i, &on) in states.iter().enumerate() {
        data[i / 7] |= (on as u8) << (6 - (i % 7));
    }
    data
}

/// Unpacks range-write data bytes back into up to `count` LED states.
///
/// Returns `None` if any data byte has its high bit set, which a conforming
/// sender never produces.
pub fn unpack_states(data: &[u8], count: usize) -> Option<Vec<bool>> {
    if data.iter().any(|d| d & 0x80 != 0) {
        return None;
    }
    let mut states = Vec::with_capacity(count);
    'bytes: for d in data {
        for bit in (0..7).rev() {
            if states.len() == count {
                break 'bytes;
            }
            states.push((d >> bit) & 1 != 0);
        }
    }
    Some(states)
}
