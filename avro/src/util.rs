// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use crate::{bitpack, error::DecodeError};
use serde_json::{Map, Value};
use std::sync::{
    Once,
    atomic::{AtomicUsize, Ordering},
};

/// Maximum number of bytes that can be allocated when decoding
/// Avro-encoded values. This is a protection against ill-formed
/// data, whose length field might be interpreted as enormous.
/// See max_allocation_bytes to change this limit.
pub const DEFAULT_MAX_ALLOCATION_BYTES: usize = 512 * 1024 * 1024;
static MAX_ALLOCATION_BYTES: AtomicUsize = AtomicUsize::new(DEFAULT_MAX_ALLOCATION_BYTES);
static MAX_ALLOCATION_BYTES_ONCE: Once = Once::new();

/// Deepest nesting of schema nodes that encoding, decoding and validation
/// will descend into. Recursive schemas can otherwise describe values nested
/// deeply enough to exhaust the stack. See max_nesting_depth to change this
/// limit.
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 256;
static MAX_NESTING_DEPTH: AtomicUsize = AtomicUsize::new(DEFAULT_MAX_NESTING_DEPTH);
static MAX_NESTING_DEPTH_ONCE: Once = Once::new();

/// Longest encoding of a `long`.
pub const MAX_VARINT_LONG: usize = 10;
/// Longest encoding of an `int`.
pub const MAX_VARINT_INT: usize = 5;

/// Set a new maximum number of bytes that can be allocated when decoding data.
/// Once called, the limit cannot be changed.
///
/// **NOTE** This function must be called before decoding **any** data. The
/// library leverages [`std::sync::Once`](https://doc.rust-lang.org/std/sync/struct.Once.html)
/// to set the limit either when calling this method, or when decoding for
/// the first time.
pub fn max_allocation_bytes(num_bytes: usize) -> usize {
    MAX_ALLOCATION_BYTES_ONCE.call_once(|| {
        MAX_ALLOCATION_BYTES.store(num_bytes, Ordering::Release);
    });
    MAX_ALLOCATION_BYTES.load(Ordering::Acquire)
}

pub(crate) fn safe_len(len: usize) -> Result<usize, DecodeError> {
    let max_bytes = max_allocation_bytes(DEFAULT_MAX_ALLOCATION_BYTES);

    if len <= max_bytes {
        Ok(len)
    } else {
        Err(DecodeError::MemoryAllocation {
            desired: len,
            maximum: max_bytes,
        })
    }
}

/// Set the maximum nesting depth of values that can be encoded, decoded or
/// validated. Once called, the limit cannot be changed.
///
/// **NOTE** Like [`max_allocation_bytes`], this must be called before any
/// value is processed; the first use fixes the default otherwise.
pub fn max_nesting_depth(depth: usize) -> usize {
    MAX_NESTING_DEPTH_ONCE.call_once(|| {
        MAX_NESTING_DEPTH.store(depth, Ordering::Release);
    });
    MAX_NESTING_DEPTH.load(Ordering::Acquire)
}

/// `Err` with the configured maximum once `depth` exceeds it.
pub(crate) fn check_depth(depth: usize) -> Result<(), usize> {
    let max = max_nesting_depth(DEFAULT_MAX_NESTING_DEPTH);
    if depth > max { Err(max) } else { Ok(()) }
}

pub(crate) trait MapHelper {
    fn string(&self, key: &str) -> Option<String>;

    fn name(&self) -> Option<String> {
        self.string("name")
    }
}

impl MapHelper for Map<String, Value> {
    fn string(&self, key: &str) -> Option<String> {
        self.get(key)
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
    }
}

/// Append the zigzag varint encoding of `n` to `buffer`, returning the number
/// of bytes written.
pub fn zig_i64(n: i64, buffer: &mut Vec<u8>) -> usize {
    encode_variable(((n << 1) ^ (n >> 63)) as u64, buffer)
}

pub fn zig_i32(n: i32, buffer: &mut Vec<u8>) -> usize {
    zig_i64(n as i64, buffer)
}

/// Decode the zigzag varint starting at `offset`, returning the value and the
/// number of bytes it occupied.
pub fn zag_i64(bytes: &[u8], offset: usize) -> Result<(i64, usize), DecodeError> {
    let tail = bytes.get(offset..).unwrap_or_default();
    let (z, len) = decode_variable(tail, MAX_VARINT_LONG)?;
    Ok((unzigzag(z), len))
}

/// Like [`zag_i64`], limited to five bytes and the `int` range.
pub fn zag_i32(bytes: &[u8], offset: usize) -> Result<(i32, usize), DecodeError> {
    let tail = bytes.get(offset..).unwrap_or_default();
    let (z, len) = decode_variable(tail, MAX_VARINT_INT)?;
    let n = unzigzag(z);
    let n = i32::try_from(n).map_err(|_| DecodeError::IntOutOfRange(n))?;
    Ok((n, len))
}

#[inline]
fn unzigzag(z: u64) -> i64 {
    if z & 0x1 == 0 {
        (z >> 1) as i64
    } else {
        !(z >> 1) as i64
    }
}

fn encode_variable(mut z: u64, buffer: &mut Vec<u8>) -> usize {
    let start = buffer.len();
    loop {
        if z <= 0x7F {
            buffer.push((z & 0x7F) as u8);
            break;
        } else {
            buffer.push((0x80 | (z & 0x7F)) as u8);
            z >>= 7;
        }
    }
    buffer.len() - start
}

/// Decode an unsigned varint of at most `max_len` bytes from the front of
/// `bytes`.
///
/// Loads a whole word when enough input is left and lets the active
/// [`bitpack`] backend find and pack the varint in one step; varints that do
/// not end inside the word take the byte-by-byte path.
#[inline]
pub(crate) fn decode_variable(bytes: &[u8], max_len: usize) -> Result<(u64, usize), DecodeError> {
    let packer = bitpack::packer();
    if let Some(word) = bytes.first_chunk::<8>() {
        let word = u64::from_le_bytes(*word);
        let n = packer.count_pack_bits_u64(word);
        if n <= 8 && n as usize <= max_len {
            return Ok((packer.pack_7_8_u64(word, n), n as usize));
        }
    } else if let Some(word) = bytes.first_chunk::<4>() {
        let word = u32::from_le_bytes(*word);
        let n = packer.count_pack_bits_u32(word);
        if n <= 4 && n as usize <= max_len {
            return Ok((u64::from(packer.pack_7_8_u32(word, n)), n as usize));
        }
    }
    decode_variable_bytewise(bytes, max_len)
}

fn decode_variable_bytewise(bytes: &[u8], max_len: usize) -> Result<(u64, usize), DecodeError> {
    let mut i = 0u64;
    for (j, byte) in bytes.iter().take(max_len).enumerate() {
        i |= u64::from(byte & 0x7F) << (j * 7);
        if (byte >> 7) == 0 {
            return Ok((i, j + 1));
        }
    }
    if bytes.len() < max_len {
        Err(DecodeError::TruncatedInput {
            needed: bytes.len() + 1,
            available: bytes.len(),
        })
    } else {
        Err(DecodeError::VarintTooLong { max_bytes: max_len })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn zig(n: i64) -> Vec<u8> {
        let mut s = Vec::new();
        zig_i64(n, &mut s);
        s
    }

    #[test]
    fn test_zigzag() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        zig_i32(42i32, &mut a);
        zig_i64(42i64, &mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn test_zig_i64() {
        assert_eq!(zig(0), [0]);
        assert_eq!(zig(-1), [1]);
        assert_eq!(zig(1), [2]);
        assert_eq!(zig(-64), [127]);
        assert_eq!(zig(64), [128, 1]);
        assert_eq!(zig(i32::MAX as i64), [254, 255, 255, 255, 15]);
        assert_eq!(zig(i32::MAX as i64 + 1), [128, 128, 128, 128, 16]);
        assert_eq!(zig(i32::MIN as i64), [255, 255, 255, 255, 15]);
        assert_eq!(zig(i32::MIN as i64 - 1), [129, 128, 128, 128, 16]);
        assert_eq!(zig(i64::MAX), [254, 255, 255, 255, 255, 255, 255, 255, 255, 1]);
        assert_eq!(zig(i64::MIN), [255, 255, 255, 255, 255, 255, 255, 255, 255, 1]);
    }

    #[test]
    fn test_zag_i64_extremes() {
        for n in [0, -1, 1, -64, 64, i64::MAX, i64::MIN, i32::MIN as i64 - 1] {
            let bytes = zig(n);
            assert_eq!(zag_i64(&bytes, 0), Ok((n, bytes.len())));
        }
    }

    #[test]
    fn test_zag_reads_at_offset_inside_wider_buffer() {
        // Enough trailing bytes for both word paths.
        let mut bytes = vec![0xff, 0xff];
        zig_i64(-300, &mut bytes);
        bytes.extend_from_slice(&[0x80; 8]);
        assert_eq!(zag_i64(&bytes, 2), Ok((-300, 2)));

        let bytes = [0x00, 0x96, 0x01, 0x80, 0x80];
        assert_eq!(zag_i64(&bytes, 1), Ok((75, 2)));
    }

    #[test]
    fn test_zag_i32_range() {
        let bytes = zig(i32::MAX as i64 + 1);
        assert_eq!(
            zag_i32(&bytes, 0),
            Err(DecodeError::IntOutOfRange(i32::MAX as i64 + 1))
        );
        let bytes = zig(i32::MIN as i64);
        assert_eq!(zag_i32(&bytes, 0), Ok((i32::MIN, 5)));
    }

    #[test]
    fn test_truncated() {
        let causes_left_shift_overflow: &[u8] = &[0xe1, 0xe1, 0xe1, 0xe1];
        assert_eq!(
            zag_i64(causes_left_shift_overflow, 0),
            Err(DecodeError::TruncatedInput {
                needed: 5,
                available: 4
            })
        );
        assert!(matches!(
            zag_i64(&[], 0),
            Err(DecodeError::TruncatedInput { .. })
        ));
        assert!(matches!(
            zag_i64(&[0x00], 1),
            Err(DecodeError::TruncatedInput { .. })
        ));
    }

    #[test]
    fn test_overflow() {
        assert_eq!(
            zag_i64(&[0x80; 12], 0),
            Err(DecodeError::VarintTooLong { max_bytes: 10 })
        );
        assert_eq!(
            zag_i32(&[0xe1, 0xe1, 0xe1, 0xe1, 0xe1, 0x01], 0),
            Err(DecodeError::VarintTooLong { max_bytes: 5 })
        );
    }

    #[test]
    fn test_safe_len() -> anyhow::Result<()> {
        assert_eq!(42usize, safe_len(42usize)?);
        assert!(safe_len(1024 * 1024 * 1024).is_err());

        Ok(())
    }

    #[test]
    fn test_check_depth() {
        assert_eq!(check_depth(0), Ok(()));
        assert_eq!(check_depth(DEFAULT_MAX_NESTING_DEPTH), Ok(()));
        assert_eq!(
            check_depth(DEFAULT_MAX_NESTING_DEPTH + 1),
            Err(DEFAULT_MAX_NESTING_DEPTH)
        );
    }
}
