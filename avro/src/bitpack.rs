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

//! Word-at-a-time varint primitives.
//!
//! [`count_pack_bits_u32`]/[`count_pack_bits_u64`] find how many bytes of a
//! little-endian word make up the leading varint, and
//! [`pack_7_8_u32`]/[`pack_7_8_u64`] strip the continuation bits of those bytes
//! and compact the 7-bit groups into one integer.
//!
//! Two backends compute identical results: [`Bmi2`] uses the x86-64 `PEXT`
//! instruction and [`Portable`] uses trailing-zero counts plus shifts and
//! masks. The backend is chosen once per process, on first use or through
//! [`select_backend`], and every call after that goes through it.

use log::debug;
use std::{fmt, sync::OnceLock};

const MSB_32: u32 = 0x8080_8080;
const MSB_64: u64 = 0x8080_8080_8080_8080;
const PAYLOAD_32: u32 = 0x7f7f_7f7f;
const PAYLOAD_64: u64 = 0x7f7f_7f7f_7f7f_7f7f;

/// The bit-packing implementation in use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Backend {
    Portable,
    Bmi2,
}

/// Requested backend for [`select_backend`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Preference {
    /// Use `PEXT` when the CPU supports it.
    #[default]
    Auto,
    /// Always use the shift and mask implementation.
    Portable,
}

/// Varint bit-packing over 4- and 8-byte little-endian words.
///
/// `count_pack_bits_*` returns the 1-based index of the first byte whose top
/// bit is clear. When every byte has its top bit set the result is the word
/// width plus the word's most significant bit, so any result greater than the
/// width means the varint continues past the word.
///
/// `pack_7_8_*` keeps the low 7 bits of the first `n` bytes and packs them
/// together, least significant group first.
pub trait BitPacker: fmt::Debug + Send + Sync {
    fn backend(&self) -> Backend;

    fn count_pack_bits_u32(&self, word: u32) -> u32;

    fn count_pack_bits_u64(&self, word: u64) -> u32;

    fn pack_7_8_u32(&self, word: u32, n: u32) -> u32;

    fn pack_7_8_u64(&self, word: u64, n: u32) -> u64;
}

#[inline]
fn low_bytes_u32(n: u32) -> u32 {
    if n >= 4 { u32::MAX } else { (1u32 << (8 * n)) - 1 }
}

#[inline]
fn low_bytes_u64(n: u32) -> u64 {
    if n >= 8 { u64::MAX } else { (1u64 << (8 * n)) - 1 }
}

/// Shift and mask implementation, available on every target.
#[derive(Clone, Copy, Debug, Default)]
pub struct Portable;

impl BitPacker for Portable {
    fn backend(&self) -> Backend {
        Backend::Portable
    }

    #[inline]
    fn count_pack_bits_u32(&self, word: u32) -> u32 {
        let gap = (((!word & MSB_32) | 0x8000_0000).trailing_zeros() + 1) / 8;
        gap + if gap == 4 { word >> 31 } else { 0 }
    }

    #[inline]
    fn count_pack_bits_u64(&self, word: u64) -> u32 {
        let gap = (((!word & MSB_64) | (1 << 63)).trailing_zeros() + 1) / 8;
        gap + if gap == 8 { (word >> 63) as u32 } else { 0 }
    }

    #[inline]
    fn pack_7_8_u32(&self, word: u32, n: u32) -> u32 {
        let word = word & PAYLOAD_32 & low_bytes_u32(n);
        (word & 0x7f) | ((word >> 1) & 0x3f80) | ((word >> 2) & 0x1f_c000) | ((word >> 3) & 0xfe0_0000)
    }

    #[inline]
    fn pack_7_8_u64(&self, word: u64, n: u32) -> u64 {
        let word = word & PAYLOAD_64 & low_bytes_u64(n);
        (0..8).fold(0, |packed, i| packed | ((word >> i) & (0x7f << (7 * i))))
    }
}

/// `PEXT` implementation. Only obtainable through [`Bmi2::detect`], so holding
/// one proves the running CPU supports BMI2.
#[derive(Clone, Copy, Debug)]
pub struct Bmi2 {
    _detected: (),
}

impl Bmi2 {
    /// Probe the CPU, returning the backend when BMI2 is available.
    pub fn detect() -> Option<Self> {
        #[cfg(target_arch = "x86_64")]
        {
            if std::arch::is_x86_feature_detected!("bmi2") {
                return Some(Self { _detected: () });
            }
        }
        None
    }
}

#[cfg(target_arch = "x86_64")]
mod pext {
    use std::arch::x86_64::{_pext_u32, _pext_u64};

    /// # Safety
    /// The CPU must support BMI2.
    #[inline]
    #[target_feature(enable = "bmi2")]
    pub(super) unsafe fn pext32(word: u32, mask: u32) -> u32 {
        _pext_u32(word, mask)
    }

    /// # Safety
    /// The CPU must support BMI2.
    #[inline]
    #[target_feature(enable = "bmi2")]
    pub(super) unsafe fn pext64(word: u64, mask: u64) -> u64 {
        _pext_u64(word, mask)
    }
}

#[cfg(target_arch = "x86_64")]
impl BitPacker for Bmi2 {
    fn backend(&self) -> Backend {
        Backend::Bmi2
    }

    #[inline]
    fn count_pack_bits_u32(&self, word: u32) -> u32 {
        // SAFETY: `Bmi2` is only constructed after detecting BMI2 support.
        let stops = unsafe { pext::pext32(word, MSB_32) };
        (!stops).trailing_zeros() + 1
    }

    #[inline]
    fn count_pack_bits_u64(&self, word: u64) -> u32 {
        // SAFETY: `Bmi2` is only constructed after detecting BMI2 support.
        let stops = unsafe { pext::pext64(word, MSB_64) };
        (!stops).trailing_zeros() + 1
    }

    #[inline]
    fn pack_7_8_u32(&self, word: u32, n: u32) -> u32 {
        // SAFETY: `Bmi2` is only constructed after detecting BMI2 support.
        unsafe { pext::pext32(word, PAYLOAD_32 & low_bytes_u32(n)) }
    }

    #[inline]
    fn pack_7_8_u64(&self, word: u64, n: u32) -> u64 {
        // SAFETY: `Bmi2` is only constructed after detecting BMI2 support.
        unsafe { pext::pext64(word, PAYLOAD_64 & low_bytes_u64(n)) }
    }
}

// Never detected off x86-64, so these are unreachable there; delegating keeps
// the trait object well formed on every target.
#[cfg(not(target_arch = "x86_64"))]
impl BitPacker for Bmi2 {
    fn backend(&self) -> Backend {
        Backend::Bmi2
    }

    fn count_pack_bits_u32(&self, word: u32) -> u32 {
        Portable.count_pack_bits_u32(word)
    }

    fn count_pack_bits_u64(&self, word: u64) -> u32 {
        Portable.count_pack_bits_u64(word)
    }

    fn pack_7_8_u32(&self, word: u32, n: u32) -> u32 {
        Portable.pack_7_8_u32(word, n)
    }

    fn pack_7_8_u64(&self, word: u64, n: u32) -> u64 {
        Portable.pack_7_8_u64(word, n)
    }
}

static SELECTED: OnceLock<Box<dyn BitPacker>> = OnceLock::new();

fn choose(preference: Preference) -> Box<dyn BitPacker> {
    let packer: Box<dyn BitPacker> = match (preference, Bmi2::detect()) {
        (Preference::Auto, Some(bmi2)) => Box::new(bmi2),
        _ => Box::new(Portable),
    };
    debug!(
        "Using the {} bit-packing backend (requested: {preference:?})",
        packer.backend()
    );
    packer
}

/// Fix the process-wide backend.
///
/// Only the first call, or the first bit-packing operation if that comes
/// earlier, decides; later calls return the backend already in use.
pub fn select_backend(preference: Preference) -> Backend {
    SELECTED.get_or_init(|| choose(preference)).backend()
}

/// The process-wide backend, selected automatically on first use.
#[inline]
pub fn packer() -> &'static dyn BitPacker {
    SELECTED.get_or_init(|| choose(Preference::Auto)).as_ref()
}

#[inline]
pub fn count_pack_bits_u32(word: u32) -> u32 {
    packer().count_pack_bits_u32(word)
}

#[inline]
pub fn count_pack_bits_u64(word: u64) -> u32 {
    packer().count_pack_bits_u64(word)
}

#[inline]
pub fn pack_7_8_u32(word: u32, n: u32) -> u32 {
    packer().pack_7_8_u32(word, n)
}

#[inline]
pub fn pack_7_8_u64(word: u64, n: u32) -> u64 {
    packer().pack_7_8_u64(word, n)
}
