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

use avro_binary::{
    Schema,
    bitpack::{self, BitPacker, Bmi2, Portable},
    from_avro_datum,
    types::Value,
    util::{zag_i32, zag_i64, zig_i32, zig_i64},
};
use proptest::prelude::*;

/// Byte-by-byte reference for `count_pack_bits`.
fn naive_count(bytes: &[u8]) -> u32 {
    match bytes.iter().position(|b| b & 0x80 == 0) {
        Some(i) => i as u32 + 1,
        None => bytes.len() as u32 + 1,
    }
}

/// Byte-by-byte reference for `pack_7_8`.
fn naive_pack(bytes: &[u8], n: u32) -> u64 {
    bytes
        .iter()
        .take(n as usize)
        .enumerate()
        .fold(0, |packed, (i, b)| packed | (u64::from(b & 0x7f) << (7 * i)))
}

fn backends() -> Vec<Box<dyn BitPacker>> {
    let mut backends: Vec<Box<dyn BitPacker>> = vec![Box::new(Portable)];
    if let Some(bmi2) = Bmi2::detect() {
        backends.push(Box::new(bmi2));
    }
    backends
}

/// Words whose bytes mostly have the continuation bit set, so every varint
/// length shows up.
fn varint_heavy_u64() -> impl Strategy<Value = u64> {
    (any::<u64>(), 0u32..=8).prop_map(|(word, stop)| {
        let word = (word & 0x7f7f_7f7f_7f7f_7f7f) | 0x8080_8080_8080_8080;
        if stop < 8 { word & !(0x80u64 << (8 * stop)) } else { word }
    })
}

proptest! {
    #[test]
    fn backends_agree_on_u64(word in prop_oneof![any::<u64>(), varint_heavy_u64()], n in 0u32..=8) {
        let bytes = word.to_le_bytes();
        for backend in backends() {
            prop_assert_eq!(backend.count_pack_bits_u64(word), naive_count(&bytes), "{}", backend.backend());
            prop_assert_eq!(backend.pack_7_8_u64(word, n), naive_pack(&bytes, n), "{}", backend.backend());
        }
    }

    #[test]
    fn backends_agree_on_u32(word in any::<u32>(), n in 0u32..=4) {
        let bytes = word.to_le_bytes();
        for backend in backends() {
            prop_assert_eq!(backend.count_pack_bits_u32(word), naive_count(&bytes), "{}", backend.backend());
            prop_assert_eq!(u64::from(backend.pack_7_8_u32(word, n)), naive_pack(&bytes, n), "{}", backend.backend());
        }
    }

    #[test]
    fn selected_backend_matches_reference(word in varint_heavy_u64()) {
        let bytes = word.to_le_bytes();
        let n = bitpack::count_pack_bits_u64(word);
        prop_assert_eq!(n, naive_count(&bytes));
        prop_assert_eq!(bitpack::pack_7_8_u64(word, n.min(8)), naive_pack(&bytes, n.min(8)));
    }

    #[test]
    fn long_varints_round_trip(n in any::<i64>(), prefix in prop::collection::vec(any::<u8>(), 0..4), suffix in prop::collection::vec(any::<u8>(), 0..12)) {
        let mut bytes = prefix.clone();
        let len = zig_i64(n, &mut bytes);
        bytes.extend_from_slice(&suffix);
        prop_assert_eq!(zag_i64(&bytes, prefix.len()), Ok((n, len)));
    }

    #[test]
    fn int_varints_round_trip(n in any::<i32>(), suffix in prop::collection::vec(any::<u8>(), 0..8)) {
        let mut bytes = Vec::new();
        let len = zig_i32(n, &mut bytes);
        bytes.extend_from_slice(&suffix);
        prop_assert_eq!(zag_i32(&bytes, 0), Ok((n, len)));
    }

    #[test]
    fn longs_decode_through_the_datum_decoder(n in any::<i64>()) {
        let schema = Schema::parse_str(r#""long""#).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let mut bytes = Vec::new();
        zig_i64(n, &mut bytes);
        prop_assert_eq!(from_avro_datum(&schema, &bytes).ok(), Some(Value::Int(n)));
    }
}

#[test]
fn extremes() {
    for n in [0, -1, 1, i64::MIN, i64::MAX, 63, 64, -64, -65] {
        let mut bytes = Vec::new();
        let len = zig_i64(n, &mut bytes);
        assert_eq!(zag_i64(&bytes, 0), Ok((n, len)));
    }
}
