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

use crate::{
    AvroResult, Error,
    error::DecodeError,
    util::{safe_len, zag_i32, zag_i64},
};

/// Read position over an in-memory datum. Failures report the offset of the
/// item being read.
pub(crate) struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn fail(&self, at: usize, reason: DecodeError) -> Error {
        Error::decode(at, reason)
    }

    pub(crate) fn read_long(&mut self) -> AvroResult<i64> {
        let (n, len) = zag_i64(self.data, self.pos).map_err(|r| self.fail(self.pos, r))?;
        self.pos += len;
        Ok(n)
    }

    pub(crate) fn read_int(&mut self) -> AvroResult<i32> {
        let (n, len) = zag_i32(self.data, self.pos).map_err(|r| self.fail(self.pos, r))?;
        self.pos += len;
        Ok(n)
    }

    pub(crate) fn read_bytes(&mut self, n: usize) -> AvroResult<&'a [u8]> {
        let available = self.remaining();
        if n > available {
            return Err(self.fail(
                self.pos,
                DecodeError::TruncatedInput {
                    needed: n,
                    available,
                },
            ));
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    pub(crate) fn read_array<const N: usize>(&mut self) -> AvroResult<[u8; N]> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.read_bytes(N)?);
        Ok(array)
    }

    /// A `long` length prefix, checked against the allocation limit.
    pub(crate) fn read_len(&mut self) -> AvroResult<usize> {
        let start = self.pos;
        let len = self.read_long()?;
        if len < 0 {
            return Err(self.fail(start, DecodeError::NegativeLength(len)));
        }
        let len = usize::try_from(len)
            .map_err(|_| self.fail(start, DecodeError::LengthOutOfBounds { len: len as u64 }))?;
        safe_len(len).map_err(|r| self.fail(start, r))
    }

    /// The item count opening an array or map block; zero ends the sequence.
    ///
    /// A negative count is followed by the byte size of the block. The size
    /// is checked but not used: the items are decoded one by one anyway.
    pub(crate) fn read_block_count(&mut self) -> AvroResult<usize> {
        let start = self.pos;
        let count = self.read_long()?;
        if count < 0 {
            let size_at = self.pos;
            let size = self.read_long()?;
            let available = self.remaining();
            if size < 0 {
                return Err(self.fail(
                    size_at,
                    DecodeError::BlockSizeOutOfBounds { size, available },
                ));
            }
            if size as u64 > available as u64 {
                return Err(self.fail(
                    size_at,
                    DecodeError::TruncatedInput {
                        needed: usize::try_from(size).unwrap_or(usize::MAX),
                        available,
                    },
                ));
            }
        }
        let count = count.unsigned_abs();
        usize::try_from(count)
            .map_err(|_| self.fail(start, DecodeError::LengthOutOfBounds { len: count }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Details;
    use pretty_assertions::assert_eq;

    fn reason(err: Error) -> DecodeError {
        match err.into_details() {
            Details::Decode { reason, .. } => reason,
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn lengths() -> anyhow::Result<()> {
        let mut cursor = Cursor::new(&[0x06, b'a', b'b', b'c'], 0);
        assert_eq!(cursor.read_len()?, 3);
        assert_eq!(cursor.read_bytes(3)?, b"abc");
        assert_eq!(cursor.remaining(), 0);

        let mut cursor = Cursor::new(&[0x01], 0);
        assert_eq!(
            reason(cursor.read_len().unwrap_err()),
            DecodeError::NegativeLength(-1)
        );
        Ok(())
    }

    #[test]
    fn block_count_with_size_hint() -> anyhow::Result<()> {
        // count -2, size 2, then two one-byte items
        let mut cursor = Cursor::new(&[0x03, 0x04, 0x02, 0x04], 0);
        assert_eq!(cursor.read_block_count()?, 2);
        assert_eq!(cursor.pos(), 2);

        let mut cursor = Cursor::new(&[0x03, 0x03, 0x02, 0x04], 0);
        assert_eq!(
            reason(cursor.read_block_count().unwrap_err()),
            DecodeError::BlockSizeOutOfBounds {
                size: -2,
                available: 2
            }
        );

        let mut cursor = Cursor::new(&[0x03, 0x0a, 0x02, 0x04], 0);
        assert_eq!(
            reason(cursor.read_block_count().unwrap_err()),
            DecodeError::TruncatedInput {
                needed: 5,
                available: 2
            }
        );
        Ok(())
    }

    #[test]
    fn fixed_width_reads_need_all_bytes() {
        let mut cursor = Cursor::new(&[0, 0, 0x80], 0);
        let err = cursor.read_array::<4>().unwrap_err();
        assert_eq!(err.offset(), Some(0));
        assert_eq!(
            reason(err),
            DecodeError::TruncatedInput {
                needed: 4,
                available: 3
            }
        );
    }
}
