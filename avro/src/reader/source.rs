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

use crate::{AvroResult, error::Details};
use std::io::{ErrorKind, Read};

const CHUNK_SIZE: usize = 8 * 1024;

/// Pull buffer over an `io::Read`.
///
/// Bytes are read in chunks and handed out as slices so that varints and
/// datums can be decoded in place. `offset` counts every byte consumed so
/// far, giving absolute positions for error reports.
#[derive(Debug)]
pub(super) struct Source<R> {
    reader: R,
    buf: Vec<u8>,
    pos: usize,
    consumed: u64,
    eof: bool,
}

impl<R: Read> Source<R> {
    pub(super) fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            pos: 0,
            consumed: 0,
            eof: false,
        }
    }

    /// Bytes read from the underlying reader but not consumed yet.
    pub(super) fn available(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    /// Absolute offset of the first available byte.
    pub(super) fn offset(&self) -> u64 {
        self.consumed
    }

    /// Absolute offset just past the last byte read.
    pub(super) fn end_offset(&self) -> u64 {
        self.consumed + self.available().len() as u64
    }

    pub(super) fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.available().len());
        self.pos += n;
        self.consumed += n as u64;
    }

    /// Read one more chunk. Returns the number of new bytes, zero at the end
    /// of the input.
    pub(super) fn fill_more(&mut self) -> AvroResult<usize> {
        if self.eof {
            return Ok(0);
        }
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        let len = self.buf.len();
        self.buf.resize(len + CHUNK_SIZE, 0);
        let read = loop {
            match self.reader.read(&mut self.buf[len..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.buf.truncate(len);
                    return Err(Details::ReadSource(e).into());
                }
            }
        };
        self.buf.truncate(len + read);
        if read == 0 {
            self.eof = true;
        }
        Ok(read)
    }

    /// Make sure at least `n` bytes are available. Returns `false` when the
    /// input ends first.
    pub(super) fn fill(&mut self, n: usize) -> AvroResult<bool> {
        while self.available().len() < n {
            if self.fill_more()? == 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// `true` once every byte of the input has been consumed.
    pub(super) fn is_exhausted(&mut self) -> AvroResult<bool> {
        Ok(!self.fill(1)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io;

    /// Hands out one byte per call and interrupts every other call.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        interrupt: bool,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.interrupt = !self.interrupt;
            if self.interrupt {
                return Err(io::Error::from(ErrorKind::Interrupted));
            }
            match (self.data.get(self.pos), buf.first_mut()) {
                (Some(byte), Some(slot)) => {
                    *slot = *byte;
                    self.pos += 1;
                    Ok(1)
                }
                _ => Ok(0),
            }
        }
    }

    #[test]
    fn fills_across_short_reads() -> anyhow::Result<()> {
        let mut source = Source::new(Trickle {
            data: b"abcdef".to_vec(),
            pos: 0,
            interrupt: false,
        });
        assert!(source.fill(4)?);
        assert_eq!(&source.available()[..4], b"abcd");
        source.consume(3);
        assert_eq!(source.offset(), 3);
        assert!(source.fill(3)?);
        assert_eq!(source.available(), b"def");
        assert!(!source.fill(4)?);
        source.consume(3);
        assert!(source.is_exhausted()?);
        assert_eq!(source.end_offset(), 6);
        Ok(())
    }

    #[test]
    fn read_failures_are_io_errors() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("disk on fire"))
            }
        }

        let err = Source::new(Broken).fill(1).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Io);
    }
}
