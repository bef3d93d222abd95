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

//! Block compression codecs of the object container format.

use crate::{AvroResult, error::Details, types::Value};
use log::debug;
use std::{collections::HashMap, fmt, io, sync::Arc};
use strum::IntoEnumIterator;
use strum_macros::{EnumIter, EnumString, IntoStaticStr};

/// Settings for the `Deflate` codec.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct DeflateSettings {
    compression_level: miniz_oxide::deflate::CompressionLevel,
}

impl DeflateSettings {
    pub fn new(compression_level: miniz_oxide::deflate::CompressionLevel) -> Self {
        DeflateSettings { compression_level }
    }

    fn compression_level(&self) -> u8 {
        self.compression_level as u8
    }
}

impl Default for DeflateSettings {
    /// Default compression level is `miniz_oxide::deflate::CompressionLevel::DefaultCompression`.
    fn default() -> Self {
        Self::new(miniz_oxide::deflate::CompressionLevel::DefaultCompression)
    }
}

/// The compression codec used to compress blocks.
#[derive(Clone, Copy, Debug, Eq, PartialEq, EnumIter, EnumString, IntoStaticStr)]
#[strum(serialize_all = "kebab_case")]
pub enum Codec {
    /// The `Null` codec simply passes through data uncompressed.
    Null,
    /// The `Deflate` codec writes the data block using the deflate algorithm
    /// as specified in RFC 1951. Unlike the "zlib format" of RFC 1950 there
    /// is no checksum.
    Deflate(DeflateSettings),
    #[cfg(feature = "snappy")]
    /// The `Snappy` codec uses Google's [Snappy](http://google.github.io/snappy/)
    /// compression library. Each compressed block is followed by the 4-byte, big-endian
    /// CRC32 checksum of the uncompressed data in the block.
    Snappy,
    #[cfg(feature = "zstandard")]
    /// The `Zstandard` codec uses Facebook's [Zstandard](https://facebook.github.io/zstd/)
    Zstandard(zstandard::ZstandardSettings),
    #[cfg(feature = "bzip")]
    /// The `BZip2` codec uses [BZip2](https://sourceware.org/bzip2/)
    /// compression library.
    Bzip2(bzip::Bzip2Settings),
    #[cfg(feature = "xz")]
    /// The `Xz` codec uses [Xz utils](https://tukaani.org/xz/)
    /// compression library.
    Xz(xz::XzSettings),
}

impl From<Codec> for Value {
    fn from(value: Codec) -> Self {
        Self::Bytes(<&str>::from(value).as_bytes().to_vec())
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(any(
    feature = "snappy",
    feature = "zstandard",
    feature = "bzip",
    feature = "xz"
))]
fn compress_error(codec: Codec, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Details {
    Details::Compress {
        codec: codec.to_string(),
        source: source.into(),
    }
}

fn decompress_error(
    codec: Codec,
    source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> Details {
    Details::Decompress {
        codec: codec.to_string(),
        source: source.into(),
    }
}

impl Codec {
    /// The name recorded under `avro.codec` in a container header.
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Compress a stream of bytes in-place.
    pub fn compress(self, stream: &mut Vec<u8>) -> AvroResult<()> {
        match self {
            Codec::Null => (),
            Codec::Deflate(settings) => {
                let compressed =
                    miniz_oxide::deflate::compress_to_vec(stream, settings.compression_level());
                *stream = compressed;
            }
            #[cfg(feature = "snappy")]
            Codec::Snappy => {
                let mut encoded: Vec<u8> = vec![0; snap::raw::max_compress_len(stream.len())];
                let compressed_size = snap::raw::Encoder::new()
                    .compress(&stream[..], &mut encoded[..])
                    .map_err(|e| compress_error(self, e))?;

                let mut hasher = crc32fast::Hasher::new();
                hasher.update(&stream[..]);
                let checksum_as_bytes = hasher.finalize().to_be_bytes();
                encoded.truncate(compressed_size);
                encoded.extend_from_slice(&checksum_as_bytes);

                *stream = encoded;
            }
            #[cfg(feature = "zstandard")]
            Codec::Zstandard(settings) => {
                use std::io::Write;
                let mut encoder =
                    zstd::Encoder::new(Vec::new(), settings.compression_level as i32)
                        .map_err(|e| compress_error(self, e))?;
                encoder
                    .write_all(stream)
                    .map_err(|e| compress_error(self, e))?;
                *stream = encoder.finish().map_err(|e| compress_error(self, e))?;
            }
            #[cfg(feature = "bzip")]
            Codec::Bzip2(settings) => {
                use bzip2::read::BzEncoder;
                use std::io::Read;

                let mut encoder = BzEncoder::new(&stream[..], settings.compression());
                let mut buffer = Vec::new();
                encoder
                    .read_to_end(&mut buffer)
                    .map_err(|e| compress_error(self, e))?;
                *stream = buffer;
            }
            #[cfg(feature = "xz")]
            Codec::Xz(settings) => {
                use std::io::Read;
                use xz2::read::XzEncoder;

                let mut encoder = XzEncoder::new(&stream[..], settings.compression_level as u32);
                let mut buffer = Vec::new();
                encoder
                    .read_to_end(&mut buffer)
                    .map_err(|e| compress_error(self, e))?;
                *stream = buffer;
            }
        };

        Ok(())
    }

    /// Decompress a stream of bytes in-place.
    pub fn decompress(self, stream: &mut Vec<u8>) -> AvroResult<()> {
        *stream = match self {
            Codec::Null => return Ok(()),
            Codec::Deflate(_settings) => {
                miniz_oxide::inflate::decompress_to_vec(stream).map_err(|e| {
                    use miniz_oxide::inflate::TINFLStatus::*;
                    let err = match e.status {
                        FailedCannotMakeProgress | NeedsMoreInput => {
                            io::Error::from(io::ErrorKind::UnexpectedEof)
                        }
                        Adler32Mismatch | Failed => io::Error::from(io::ErrorKind::InvalidData),
                        // not reachable for `decompress_to_vec`
                        BadParam | Done | HasMoreOutput => {
                            io::Error::other(format!("inflate stopped with status {:?}", e.status))
                        }
                    };
                    decompress_error(self, err)
                })?
            }
            #[cfg(feature = "snappy")]
            Codec::Snappy => {
                let Some(split) = stream.len().checked_sub(4) else {
                    return Err(decompress_error(
                        self,
                        io::Error::from(io::ErrorKind::UnexpectedEof),
                    )
                    .into());
                };
                let (compressed, checksum) = stream.split_at(split);
                let decompressed_size =
                    snap::raw::decompress_len(compressed).map_err(|e| decompress_error(self, e))?;
                crate::util::safe_len(decompressed_size)
                    .map_err(|e| decompress_error(self, e))?;
                let mut decoded = vec![0; decompressed_size];
                snap::raw::Decoder::new()
                    .decompress(compressed, &mut decoded[..])
                    .map_err(|e| decompress_error(self, e))?;

                let mut last_four: [u8; 4] = [0; 4];
                last_four.copy_from_slice(checksum);
                let expected: u32 = u32::from_be_bytes(last_four);

                let mut hasher = crc32fast::Hasher::new();
                hasher.update(&decoded);
                let actual = hasher.finalize();

                if expected != actual {
                    return Err(Details::SnappyCrc32 { expected, actual }.into());
                }
                decoded
            }
            #[cfg(feature = "zstandard")]
            Codec::Zstandard(_settings) => {
                use std::io::BufReader;
                use zstd::zstd_safe;

                let mut decoded = Vec::new();
                let buffer_size = zstd_safe::DCtx::in_size();
                let buffer = BufReader::with_capacity(buffer_size, &stream[..]);
                let mut decoder =
                    zstd::Decoder::new(buffer).map_err(|e| decompress_error(self, e))?;
                io::copy(&mut decoder, &mut decoded).map_err(|e| decompress_error(self, e))?;
                decoded
            }
            #[cfg(feature = "bzip")]
            Codec::Bzip2(_) => {
                use bzip2::read::BzDecoder;
                use std::io::Read;

                let mut decoder = BzDecoder::new(&stream[..]);
                let mut decoded = Vec::new();
                decoder
                    .read_to_end(&mut decoded)
                    .map_err(|e| decompress_error(self, e))?;
                decoded
            }
            #[cfg(feature = "xz")]
            Codec::Xz(_) => {
                use std::io::Read;
                use xz2::read::XzDecoder;

                let mut decoder = XzDecoder::new(&stream[..]);
                let mut decoded: Vec<u8> = Vec::new();
                decoder
                    .read_to_end(&mut decoded)
                    .map_err(|e| decompress_error(self, e))?;
                decoded
            }
        };
        Ok(())
    }
}

/// Turns a compressed container block back into the bytes the writer encoded.
///
/// Implement this to read containers whose `avro.codec` is not built in, and
/// register it with a [`CodecRegistry`].
pub trait Decompressor: Send + Sync {
    fn decompress(&self, block: Vec<u8>) -> AvroResult<Vec<u8>>;
}

impl Decompressor for Codec {
    fn decompress(&self, mut block: Vec<u8>) -> AvroResult<Vec<u8>> {
        Codec::decompress(*self, &mut block)?;
        Ok(block)
    }
}

/// Decompressors by codec name.
///
/// The default registry knows every [`Codec`] compiled into the crate.
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: HashMap<String, Arc<dyn Decompressor>>,
}

impl CodecRegistry {
    /// A registry without any codec, not even `null`.
    pub fn empty() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// Add or replace the decompressor used for `name`.
    pub fn register(&mut self, name: impl Into<String>, decompressor: impl Decompressor + 'static) {
        let name = name.into();
        debug!("Registering decompressor for codec '{name}'");
        self.codecs.insert(name, Arc::new(decompressor));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.codecs.contains_key(name)
    }

    /// Look up the decompressor for `name`.
    pub fn get(&self, name: &str) -> AvroResult<Arc<dyn Decompressor>> {
        self.codecs
            .get(name)
            .cloned()
            .ok_or_else(|| Details::CodecNotSupported(name.to_string()).into())
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for codec in Codec::iter() {
            registry
                .codecs
                .insert(codec.name().to_string(), Arc::new(codec));
        }
        registry
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.codecs.keys().collect();
        names.sort();
        f.debug_struct("CodecRegistry").field("codecs", &names).finish()
    }
}

#[cfg(feature = "bzip")]
pub mod bzip {
    use bzip2::Compression;

    #[derive(Clone, Copy, Eq, PartialEq, Debug)]
    pub struct Bzip2Settings {
        pub compression_level: u8,
    }

    impl Bzip2Settings {
        pub fn new(compression_level: u8) -> Self {
            Self { compression_level }
        }

        pub(crate) fn compression(&self) -> Compression {
            Compression::new(self.compression_level as u32)
        }
    }

    impl Default for Bzip2Settings {
        fn default() -> Self {
            Bzip2Settings::new(Compression::best().level() as u8)
        }
    }
}

#[cfg(feature = "zstandard")]
pub mod zstandard {
    #[derive(Clone, Copy, Eq, PartialEq, Debug)]
    pub struct ZstandardSettings {
        pub compression_level: u8,
    }

    impl ZstandardSettings {
        pub fn new(compression_level: u8) -> Self {
            Self { compression_level }
        }
    }

    impl Default for ZstandardSettings {
        fn default() -> Self {
            Self::new(0)
        }
    }
}

#[cfg(feature = "xz")]
pub mod xz {
    #[derive(Clone, Copy, Eq, PartialEq, Debug)]
    pub struct XzSettings {
        pub compression_level: u8,
    }

    impl XzSettings {
        pub fn new(compression_level: u8) -> Self {
            Self { compression_level }
        }
    }

    impl Default for XzSettings {
        fn default() -> Self {
            XzSettings::new(9)
        }
    }
}
