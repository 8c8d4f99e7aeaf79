//! Decompression of stored content blobs
//!
//! Records keep their JSON document compressed in a binary column. The codec
//! is chosen once per run; a blob that the codec cannot read fails with
//! [`BlobmigError::Decompress`] and leaves nothing behind.
//!
//! # Supported Formats
//!
//! - **LZ4 block** (`lz4-block`): raw LZ4 block preceded by the uncompressed
//!   size as a 4-byte little-endian integer. This is what the chart store
//!   writes and is the default.
//! - **Gzip** (`gzip`): using flate2

use crate::error::{BlobmigError, Result};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::io::Read;
use tracing::debug;

/// Upper bound accepted for the LZ4 size prefix.
///
/// A corrupt prefix would otherwise make the decoder allocate whatever the
/// first four bytes happen to say.
pub const MAX_DECOMPRESSED_SIZE: usize = 256 * 1024 * 1024;

/// Compression codec applied to the content column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Codec {
    /// LZ4 block format with a little-endian `u32` size prefix
    #[default]
    Lz4Block,
    /// Gzip stream
    Gzip,
}

impl Codec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::Lz4Block => "lz4-block",
            Codec::Gzip => "gzip",
        }
    }

    /// Decompress a content blob
    ///
    /// # Arguments
    /// * `data` - Compressed bytes as stored in the content column
    ///
    /// # Returns
    /// Decompressed bytes
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let decompressed = match self {
            Codec::Lz4Block => decompress_lz4_block(data)?,
            Codec::Gzip => decompress_gzip(data)?,
        };
        debug!(
            codec = self.as_str(),
            "Decompressed {} -> {} bytes",
            data.len(),
            decompressed.len()
        );
        Ok(decompressed)
    }

    /// Compress bytes into the layout [`Codec::decompress`] expects
    ///
    /// Used to build fixtures and by tooling that writes test stores.
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Codec::Lz4Block => Ok(lz4_flex::block::compress_prepend_size(data)),
            Codec::Gzip => {
                use flate2::write::GzEncoder;
                use flate2::Compression;
                use std::io::Write;

                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                Ok(encoder.finish()?)
            },
        }
    }
}

impl std::str::FromStr for Codec {
    type Err = BlobmigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lz4" | "lz4-block" | "lz4_block" => Ok(Codec::Lz4Block),
            "gzip" | "gz" => Ok(Codec::Gzip),
            _ => Err(BlobmigError::Config(format!("Unknown codec: {}", s))),
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn decompress_lz4_block(data: &[u8]) -> Result<Vec<u8>> {
    let Some(prefix) = data.get(..4) else {
        return Err(BlobmigError::decompress(
            Codec::Lz4Block.as_str(),
            format!("blob of {} bytes is shorter than the size prefix", data.len()),
        ));
    };
    let declared = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    if declared > MAX_DECOMPRESSED_SIZE {
        return Err(BlobmigError::decompress(
            Codec::Lz4Block.as_str(),
            format!(
                "declared size {} exceeds limit of {} bytes",
                declared, MAX_DECOMPRESSED_SIZE
            ),
        ));
    }

    lz4_flex::block::decompress_size_prepended(data)
        .map_err(|e| BlobmigError::decompress(Codec::Lz4Block.as_str(), e))
}

fn decompress_gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| BlobmigError::decompress(Codec::Gzip.as_str(), e))?;
    Ok(decompressed)
}
