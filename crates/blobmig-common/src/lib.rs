//! blobmig Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Record decoding, JSON normalization, shared types and logging for the
//! blobmig workspace.
//!
//! # Overview
//!
//! - **Codec**: decompression of stored content blobs (LZ4 block, gzip)
//! - **Normalization**: recursive re-parsing of JSON embedded in strings
//! - **Transform**: the decompress → decode → parse → normalize pipeline
//! - **Types**: record identifiers and rows shared by every store
//!
//! # Example
//!
//! ```no_run
//! use blobmig_common::codec::Codec;
//! use blobmig_common::transform::Pipeline;
//!
//! fn show(blob: &[u8]) -> blobmig_common::Result<()> {
//!     let pipeline = Pipeline::new(Codec::Lz4Block);
//!     let value = pipeline.transform(blob)?;
//!     println!("{}", serde_json::to_string_pretty(&value)?);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod error;
pub mod logging;
pub mod normalize;
pub mod transform;
pub mod types;

// Re-export commonly used types
pub use error::{BlobmigError, Result};
pub use types::{KeyType, Record, RecordId};
