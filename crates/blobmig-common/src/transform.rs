//! Record transform pipeline
//!
//! Turns a stored content blob into its normalized JSON document:
//! decompress → UTF-8 decode → JSON parse → normalize. Each stage fails with
//! its own error kind so a caller can report exactly what was wrong with a
//! record. Nothing here touches a store.

use crate::codec::Codec;
use crate::error::{BlobmigError, Result};
use crate::normalize::Normalizer;
use serde_json::Value;

/// Decoding pipeline for one codec and normalization ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pipeline {
    codec: Codec,
    normalizer: Normalizer,
}

impl Pipeline {
    pub fn new(codec: Codec) -> Self {
        Self {
            codec,
            normalizer: Normalizer::default(),
        }
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Decode a blob into its normalized JSON value
    pub fn transform(&self, blob: &[u8]) -> Result<Value> {
        let decompressed = self.codec.decompress(blob)?;
        let text = String::from_utf8(decompressed)?;
        let parsed: Value = serde_json::from_str(&text).map_err(BlobmigError::Parse)?;
        self.normalizer.normalize(&parsed)
    }

    /// Decode a blob and serialize the result compactly (for `parsed_content`)
    pub fn render(&self, blob: &[u8]) -> Result<String> {
        let value = self.transform(blob)?;
        Ok(serde_json::to_string(&value)?)
    }

    /// Decode a blob and serialize the result with two-space indentation
    pub fn render_pretty(&self, blob: &[u8]) -> Result<String> {
        let value = self.transform(blob)?;
        Ok(serde_json::to_string_pretty(&value)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lz4(text: &[u8]) -> Vec<u8> {
        Codec::Lz4Block.compress(text).unwrap()
    }

    #[test]
    fn test_transform_normalizes() {
        let blob = lz4(br#"{"a": "[1,2,3]", "b": 5}"#);
        let value = Pipeline::new(Codec::Lz4Block).transform(&blob).unwrap();
        assert_eq!(value, json!({"a": [1, 2, 3], "b": 5}));
    }

    #[test]
    fn test_render_is_stable() {
        let blob = lz4(br#"{"z": "{\"y\": [1, null]}"}"#);
        let pipeline = Pipeline::new(Codec::Lz4Block);
        let first = pipeline.render(&blob).unwrap();
        assert_eq!(first, r#"{"z":{"y":[1,null]}}"#);
        assert_eq!(pipeline.render(&blob).unwrap(), first);
    }

    #[test]
    fn test_render_pretty() {
        let blob = lz4(br#"{"a": 1}"#);
        let text = Pipeline::new(Codec::Lz4Block).render_pretty(&blob).unwrap();
        assert_eq!(text, "{\n  \"a\": 1\n}");
    }

    #[test]
    fn test_decompress_error() {
        let err = Pipeline::new(Codec::Lz4Block)
            .transform(b"\x05\x00\x00\x00\xff\xff")
            .unwrap_err();
        assert_eq!(err.kind(), "decompress");
    }

    #[test]
    fn test_encoding_error() {
        let blob = lz4(&[0xff, 0xfe, 0x00]);
        let err = Pipeline::new(Codec::Lz4Block).transform(&blob).unwrap_err();
        assert!(matches!(err, BlobmigError::Encoding(_)));
    }

    #[test]
    fn test_parse_error() {
        let blob = lz4(b"{\"unterminated\": ");
        let err = Pipeline::new(Codec::Lz4Block).transform(&blob).unwrap_err();
        assert!(matches!(err, BlobmigError::Parse(_)));
    }

    #[test]
    fn test_depth_error() {
        let blob = lz4(b"[[[[[[1]]]]]]");
        let err = Pipeline::new(Codec::Lz4Block)
            .with_normalizer(Normalizer::with_max_depth(3))
            .transform(&blob)
            .unwrap_err();
        assert!(matches!(err, BlobmigError::NormalizationDepthExceeded { limit: 3 }));
    }

    #[test]
    fn test_gzip_pipeline() {
        let blob = Codec::Gzip.compress(br#"["{\"k\":true}"]"#).unwrap();
        let value = Pipeline::new(Codec::Gzip).transform(&blob).unwrap();
        assert_eq!(value, json!([{"k": true}]));
    }
}
