//! Payload compression
//!
//! Compression always runs before encryption. Current files use zstd; zlib is
//! only ever read, for version 1 files.

use std::io::Read;

use quill_core::{QuillError, QuillResult};
use zeroize::Zeroizing;

/// Default zstd level for new files
pub const DEFAULT_LEVEL: i32 = 3;

/// Upper bound on decompressed payload size (256 MiB)
pub const MAX_DECOMPRESSED: u64 = 256 * 1024 * 1024;

/// zstd compressor for the current format
#[derive(Debug, Clone, Copy)]
pub struct Compressor {
    level: i32,
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(DEFAULT_LEVEL)
    }
}

impl Compressor {
    pub fn new(level: i32) -> Self {
        Self { level }
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn compress(&self, data: &[u8]) -> QuillResult<Zeroizing<Vec<u8>>> {
        let out = zstd::encode_all(data, self.level)?;
        Ok(Zeroizing::new(out))
    }

    /// Inverse of [`Compressor::compress`]. Runs after authentication, so any
    /// failure here is [`QuillError::PayloadCorrupt`].
    pub fn decompress(&self, data: &[u8]) -> QuillResult<Zeroizing<Vec<u8>>> {
        let decoder = zstd::stream::read::Decoder::new(data)
            .map_err(|e| corrupt("zstd", &e.to_string()))?;
        read_capped(decoder, "zstd")
    }
}

/// Inflate a zlib stream from a version 1 file.
pub fn decompress_zlib(data: &[u8]) -> QuillResult<Zeroizing<Vec<u8>>> {
    read_capped(flate2::read::ZlibDecoder::new(data), "zlib")
}

fn read_capped<R: Read>(reader: R, codec: &'static str) -> QuillResult<Zeroizing<Vec<u8>>> {
    let mut out = Zeroizing::new(Vec::new());
    reader
        .take(MAX_DECOMPRESSED + 1)
        .read_to_end(&mut out)
        .map_err(|e| corrupt(codec, &e.to_string()))?;
    if out.len() as u64 > MAX_DECOMPRESSED {
        return Err(corrupt(codec, "decompressed size exceeds limit"));
    }
    Ok(out)
}

fn corrupt(codec: &'static str, detail: &str) -> QuillError {
    tracing::error!(codec, detail, "authenticated payload failed to decompress");
    QuillError::PayloadCorrupt(format!("{codec}: {detail}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;

    #[test]
    fn test_roundtrip_text() {
        let c = Compressor::default();
        let data = "It began... ".repeat(500);
        let packed = c.compress(data.as_bytes()).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(c.decompress(&packed).unwrap().as_slice(), data.as_bytes());
    }

    #[test]
    fn test_empty_input() {
        let c = Compressor::new(1);
        let packed = c.compress(b"").unwrap();
        assert!(c.decompress(&packed).unwrap().is_empty());
    }

    #[test]
    fn test_garbage_is_payload_corrupt() {
        let err = Compressor::default()
            .decompress(b"definitely not zstd")
            .unwrap_err();
        assert!(matches!(err, QuillError::PayloadCorrupt(_)));

        let err = decompress_zlib(b"nor zlib").unwrap_err();
        assert!(matches!(err, QuillError::PayloadCorrupt(_)));
    }

    #[test]
    fn test_zlib_reads_legacy_stream() {
        let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(b"{\"title\": \"Dune\"}").unwrap();
        let packed = enc.finish().unwrap();
        assert_eq!(
            decompress_zlib(&packed).unwrap().as_slice(),
            b"{\"title\": \"Dune\"}"
        );
    }

    #[test]
    fn test_decompression_bomb_is_rejected() {
        // 300 MiB of zeros compresses to a few KiB
        let mut enc = zstd::stream::write::Encoder::new(Vec::new(), 19).unwrap();
        let block = vec![0u8; 1024 * 1024];
        for _ in 0..300 {
            enc.write_all(&block).unwrap();
        }
        let bomb = enc.finish().unwrap();

        let err = Compressor::default().decompress(&bomb).unwrap_err();
        assert!(matches!(err, QuillError::PayloadCorrupt(_)));
    }

    proptest! {
        #[test]
        fn compress_roundtrip(
            data in proptest::collection::vec(any::<u8>(), 0..=16384),
            level in 1i32..=9,
        ) {
            let c = Compressor::new(level);
            let packed = c.compress(&data).unwrap();
            let back = c.decompress(&packed).unwrap();
            prop_assert_eq!(back.as_slice(), data.as_slice());
        }
    }
}
