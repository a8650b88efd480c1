//! Whole-file compression for row-text output
//!
//! Parquet compresses inside the file and does not use this module. CSV output
//! can be wrapped in a streaming encoder so the file is compressed as it is
//! written, without buffering the whole payload.
//!
//! # Supported Compression Algorithms
//!
//! | Algorithm | Extension | Use Case | Speed | Ratio |
//! |-----------|-----------|----------|-------|-------|
//! | Gzip | `.gz` | Universal compatibility | Medium | Good |
//! | Zstd | `.zst` | Modern systems, best balance | Fast | Excellent |
//! | Snappy | `.snappy` | Framed snappy stream | Very Fast | Moderate |
//! | LZ4 | `.lz4` | LZ4 frame format | Fastest | Moderate |

use flate2::write::GzEncoder;
use flate2::Compression as GzipLevel;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// Zstd level used for CSV output
const ZSTD_LEVEL: i32 = 3;

/// Output compression algorithm for row-text formats
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputCompression {
    /// No compression
    #[default]
    None,
    /// Gzip compression (.gz)
    Gzip,
    /// Zstandard compression (.zst)
    Zstd,
    /// Snappy frame format (.snappy)
    Snappy,
    /// LZ4 frame format (.lz4)
    Lz4,
}

impl OutputCompression {
    /// Get file extension suffix for this compression
    pub fn extension_suffix(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Gzip => ".gz",
            Self::Zstd => ".zst",
            Self::Snappy => ".snappy",
            Self::Lz4 => ".lz4",
        }
    }

    /// Wrap a writer in the streaming encoder for this algorithm
    pub fn wrap<W: Write>(&self, inner: W) -> io::Result<CompressedOutput<W>> {
        Ok(match self {
            Self::None => CompressedOutput::Plain(inner),
            Self::Gzip => CompressedOutput::Gzip(GzEncoder::new(inner, GzipLevel::default())),
            Self::Zstd => CompressedOutput::Zstd(zstd::stream::write::Encoder::new(
                inner, ZSTD_LEVEL,
            )?),
            Self::Snappy => CompressedOutput::Snappy(snap::write::FrameEncoder::new(inner)),
            Self::Lz4 => CompressedOutput::Lz4(lz4_flex::frame::FrameEncoder::new(inner)),
        })
    }
}

impl std::fmt::Display for OutputCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Gzip => write!(f, "gzip"),
            Self::Zstd => write!(f, "zstd"),
            Self::Snappy => write!(f, "snappy"),
            Self::Lz4 => write!(f, "lz4"),
        }
    }
}

/// A writer that compresses everything written through it.
///
/// [`CompressedOutput::finish`] must be called to write the stream trailer;
/// dropping the encoder may leave a truncated stream.
pub enum CompressedOutput<W: Write> {
    /// Uncompressed passthrough
    Plain(W),
    /// Gzip stream
    Gzip(GzEncoder<W>),
    /// Zstd stream
    Zstd(zstd::stream::write::Encoder<'static, W>),
    /// Snappy frame stream
    Snappy(snap::write::FrameEncoder<W>),
    /// LZ4 frame stream
    Lz4(lz4_flex::frame::FrameEncoder<W>),
}

impl<W: Write> CompressedOutput<W> {
    /// Write the stream trailer and return the inner writer
    pub fn finish(self) -> io::Result<W> {
        match self {
            Self::Plain(w) => Ok(w),
            Self::Gzip(enc) => enc.finish(),
            Self::Zstd(enc) => enc.finish(),
            Self::Snappy(enc) => enc
                .into_inner()
                .map_err(|e| io::Error::new(e.error().kind(), e.error().to_string())),
            Self::Lz4(enc) => enc.finish().map_err(io::Error::other),
        }
    }
}

impl<W: Write> Write for CompressedOutput<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(w) => w.write(buf),
            Self::Gzip(enc) => enc.write(buf),
            Self::Zstd(enc) => enc.write(buf),
            Self::Snappy(enc) => enc.write(buf),
            Self::Lz4(enc) => enc.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(w) => w.flush(),
            Self::Gzip(enc) => enc.flush(),
            Self::Zstd(enc) => enc.flush(),
            Self::Snappy(enc) => enc.flush(),
            Self::Lz4(enc) => enc.flush(),
        }
    }
}

/// Get the full extension including compression suffix
pub fn full_extension(base_extension: &str, compression: &OutputCompression) -> String {
    format!("{}{}", base_extension, compression.extension_suffix())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    const PAYLOAD: &[u8] = b"id,name\n1,alice\n2,bob\n3,carol\n";

    fn compress(compression: OutputCompression, data: &[u8]) -> Vec<u8> {
        let mut out = compression.wrap(Vec::new()).unwrap();
        // Split writes to exercise streaming
        for chunk in data.chunks(7) {
            out.write_all(chunk).unwrap();
        }
        out.finish().unwrap()
    }

    #[test]
    fn test_compression_extension_suffix() {
        assert_eq!(OutputCompression::None.extension_suffix(), "");
        assert_eq!(OutputCompression::Gzip.extension_suffix(), ".gz");
        assert_eq!(OutputCompression::Zstd.extension_suffix(), ".zst");
        assert_eq!(OutputCompression::Snappy.extension_suffix(), ".snappy");
        assert_eq!(OutputCompression::Lz4.extension_suffix(), ".lz4");
    }

    #[test]
    fn test_no_compression_passthrough() {
        assert_eq!(compress(OutputCompression::None, PAYLOAD), PAYLOAD);
    }

    #[test]
    fn test_gzip_stream_decodes() {
        let compressed = compress(OutputCompression::Gzip, PAYLOAD);
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);

        let mut decoder = flate2::read::GzDecoder::new(&compressed[..]);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed).unwrap();
        assert_eq!(decompressed, PAYLOAD);
    }

    #[test]
    fn test_zstd_stream_decodes() {
        let compressed = compress(OutputCompression::Zstd, PAYLOAD);
        let decompressed = zstd::stream::decode_all(&compressed[..]).unwrap();
        assert_eq!(decompressed, PAYLOAD);
    }

    #[test]
    fn test_snappy_stream_decodes() {
        let compressed = compress(OutputCompression::Snappy, PAYLOAD);
        let mut decompressed = Vec::new();
        snap::read::FrameDecoder::new(&compressed[..])
            .read_to_end(&mut decompressed)
            .unwrap();
        assert_eq!(decompressed, PAYLOAD);
    }

    #[test]
    fn test_lz4_stream_decodes() {
        let compressed = compress(OutputCompression::Lz4, PAYLOAD);
        let mut decompressed = Vec::new();
        lz4_flex::frame::FrameDecoder::new(&compressed[..])
            .read_to_end(&mut decompressed)
            .unwrap();
        assert_eq!(decompressed, PAYLOAD);
    }

    #[test]
    fn test_full_extension() {
        assert_eq!(full_extension(".csv", &OutputCompression::Gzip), ".csv.gz");
        assert_eq!(full_extension(".csv", &OutputCompression::None), ".csv");
    }
}
