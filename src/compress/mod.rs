//! # Compression Filter
//!
//! The container encoder never talks to a codec directly. It writes into a
//! [`CompressWriter`] and reads from a boxed [`Read`] produced here, so the
//! tar framing in [`crate::archive`] and [`crate::extract`] stays the same
//! whichever filter wraps the byte stream.
//!
//! Packages are xz (LZMA2) compressed. `Store` produces a bare tar and exists
//! for inspection and debugging; readers sniff the xz magic and accept both.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

use crate::error::{ApgError, Result};

/// Magic bytes at the start of every xz stream.
pub const XZ_MAGIC: &[u8; 6] = b"\xFD7zXZ\x00";

/// Default LZMA2 preset, matching the `xz` command line tool.
pub const DEFAULT_PRESET: u32 = 6;

/// Defines the available compression algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionAlgo {
    /// Use the LZMA2 algorithm (xz container) with a given preset (0-9).
    Lzma2 { preset: u32 },
    /// Plain storage without any compression.
    Store,
}

impl Default for CompressionAlgo {
    fn default() -> Self {
        CompressionAlgo::Lzma2 {
            preset: DEFAULT_PRESET,
        }
    }
}

/// A byte sink that must be explicitly finished to produce a complete stream.
pub trait CompressWriter: Write {
    /// Flushes the codec trailer and the underlying writer.
    fn finish(self: Box<Self>) -> io::Result<()>;
}

impl<W: Write> CompressWriter for XzEncoder<W> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        let mut inner = (*self).finish()?;
        inner.flush()
    }
}

/// Pass-through writer used by `Store`.
struct StoreWriter<W: Write>(W);

impl<W: Write> Write for StoreWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<W: Write> CompressWriter for StoreWriter<W> {
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.0.flush()
    }
}

impl CompressionAlgo {
    /// Validates the preset range.
    pub fn lzma2(preset: u32) -> Result<Self> {
        if preset > 9 {
            return Err(ApgError::InvalidInput(format!(
                "LZMA2 preset must be 0-9, got {preset}"
            )));
        }
        Ok(CompressionAlgo::Lzma2 { preset })
    }

    /// Wraps `writer` in this algorithm's encoder.
    ///
    /// Presets above 9 are clamped to 9.
    pub fn encoder<'a, W: Write + 'a>(self, writer: W) -> Box<dyn CompressWriter + 'a> {
        match self {
            CompressionAlgo::Lzma2 { preset } => Box::new(XzEncoder::new(writer, preset.min(9))),
            CompressionAlgo::Store => Box::new(StoreWriter(writer)),
        }
    }

    /// Sniffs the leading bytes of `reader` without consuming them.
    pub fn detect<R: BufRead>(reader: &mut R) -> io::Result<Self> {
        let head = reader.fill_buf()?;
        if head.starts_with(XZ_MAGIC) {
            Ok(CompressionAlgo::default())
        } else {
            Ok(CompressionAlgo::Store)
        }
    }

    /// Wraps `reader` in this algorithm's decoder.
    pub fn decoder<'a, R: BufRead + 'a>(self, reader: R) -> Box<dyn Read + 'a> {
        match self {
            CompressionAlgo::Lzma2 { .. } => Box::new(XzDecoder::new(reader)),
            CompressionAlgo::Store => Box::new(reader),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CompressionAlgo::Lzma2 { .. } => "xz",
            CompressionAlgo::Store => "store",
        }
    }
}

/// Creates `path` and returns a buffered encoder writing into it.
pub fn create_compressed(path: &Path, algo: CompressionAlgo) -> Result<Box<dyn CompressWriter>> {
    let file = File::create(path).map_err(ApgError::at(path))?;
    let writer = BufWriter::with_capacity(1 << 20, file);
    Ok(algo.encoder(writer))
}

/// Opens `path`, detects its compression and returns the decoded byte stream.
pub fn open_decompressed(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path).map_err(ApgError::at(path))?;
    let mut reader = BufReader::with_capacity(1 << 20, file);
    let algo = CompressionAlgo::detect(&mut reader).map_err(ApgError::at(path))?;
    tracing::debug!(path = %path.display(), codec = algo.name(), "opened container");
    Ok(algo.decoder(reader))
}
