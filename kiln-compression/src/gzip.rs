//! Reusable gzip container writer
//!
//! [`ReusableGzip`] writes the gzip framing itself (RFC 1952 header, raw
//! deflate payload, CRC32 + ISIZE trailer) around a `flate2::Compress`
//! stream. The deflate state, checksum, counters and output buffer are all
//! owned by the instance and are restored by [`ReusableGzip::reset`], so a
//! worker can keep one compressor for its whole lifetime.

use crate::{CompressionError, Result};
use flate2::{Compress, Compression, Crc, FlushCompress, Status};
use tracing::trace;

/// Fixed member header: magic, deflate, no flags, zero mtime, XFL 2, unknown OS.
pub const GZIP_HEADER: [u8; 10] = [0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0xff];

/// Level used after every reset.
pub const DEFAULT_LEVEL: u32 = 1;

const MIN_LEVEL: u32 = 1;
const MAX_LEVEL: u32 = 9;

/// Output space reserved before each deflate call.
const CHUNK: usize = 8 * 1024;

/// Gzip writer that is reset and reused across requests.
pub struct ReusableGzip {
    deflate: Compress,
    crc: Crc,
    bytes_in: u64,
    header_written: bool,
    finished: bool,
    level: u32,
    output: Vec<u8>,
}

impl ReusableGzip {
    /// Create a compressor at the fast default level.
    pub fn new() -> Self {
        Self::with_capacity(CHUNK)
    }

    /// Create a compressor with a pre-sized output buffer.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            deflate: Compress::new(Compression::new(DEFAULT_LEVEL), false),
            crc: Crc::new(),
            bytes_in: 0,
            header_written: false,
            finished: false,
            level: DEFAULT_LEVEL,
            output: Vec::with_capacity(capacity),
        }
    }

    /// Restore every field to its initial state.
    ///
    /// The output buffer keeps its allocation; the level drops back to
    /// [`DEFAULT_LEVEL`].
    pub fn reset(&mut self) {
        if self.level == DEFAULT_LEVEL {
            self.deflate.reset();
        } else {
            self.deflate = Compress::new(Compression::new(DEFAULT_LEVEL), false);
            self.level = DEFAULT_LEVEL;
        }
        self.crc.reset();
        self.bytes_in = 0;
        self.header_written = false;
        self.finished = false;
        self.output.clear();
    }

    /// Change the compression level for the current cycle.
    ///
    /// Only valid before any body bytes were written.
    pub fn set_level(&mut self, level: u32) -> Result<()> {
        if !(MIN_LEVEL..=MAX_LEVEL).contains(&level) {
            return Err(CompressionError::InvalidLevel(level, MIN_LEVEL, MAX_LEVEL));
        }
        if self.bytes_in > 0 || self.finished {
            return Err(CompressionError::CompressionFailed(
                "level must be set before writing".to_string(),
            ));
        }
        if level != self.level {
            self.deflate = Compress::new(Compression::new(level), false);
            self.level = level;
        }
        Ok(())
    }

    /// Current compression level.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Uncompressed bytes written since the last reset.
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    /// Whether `finish()` has run since the last reset.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed body bytes into the stream.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.finished {
            return Err(CompressionError::AlreadyFinished);
        }
        self.write_header();

        let mut input = data;
        while !input.is_empty() {
            self.output.reserve(CHUNK);
            let before = self.deflate.total_in();
            self.deflate
                .compress_vec(input, &mut self.output, FlushCompress::None)?;
            let consumed = (self.deflate.total_in() - before) as usize;
            input = &input[consumed..];
        }

        self.crc.update(data);
        self.bytes_in += data.len() as u64;
        Ok(())
    }

    /// Flush the deflate stream and append the trailer.
    ///
    /// Writes the header first when nothing was written, so an empty body
    /// still yields a valid gzip member.
    pub fn finish(&mut self) -> Result<&[u8]> {
        if self.finished {
            return Ok(&self.output);
        }
        self.write_header();

        loop {
            self.output.reserve(CHUNK);
            match self
                .deflate
                .compress_vec(&[], &mut self.output, FlushCompress::Finish)?
            {
                Status::StreamEnd => break,
                Status::Ok | Status::BufError => continue,
            }
        }

        self.output.extend_from_slice(&self.crc.sum().to_le_bytes());
        // ISIZE is the input length modulo 2^32
        self.output
            .extend_from_slice(&(self.bytes_in as u32).to_le_bytes());
        self.finished = true;

        trace!(
            bytes_in = self.bytes_in,
            bytes_out = self.output.len(),
            level = self.level,
            "gzip member finished"
        );
        Ok(&self.output)
    }

    /// Reset, compress `data` as one member, and return an owned copy.
    ///
    /// The internal buffer keeps its capacity for the next call.
    pub fn compress(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        self.reset();
        self.write(data)?;
        self.finish()?;
        Ok(self.output.split_off(0))
    }

    fn write_header(&mut self) {
        if !self.header_written {
            self.output.extend_from_slice(&GZIP_HEADER);
            self.header_written = true;
        }
    }
}

impl Default for ReusableGzip {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReusableGzip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReusableGzip")
            .field("bytes_in", &self.bytes_in)
            .field("header_written", &self.header_written)
            .field("finished", &self.finished)
            .field("level", &self.level)
            .field("buffered", &self.output.len())
            .finish()
    }
}
