// File-side stream adapters: gzip wrapping and CSV record counting
use flate2::bufread::MultiGzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use crate::types::Compression;

/// Read buffer size used when feeding COPY FROM STDIN
pub const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Destination writer that optionally gzip-compresses everything written to it
pub enum CompressedWriter<W: Write> {
    Plain(W),
    Gzip(GzEncoder<W>),
}

impl<W: Write> CompressedWriter<W> {
    pub fn new(inner: W, compression: Compression) -> Self {
        match compression {
            Compression::None => CompressedWriter::Plain(inner),
            Compression::Gzip => {
                CompressedWriter::Gzip(GzEncoder::new(inner, flate2::Compression::default()))
            }
        }
    }

    /// Flush all pending data, write the gzip trailer if any, and return the inner writer
    pub fn finish(self) -> io::Result<W> {
        match self {
            CompressedWriter::Plain(mut inner) => {
                inner.flush()?;
                Ok(inner)
            }
            CompressedWriter::Gzip(encoder) => {
                let mut inner = encoder.finish()?;
                inner.flush()?;
                Ok(inner)
            }
        }
    }
}

impl<W: Write> Write for CompressedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            CompressedWriter::Plain(inner) => inner.write(buf),
            CompressedWriter::Gzip(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            CompressedWriter::Plain(inner) => inner.flush(),
            CompressedWriter::Gzip(encoder) => encoder.flush(),
        }
    }
}

/// Open a CSV source for streaming, decompressing lazily when gzip is selected
pub fn open_source(path: &Path, compression: Compression) -> io::Result<Box<dyn Read + Send>> {
    let reader = BufReader::with_capacity(COPY_CHUNK_SIZE, File::open(path)?);
    Ok(match compression {
        Compression::None => Box::new(reader),
        Compression::Gzip => Box::new(MultiGzDecoder::new(reader)),
    })
}

/// Writer that counts bytes and CSV records passing through it.
///
/// A record ends at a newline outside a quoted field. Doubled quote
/// characters toggle the quoted state twice, so they need no special case.
pub struct CountingWriter<W: Write> {
    inner: W,
    quote: u8,
    in_quotes: bool,
    bytes: u64,
    records: u64,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W, quote: u8) -> Self {
        Self {
            inner,
            quote,
            in_quotes: false,
            bytes: 0,
            records: 0,
        }
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Complete records seen so far, header included
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        for &byte in &buf[..written] {
            if byte == self.quote {
                self.in_quotes = !self.in_quotes;
            } else if byte == b'\n' && !self.in_quotes {
                self.records += 1;
            }
        }
        self.bytes += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reader that counts the bytes read through it
pub struct CountingReader<R: Read> {
    inner: R,
    bytes: u64,
}

impl<R: Read> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, bytes: 0 }
    }

    /// Bytes read so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bytes += n as u64;
        Ok(n)
    }
}

/// Count the fields of the first CSV record of `source`.
///
/// Returns `None` for an empty source.
pub fn first_record_width<R: Read>(source: R, delimiter: u8, quote: u8) -> Result<Option<usize>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .quote(quote)
        .flexible(true)
        .from_reader(source);

    let mut record = csv::ByteRecord::new();
    if reader.read_byte_record(&mut record)? {
        Ok(Some(record.len()))
    } else {
        Ok(None)
    }
}
