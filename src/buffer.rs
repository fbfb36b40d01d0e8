//! Output buffering used when the content length must be known before the
//! response headers are sent.
//!
//! Data is kept in memory up to a threshold and spills to an anonymous temporary
//! file beyond it. The file has no name on disk, so it goes away with the buffer.
use std::io;
use std::io::{
    Read,
    Seek,
    SeekFrom,
    Write,
};

use log::{
    debug,
    trace,
};
use tempfile::{
    spooled_tempfile,
    SpooledTempFile,
};

pub struct BufferingWriter {
    inner: SpooledTempFile,
    size: u64,
    max_memory_size: usize,
}

impl BufferingWriter {
    pub fn new(max_memory_size: usize) -> BufferingWriter {
        BufferingWriter {
            inner: spooled_tempfile(max_memory_size),
            size: 0,
            max_memory_size,
        }
    }

    /// Bytes written so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_complete_in_memory(&self) -> bool {
        !self.inner.is_rolled()
    }

    /// Finishes writing and rewinds for reading back.
    pub fn into_reader(mut self) -> io::Result<BufferedContent> {
        self.inner.flush()?;
        self.inner.seek(SeekFrom::Start(0))?;
        debug!("buffered {} bytes, in memory {}", self.size, self.is_complete_in_memory());
        Ok(BufferedContent {
            inner: self.inner,
            size: self.size,
        })
    }
}

impl Write for BufferingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let rolled = self.inner.is_rolled();
        let c = self.inner.write(buf)?;
        self.size += c as u64;
        if !rolled && self.inner.is_rolled() {
            trace!("buffer exceeded {} bytes, spilled to temporary file", self.max_memory_size);
        }
        Ok(c)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Content read back from a [BufferingWriter], with its now known length.
pub struct BufferedContent {
    inner: SpooledTempFile,
    size: u64,
}

impl BufferedContent {
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Read for BufferedContent {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}
