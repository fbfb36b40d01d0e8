//! `multipart/byteranges` encoding of several ranges over one forward only pass
//! of the content.
use std::io;
use std::io::Write;

use log::{
    debug,
    warn,
};
use uuid::Uuid;

use crate::range::{
    to_range_string,
    Range,
};

/// A boundary unique to one response.
pub fn new_boundary() -> String {
    Uuid::new_v4().to_string()
}

pub fn content_type_header(boundary: &str) -> String {
    format!("multipart/byteranges; boundary={}", boundary)
}

/// Filters the full content written through it down to the requested ranges,
/// opening a MIME part as the write cursor enters each range.
///
/// Ranges must be concrete (see [Range::resolve]). They are visited in the given
/// order; one that lies wholly behind the cursor, or begins behind it because it
/// overlaps its predecessor, is skipped. Call [MultipleRangeWriter::finish] after
/// the content has been written to emit the closing boundary.
pub struct MultipleRangeWriter<'a> {
    out: &'a mut dyn Write,
    ranges: Vec<Range>,
    boundary: String,
    content_type: Option<String>,
    total_length: Option<u64>,
    cursor: u64,
    current: usize,
    in_part: bool,
    parts: usize,
}

impl<'a> MultipleRangeWriter<'a> {
    pub fn new(out: &'a mut dyn Write, ranges: Vec<Range>, boundary: &str, content_type: Option<String>, total_length: Option<u64>) -> MultipleRangeWriter<'a> {
        MultipleRangeWriter {
            out,
            ranges,
            boundary: boundary.to_string(),
            content_type,
            total_length,
            cursor: 0,
            current: 0,
            in_part: false,
            parts: 0,
        }
    }

    fn bounds(&self, i: usize) -> (u64, u64) {
        let r = &self.ranges[i];
        (r.start().unwrap_or(0), r.finish().unwrap_or(u64::MAX))
    }

    fn open_part(&mut self, start: u64, finish: u64) -> io::Result<()> {
        let mut head = format!("--{}\r\n", self.boundary);
        if let Some(ct) = &self.content_type {
            head.push_str(&format!("Content-Type: {}\r\n", ct));
        }
        head.push_str(&format!("Content-Range: {}\r\n\r\n", to_range_string(start, Some(finish), self.total_length)));
        self.out.write_all(head.as_bytes())?;
        self.in_part = true;
        self.parts += 1;
        Ok(())
    }

    fn close_part(&mut self) -> io::Result<()> {
        self.out.write_all(b"\r\n")?;
        self.in_part = false;
        self.current += 1;
        Ok(())
    }

    /// Writes the closing boundary. Returns the number of parts sent.
    pub fn finish(mut self) -> io::Result<usize> {
        if self.in_part {
            warn!("content ended inside range {}, part is short", self.ranges[self.current]);
            self.out.write_all(b"\r\n")?;
        }
        let tail = format!("--{}--\r\n", self.boundary);
        self.out.write_all(tail.as_bytes())?;
        self.out.flush()?;
        debug!("sent {} of {} requested parts", self.parts, self.ranges.len());
        Ok(self.parts)
    }
}

impl<'a> Write for MultipleRangeWriter<'a> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut offset: usize = 0;
        while offset < buf.len() {
            if self.current >= self.ranges.len() {
                break;
            }
            let (start, finish) = self.bounds(self.current);
            let remaining = (buf.len() - offset) as u64;

            if !self.in_part {
                if start < self.cursor {
                    debug!("skipping range {} behind cursor {}", self.ranges[self.current], self.cursor);
                    self.current += 1;
                    continue;
                }
                if self.cursor < start {
                    let c = (start - self.cursor).min(remaining);
                    self.cursor += c;
                    offset += c as usize;
                    continue;
                }
                self.open_part(start, finish)?;
            }

            let c = (finish - self.cursor).saturating_add(1).min(remaining) as usize;
            self.out.write_all(&buf[offset..offset + c])?;
            self.cursor += c as u64;
            offset += c;
            if self.cursor > finish {
                self.close_part()?;
            }
        }
        self.cursor += (buf.len() - offset) as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}
