//! Byte ranges, as requested by `Range` on GET and declared by `Content-Range` on PUT.
//!
//! Also carries the copy helpers resources use to honour a range when writing
//! their content.
use std::fmt;
use std::io;
use std::io::{
    Read,
    Write,
};
use std::str::FromStr;

use log::{
    debug,
    warn,
};

use crate::error::{
    Error,
    Result,
};

const UNIT_PREFIX: &str = "bytes=";
const COPY_BUFFER_SIZE: usize = 65535;

/// An inclusive byte range.
///
/// Either bound may be absent, as in the `Range` header forms:
///
/// * `500-999` has both bounds.
/// * `500-` has only a start and runs to the end of the content.
/// * `-500` has only a finish, which then holds the number of trailing bytes
///   requested (the last 500 bytes).
///
/// [Range::resolve] turns any form into a concrete range against a known length.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Range {
    start: Option<u64>,
    finish: Option<u64>,
}

impl Range {
    pub fn new(start: u64, finish: u64) -> Range {
        Range {
            start: Some(start),
            finish: Some(finish),
        }
    }

    /// From `start` to the end of the content.
    pub fn from_start(start: u64) -> Range {
        Range {
            start: Some(start),
            finish: None,
        }
    }

    /// The last `length` bytes of the content.
    pub fn suffix(length: u64) -> Range {
        Range {
            start: None,
            finish: Some(length),
        }
    }

    pub fn start(&self) -> Option<u64> {
        self.start
    }

    pub fn finish(&self) -> Option<u64> {
        self.finish
    }

    /// Number of bytes covered, if both bounds are known.
    pub fn length(&self) -> Option<u64> {
        match (self.start, self.finish) {
            (Some(s), Some(f)) => (f - s).checked_add(1),
            _ => None,
        }
    }

    /// Concrete bounds against a content of `total` bytes.
    ///
    /// A finish past the end is clamped to the last byte. Returns `None` when
    /// no byte of the content falls in the range.
    pub fn resolve(&self, total: u64) -> Option<Range> {
        if total == 0 {
            return None;
        }
        let last = total - 1;
        match (self.start, self.finish) {
            (Some(s), _) if s > last => None,
            (Some(s), Some(f)) => Some(Range::new(s, f.min(last))),
            (Some(s), None) => Some(Range::new(s, last)),
            (None, Some(0)) => None,
            (None, Some(n)) => Some(Range::new(total - n.min(total), last)),
            (None, None) => None,
        }
    }
}

impl fmt::Debug for Range {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "Range({})", self)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.start, self.finish) {
            (Some(s), Some(f)) => write!(fmt, "{}-{}", s, f),
            (Some(s), None) => write!(fmt, "{}-", s),
            (None, Some(n)) => write!(fmt, "-{}", n),
            (None, None) => fmt.write_str("-"),
        }
    }
}

fn parse_position(s: &str, segment: &str) -> Result<u64> {
    match u64::from_str(s.trim()) {
        Ok(v) => Ok(v),
        Err(e) => {
            warn!("invalid range position {:?} in {:?}: {}", s, segment, e);
            Err(Error::BadRange(segment.to_string()))
        },
    }
}

impl FromStr for Range {
    type Err = Error;

    /// Parses one `byte-range-spec` of a `Range` header, without the unit.
    fn from_str(s: &str) -> Result<Range> {
        let segment = s.trim();
        let (left, right) = match segment.split_once('-') {
            Some(v) => v,
            None => {
                warn!("range segment has no dash: {:?}", segment);
                return Err(Error::BadRange(segment.to_string()));
            },
        };
        let left = left.trim();
        let right = right.trim();

        if left.len() == 0 {
            if right.len() == 0 {
                return Err(Error::BadRange(segment.to_string()));
            }
            return Ok(Range::suffix(parse_position(right, segment)?));
        }

        let start = parse_position(left, segment)?;
        if right.len() == 0 {
            return Ok(Range::from_start(start));
        }
        let finish = parse_position(right, segment)?;
        if start > finish {
            warn!("range start {} is after finish {}", start, finish);
            return Err(Error::BadRange(segment.to_string()));
        }
        Ok(Range::new(start, finish))
    }
}

/// Parses a `Range` request header.
///
/// Returns `Ok(None)` when there is no header, or when its unit is not `bytes`,
/// in which case the caller serves the full content. Ranges are returned in
/// the order the client listed them, neither sorted nor merged.
pub fn parse_range_header(header: Option<&str>) -> Result<Option<Vec<Range>>> {
    let s = match header {
        Some(v) if v.trim().len() > 0 => v.trim(),
        _ => {
            return Ok(None);
        },
    };

    if !s.starts_with(UNIT_PREFIX) {
        warn!("unsupported range unit, serving full content: {}", s);
        return Ok(None);
    }

    let mut ranges: Vec<Range> = vec!();
    for segment in s[UNIT_PREFIX.len()..].split(',') {
        if segment.trim().len() == 0 {
            continue;
        }
        ranges.push(Range::from_str(segment)?);
    }

    if ranges.len() == 0 {
        return Err(Error::BadRange(s.to_string()));
    }
    debug!("parsed ranges {:?}", ranges);
    Ok(Some(ranges))
}

/// Parses a `Content-Range` header of a PUT, `bytes {start}-{finish}/{total|*}`.
///
/// The declared total is not used. Both bounds are required.
pub fn parse_content_range(header: Option<&str>) -> Result<Option<Range>> {
    let s = match header {
        Some(v) => v.trim(),
        None => {
            return Ok(None);
        },
    };

    if !s.starts_with("bytes") {
        warn!("invalid content range, does not start with 'bytes': {}", s);
        return Err(Error::BadContentRange(s.to_string()));
    }
    let spec = s["bytes".len()..].trim_start_matches(|c: char| c == ' ' || c == '=').trim();

    let (bounds, _total) = match spec.split_once('/') {
        Some(v) => v,
        None => {
            warn!("invalid content range, slash not found: {}", s);
            return Err(Error::BadContentRange(s.to_string()));
        },
    };
    let (start, finish) = match bounds.split_once('-') {
        Some(v) => v,
        None => {
            warn!("invalid content range, dash not found: {}", s);
            return Err(Error::BadContentRange(s.to_string()));
        },
    };

    let start = match u64::from_str(start.trim()) {
        Ok(v) => v,
        Err(_) => {
            warn!("invalid content range, start is not a valid number: {}", s);
            return Err(Error::BadContentRange(s.to_string()));
        },
    };
    let finish = match u64::from_str(finish.trim()) {
        Ok(v) => v,
        Err(_) => {
            warn!("invalid content range, finish is not a valid number: {}", s);
            return Err(Error::BadContentRange(s.to_string()));
        },
    };
    if start > finish {
        warn!("invalid content range, start is greater than finish: {}", s);
        return Err(Error::BadContentRange(s.to_string()));
    }
    // finish + 1 must fit the resulting content length
    if finish == u64::MAX {
        warn!("invalid content range, finish is out of bounds: {}", s);
        return Err(Error::BadContentRange(s.to_string()));
    }
    Ok(Some(Range::new(start, finish)))
}

/// Formats a `Content-Range` response value, e.g. `bytes 0-200/5000`.
///
/// Without a finish the range runs to the last byte of `total`. An unknown total
/// is written as `*`, and so is the finish when neither is known.
pub fn to_range_string(start: u64, finish: Option<u64>, total: Option<u64>) -> String {
    let l = match total {
        Some(v) => v.to_string(),
        None => String::from("*"),
    };
    let f = match (finish, total) {
        (Some(v), _) => v.to_string(),
        (None, Some(v)) => v.saturating_sub(1).to_string(),
        (None, None) => String::from("*"),
    };
    format!("bytes {}-{}/{}", start, f, l)
}

/// Copies at most `length` bytes. Stops early if `f` runs out.
pub fn send_bytes(f: &mut dyn Read, out: &mut dyn Write, length: u64) -> io::Result<u64> {
    let mut buf: [u8; COPY_BUFFER_SIZE] = [0; COPY_BUFFER_SIZE];
    let mut total: u64 = 0;
    while total < length {
        let want = (length - total).min(COPY_BUFFER_SIZE as u64) as usize;
        let c = f.read(&mut buf[..want])?;
        if c == 0 {
            break;
        }
        out.write_all(&buf[..c])?;
        total += c as u64;
    }
    Ok(total)
}

fn skip(f: &mut dyn Read, count: u64) -> io::Result<()> {
    let skipped = io::copy(&mut f.take(count), &mut io::sink())?;
    if skipped < count {
        debug!("source ended after {} of {} skipped bytes", skipped, count);
    }
    Ok(())
}

/// Copies the bytes of `range` from a forward only source, or everything when
/// there is no range.
///
/// Suffix ranges must be resolved against the content length first.
pub fn write_range(f: &mut dyn Read, range: Option<&Range>, out: &mut dyn Write) -> io::Result<u64> {
    let r = match range {
        Some(v) => v,
        None => {
            return io::copy(f, out);
        },
    };
    let start = match r.start() {
        Some(v) => v,
        None => {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, format!("unresolved suffix range {}", r)));
        },
    };
    skip(f, start)?;
    match r.finish() {
        Some(finish) => send_bytes(f, out, finish - start + 1),
        None => io::copy(f, out),
    }
}

/// Copies several ascending, non overlapping concrete ranges back to back.
pub fn write_ranges(f: &mut dyn Read, ranges: &[Range], out: &mut dyn Write) -> io::Result<u64> {
    let mut pos: u64 = 0;
    let mut total: u64 = 0;
    for r in ranges.iter() {
        let (start, length) = match (r.start(), r.length()) {
            (Some(s), Some(l)) => (s, l),
            _ => {
                return Err(io::Error::new(io::ErrorKind::InvalidInput, format!("unable to write range {}, start or finish missing", r)));
            },
        };
        if start < pos {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, format!("range {} overlaps previous range", r)));
        }
        skip(f, start - pos)?;
        total += send_bytes(f, out, length)?;
        pos = start + length;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::str::FromStr;

    use super::{
        parse_content_range,
        parse_range_header,
        send_bytes,
        to_range_string,
        write_range,
        write_ranges,
        Range,
    };

    fn fixture(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_parse_two_ranges() {
        let r = parse_range_header(Some("bytes=0-499,500-999")).unwrap().unwrap();
        assert_eq!(r, vec!(Range::new(0, 499), Range::new(500, 999)));
    }

    #[test]
    fn test_parse_keeps_client_order() {
        let r = parse_range_header(Some("bytes=900-999, 0-99")).unwrap().unwrap();
        assert_eq!(r, vec!(Range::new(900, 999), Range::new(0, 99)));
    }

    #[test]
    fn test_parse_absent() {
        assert!(parse_range_header(None).unwrap().is_none());
        assert!(parse_range_header(Some("")).unwrap().is_none());
    }

    #[test]
    fn test_parse_suffix_and_open() {
        let r = parse_range_header(Some("bytes=-500")).unwrap().unwrap();
        assert_eq!(r, vec!(Range::suffix(500)));
        assert_eq!(r[0].resolve(1000), Some(Range::new(500, 999)));

        let r = parse_range_header(Some("bytes=500-")).unwrap().unwrap();
        assert_eq!(r, vec!(Range::from_start(500)));
        assert_eq!(r[0].resolve(1000), Some(Range::new(500, 999)));
    }

    #[test]
    fn test_parse_unsupported_unit() {
        assert!(parse_range_header(Some("items=0-5")).unwrap().is_none());
    }

    #[test]
    fn test_parse_malformed() {
        assert!(parse_range_header(Some("bytes=a-b")).is_err());
        assert!(parse_range_header(Some("bytes=10-5")).is_err());
        assert!(parse_range_header(Some("bytes=5")).is_err());
        assert!(parse_range_header(Some("bytes=-")).is_err());
        assert!(parse_range_header(Some("bytes=")).is_err());
    }

    #[test]
    fn test_resolve() {
        assert_eq!(Range::new(0, 5000).resolve(1000), Some(Range::new(0, 999)));
        assert_eq!(Range::new(1000, 1005).resolve(1000), None);
        assert_eq!(Range::suffix(5000).resolve(1000), Some(Range::new(0, 999)));
        assert_eq!(Range::suffix(0).resolve(1000), None);
        assert_eq!(Range::new(0, 0).resolve(0), None);
    }

    #[test]
    fn test_length() {
        assert_eq!(Range::new(0, 99).length(), Some(100));
        assert_eq!(Range::from_start(10).length(), None);
        assert_eq!(Range::suffix(10).length(), None);
        assert_eq!(Range::new(0, u64::MAX).length(), None);
    }

    #[test]
    fn test_display_round_trip() {
        for s in ["0-99", "100-", "-20"] {
            let r = Range::from_str(s).unwrap();
            assert_eq!(r.to_string(), s);
        }
    }

    #[test]
    fn test_content_range() {
        let r = parse_content_range(Some("bytes 1000-1099/*")).unwrap().unwrap();
        assert_eq!(r, Range::new(1000, 1099));
        let r = parse_content_range(Some("bytes 0-9/100")).unwrap().unwrap();
        assert_eq!(r, Range::new(0, 9));
        assert!(parse_content_range(None).unwrap().is_none());
    }

    #[test]
    fn test_content_range_malformed() {
        assert!(parse_content_range(Some("items 0-9/10")).is_err());
        assert!(parse_content_range(Some("bytes 0-9")).is_err());
        assert!(parse_content_range(Some("bytes 09/10")).is_err());
        assert!(parse_content_range(Some("bytes x-9/10")).is_err());
        assert!(parse_content_range(Some("bytes 9-0/10")).is_err());
        assert!(parse_content_range(Some("bytes 0-18446744073709551615/*")).is_err());
    }

    #[test]
    fn test_range_string() {
        assert_eq!(to_range_string(0, Some(200), Some(5000)), "bytes 0-200/5000");
        assert_eq!(to_range_string(100, None, Some(5000)), "bytes 100-4999/5000");
        assert_eq!(to_range_string(0, Some(9), None), "bytes 0-9/*");
        assert_eq!(to_range_string(990, None, None), "bytes 990-*/*");
    }

    #[test]
    fn test_send_bytes() {
        let data = fixture(10000);
        let mut f = Cursor::new(&data);
        let mut out: Vec<u8> = vec!();
        assert_eq!(send_bytes(&mut f, &mut out, 5000).unwrap(), 5000);
        assert_eq!(out, &data[..5000]);
    }

    #[test]
    fn test_write_range() {
        let data = fixture(1000);
        let mut out: Vec<u8> = vec!();
        write_range(&mut Cursor::new(&data), Some(&Range::new(100, 199)), &mut out).unwrap();
        assert_eq!(out, &data[100..200]);

        let mut out: Vec<u8> = vec!();
        write_range(&mut Cursor::new(&data), Some(&Range::from_start(900)), &mut out).unwrap();
        assert_eq!(out, &data[900..]);

        let mut out: Vec<u8> = vec!();
        write_range(&mut Cursor::new(&data), None, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_write_range_beyond_end() {
        let data = fixture(1000);
        let mut out: Vec<u8> = vec!();
        write_range(&mut Cursor::new(&data), Some(&Range::new(500, 5000)), &mut out).unwrap();
        assert_eq!(out.len(), 500);
    }

    #[test]
    fn test_write_range_unresolved_suffix() {
        let data = fixture(10);
        let mut out: Vec<u8> = vec!();
        assert!(write_range(&mut Cursor::new(&data), Some(&Range::suffix(2)), &mut out).is_err());
    }

    #[test]
    fn test_write_ranges() {
        let data = fixture(10000);
        let ranges = vec!(Range::new(501, 1000), Range::new(2001, 2500), Range::new(3001, 3500));
        let mut out: Vec<u8> = vec!();
        let c = write_ranges(&mut Cursor::new(&data), &ranges, &mut out).unwrap();
        assert_eq!(c, 1500);
        assert_eq!(&out[..500], &data[501..1001]);
        assert_eq!(&out[500..1000], &data[2001..2501]);
        assert_eq!(&out[1000..], &data[3001..3501]);
    }

    #[test]
    fn test_write_ranges_descending() {
        let data = fixture(100);
        let ranges = vec!(Range::new(50, 60), Range::new(0, 10));
        let mut out: Vec<u8> = vec!();
        assert!(write_ranges(&mut Cursor::new(&data), &ranges, &mut out).is_err());
    }
}
