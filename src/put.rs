//! PUT handling, including partial updates declared with `Content-Range`.
use std::env;
use std::io;
use std::io::{
    BufReader,
    Read,
    Seek,
    SeekFrom,
};
use std::path::Path;
use std::sync::Arc;

use log::{
    debug,
    info,
    warn,
};

use crate::error::{
    Error,
    Result,
};
use crate::matching::MatchHelper;
use crate::range::{
    parse_content_range,
    Range,
};
use crate::request::RequestInfo;
use crate::resource::{
    Resource,
    ResourceFactory,
};
use crate::response::{
    Response,
    ResponseHandler,
};

pub struct PutHandler {
    match_helper: Arc<MatchHelper>,
    response_handler: Arc<ResponseHandler>,
}

impl PutHandler {
    pub fn new(match_helper: Arc<MatchHelper>, response_handler: Arc<ResponseHandler>) -> PutHandler {
        PutHandler {
            match_helper,
            response_handler,
        }
    }

    /// Replaces `existing`, or creates a new resource at `path` when there is none.
    ///
    /// Preconditions are checked before the body is read.
    pub fn process(&self, factory: &dyn ResourceFactory, path: &str, existing: Option<Box<dyn Resource>>, req: &RequestInfo, body: &mut dyn Read) -> Result<Response> {
        let resource = match existing {
            Some(v) => v,
            None => {
                return self.create(factory, path, req, body);
            },
        };
        let r = resource.as_ref();

        if !self.match_helper.check_if_match(Some(r), req.if_match.as_deref(), req.if_header.as_deref()) {
            warn!("if-match precondition failed for {}", r.name());
            return Ok(self.response_handler.respond_precondition_failed(Some(r)));
        }
        if self.match_helper.check_if_none_match(Some(r), req.if_none_match.as_deref()) {
            warn!("if-none-match precondition failed for {}", r.name());
            return Ok(self.response_handler.respond_precondition_failed(Some(r)));
        }

        match parse_content_range(req.content_range.as_deref())? {
            Some(range) => {
                debug!("partial put of {} to {}", range, r.name());
                apply_range(r, &range, body)?;
            },
            None => {
                let replaceable = match r.as_replaceable() {
                    Some(v) => v,
                    None => {
                        return Err(Error::NotReplaceable(r.name().to_string()));
                    },
                };
                replaceable.replace_content(body, req.content_length)?;
            },
        };
        info!("replaced content of {}", r.name());
        Ok(self.response_handler.respond_no_content(r))
    }

    fn create(&self, factory: &dyn ResourceFactory, path: &str, req: &RequestInfo, body: &mut dyn Read) -> Result<Response> {
        if !self.match_helper.check_if_match(None, req.if_match.as_deref(), req.if_header.as_deref()) {
            warn!("if-match given for {} which does not exist", path);
            return Ok(self.response_handler.respond_precondition_failed(None));
        }
        if self.match_helper.check_if_none_match(None, req.if_none_match.as_deref()) {
            return Ok(self.response_handler.respond_precondition_failed(None));
        }
        if let Some(v) = &req.content_range {
            debug!("ignoring content range {} on new resource {}, storing whole body", v, path);
        }
        let resource = factory.create(path, body, req.content_length, req.content_type.as_deref())?;
        info!("created {}", resource.name());
        Ok(self.response_handler.respond_created(resource.as_ref()))
    }
}

/// Merges `content` into the resource at the position given by `range`.
///
/// At most the range length is read from `content`. A resource that merges
/// ranges itself is handed the range directly. Otherwise the current content
/// is copied to a temporary file, spliced there and written back as a full
/// replacement, growing the content if the range reaches past its end.
pub fn apply_range(resource: &dyn Resource, range: &Range, content: &mut dyn Read) -> Result<()> {
    apply_range_in(&env::temp_dir(), resource, range, content)
}

/// As [apply_range], with the merge file created in `dir`. The merge file is
/// removed whether or not the replacement succeeds.
pub fn apply_range_in(dir: &Path, resource: &dyn Resource, range: &Range, content: &mut dyn Read) -> Result<()> {
    let (start, end) = match (range.start(), range.finish().and_then(|f| f.checked_add(1))) {
        (Some(s), Some(e)) if s < e => (s, e),
        _ => {
            return Err(Error::BadContentRange(range.to_string()));
        },
    };
    let length = end - start;
    let mut content = content.take(length);

    if let Some(v) = resource.as_partially_updateable() {
        debug!("resource {} merges range {} natively", resource.name(), range);
        return v.replace_partial_content(range, &mut content);
    }

    let replaceable = match resource.as_replaceable() {
        Some(v) => v,
        None => {
            return Err(Error::PartialUpdateUnsupported(resource.name().to_string()));
        },
    };

    let mut f = tempfile::Builder::new()
        .prefix("partial-put")
        .tempfile_in(dir)?;
    resource.send_content(f.as_file_mut(), None)?;

    let current_length = f.as_file().metadata()?.len();
    let new_length = current_length.max(end);
    f.as_file().set_len(new_length)?;

    f.seek(SeekFrom::Start(start))?;
    let c = io::copy(&mut content, &mut f)?;
    if c < length {
        warn!("request body ended after {} of {} bytes for range {}", c, length, range);
    }
    f.seek(SeekFrom::Start(0))?;
    debug!("merged range {} into {} bytes of {}", range, new_length, resource.name());

    let r = {
        let mut reader = BufReader::new(f.as_file_mut());
        replaceable.replace_content(&mut reader, Some(new_length))
    };
    if let Err(e) = f.close() {
        warn!("could not remove partial put temporary file: {}", e);
    }
    r
}

#[cfg(test)]
mod tests {
    use std::fs::read_dir;
    use std::io;
    use std::io::{
        Cursor,
        Read,
        Write,
    };
    use std::sync::Arc;
    use std::time::SystemTime;

    use tempfile::tempdir;
    use tiny_http::Method;

    use crate::auth::Auth;
    use crate::error::{
        Error,
        Result,
    };
    use crate::etag::{
        DefaultETagGenerator,
        ETagGenerator,
    };
    use crate::matching::MatchHelper;
    use crate::range::Range;
    use crate::request::RequestInfo;
    use crate::resource::tests::MemoryResource;
    use crate::resource::{
        Replaceable,
        Resource,
        ResourceFactory,
    };
    use crate::response::{
        ResponseConfig,
        ResponseHandler,
    };

    use super::{
        apply_range,
        apply_range_in,
        PutHandler,
    };

    /// Wraps a resource whose replacement always fails.
    struct FailingResource {
        inner: MemoryResource,
    }

    impl Resource for FailingResource {
        fn unique_id(&self) -> Option<String> {
            self.inner.unique_id()
        }

        fn name(&self) -> &str {
            self.inner.name()
        }

        fn modified_date(&self) -> Option<SystemTime> {
            self.inner.modified_date()
        }

        fn max_age_seconds(&self, auth: Option<&Auth>) -> Option<u64> {
            self.inner.max_age_seconds(auth)
        }

        fn content_type(&self, accepts: Option<&str>) -> Option<String> {
            self.inner.content_type(accepts)
        }

        fn content_length(&self) -> Option<u64> {
            self.inner.content_length()
        }

        fn send_content(&self, out: &mut dyn Write, range: Option<&Range>) -> Result<()> {
            self.inner.send_content(out, range)
        }

        fn as_replaceable(&self) -> Option<&dyn Replaceable> {
            Some(self)
        }
    }

    impl Replaceable for FailingResource {
        fn replace_content(&self, _content: &mut dyn Read, _length: Option<u64>) -> Result<()> {
            Err(Error::Io(io::Error::new(io::ErrorKind::Other, "disk full")))
        }
    }

    struct MemoryFactory;

    impl ResourceFactory for MemoryFactory {
        fn resource(&self, _path: &str) -> Result<Option<Box<dyn Resource>>> {
            Ok(None)
        }

        fn create(&self, path: &str, content: &mut dyn Read, _length: Option<u64>, _content_type: Option<&str>) -> Result<Box<dyn Resource>> {
            let mut v: Vec<u8> = vec!();
            content.read_to_end(&mut v)?;
            Ok(Box::new(MemoryResource::new(path, &v)))
        }
    }

    fn fixture(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn handler() -> PutHandler {
        let etag: Arc<dyn ETagGenerator> = Arc::new(DefaultETagGenerator);
        PutHandler::new(
            Arc::new(MatchHelper::new(etag.clone())),
            Arc::new(ResponseHandler::new(etag, ResponseConfig::default())),
        )
    }

    #[test]
    fn test_extend_past_end() {
        let data = fixture(1000);
        let r = MemoryResource::new("foo", &data);
        let new_content = vec!(0x2a; 100);
        apply_range(&r, &Range::new(1000, 1099), &mut Cursor::new(new_content.clone())).unwrap();

        let result = r.bytes();
        assert_eq!(result.len(), 1100);
        assert_eq!(&result[..1000], &data[..]);
        assert_eq!(&result[1000..], &new_content[..]);
    }

    #[test]
    fn test_overwrite_middle() {
        let data = fixture(1000);
        let r = MemoryResource::new("foo", &data);
        apply_range(&r, &Range::new(10, 19), &mut Cursor::new(vec!(0xff; 10))).unwrap();

        let result = r.bytes();
        assert_eq!(result.len(), 1000);
        assert_eq!(&result[..10], &data[..10]);
        assert_eq!(&result[10..20], &[0xff; 10]);
        assert_eq!(&result[20..], &data[20..]);
    }

    #[test]
    fn test_body_longer_than_range() {
        let data = fixture(100);
        let r = MemoryResource::new("foo", &data);
        apply_range(&r, &Range::new(0, 4), &mut Cursor::new(vec!(0xff; 50))).unwrap();

        let result = r.bytes();
        assert_eq!(result.len(), 100);
        assert_eq!(&result[..5], &[0xff; 5]);
        assert_eq!(&result[5..], &data[5..]);
    }

    #[test]
    fn test_native_partial() {
        let data = fixture(100);
        let mut r = MemoryResource::new("foo", &data);
        r.native_partial = true;
        apply_range(&r, &Range::new(100, 109), &mut Cursor::new(vec!(0x2a; 10))).unwrap();

        let result = r.bytes();
        assert_eq!(result.len(), 110);
        assert_eq!(&result[100..], &[0x2a; 10]);
    }

    #[test]
    fn test_put_replace() {
        let r = MemoryResource::new("foo", b"old");
        let req = RequestInfo::new(Method::Put, "/foo");
        let res = handler().process(&MemoryFactory, "/foo", Some(Box::new(r)), &req, &mut Cursor::new(b"new".to_vec())).unwrap();
        assert_eq!(res.status().0, 204);
    }

    #[test]
    fn test_put_partial() {
        let req = RequestInfo::new(Method::Put, "/foo").with_header("Content-Range", "bytes 3-5/*");
        let r = MemoryResource::new("foo", b"0123456789");
        let res = handler().process(&MemoryFactory, "/foo", Some(Box::new(r)), &req, &mut Cursor::new(b"abc".to_vec())).unwrap();
        assert_eq!(res.status().0, 204);
    }

    #[test]
    fn test_put_bad_content_range() {
        let req = RequestInfo::new(Method::Put, "/foo").with_header("Content-Range", "bytes 5-3/*");
        let r = MemoryResource::new("foo", b"0123456789");
        let e = handler().process(&MemoryFactory, "/foo", Some(Box::new(r)), &req, &mut Cursor::new(b"abc".to_vec()));
        assert_eq!(e.err().unwrap().status().0, 400);
    }

    #[test]
    fn test_put_if_match() {
        let r = MemoryResource::new("foo", b"old");
        let etag = DefaultETagGenerator.generate_etag(Some(&r)).unwrap();

        let req = RequestInfo::new(Method::Put, "/foo").with_header("If-Match", "\"stale\"");
        let res = handler().process(&MemoryFactory, "/foo", Some(Box::new(r)), &req, &mut Cursor::new(b"new".to_vec())).unwrap();
        assert_eq!(res.status().0, 412);

        let r = MemoryResource::new("foo", b"old");
        let req = RequestInfo::new(Method::Put, "/foo").with_header("If-Match", &etag);
        let res = handler().process(&MemoryFactory, "/foo", Some(Box::new(r)), &req, &mut Cursor::new(b"new".to_vec())).unwrap();
        assert_eq!(res.status().0, 204);
    }

    #[test]
    fn test_put_if_none_match_star() {
        let req = RequestInfo::new(Method::Put, "/foo").with_header("If-None-Match", "*");

        let r = MemoryResource::new("foo", b"old");
        let res = handler().process(&MemoryFactory, "/foo", Some(Box::new(r)), &req, &mut Cursor::new(b"new".to_vec())).unwrap();
        assert_eq!(res.status().0, 412);

        let res = handler().process(&MemoryFactory, "/foo", None, &req, &mut Cursor::new(b"new".to_vec())).unwrap();
        assert_eq!(res.status().0, 201);
    }

    #[test]
    fn test_put_create_if_match_fails() {
        let req = RequestInfo::new(Method::Put, "/foo").with_header("If-Match", "*");
        let res = handler().process(&MemoryFactory, "/foo", None, &req, &mut Cursor::new(b"new".to_vec())).unwrap();
        assert_eq!(res.status().0, 412);
    }

    #[test]
    fn test_merge_file_removed() {
        let d = tempdir().unwrap();
        let r = MemoryResource::new("foo", &fixture(100));
        apply_range_in(d.path(), &r, &Range::new(90, 109), &mut Cursor::new(vec!(0x2a; 20))).unwrap();
        assert_eq!(r.bytes().len(), 110);
        assert_eq!(read_dir(d.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_merge_file_removed_on_failure() {
        let d = tempdir().unwrap();
        let r = FailingResource {
            inner: MemoryResource::new("foo", &fixture(100)),
        };
        let e = apply_range_in(d.path(), &r, &Range::new(0, 9), &mut Cursor::new(vec!(0x2a; 10)));
        match e {
            Err(Error::Io(v)) => assert_eq!(v.to_string(), "disk full"),
            Err(v) => panic!("unexpected error {}", v),
            Ok(_) => panic!("expected replacement to fail"),
        }
        assert_eq!(read_dir(d.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_put_content_range_overflow() {
        let req = RequestInfo::new(Method::Put, "/foo").with_header("Content-Range", "bytes 0-18446744073709551615/*");
        let r = MemoryResource::new("foo", b"0123456789");
        let e = handler().process(&MemoryFactory, "/foo", Some(Box::new(r)), &req, &mut Cursor::new(b"abc".to_vec()));
        assert_eq!(e.err().unwrap().status().0, 400);
    }

    #[test]
    fn test_apply_range_overflow() {
        let r = MemoryResource::new("foo", b"0123456789");
        let e = apply_range(&r, &Range::new(0, u64::MAX), &mut Cursor::new(b"abc".to_vec()));
        assert_eq!(e.err().unwrap().status().0, 400);
        assert_eq!(r.bytes(), b"0123456789");
    }
}
