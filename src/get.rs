use std::sync::Arc;
use std::time::SystemTime;

use log::debug;
use tiny_http::Method;

use crate::conditional::{
    check_conditional,
    decide_ranges,
    Decision,
};
use crate::error::Result;
use crate::matching::MatchHelper;
use crate::range::parse_range_header;
use crate::request::RequestInfo;
use crate::resource::Resource;
use crate::response::{
    Response,
    ResponseHandler,
};

/// Answers GET and HEAD for an existing resource.
pub struct GetHandler {
    match_helper: Arc<MatchHelper>,
    response_handler: Arc<ResponseHandler>,
}

impl GetHandler {
    pub fn new(match_helper: Arc<MatchHelper>, response_handler: Arc<ResponseHandler>) -> GetHandler {
        GetHandler {
            match_helper,
            response_handler,
        }
    }

    /// The not modified check comes first, for HEAD as well. After it a
    /// malformed `Range` header is an error (400), an unsupported range unit
    /// is ignored.
    pub fn process(&self, resource: &dyn Resource, req: &RequestInfo, now: SystemTime) -> Result<Response> {
        if check_conditional(&self.match_helper, resource, req, now) {
            return Ok(self.response_handler.respond_not_modified(resource, req));
        }

        if req.method == Method::Head {
            return Ok(self.response_handler.respond_head(resource, req));
        }

        let ranges = parse_range_header(req.range.as_deref())?;
        match decide_ranges(&self.match_helper, resource, req, ranges) {
            Decision::NotModified => {
                Ok(self.response_handler.respond_not_modified(resource, req))
            },
            Decision::SendPartial(ranges) => {
                if ranges.len() == 1 {
                    Ok(self.response_handler.respond_partial_content(resource, req, &ranges[0]))
                } else {
                    debug!("multiple ranges requested for {}", resource.name());
                    Ok(self.response_handler.respond_partial_content_multi(resource, req, &ranges))
                }
            },
            Decision::SendFull => {
                self.response_handler.respond_content(resource, req)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::SystemTime;

    use tiny_http::Method;

    use crate::error::Error;
    use crate::etag::{
        DefaultETagGenerator,
        ETagGenerator,
    };
    use crate::matching::MatchHelper;
    use crate::request::RequestInfo;
    use crate::resource::tests::MemoryResource;
    use crate::response::{
        ResponseConfig,
        ResponseHandler,
    };

    use super::GetHandler;

    fn handler() -> GetHandler {
        let etag: Arc<dyn ETagGenerator> = Arc::new(DefaultETagGenerator);
        GetHandler::new(
            Arc::new(MatchHelper::new(etag.clone())),
            Arc::new(ResponseHandler::new(etag, ResponseConfig::default())),
        )
    }

    fn body_of(h: &GetHandler, r: &MemoryResource, req: &RequestInfo) -> (u16, Vec<u8>) {
        let res = h.process(r, req, SystemTime::now()).unwrap();
        let status = res.status().0;
        let mut out: Vec<u8> = vec!();
        res.write_body(Some(r), &mut out).unwrap();
        (status, out)
    }

    #[test]
    fn test_full() {
        let r = MemoryResource::new("foo", b"0123456789");
        let (status, out) = body_of(&handler(), &r, &RequestInfo::new(Method::Get, "/foo"));
        assert_eq!(status, 200);
        assert_eq!(out, b"0123456789");
    }

    #[test]
    fn test_single_range() {
        let r = MemoryResource::new("foo", b"0123456789");
        let req = RequestInfo::new(Method::Get, "/foo").with_header("Range", "bytes=-3");
        let (status, out) = body_of(&handler(), &r, &req);
        assert_eq!(status, 206);
        assert_eq!(out, b"789");
    }

    #[test]
    fn test_multi_range() {
        let r = MemoryResource::new("foo", b"0123456789");
        let req = RequestInfo::new(Method::Get, "/foo").with_header("Range", "bytes=0-1,5-6");
        let res = handler().process(&r, &req, SystemTime::now()).unwrap();
        assert_eq!(res.status().0, 206);
        assert!(res.header("Content-Type").unwrap().starts_with("multipart/byteranges"));
    }

    #[test]
    fn test_stale_if_range_sends_full() {
        let r = MemoryResource::new("foo", b"0123456789");
        let req = RequestInfo::new(Method::Get, "/foo")
            .with_header("Range", "bytes=0-1")
            .with_header("If-Range", "\"foo_0\"");
        let (status, out) = body_of(&handler(), &r, &req);
        assert_eq!(status, 200);
        assert_eq!(out.len(), 10);
    }

    #[test]
    fn test_not_modified() {
        let r = MemoryResource::new("foo", b"0123456789");
        let etag = DefaultETagGenerator.generate_etag(Some(&r)).unwrap();
        let req = RequestInfo::new(Method::Get, "/foo")
            .with_header("If-None-Match", &etag)
            .with_header("Range", "bytes=0-1");
        let (status, out) = body_of(&handler(), &r, &req);
        assert_eq!(status, 304);
        assert_eq!(out.len(), 0);
    }

    #[test]
    fn test_bad_range() {
        let r = MemoryResource::new("foo", b"0123456789");
        let req = RequestInfo::new(Method::Get, "/foo").with_header("Range", "bytes=5-1");
        match handler().process(&r, &req, SystemTime::now()) {
            Err(Error::BadRange(_)) => {},
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("expected error"),
        }
    }

    #[test]
    fn test_unknown_unit_sends_full() {
        let r = MemoryResource::new("foo", b"0123456789");
        let req = RequestInfo::new(Method::Get, "/foo").with_header("Range", "items=0-1");
        let (status, _) = body_of(&handler(), &r, &req);
        assert_eq!(status, 200);
    }

    #[test]
    fn test_head() {
        let r = MemoryResource::new("foo", b"0123456789");
        let res = handler().process(&r, &RequestInfo::new(Method::Head, "/foo"), SystemTime::now()).unwrap();
        assert_eq!(res.status().0, 200);
        assert_eq!(res.header("Content-Length").unwrap(), "10");
    }

    #[test]
    fn test_head_not_modified() {
        let r = MemoryResource::new("foo", b"0123456789");
        let etag = DefaultETagGenerator.generate_etag(Some(&r)).unwrap();
        let req = RequestInfo::new(Method::Head, "/foo").with_header("If-None-Match", &etag);
        let res = handler().process(&r, &req, SystemTime::now()).unwrap();
        assert_eq!(res.status().0, 304);
    }

    #[test]
    fn test_not_modified_before_range_parsing() {
        let r = MemoryResource::new("foo", b"0123456789");
        let etag = DefaultETagGenerator.generate_etag(Some(&r)).unwrap();
        let req = RequestInfo::new(Method::Get, "/foo")
            .with_header("If-None-Match", &etag)
            .with_header("Range", "bytes=x-y");
        let res = handler().process(&r, &req, SystemTime::now()).unwrap();
        assert_eq!(res.status().0, 304);
    }
}
