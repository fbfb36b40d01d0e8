//! Outgoing responses, and the handler that fills them in for each outcome.
//!
//! Headers and status are decided completely before any body byte is written,
//! so a [Response] is built first and written out afterwards with
//! [Response::write_to].
use std::fmt;
use std::io;
use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{
    Duration,
    SystemTime,
};

use ascii::AsciiString;
use log::{
    debug,
    trace,
    warn,
};
use tiny_http::{
    Header,
    HeaderField,
    StatusCode,
};

use crate::auth::Auth;
use crate::buffer::{
    BufferedContent,
    BufferingWriter,
};
use crate::error::{
    Error,
    Result,
};
use crate::etag::ETagGenerator;
use crate::multipart::{
    content_type_header,
    new_boundary,
    MultipleRangeWriter,
};
use crate::range::{
    to_range_string,
    Range,
};
use crate::request::RequestInfo;
use crate::resource::Resource;

const DEFAULT_MAX_MEMORY_SIZE: usize = 100000;

/// When full content is buffered to learn its length before sending.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Buffering {
    Always,
    Never,
    /// Only when the resource does not report its length.
    WhenNeeded,
}

#[derive(Debug)]
pub struct BufferingParseError(String);

impl fmt::Display for BufferingParseError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "unknown buffering mode: {}", self.0)
    }
}

impl std::error::Error for BufferingParseError {}

impl FromStr for Buffering {
    type Err = BufferingParseError;

    fn from_str(s: &str) -> std::result::Result<Buffering, BufferingParseError> {
        match s {
            "always" => Ok(Buffering::Always),
            "never" => Ok(Buffering::Never),
            "when-needed" => Ok(Buffering::WhenNeeded),
            _ => Err(BufferingParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResponseConfig {
    /// Bytes held in memory per request before buffered content spills to disk.
    pub max_memory_size: usize,
    pub buffering: Buffering,
    pub server_name: String,
}

impl Default for ResponseConfig {
    fn default() -> ResponseConfig {
        ResponseConfig {
            max_memory_size: DEFAULT_MAX_MEMORY_SIZE,
            buffering: Buffering::WhenNeeded,
            server_name: format!("rangeserve/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// How the body of a response is produced.
pub enum Entity {
    Empty,
    Text(String),
    /// Streamed from the resource, restricted to a range if given.
    Content(Option<Range>),
    /// Already read from the resource into a buffer.
    Buffered(BufferedContent),
    /// Full content filtered into `multipart/byteranges` parts.
    Multipart {
        ranges: Vec<Range>,
        boundary: String,
        content_type: Option<String>,
        total_length: Option<u64>,
    },
}

impl fmt::Debug for Entity {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Empty => fmt.write_str("Empty"),
            Entity::Text(v) => write!(fmt, "Text({} bytes)", v.len()),
            Entity::Content(r) => write!(fmt, "Content({:?})", r),
            Entity::Buffered(b) => write!(fmt, "Buffered({} bytes)", b.size()),
            Entity::Multipart { ranges, boundary, .. } => write!(fmt, "Multipart({:?}, {})", ranges, boundary),
        }
    }
}

#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Vec<Header>,
    entity: Entity,
}

fn http_date(t: SystemTime) -> String {
    httpdate::fmt_http_date(t)
}

impl Response {
    pub fn empty(status: StatusCode) -> Response {
        Response {
            status,
            headers: vec!(),
            entity: Entity::Empty,
        }
    }

    pub fn from_string(status: StatusCode, s: &str) -> Response {
        let mut res = Response::empty(status);
        res.add_header("Content-Type", "text/plain; charset=utf-8");
        res.add_header("Content-Length", &s.len().to_string());
        res.entity = Entity::Text(s.to_string());
        res
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn set_entity(&mut self, entity: Entity) {
        self.entity = entity;
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// Adds a header, dropping it with a warning if it is not valid ASCII.
    pub fn add_header(&mut self, field: &str, value: &str) {
        let field_parsed = match HeaderField::from_str(field) {
            Ok(v) => v,
            Err(_) => {
                warn!("invalid header name {:?}", field);
                return;
            },
        };
        let value_parsed = match AsciiString::from_ascii(value) {
            Ok(v) => v,
            Err(e) => {
                warn!("dropping header {} with non ascii value: {}", field, e);
                return;
            },
        };
        self.headers.push(Header{
            field: field_parsed,
            value: value_parsed,
        });
    }

    /// First value of the named header, case insensitive.
    pub fn header(&self, field: &str) -> Option<&str> {
        self.headers.iter()
            .find(|h| h.field.to_string().eq_ignore_ascii_case(field))
            .map(|h| h.value.as_str())
    }

    /// Writes the body only. `resource` supplies streamed content.
    pub fn write_body(self, resource: Option<&dyn Resource>, out: &mut dyn Write) -> Result<()> {
        match self.entity {
            Entity::Empty => {},
            Entity::Text(v) => {
                out.write_all(v.as_bytes())?;
            },
            Entity::Buffered(mut b) => {
                let c = io::copy(&mut b, out)?;
                trace!("sent {} buffered bytes", c);
            },
            Entity::Content(range) => {
                if let Some(r) = resource {
                    r.send_content(out, range.as_ref())?;
                }
            },
            Entity::Multipart { ranges, boundary, content_type, total_length } => {
                if let Some(r) = resource {
                    let mut w = MultipleRangeWriter::new(out, ranges, &boundary, content_type, total_length);
                    r.send_content(&mut w, None)?;
                    w.finish()?;
                }
            },
        }
        out.flush()?;
        Ok(())
    }

    /// Writes status line, headers and body to a raw HTTP/1.1 connection.
    ///
    /// The connection is closed after the response, which delimits bodies sent
    /// without a length.
    pub fn write_to(mut self, resource: Option<&dyn Resource>, head_only: bool, out: &mut dyn Write) -> Result<()> {
        self.add_header("Connection", "close");
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status.0, self.status.default_reason_phrase());
        for h in self.headers.iter() {
            head.push_str(&format!("{}: {}\r\n", h.field, h.value));
        }
        head.push_str("\r\n");
        out.write_all(head.as_bytes())?;
        if head_only {
            out.flush()?;
            return Ok(());
        }
        self.write_body(resource, out)
    }
}

/// Sets `Cache-Control` (and related headers) on content responses.
pub trait CacheControlHelper: Send + Sync {
    fn set_cache_control(&self, resource: &dyn Resource, response: &mut Response, auth: Option<&Auth>);
}

/// `max-age` from the resource, `private` when the request was authenticated,
/// `no-cache` when the resource has no max age.
#[derive(Debug, Default)]
pub struct DefaultCacheControlHelper;

impl CacheControlHelper for DefaultCacheControlHelper {
    fn set_cache_control(&self, resource: &dyn Resource, response: &mut Response, auth: Option<&Auth>) {
        match resource.max_age_seconds(auth) {
            Some(delta) => {
                if auth.is_some() {
                    response.add_header("Cache-Control", &format!("private, max-age={}", delta));
                } else {
                    response.add_header("Cache-Control", &format!("max-age={}", delta));
                }
                let expires = SystemTime::now() + Duration::from_secs(delta);
                response.add_header("Expires", &http_date(expires));
            },
            None => {
                response.add_header("Cache-Control", "no-cache");
            },
        }
    }
}

/// First entry of a comma separated list of content types.
fn pick_best_content_type(ct: &str) -> &str {
    match ct.split(',').next() {
        Some(v) => v.trim(),
        None => ct,
    }
}

/// Builds the response for each outcome of a request.
pub struct ResponseHandler {
    etag_generator: Arc<dyn ETagGenerator>,
    cache_control_helper: Box<dyn CacheControlHelper>,
    config: ResponseConfig,
}

impl ResponseHandler {
    pub fn new(etag_generator: Arc<dyn ETagGenerator>, config: ResponseConfig) -> ResponseHandler {
        ResponseHandler {
            etag_generator,
            cache_control_helper: Box::new(DefaultCacheControlHelper),
            config,
        }
    }

    pub fn with_cache_control_helper(mut self, helper: Box<dyn CacheControlHelper>) -> ResponseHandler {
        self.cache_control_helper = helper;
        self
    }

    pub fn config(&self) -> &ResponseConfig {
        &self.config
    }

    pub fn generate_etag(&self, resource: Option<&dyn Resource>) -> Option<String> {
        self.etag_generator.generate_etag(resource)
    }

    fn set_etag(&self, response: &mut Response, resource: Option<&dyn Resource>) {
        if let Some(etag) = self.generate_etag(resource) {
            response.add_header("ETag", &etag);
        }
    }

    fn set_common_headers(&self, response: &mut Response, resource: Option<&dyn Resource>) {
        response.add_header("Server", &self.config.server_name);
        response.add_header("Date", &http_date(SystemTime::now()));
        response.add_header("Accept-Ranges", "bytes");
        self.set_etag(response, resource);
    }

    fn set_content_common_headers(&self, response: &mut Response, resource: &dyn Resource) {
        self.set_common_headers(response, Some(resource));
        if let Some(modified) = resource.modified_date() {
            response.add_header("Last-Modified", &http_date(modified));
        }
    }

    fn set_content_type(&self, response: &mut Response, resource: &dyn Resource, req: &RequestInfo) -> Option<String> {
        let ct = resource.content_type(req.accept.as_deref())?;
        let ct = pick_best_content_type(&ct).to_string();
        response.add_header("Content-Type", &ct);
        Some(ct)
    }

    fn do_buffering(&self, resource: &dyn Resource) -> bool {
        if let Some(v) = resource.buffering_required() {
            return v;
        }
        match self.config.buffering {
            Buffering::Always => true,
            Buffering::Never => false,
            Buffering::WhenNeeded => resource.content_length().is_none(),
        }
    }

    /// 200 with the full content.
    ///
    /// Content of unknown length is buffered first (spilling to disk past
    /// the configured size) so `Content-Length` can precede the body.
    pub fn respond_content(&self, resource: &dyn Resource, req: &RequestInfo) -> Result<Response> {
        debug!("respond content: {}", resource.name());
        let mut res = Response::empty(StatusCode(200));
        self.set_content_common_headers(&mut res, resource);
        self.set_content_type(&mut res, resource, req);
        self.cache_control_helper.set_cache_control(resource, &mut res, req.auth());

        let content_length = resource.content_length();
        if !self.do_buffering(resource) {
            trace!("sending content with known content length: {:?}", content_length);
            if let Some(l) = content_length {
                res.add_header("Content-Length", &l.to_string());
            }
            res.entity = Entity::Content(None);
            return Ok(res);
        }

        let mut w = BufferingWriter::new(self.config.max_memory_size);
        resource.send_content(&mut w, None)?;
        let buffered = w.into_reader()?;
        if let Some(l) = content_length {
            if l != buffered.size() {
                warn!("resource {} reported length {} but sent {} bytes", resource.name(), l, buffered.size());
            }
        }
        res.add_header("Content-Length", &buffered.size().to_string());
        res.entity = Entity::Buffered(buffered);
        Ok(res)
    }

    /// 206 with one range of the content, or 416 if the range lies past the end.
    pub fn respond_partial_content(&self, resource: &dyn Resource, req: &RequestInfo, range: &Range) -> Response {
        debug!("respond partial content: {} {}", resource.name(), range);
        let content_length = resource.content_length();

        let (start, finish) = match content_length {
            Some(cl) => {
                match range.resolve(cl) {
                    Some(r) => (r.start().unwrap_or(0), r.finish()),
                    None => {
                        return self.respond_range_not_satisfiable(resource, cl);
                    },
                }
            },
            None => {
                warn!("no content length reported for {}, range end may be indeterminate", resource.name());
                match (range.start(), range.finish()) {
                    (Some(s), f) => (s, f),
                    (None, _) => (0, None),
                }
            },
        };

        let mut res = Response::empty(StatusCode(206));
        self.set_content_common_headers(&mut res, resource);
        self.set_content_type(&mut res, resource, req);
        res.add_header("Content-Range", &to_range_string(start, finish, content_length));
        let effective = match finish {
            Some(f) => {
                res.add_header("Content-Length", &(f - start + 1).to_string());
                Range::new(start, f)
            },
            None => Range::from_start(start),
        };
        res.entity = Entity::Content(Some(effective));
        res
    }

    /// 206 with several ranges as `multipart/byteranges`, with a boundary fresh
    /// to this response.
    pub fn respond_partial_content_multi(&self, resource: &dyn Resource, req: &RequestInfo, ranges: &[Range]) -> Response {
        debug!("respond partial content, {} ranges: {}", ranges.len(), resource.name());
        let content_length = resource.content_length();

        let resolved: Vec<Range> = match content_length {
            Some(cl) => ranges.iter().filter_map(|r| r.resolve(cl)).collect(),
            None => ranges.iter().filter(|r| r.start().is_some()).cloned().collect(),
        };
        if resolved.len() == 0 {
            return self.respond_range_not_satisfiable(resource, content_length.unwrap_or(0));
        }

        let boundary = new_boundary();
        let mut res = Response::empty(StatusCode(206));
        self.set_content_common_headers(&mut res, resource);
        res.add_header("Content-Type", &content_type_header(&boundary));
        let content_type = resource.content_type(req.accept.as_deref())
            .map(|v| pick_best_content_type(&v).to_string());
        res.entity = Entity::Multipart {
            ranges: resolved,
            boundary,
            content_type,
            total_length: content_length,
        };
        res
    }

    pub fn respond_range_not_satisfiable(&self, resource: &dyn Resource, content_length: u64) -> Response {
        debug!("range not satisfiable for {} of length {}", resource.name(), content_length);
        let mut res = Response::empty(StatusCode(416));
        self.set_common_headers(&mut res, Some(resource));
        res.add_header("Content-Range", &format!("bytes */{}", content_length));
        res.add_header("Content-Length", "0");
        res
    }

    /// 304, with the actual modified date of the resource.
    pub fn respond_not_modified(&self, resource: &dyn Resource, req: &RequestInfo) -> Response {
        trace!("respond not modified: {}", resource.name());
        let mut res = Response::empty(StatusCode(304));
        res.add_header("Date", &http_date(SystemTime::now()));
        self.set_etag(&mut res, Some(resource));
        if let Some(modified) = resource.modified_date() {
            res.add_header("Last-Modified", &http_date(modified));
        }
        self.cache_control_helper.set_cache_control(resource, &mut res, req.auth());
        res
    }

    pub fn respond_head(&self, resource: &dyn Resource, req: &RequestInfo) -> Response {
        let mut res = Response::empty(StatusCode(200));
        self.set_content_common_headers(&mut res, resource);
        self.set_content_type(&mut res, resource, req);
        match resource.content_length() {
            Some(l) => {
                res.add_header("Content-Length", &l.to_string());
            },
            None => {
                trace!("no content length is available for head request");
            },
        }
        res
    }

    pub fn respond_created(&self, resource: &dyn Resource) -> Response {
        let mut res = Response::empty(StatusCode(201));
        self.set_common_headers(&mut res, Some(resource));
        res.add_header("Content-Length", "0");
        res
    }

    pub fn respond_no_content(&self, resource: &dyn Resource) -> Response {
        let mut res = Response::empty(StatusCode(204));
        self.set_common_headers(&mut res, Some(resource));
        res
    }

    pub fn respond_precondition_failed(&self, resource: Option<&dyn Resource>) -> Response {
        let mut res = Response::empty(StatusCode(412));
        self.set_common_headers(&mut res, resource);
        res.add_header("Content-Length", "0");
        res
    }

    pub fn respond_options(&self, resource: Option<&dyn Resource>, methods: &[&str]) -> Response {
        let mut res = Response::empty(StatusCode(200));
        self.set_common_headers(&mut res, resource);
        res.add_header("Allow", &methods.join(", "));
        res.add_header("Content-Length", "0");
        res
    }

    pub fn respond_method_not_allowed(&self, methods: &[&str]) -> Response {
        let mut res = Response::from_string(StatusCode(405), "method not allowed");
        res.add_header("Allow", &methods.join(", "));
        res
    }

    pub fn respond_not_found(&self) -> Response {
        Response::from_string(StatusCode(404), "not found")
    }

    pub fn respond_error(&self, e: &Error) -> Response {
        let status = e.status();
        if status.0 >= 500 {
            warn!("request failed: {}", e);
            return Response::from_string(status, "internal server error");
        }
        Response::from_string(status, &e.to_string())
    }
}
