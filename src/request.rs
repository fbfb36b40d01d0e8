use std::io::{
    Read,
    Write,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::SystemTime;

use log::{
    debug,
    error,
    info,
    trace,
    warn,
};
use tiny_http::{
    Method,
    Request,
};

use crate::auth::Auth;
use crate::error::Result;
use crate::etag::{
    DefaultETagGenerator,
    ETagGenerator,
};
use crate::get::GetHandler;
use crate::matching::MatchHelper;
use crate::put::PutHandler;
use crate::resource::{
    Resource,
    ResourceFactory,
};
use crate::response::{
    Response,
    ResponseConfig,
    ResponseHandler,
};

const ALLOWED_METHODS: [&str; 4] = ["GET", "HEAD", "PUT", "OPTIONS"];

/// The parts of a client request the handlers look at.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: Method,
    pub url: String,
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
    pub if_range: Option<String>,
    pub if_header: Option<String>,
    pub if_modified_since: Option<String>,
    pub cache_control: Option<String>,
    pub range: Option<String>,
    pub content_range: Option<String>,
    pub content_type: Option<String>,
    pub accept: Option<String>,
    pub content_length: Option<u64>,
    auth: Option<Auth>,
}

impl RequestInfo {
    pub fn new(method: Method, url: &str) -> RequestInfo {
        RequestInfo {
            method,
            url: url.to_string(),
            if_match: None,
            if_none_match: None,
            if_range: None,
            if_header: None,
            if_modified_since: None,
            cache_control: None,
            range: None,
            content_range: None,
            content_type: None,
            accept: None,
            content_length: None,
            auth: None,
        }
    }

    pub fn with_header(mut self, field: &str, value: &str) -> RequestInfo {
        self.set_header(field, value);
        self
    }

    /// Records a header by case insensitive name. Headers that play no part in
    /// handling are ignored.
    pub fn set_header(&mut self, field: &str, value: &str) {
        let v = Some(value.to_string());
        match field.to_ascii_lowercase().as_str() {
            "if-match" => self.if_match = v,
            "if-none-match" => self.if_none_match = v,
            "if-range" => self.if_range = v,
            "if" => self.if_header = v,
            "if-modified-since" => self.if_modified_since = v,
            "cache-control" => self.cache_control = v,
            "range" => self.range = v,
            "content-range" => self.content_range = v,
            "content-type" => self.content_type = v,
            "accept" => self.accept = v,
            "content-length" => {
                match u64::from_str(value.trim()) {
                    Ok(l) => {
                        self.content_length = Some(l);
                    },
                    Err(e) => {
                        warn!("invalid content length {:?}: {}", value, e);
                    },
                };
            },
            "authorization" => {
                match Auth::from_str(value) {
                    Ok(a) => {
                        debug!("have auth {:?}", a);
                        self.auth = Some(a);
                    },
                    Err(e) => {
                        warn!("malformed auth string: {}", e);
                    },
                };
            },
            _ => {},
        }
    }

    pub fn from_request(req: &Request) -> RequestInfo {
        let mut info = RequestInfo::new(req.method().clone(), req.url());
        for h in req.headers() {
            let field = h.field.to_string();
            info.set_header(&field, h.value.as_str());
        }
        if info.content_length.is_none() {
            info.content_length = req.body_length().map(|v| v as u64);
        }
        info
    }

    pub fn auth(&self) -> Option<&Auth> {
        self.auth.as_ref()
    }

    /// `If-Modified-Since` as a date. Unparseable dates count as absent.
    pub fn if_modified_since_date(&self) -> Option<SystemTime> {
        let v = self.if_modified_since.as_ref()?;
        match httpdate::parse_http_date(v.trim()) {
            Ok(t) => Some(t),
            Err(e) => {
                debug!("unparseable if-modified-since {:?}: {}", v, e);
                None
            },
        }
    }

    /// The url path without query, as handed to the resource factory.
    pub fn path(&self) -> &str {
        match self.url.find('?') {
            Some(i) => &self.url[..i],
            None => &self.url,
        }
    }
}

/// Routes requests by method to the get and put handlers.
pub struct HttpManager {
    factory: Box<dyn ResourceFactory>,
    get_handler: GetHandler,
    put_handler: PutHandler,
    response_handler: Arc<ResponseHandler>,
}

impl HttpManager {
    pub fn new(factory: Box<dyn ResourceFactory>, config: ResponseConfig) -> HttpManager {
        HttpManager::with_etag_generator(factory, config, Arc::new(DefaultETagGenerator))
    }

    pub fn with_etag_generator(factory: Box<dyn ResourceFactory>, config: ResponseConfig, etag_generator: Arc<dyn ETagGenerator>) -> HttpManager {
        let match_helper = Arc::new(MatchHelper::new(etag_generator.clone()));
        let response_handler = Arc::new(ResponseHandler::new(etag_generator, config));
        HttpManager {
            factory,
            get_handler: GetHandler::new(match_helper.clone(), response_handler.clone()),
            put_handler: PutHandler::new(match_helper, response_handler.clone()),
            response_handler,
        }
    }

    /// Handles one request. The resource is returned alongside the response
    /// when the response body streams from it.
    pub fn process(&self, req: &RequestInfo, body: &mut dyn Read, now: SystemTime) -> (Response, Option<Box<dyn Resource>>) {
        match self.process_method(req, body, now) {
            Ok(v) => v,
            Err(e) => {
                debug!("{} {} failed: {}", req.method, req.url, e);
                (self.response_handler.respond_error(&e), None)
            },
        }
    }

    fn process_method(&self, req: &RequestInfo, body: &mut dyn Read, now: SystemTime) -> Result<(Response, Option<Box<dyn Resource>>)> {
        let path = req.path();
        match req.method {
            Method::Get | Method::Head => {
                let resource = match self.factory.resource(path)? {
                    Some(v) => v,
                    None => {
                        return Ok((self.response_handler.respond_not_found(), None));
                    },
                };
                let res = self.get_handler.process(resource.as_ref(), req, now)?;
                Ok((res, Some(resource)))
            },
            Method::Put => {
                let existing = self.factory.resource(path)?;
                let res = self.put_handler.process(self.factory.as_ref(), path, existing, req, body)?;
                Ok((res, None))
            },
            Method::Options => {
                let resource = self.factory.resource(path)?;
                Ok((self.response_handler.respond_options(resource.as_deref(), &ALLOWED_METHODS), None))
            },
            _ => {
                Ok((self.response_handler.respond_method_not_allowed(&ALLOWED_METHODS), None))
            },
        }
    }

    /// Reads, handles and answers a request received by the server.
    pub fn respond(&self, mut req: Request) {
        let info = RequestInfo::from_request(&req);
        info!("processing request {} for {}", info.method, info.url);

        let (res, resource) = self.process(&info, req.as_reader(), SystemTime::now());
        let status = res.status();
        let head_only = info.method == Method::Head;

        let mut w = req.into_writer();
        match res.write_to(resource.as_deref(), head_only, &mut w) {
            Ok(_) => {
                trace!("{} {} -> {}", info.method, info.url, status.0);
            },
            Err(e) => {
                error!("failed writing response for {}: {}", info.url, e);
            },
        };
        if let Err(e) = w.flush() {
            debug!("flush after response failed: {}", e);
        }
    }
}
