use std::sync::Arc;

use log::{
    debug,
    warn,
};

use crate::etag::ETagGenerator;
use crate::resource::Resource;

/// Evaluates `If-Match`, `If-None-Match` and `If-Range` against the current ETag.
///
/// Missing or empty headers never block: the common case operation goes ahead.
pub struct MatchHelper {
    etag_generator: Arc<dyn ETagGenerator>,
}

fn split_to_list(s: &str) -> Vec<&str> {
    s.split(',')
        .map(|v| v.trim())
        .filter(|v| v.len() > 0)
        .collect()
}

/// Undoes the quote mangling some user agents apply to the tags they were sent.
fn clean_up(s: &str) -> String {
    s.replace("&quot;", "\"").replace("\"\"", "\"")
}

/// Tag of a WebDAV `If` header of the form `(<token> ["etag"])`, with its quotes.
fn if_header_etag(value: &str) -> Option<String> {
    let v = value.trim();
    if !v.ends_with("\"])") {
        return None;
    }
    let pos = v.rfind("[\"")?;
    let inner_start = pos + 2;
    let inner_end = v.len() - 3;
    if inner_start > inner_end {
        return None;
    }
    Some(format!("\"{}\"", &v[inner_start..inner_end]))
}

impl MatchHelper {
    pub fn new(etag_generator: Arc<dyn ETagGenerator>) -> MatchHelper {
        MatchHelper {
            etag_generator,
        }
    }

    fn current_etag(&self, r: Option<&dyn Resource>) -> Option<String> {
        match self.etag_generator.generate_etag(r) {
            Some(v) if v.len() > 0 => Some(v),
            _ => None,
        }
    }

    /// True when processing (typically a PUT) may continue.
    ///
    /// An `If-Match` listing the current tag or `*` passes, any other list fails,
    /// as does any list when there is no resource or the resource has no tag.
    /// Without `If-Match`, the tag in a WebDAV `If` header is checked instead.
    pub fn check_if_match(&self, r: Option<&dyn Resource>, if_match: Option<&str>, if_header: Option<&str>) -> bool {
        let h = match if_match {
            Some(v) if v.trim().len() > 0 => v,
            _ => {
                if r.is_none() {
                    return true;
                }
                return self.check_if_header(r, if_header);
            },
        };
        if r.is_none() {
            debug!("if-match given but there is no resource");
            return false;
        }
        let current = match self.current_etag(r) {
            Some(v) => v,
            None => {
                return false;
            },
        };
        for requested in split_to_list(h) {
            let requested = clean_up(requested);
            if requested == current || requested == "*" {
                return true;
            }
        }
        debug!("did not find matching etag for {}", current);
        false
    }

    fn check_if_header(&self, r: Option<&dyn Resource>, if_header: Option<&str>) -> bool {
        let value = match if_header {
            Some(v) => v,
            None => {
                return true;
            },
        };
        let requested = match if_header_etag(value) {
            Some(v) => clean_up(&v),
            None => {
                return true;
            },
        };
        match self.current_etag(r) {
            Some(current) => requested == current,
            None => false,
        }
    }

    /// True when a tag in `If-None-Match` matches, meaning the request must not
    /// proceed normally (304 on GET, 412 on PUT).
    ///
    /// `*` matches any existing resource.
    pub fn check_if_none_match(&self, r: Option<&dyn Resource>, if_none_match: Option<&str>) -> bool {
        let h = match if_none_match {
            Some(v) => v.trim(),
            None => {
                return false;
            },
        };
        if h == "*" {
            if let Some(v) = r {
                warn!("if-none-match is star and resource {} exists", v.name());
                return true;
            }
            return false;
        }
        let current = match self.current_etag(r) {
            Some(v) => v,
            None => {
                debug!("no etag for resource, if-none-match passes");
                return false;
            },
        };
        split_to_list(h).into_iter().any(|requested| clean_up(requested) == current)
    }

    /// True when a partial GET may be served.
    ///
    /// False means the tag in `If-Range` is stale and the full content must be
    /// sent instead.
    pub fn check_if_range(&self, r: Option<&dyn Resource>, if_range: Option<&str>) -> bool {
        let requested = match if_range {
            Some(v) if v.trim().len() > 0 => v.trim(),
            _ => {
                return true;
            },
        };
        let current = match self.current_etag(r) {
            Some(v) => v,
            None => {
                return false;
            },
        };
        requested == current || requested == "*"
    }
}
