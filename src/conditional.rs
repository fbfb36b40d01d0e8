//! Decides whether a GET is answered with 304, full content or partial content.
//!
//! All checks run before any byte of the response is written.
use std::time::{
    SystemTime,
    UNIX_EPOCH,
};

use log::{
    debug,
    trace,
    warn,
};

use crate::matching::MatchHelper;
use crate::range::Range;
use crate::request::RequestInfo;
use crate::resource::Resource;

/// Added to the request date to absorb rounding to whole seconds in HTTP dates.
const ROUNDING_MS: i64 = 1000;

#[derive(Debug, PartialEq)]
pub enum Decision {
    NotModified,
    SendFull,
    SendPartial(Vec<Range>),
}

fn epoch_millis(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(v) => v.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}

/// True when the resource has NOT been modified since the `If-Modified-Since` date.
///
/// `Cache-Control: no-cache` in the request, a resource without max age, or a
/// request without a date all give false. Once max age seconds have passed since
/// the request date the content is resent whatever its modified date, so
/// generated content is refreshed periodically. A resource without a modified
/// date cannot be proven unchanged and gives false as well.
pub fn check_if_modified_since(resource: &dyn Resource, req: &RequestInfo, now: SystemTime) -> bool {
    if let Some(cache_control) = &req.cache_control {
        if cache_control.trim().eq_ignore_ascii_case("no-cache") {
            trace!("request cache-control is no-cache");
            return false;
        }
    }

    let max_age = match resource.max_age_seconds(req.auth()) {
        Some(v) => v,
        None => {
            trace!("null max age, always generate fresh response");
            return false;
        },
    };

    let dt_request = match req.if_modified_since_date() {
        Some(v) => v,
        None => {
            trace!("no modified date header");
            return false;
        },
    };

    let request_ms = epoch_millis(dt_request) + ROUNDING_MS;
    let elapsed = (epoch_millis(now) - request_ms) / 1000;
    // a request exactly max age old is already stale
    if elapsed >= max_age as i64 {
        trace!("{}s elapsed exceeds max age {}s, generate fresh response", elapsed, max_age);
        return false;
    }

    let modified = match resource.modified_date() {
        Some(v) => v,
        None => {
            trace!("no modified date on resource {}, generate fresh response", resource.name());
            return false;
        },
    };

    let unchanged = request_ms >= epoch_millis(modified);
    trace!("resource modified {} request date {} unchanged {}", epoch_millis(modified), request_ms - ROUNDING_MS, unchanged);
    unchanged
}

/// True when a 304 may be sent instead of content.
pub fn check_conditional(match_helper: &MatchHelper, resource: &dyn Resource, req: &RequestInfo, now: SystemTime) -> bool {
    if resource.max_age_seconds(req.auth()).is_none() {
        trace!("resource has null max age, not modified response is disabled");
        return false;
    }
    if check_if_modified_since(resource, req, now) {
        trace!("is not modified since");
        return true;
    }
    if match_helper.check_if_none_match(Some(resource), req.if_none_match.as_deref()) {
        trace!("if-none-match matched");
        return true;
    }
    false
}

/// Full decision for a GET, given the ranges parsed from its `Range` header.
pub fn decide(match_helper: &MatchHelper, resource: &dyn Resource, req: &RequestInfo, ranges: Option<Vec<Range>>, now: SystemTime) -> Decision {
    if check_conditional(match_helper, resource, req, now) {
        return Decision::NotModified;
    }
    decide_ranges(match_helper, resource, req, ranges)
}

/// Decision for a GET already known not to be answered with 304.
///
/// Ranges are honoured only when `If-Range` still matches and the resource
/// reports its content length; otherwise the full content is sent.
pub fn decide_ranges(match_helper: &MatchHelper, resource: &dyn Resource, req: &RequestInfo, ranges: Option<Vec<Range>>) -> Decision {
    let ranges = match ranges {
        Some(v) if v.len() > 0 => v,
        _ => {
            return Decision::SendFull;
        },
    };

    if !match_helper.check_if_range(Some(resource), req.if_range.as_deref()) {
        debug!("if-range does not match, sending full content of {}", resource.name());
        return Decision::SendFull;
    }

    if resource.content_length().is_none() {
        warn!("cannot do partial get, no content length for resource {}", resource.name());
        return Decision::SendFull;
    }

    Decision::SendPartial(ranges)
}
