#![crate_name = "rangeserve"]

//! rangeserve is an HTTP file server built around conditional requests and
//! byte ranges.
//!
//! ## Conditional requests
//!
//! Every resource gets an _ETag_ from its unique id and modified date. `If-Match`
//! and `If-None-Match` guard `PUT` against lost updates. On `GET`,
//! `If-Modified-Since` and `If-None-Match` are answered with `304 Not Modified`
//! while the content is unchanged and the resource max age has not run out.
//!
//! ## Byte ranges
//!
//! `GET` with a `Range` header returns `206 Partial Content`: one range as is,
//! several as `multipart/byteranges`. A stale `If-Range` tag falls back to the
//! full content.
//!
//! A `PUT` with a `Content-Range` header merges its body into the existing
//! content at that position, growing it if needed.
//!
//! ## Running the daemon
//!
//! The daemon will listen to all ip addresses on port 8000 by default, and
//! store and serve files from the current directory. See `cargo run -- --help`
//! for the options.
//!
//! ## Library use
//!
//! The handlers work on the [Resource](crate::resource::Resource) trait, so any
//! content store can be served by implementing it and a
//! [ResourceFactory](crate::resource::ResourceFactory) and handing the latter
//! to an [HttpManager](crate::request::HttpManager).

/// The principal given in the `Authorization` header.
pub mod auth;

/// Spill-to-disk buffering of content before its length is known.
pub mod buffer;

/// The 304 / 200 / 206 decision for GET.
pub mod conditional;

pub mod error;

/// ETag generation.
pub mod etag;

pub mod get;

/// `If-Match`, `If-None-Match` and `If-Range` evaluation.
pub mod matching;

/// Store and serve MIME metadata for content.
pub mod meta;

/// `multipart/byteranges` encoding.
pub mod multipart;

pub mod put;

/// Byte range parsing and copy helpers.
pub mod range;

/// Interfaces a content file in the served directory.
pub mod record;

/// Encapsulates an incoming remote request.
pub mod request;

/// Resource capabilities.
pub mod resource;

/// Encapsulates an outgoing response to remote.
pub mod response;
