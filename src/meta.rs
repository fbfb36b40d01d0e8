//! Stores the MIME type given in the `Content-Type` header of the `PUT` that
//! created a file.
//!
//! The MIME type is kept next to the content, in a file with the same name and
//! a `.meta` postfix. The value is checked to be a valid MIME type string, but
//! not checked against the content itself.
//!
//! Files without a stored MIME type are served as `application/octet-stream`.
//! Sidecar files are never served themselves.
use std::fs::{
    read,
    File,
};
use std::io;
use std::io::Write;
use std::path::{
    Path,
    PathBuf,
};
use std::str::FromStr;

use log::{
    debug,
    warn,
};
use mime::Mime;

const META_POSTFIX: &str = ".meta";

/// Path of the sidecar holding the MIME type of the file at `path`.
pub fn meta_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(META_POSTFIX);
    PathBuf::from(s)
}

pub fn is_meta_path(path: &str) -> bool {
    path.ends_with(META_POSTFIX)
}

/// Set a MIME type for the file at `path`.
pub fn register_type(path: &Path, typ: &Mime) -> Result<(), io::Error> {
    let mut f = File::create(meta_path(path))?;
    f.write_all(typ.as_ref().as_bytes())?;
    debug!("registered content type {} for {:?}", typ, path);
    Ok(())
}

/// Parses and stores a `Content-Type` header value. Invalid values are logged
/// and not stored.
pub fn register_type_str(path: &Path, typ: &str) -> Result<(), io::Error> {
    match Mime::from_str(typ.trim()) {
        Ok(v) => register_type(path, &v),
        Err(e) => {
            warn!("ignoring invalid content type {:?} for {:?}: {}", typ, path, e);
            Ok(())
        },
    }
}

/// Retrieve the MIME type for the file at `path`.
pub fn get_type(path: &Path) -> Option<Mime> {
    let fp = meta_path(path);
    let r = match read(&fp) {
        Ok(v) => v,
        Err(e) => {
            debug!("meta type file not found for {:?}: {}", path, e);
            return None;
        },
    };
    let mime_str = match String::from_utf8(r) {
        Ok(v) => v,
        Err(e) => {
            warn!("meta type file {:?} is not utf8: {}", fp, e);
            return None;
        },
    };
    match Mime::from_str(mime_str.trim()) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("stored content type {:?} for {:?} is invalid: {}", mime_str, path, e);
            None
        },
    }
}
