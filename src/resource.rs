//! Interfaces to the content being served.
//!
//! Resources are owned by whatever backs them (the filesystem in
//! [record](crate::record), anything else for library users). Handlers only read
//! their attributes and ask them to write or replace their content.
//!
//! Optional capabilities are advertised through the `as_*` accessors rather
//! than by type: a resource that can be overwritten returns itself from
//! [Resource::as_replaceable], one that can splice a byte range in place returns
//! itself from [Resource::as_partially_updateable].
use std::io::{
    Read,
    Write,
};
use std::time::SystemTime;

use crate::auth::Auth;
use crate::error::Result;
use crate::range::Range;

pub trait Resource: Send + Sync {
    /// Stable identifier, `None` disables ETags for this resource.
    fn unique_id(&self) -> Option<String>;

    fn name(&self) -> &str;

    fn modified_date(&self) -> Option<SystemTime>;

    /// How long clients may cache the content, `None` means always revalidate.
    fn max_age_seconds(&self, auth: Option<&Auth>) -> Option<u64>;

    /// MIME type of the content. May be a comma separated list, the first
    /// entry is used.
    fn content_type(&self, accepts: Option<&str>) -> Option<String>;

    /// Total length in bytes, `None` when unknown until the content is read.
    fn content_length(&self) -> Option<u64>;

    /// Writes the content to `out`, only the bytes in `range` if one is given.
    fn send_content(&self, out: &mut dyn Write, range: Option<&Range>) -> Result<()>;

    /// Overrides the server buffering policy when `Some`.
    fn buffering_required(&self) -> Option<bool> {
        None
    }

    fn as_replaceable(&self) -> Option<&dyn Replaceable> {
        None
    }

    fn as_partially_updateable(&self) -> Option<&dyn PartiallyUpdateable> {
        None
    }
}

/// A resource whose whole content can be overwritten.
pub trait Replaceable {
    fn replace_content(&self, content: &mut dyn Read, length: Option<u64>) -> Result<()>;
}

/// A resource able to merge a byte range into its own content.
pub trait PartiallyUpdateable {
    fn replace_partial_content(&self, range: &Range, content: &mut dyn Read) -> Result<()>;
}

/// Resolves request paths to resources.
pub trait ResourceFactory: Send + Sync {
    fn resource(&self, path: &str) -> Result<Option<Box<dyn Resource>>>;

    /// Creates a new resource at `path` from a request body.
    fn create(&self, path: &str, content: &mut dyn Read, length: Option<u64>, content_type: Option<&str>) -> Result<Box<dyn Resource>>;
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::{
        Cursor,
        Read,
        Write,
    };
    use std::sync::Mutex;
    use std::time::{
        Duration,
        SystemTime,
        UNIX_EPOCH,
    };

    use crate::auth::Auth;
    use crate::error::Result;
    use crate::range::{
        write_range,
        Range,
    };

    use super::{
        PartiallyUpdateable,
        Replaceable,
        Resource,
    };

    /// Resource holding its content in memory.
    pub struct MemoryResource {
        name: String,
        unique_id: Option<String>,
        modified: Option<SystemTime>,
        pub max_age: Option<u64>,
        pub content_type: Option<String>,
        pub known_length: bool,
        pub native_partial: bool,
        pub buffering: Option<bool>,
        pub content: Mutex<Vec<u8>>,
    }

    impl MemoryResource {
        pub fn new(name: &str, content: &[u8]) -> MemoryResource {
            MemoryResource {
                name: name.to_string(),
                unique_id: Some(name.to_string()),
                modified: Some(UNIX_EPOCH + Duration::from_secs(1_600_000_000)),
                max_age: Some(60),
                content_type: Some(String::from("text/plain")),
                known_length: true,
                native_partial: false,
                buffering: None,
                content: Mutex::new(content.to_vec()),
            }
        }

        pub fn set_modified(&mut self, t: SystemTime) {
            self.modified = Some(t);
        }

        pub fn clear_modified(&mut self) {
            self.modified = None;
        }

        pub fn clear_unique_id(&mut self) {
            self.unique_id = None;
        }

        pub fn bytes(&self) -> Vec<u8> {
            self.content.lock().unwrap().clone()
        }
    }

    impl Resource for MemoryResource {
        fn unique_id(&self) -> Option<String> {
            self.unique_id.clone()
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn modified_date(&self) -> Option<SystemTime> {
            self.modified
        }

        fn max_age_seconds(&self, _auth: Option<&Auth>) -> Option<u64> {
            self.max_age
        }

        fn content_type(&self, _accepts: Option<&str>) -> Option<String> {
            self.content_type.clone()
        }

        fn content_length(&self) -> Option<u64> {
            if !self.known_length {
                return None;
            }
            Some(self.content.lock().unwrap().len() as u64)
        }

        fn send_content(&self, out: &mut dyn Write, range: Option<&Range>) -> Result<()> {
            let data = self.bytes();
            let mut f = Cursor::new(data);
            write_range(&mut f, range, out)?;
            Ok(())
        }

        fn buffering_required(&self) -> Option<bool> {
            self.buffering
        }

        fn as_replaceable(&self) -> Option<&dyn Replaceable> {
            Some(self)
        }

        fn as_partially_updateable(&self) -> Option<&dyn PartiallyUpdateable> {
            if self.native_partial {
                return Some(self);
            }
            None
        }
    }

    impl Replaceable for MemoryResource {
        fn replace_content(&self, content: &mut dyn Read, _length: Option<u64>) -> Result<()> {
            let mut v: Vec<u8> = vec!();
            content.read_to_end(&mut v)?;
            *self.content.lock().unwrap() = v;
            Ok(())
        }
    }

    impl PartiallyUpdateable for MemoryResource {
        fn replace_partial_content(&self, range: &Range, content: &mut dyn Read) -> Result<()> {
            let mut v: Vec<u8> = vec!();
            content.read_to_end(&mut v)?;
            let start = range.start().unwrap_or(0) as usize;
            let mut data = self.content.lock().unwrap();
            if data.len() < start + v.len() {
                data.resize(start + v.len(), 0);
            }
            data[start..start + v.len()].copy_from_slice(&v);
            Ok(())
        }
    }
}
