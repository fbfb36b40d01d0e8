use std::time::{
    SystemTime,
    UNIX_EPOCH,
};

use crate::resource::Resource;

/// Derives the opaque version token sent in `ETag` headers.
pub trait ETagGenerator: Send + Sync {
    /// Returns `None` when the resource cannot be versioned.
    fn generate_etag(&self, resource: Option<&dyn Resource>) -> Option<String>;
}

/// Builds the tag from the resource unique id and a hash of its modified date.
///
/// Format is `"{unique_id}_{hash}"`, or `"{unique_id}"` when the resource has no
/// modified date. A resource without a unique id has no tag.
#[derive(Debug, Default, Clone)]
pub struct DefaultETagGenerator;

impl ETagGenerator for DefaultETagGenerator {
    fn generate_etag(&self, resource: Option<&dyn Resource>) -> Option<String> {
        let r = resource?;
        let mut etag = r.unique_id()?;
        if let Some(modified) = r.modified_date() {
            etag.push('_');
            etag.push_str(&date_hash(modified).to_string());
        }
        Some(format!("\"{}\"", etag))
    }
}

/// Millisecond timestamp folded to 32 bits, high word xor low word.
pub fn date_hash(t: SystemTime) -> i32 {
    let ms: i64 = match t.duration_since(UNIX_EPOCH) {
        Ok(v) => v.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    };
    (ms ^ ((ms as u64) >> 32) as i64) as i32
}
