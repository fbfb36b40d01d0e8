//! Resources backed by files in a content directory.
use std::fs;
use std::fs::{
    File,
    OpenOptions,
};
use std::io;
use std::io::{
    Read,
    Seek,
    SeekFrom,
    Write,
};
use std::path::{
    Component,
    Path,
    PathBuf,
};
use std::time::SystemTime;

use log::{
    debug,
    info,
    warn,
};
use sha2::{
    Digest,
    Sha256,
};
use tempfile::NamedTempFile;

use crate::auth::Auth;
use crate::error::{
    Error,
    Result,
};
use crate::meta::{
    get_type,
    is_meta_path,
    register_type_str,
};
use crate::range::{
    send_bytes,
    Range,
};
use crate::resource::{
    PartiallyUpdateable,
    Replaceable,
    Resource,
    ResourceFactory,
};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Hex SHA256 of the path relative to the content directory.
fn path_key(name: &str) -> String {
    let mut h = Sha256::new();
    h.update(name.as_bytes());
    hex::encode(h.finalize())
}

/// Writes `content` to a temporary file next to `path` and moves it into place.
fn write_file(path: &Path, content: &mut dyn Read, expected_size: Option<u64>) -> Result<u64> {
    let dir = match path.parent() {
        Some(v) => v,
        None => {
            return Err(Error::Forbidden(path.display().to_string()));
        },
    };
    let mut of = NamedTempFile::new_in(dir)?;
    debug!("writing to tempfile {:?} expected size {:?}", of.path(), expected_size);
    let total_size = io::copy(content, &mut of)?;
    if let Some(v) = expected_size {
        if v != total_size {
            warn!("expected {} bytes for {:?} but got {}", v, path, total_size);
        }
    }
    of.as_file().sync_all()?;
    of.persist(path).map_err(|e| e.error)?;
    Ok(total_size)
}

pub struct FileResource {
    path: PathBuf,
    name: String,
    unique_id: String,
    max_age: Option<u64>,
}

impl FileResource {
    pub fn new(path: PathBuf, name: &str, max_age: Option<u64>) -> FileResource {
        FileResource {
            path,
            name: name.to_string(),
            unique_id: path_key(name),
            max_age,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Resource for FileResource {
    fn unique_id(&self) -> Option<String> {
        Some(self.unique_id.clone())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn modified_date(&self) -> Option<SystemTime> {
        match fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(v) => Some(v),
            Err(e) => {
                debug!("no modified date for {:?}: {}", self.path, e);
                None
            },
        }
    }

    fn max_age_seconds(&self, _auth: Option<&Auth>) -> Option<u64> {
        self.max_age
    }

    fn content_type(&self, _accepts: Option<&str>) -> Option<String> {
        match get_type(&self.path) {
            Some(v) => Some(v.to_string()),
            None => Some(DEFAULT_CONTENT_TYPE.to_string()),
        }
    }

    fn content_length(&self) -> Option<u64> {
        fs::metadata(&self.path).ok().map(|m| m.len())
    }

    fn send_content(&self, out: &mut dyn Write, range: Option<&Range>) -> Result<()> {
        let mut f = File::open(&self.path)?;
        let r = match range {
            Some(v) => v,
            None => {
                io::copy(&mut f, out)?;
                return Ok(());
            },
        };
        let total = f.metadata()?.len();
        let resolved = match r.resolve(total) {
            Some(v) => v,
            None => {
                debug!("range {} is past end of {} ({} bytes)", r, self.name, total);
                return Ok(());
            },
        };
        let (start, length) = match (resolved.start(), resolved.length()) {
            (Some(s), Some(l)) => (s, l),
            _ => {
                return Ok(());
            },
        };
        f.seek(SeekFrom::Start(start))?;
        send_bytes(&mut f, out, length)?;
        Ok(())
    }

    fn as_replaceable(&self) -> Option<&dyn Replaceable> {
        Some(self)
    }

    fn as_partially_updateable(&self) -> Option<&dyn PartiallyUpdateable> {
        Some(self)
    }
}

impl Replaceable for FileResource {
    fn replace_content(&self, content: &mut dyn Read, length: Option<u64>) -> Result<()> {
        let c = write_file(&self.path, content, length)?;
        info!("replaced {} with {} bytes", self.name, c);
        Ok(())
    }
}

impl PartiallyUpdateable for FileResource {
    /// Writes in place, extending the file if the range reaches past its end.
    fn replace_partial_content(&self, range: &Range, content: &mut dyn Read) -> Result<()> {
        let start = match range.start() {
            Some(v) => v,
            None => {
                return Err(Error::BadContentRange(range.to_string()));
            },
        };
        let mut f = OpenOptions::new().write(true).open(&self.path)?;
        f.seek(SeekFrom::Start(start))?;
        let c = io::copy(content, &mut f)?;
        f.sync_all()?;
        debug!("wrote {} bytes at {} of {}", c, start, self.name);
        Ok(())
    }
}

/// Maps request paths to files under a content directory.
pub struct FileResourceFactory {
    base: PathBuf,
    max_age: Option<u64>,
}

impl FileResourceFactory {
    pub fn new(base: &Path, max_age: Option<u64>) -> FileResourceFactory {
        FileResourceFactory {
            base: base.to_path_buf(),
            max_age,
        }
    }

    /// Relative name and full path for a request path. Parent directory
    /// components are refused.
    fn resolve(&self, path: &str) -> Result<(String, PathBuf)> {
        let mut parts: Vec<&str> = vec!();
        for c in Path::new(path.trim_start_matches('/')).components() {
            match c {
                Component::Normal(v) => {
                    match v.to_str() {
                        Some(s) => parts.push(s),
                        None => {
                            return Err(Error::Forbidden(path.to_string()));
                        },
                    };
                },
                Component::CurDir => {},
                _ => {
                    return Err(Error::Forbidden(path.to_string()));
                },
            }
        }
        let name = parts.join("/");
        let mut fp = self.base.clone();
        for p in parts.iter() {
            fp.push(p);
        }
        debug!("url {} resolved to {:?}", path, fp);
        Ok((name, fp))
    }
}

impl ResourceFactory for FileResourceFactory {
    fn resource(&self, path: &str) -> Result<Option<Box<dyn Resource>>> {
        if is_meta_path(path) {
            return Ok(None);
        }
        let (name, fp) = self.resolve(path)?;
        if !fp.is_file() {
            return Ok(None);
        }
        Ok(Some(Box::new(FileResource::new(fp, &name, self.max_age))))
    }

    fn create(&self, path: &str, content: &mut dyn Read, length: Option<u64>, content_type: Option<&str>) -> Result<Box<dyn Resource>> {
        if is_meta_path(path) {
            return Err(Error::Forbidden(path.to_string()));
        }
        let (name, fp) = self.resolve(path)?;
        if name.len() == 0 || fp.is_dir() {
            return Err(Error::Forbidden(path.to_string()));
        }
        if let Some(dir) = fp.parent() {
            fs::create_dir_all(dir)?;
        }
        let c = write_file(&fp, content, length)?;
        if let Some(v) = content_type {
            register_type_str(&fp, v)?;
        }
        info!("created {} with {} bytes", name, c);
        Ok(Box::new(FileResource::new(fp, &name, self.max_age)))
    }
}
