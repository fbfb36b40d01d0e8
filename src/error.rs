use std::io;

use tiny_http::StatusCode;

/// Failures surfaced by handlers and resources.
///
/// Precondition failures, not-modified and unsatisfiable ranges are not
/// errors; they are answered with a [Response](crate::response::Response).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed range header: {0}")]
    BadRange(String),

    #[error("malformed content-range header: {0}")]
    BadContentRange(String),

    #[error("resource {0} supports neither partial update nor replacement")]
    PartialUpdateUnsupported(String),

    #[error("resource {0} cannot be replaced")]
    NotReplaceable(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("access to {0} denied")]
    Forbidden(String),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// HTTP status the dispatcher answers with for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::BadRange(_) => StatusCode(400),
            Error::BadContentRange(_) => StatusCode(400),
            Error::PartialUpdateUnsupported(_) => StatusCode(400),
            Error::NotReplaceable(_) => StatusCode(405),
            Error::NotFound(_) => StatusCode(404),
            Error::Forbidden(_) => StatusCode(403),
            Error::Io(_) => StatusCode(500),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
