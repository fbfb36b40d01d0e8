//! The authenticated principal of a request.
//!
//! Credentials are not verified here. The principal only feeds
//! [Resource::max_age_seconds](crate::resource::Resource::max_age_seconds), which may
//! grant different cache lifetimes to different users.
use std::str::FromStr;
use std::error::Error;
use std::fmt;

use log::debug;

#[derive(Clone, PartialEq)]
pub struct Auth {
    pub method: String,
    pub user: Option<String>,
    token: String,
}

#[derive(Debug)]
pub struct AuthSpecError;

impl Error for AuthSpecError {
    fn description(&self) -> &str{
        "auth string malformed"
    }
}

impl fmt::Display for AuthSpecError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str("auth string malformed")
    }
}

impl Auth {
    /// Principal carrying only a user name, for resources and tests that need no header.
    pub fn user(name: &str) -> Auth {
        Auth {
            method: String::from("Basic"),
            user: Some(name.to_string()),
            token: String::new(),
        }
    }

    /// Raw credentials as sent after the scheme name.
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl FromStr for Auth {
    type Err = AuthSpecError;

    /// Parses an `Authorization` header value.
    ///
    /// `Basic` credentials yield the user part of `user:password`; any other
    /// scheme keeps its token without a user.
    fn from_str(s: &str) -> Result<Auth, AuthSpecError> {
        let mut auth_fields = s.trim().splitn(2, ' ');
        let method = match auth_fields.next() {
            Some(v) if v.len() > 0 => v.to_string(),
            _ => return Err(AuthSpecError{}),
        };
        let token = match auth_fields.next() {
            Some(v) if v.trim().len() > 0 => v.trim().to_string(),
            _ => return Err(AuthSpecError{}),
        };

        let mut user: Option<String> = None;
        if method.eq_ignore_ascii_case("basic") {
            let decoded = match base64::decode(&token) {
                Ok(v) => v,
                Err(e) => {
                    debug!("basic credentials not base64: {}", e);
                    return Err(AuthSpecError{});
                },
            };
            let credentials = match String::from_utf8(decoded) {
                Ok(v) => v,
                Err(_) => return Err(AuthSpecError{}),
            };
            match credentials.split_once(':') {
                Some((name, _)) => {
                    user = Some(name.to_string());
                },
                None => {
                    return Err(AuthSpecError{});
                },
            }
        }

        Ok(Auth{
            method,
            user,
            token,
        })
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{} user {:?}", self.method, self.user)
    }
}
