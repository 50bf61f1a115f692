//! Shared-secret access control.
//!
//! Reads and writes are guarded by independent optional tokens. A request
//! presents its token either as `Authorization: Bearer <token>` or as a
//! `token` query parameter.

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use serde::Deserialize;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl Access {
    fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

/// `?token=` query parameter.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessTokens {
    read: Option<String>,
    write: Option<String>,
}

impl AccessTokens {
    pub fn new(read: Option<String>, write: Option<String>) -> Self {
        // An empty token is the same as no token.
        Self {
            read: read.filter(|t| !t.is_empty()),
            write: write.filter(|t| !t.is_empty()),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.read_token.clone(), config.write_token.clone())
    }

    pub fn required(&self, access: Access) -> Option<&str> {
        match access {
            Access::Read => self.read.as_deref(),
            Access::Write => self.write.as_deref(),
        }
    }

    pub fn check(&self, access: Access, presented: Option<&str>) -> ServerResult<()> {
        match self.required(access) {
            None => Ok(()),
            Some(expected) if presented == Some(expected) => Ok(()),
            Some(_) => Err(ServerError::Forbidden(access.as_str())),
        }
    }

    /// Check the token carried by a request's headers or query string.
    pub fn authorize(&self, access: Access, headers: &HeaderMap, query: &TokenQuery) -> ServerResult<()> {
        self.check(access, presented_token(headers, query))
    }
}

/// The bearer token takes precedence over the query parameter.
pub fn presented_token<'a>(headers: &'a HeaderMap, query: &'a TokenQuery) -> Option<&'a str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .or(query.token.as_deref())
}
