//! Error taxonomy shared by every core component.
//!
//! Every failure mode a component can produce maps to one of these variants;
//! nothing in the core panics except [`Error::Protocol`], which signals an
//! invariant violation rather than an expected failure.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("interrupted")]
    Interrupted,

    #[error("server clock is {offset_ms}ms out of sync with local clock")]
    ClockSkew { offset_ms: i64 },

    #[error("wrong credentials")]
    WrongCredentials,

    #[error("access denied")]
    AccessDenied,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("conflict at {path} requires a user decision but no prompt is configured")]
    InteractiveRequired { path: PathBuf },

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
