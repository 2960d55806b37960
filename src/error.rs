// src/error.rs

//! Error types for the reload engine.

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Raised by [`crate::interceptor::InterceptedResponse`] for a single response.
#[derive(Debug, Error)]
pub enum InterceptError {
    /// An HTML body chunk was declared in a text encoding other than UTF-8.
    #[error("HTML must be UTF-8, got a chunk declared as {encoding:?}")]
    NonUtf8Encoding { encoding: String },
    /// The body was already ended.
    #[error("write after the response body was ended")]
    WriteAfterEnd,
}

/// Failure of an external rebuild step.
#[derive(Debug, Error)]
pub enum RebuildError {
    #[error("rebuild rule {name:?} has an empty command")]
    EmptyCommand { name: String },
    #[error("failed to start rebuild {name:?}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("rebuild {name:?} for {path} exited with {status}: {stderr}")]
    Failed {
        name: String,
        path: PathBuf,
        status: ExitStatus,
        stderr: String,
    },
}

/// The push URL handed to browsers could not be normalised.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("push URL {0:?} is not valid percent-encoded UTF-8")]
    InvalidUrl(String),
}

/// Startup configuration problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Figment(#[from] figment::Error),
    #[error("invalid pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("invalid web address {0:?}")]
    Address(String),
}
