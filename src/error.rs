//! # Error types
//!
//! The failure taxonomy shared by tag resolution, templating and the
//! override engine. Whether a given error is fatal depends on where it
//! surfaces: the override engine skips the offending operation with a
//! warning, while link naming treats the same error as a configuration
//! mistake and aborts the run.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while resolving tags and rendering templates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A template referenced a tag that could not be resolved.
    #[error("unknown key '{key}'")]
    MissingKey { key: String },

    /// Malformed template syntax: unbalanced braces or slashes, a bad
    /// format directive, an invalid inline regex, or a fallback chain
    /// that never bottoms out.
    #[error("failed to parse '{template}': {reason}")]
    Parse { template: String, reason: String },

    /// `{NAME/.../}` expansion applied to a value that is not a regex match.
    #[error("field '{field}' did not capture a regex match and cannot be expanded")]
    FieldRegexExpand { field: String },

    /// Invalid configuration, detected before any file is processed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn missing_key(key: impl Into<String>) -> Self {
        Error::MissingKey { key: key.into() }
    }

    pub(crate) fn parse(template: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Parse {
            template: template.into(),
            reason: reason.into(),
        }
    }
}
