//! Common error types for strata.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`StrataError`].
pub type StrataResult<T> = Result<T, StrataError>;

/// Errors raised while injecting artifacts or generating layer provenance.
#[derive(Error, Diagnostic, Debug)]
pub enum StrataError {
    /// A session, staged mount, or snapshot could not be acquired.
    #[error("Failed to set up {resource}: {message}")]
    #[diagnostic(code(strata::setup))]
    Setup {
        /// The resource being acquired.
        resource: String,
        /// Why acquisition failed.
        message: String,
    },

    /// A command dispatched into a build session failed.
    #[error("Command `{command}` failed inside session: {status}")]
    #[diagnostic(code(strata::dispatch))]
    Dispatch {
        /// The rendered command line.
        command: String,
        /// Exit status or spawn failure description.
        status: String,
    },

    /// A command dispatched into a build session ran past its deadline.
    #[error("Command `{command}` timed out after {seconds}s")]
    #[diagnostic(
        code(strata::dispatch::timeout),
        help("Raise --dispatch-timeout or check the build step for a hang")
    )]
    DispatchTimeout {
        /// The rendered command line.
        command: String,
        /// The timeout that elapsed.
        seconds: u64,
    },

    /// Reading a regular file for its checksum failed.
    #[error("Failed to checksum {}: {source}", path.display())]
    #[diagnostic(code(strata::checksum))]
    Checksum {
        /// The file being hashed.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Encoding or writing an artifact failed.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(strata::serialization))]
    Serialization(String),

    /// The SBOM generator failed.
    #[error("BOM generation failed: {message}")]
    #[diagnostic(code(strata::bom))]
    BomGeneration {
        /// The generator's error message.
        message: String,
    },

    /// A file mode argument was not valid octal.
    #[error("Invalid file mode: {value}")]
    #[diagnostic(
        code(strata::invalid_mode),
        help("Use octal permission bits such as '644' or '0755'")
    )]
    InvalidMode {
        /// The rejected value.
        value: String,
    },

    /// An ownership argument was not `uid` or `uid:gid`.
    #[error("Invalid owner: {value}")]
    #[diagnostic(
        code(strata::invalid_owner),
        help("Use a numeric uid, optionally followed by ':gid'")
    )]
    InvalidOwner {
        /// The rejected value.
        value: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(strata::io))]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(strata::config))]
    Config {
        /// The error message.
        message: String,
    },

    /// Feature not supported on this platform.
    #[error("Feature not supported: {feature}")]
    #[diagnostic(code(strata::unsupported), help("strata build sessions require Linux"))]
    Unsupported {
        /// The unsupported feature.
        feature: String,
    },
}

impl StrataError {
    /// Build a [`StrataError::Setup`] from any displayable cause.
    pub fn setup(resource: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Setup {
            resource: resource.into(),
            message: cause.to_string(),
        }
    }

    /// Build a [`StrataError::Config`] from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for StrataError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for StrataError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
