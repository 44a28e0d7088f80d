//! # strata-common
//!
//! Shared types for the strata layer builder.
//!
//! This crate provides:
//! - The error taxonomy used by every strata operation
//! - Standard filesystem paths, both on the host and inside build sessions

#![warn(missing_docs)]

pub mod error;
pub mod paths;

pub use error::{StrataError, StrataResult};
pub use paths::{SessionPaths, StrataPaths};
