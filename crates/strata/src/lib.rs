//! # Strata
//!
//! Artifact injection and layer provenance for daemonless OCI image builds.
//!
//! ## Features
//!
//! - **Artifact injection**: copy a file out of a build session with the
//!   running strata binary staged inside it, so none of the session's own
//!   tools are executed
//! - **Layer provenance**: an SPDX SBOM generated inside a throwaway
//!   snapshot of a built layer
//! - **Filesystem inventory**: content-hashed listing of a root filesystem
//!
//! ## Usage
//!
//! ```no_run
//! use strata::config::BuildConfig;
//! use strata::inject::InjectionRequest;
//! use strata::builder::LayerBuilder;
//!
//! # async fn example() -> strata_common::StrataResult<()> {
//! let builder = LayerBuilder::new(BuildConfig::default())?;
//!
//! let request = InjectionRequest::new("/etc/os-release", "/tmp/out").with_mode(0o644);
//! builder.inject("alpine-build", &request).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod guard;

pub mod bom;
pub mod builder;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod inject;
pub mod internal;
pub mod inventory;
pub mod provenance;
pub mod session;
pub mod setup;
pub mod storage;

pub use builder::LayerBuilder;
pub use config::BuildConfig;
pub use inject::InjectionRequest;
pub use inventory::{Inventory, InventoryEntry};
