//! Software bill of materials generation.
//!
//! The provenance generator only depends on [`BomGenerator`]; the bundled
//! [`SpdxGenerator`] is one implementation of it.

mod spdx;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use strata_common::{StrataError, StrataResult};

pub use spdx::SpdxGenerator;

/// Serialization of the SBOM document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BomFormat {
    /// SPDX tag-value text.
    #[default]
    TagValue,
    /// SPDX JSON.
    Json,
}

impl FromStr for BomFormat {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "tag-value" | "tv" | "" => Ok(Self::TagValue),
            other => Err(StrataError::config(format!("unknown SBOM format '{other}'"))),
        }
    }
}

impl fmt::Display for BomFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TagValue => "tag-value",
            Self::Json => "json",
        })
    }
}

/// What to scan and where to write the result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BomOptions {
    /// Document name; derived from the first source when empty.
    pub name: String,
    /// Document namespace URI; generated when `None`.
    pub namespace: Option<String>,
    /// License declared for every package.
    pub license: Option<String>,
    /// Output serialization.
    pub format: BomFormat,
    /// Directories scanned as packages.
    pub directories: Vec<PathBuf>,
    /// Individual files.
    pub files: Vec<PathBuf>,
    /// Container image references.
    pub images: Vec<String>,
    /// Output file; nothing is written when `None`.
    pub output: Option<PathBuf>,
    /// Also write an in-toto provenance statement here.
    pub provenance_path: Option<PathBuf>,
}

impl BomOptions {
    /// Scan one directory and write the document to `output`.
    pub fn for_directory(root: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            directories: vec![root.into()],
            output: Some(output.into()),
            ..Self::default()
        }
    }
}

/// An SBOM generator.
pub trait BomGenerator {
    /// Generate and write the document described by `options`.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::BomGeneration`] on any failure.
    fn generate(&self, options: &BomOptions) -> StrataResult<()>;
}

/// Scan `root` and write an SPDX document to `dest`.
///
/// # Errors
///
/// Returns [`StrataError::BomGeneration`] on any failure.
pub fn generate_bom(root: &Path, dest: &Path) -> StrataResult<()> {
    SpdxGenerator.generate(&BomOptions::for_directory(root, dest))
}
