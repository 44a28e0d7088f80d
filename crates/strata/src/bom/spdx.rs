//! Built-in SPDX 2.3 generator.

use std::fmt::{self, Write as _};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use strata_common::{StrataError, StrataResult};
use walkdir::WalkDir;

use super::{BomFormat, BomGenerator, BomOptions};
use crate::inventory::sha256_hex;

const NOASSERTION: &str = "NOASSERTION";
const DOCUMENT_ID: &str = "SPDXRef-DOCUMENT";

/// Generates SPDX 2.3 documents listing every regular file with its
/// SHA-256 checksum.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpdxGenerator;

impl BomGenerator for SpdxGenerator {
    fn generate(&self, options: &BomOptions) -> StrataResult<()> {
        let doc = Document::build(options).map_err(|e| bom_err("generating doc", e))?;

        let markup = match options.format {
            BomFormat::Json => serde_json::to_string_pretty(&doc)
                .map_err(|e| bom_err("serializing document", e))?,
            BomFormat::TagValue => doc.to_string(),
        };

        if let Some(output) = options.output.as_deref().filter(|p| !p.as_os_str().is_empty()) {
            write_artifact(output, markup.as_bytes()).map_err(|e| bom_err("writing SBOM", e))?;
        }

        if let Some(path) = &options.provenance_path {
            let statement = serde_json::to_vec_pretty(&doc.provenance_statement())
                .map_err(|e| bom_err("writing SBOM as provenance statement", e))?;
            write_artifact(path, &statement)
                .map_err(|e| bom_err("writing SBOM as provenance statement", e))?;
        }

        tracing::info!(
            name = %doc.name,
            format = %options.format,
            files = doc.files.len(),
            "SBOM generated"
        );
        Ok(())
    }
}

fn bom_err(context: &str, err: impl fmt::Display) -> StrataError {
    StrataError::BomGeneration {
        message: format!("{context}: {err}"),
    }
}

fn write_artifact(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o664))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    spdx_version: &'static str,
    data_license: &'static str,
    #[serde(rename = "SPDXID")]
    spdx_id: &'static str,
    name: String,
    document_namespace: String,
    creation_info: CreationInfo,
    packages: Vec<Package>,
    files: Vec<File>,
    relationships: Vec<Relationship>,
}

#[derive(Debug, Serialize)]
struct CreationInfo {
    created: String,
    creators: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Package {
    name: String,
    #[serde(rename = "SPDXID")]
    spdx_id: String,
    download_location: &'static str,
    files_analyzed: bool,
    license_concluded: String,
    license_declared: String,
    copyright_text: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct File {
    file_name: String,
    #[serde(rename = "SPDXID")]
    spdx_id: String,
    checksums: Vec<Checksum>,
    license_concluded: &'static str,
    copyright_text: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Checksum {
    algorithm: &'static str,
    checksum_value: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Relationship {
    spdx_element_id: String,
    relationship_type: &'static str,
    related_spdx_element: String,
}

impl Relationship {
    fn new(from: &str, kind: &'static str, to: &str) -> Self {
        Self {
            spdx_element_id: from.to_string(),
            relationship_type: kind,
            related_spdx_element: to.to_string(),
        }
    }
}

impl Document {
    fn build(options: &BomOptions) -> StrataResult<Self> {
        if !options.images.is_empty() {
            return Err(StrataError::Unsupported {
                feature: "scanning container images".to_string(),
            });
        }

        let name = if options.name.is_empty() {
            options
                .directories
                .iter()
                .chain(&options.files)
                .next()
                .map_or_else(|| "strata-sbom".to_string(), |p| p.display().to_string())
        } else {
            options.name.clone()
        };

        let namespace = options.namespace.clone().unwrap_or_else(|| {
            let slug: String = name
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '-' })
                .collect();
            format!(
                "https://spdx.org/spdxdocs/{}-{}",
                slug.trim_matches('-'),
                uuid::Uuid::new_v4()
            )
        });

        let license = options.license.clone().unwrap_or_else(|| NOASSERTION.to_string());

        let mut doc = Self {
            spdx_version: "SPDX-2.3",
            data_license: "CC0-1.0",
            spdx_id: DOCUMENT_ID,
            name,
            document_namespace: namespace,
            creation_info: CreationInfo {
                created: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                creators: vec![format!("Tool: strata-{}", env!("CARGO_PKG_VERSION"))],
            },
            packages: Vec::new(),
            files: Vec::new(),
            relationships: Vec::new(),
        };

        for (index, dir) in options.directories.iter().enumerate() {
            doc.add_directory(index, dir, &license)?;
        }

        for path in &options.files {
            let id = doc.add_file(path.display().to_string(), path)?;
            doc.relationships
                .push(Relationship::new(DOCUMENT_ID, "DESCRIBES", &id));
        }

        Ok(doc)
    }

    fn add_directory(&mut self, index: usize, dir: &Path, license: &str) -> StrataResult<()> {
        if !dir.is_dir() {
            return Err(StrataError::config(format!(
                "{} is not a directory",
                dir.display()
            )));
        }

        let package_id = format!("SPDXRef-Package-{index}");
        self.packages.push(Package {
            name: dir.display().to_string(),
            spdx_id: package_id.clone(),
            download_location: NOASSERTION,
            files_analyzed: false,
            license_concluded: license.to_string(),
            license_declared: license.to_string(),
            copyright_text: NOASSERTION,
        });
        self.relationships
            .push(Relationship::new(DOCUMENT_ID, "DESCRIBES", &package_id));

        for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::debug!(error = %err, "Skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
            let id = self.add_file(format!("./{}", relative.display()), entry.path())?;
            self.relationships
                .push(Relationship::new(&package_id, "CONTAINS", &id));
        }

        Ok(())
    }

    fn add_file(&mut self, file_name: String, path: &Path) -> StrataResult<String> {
        let id = format!("SPDXRef-File-{}", self.files.len());
        self.files.push(File {
            file_name,
            spdx_id: id.clone(),
            checksums: vec![Checksum {
                algorithm: "SHA256",
                checksum_value: sha256_hex(path)?,
            }],
            license_concluded: NOASSERTION,
            copyright_text: NOASSERTION,
        });
        Ok(id)
    }

    /// in-toto statement naming every scanned file as a subject.
    fn provenance_statement(&self) -> serde_json::Value {
        let subjects: Vec<serde_json::Value> = self
            .files
            .iter()
            .map(|file| {
                serde_json::json!({
                    "name": file.file_name,
                    "digest": { "sha256": file.checksums[0].checksum_value },
                })
            })
            .collect();

        serde_json::json!({
            "_type": "https://in-toto.io/Statement/v0.1",
            "predicateType": "https://slsa.dev/provenance/v0.2",
            "subject": subjects,
            "predicate": {
                "builder": { "id": format!("strata-{}", env!("CARGO_PKG_VERSION")) },
                "buildType": "https://spdx.dev/Document",
                "metadata": {
                    "buildStartedOn": self.creation_info.created,
                    "buildFinishedOn": self.creation_info.created,
                },
                "materials": [],
            },
        })
    }
}

/// SPDX tag-value rendering.
impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        writeln!(out, "SPDXVersion: {}", self.spdx_version)?;
        writeln!(out, "DataLicense: {}", self.data_license)?;
        writeln!(out, "SPDXID: {}", self.spdx_id)?;
        writeln!(out, "DocumentName: {}", self.name)?;
        writeln!(out, "DocumentNamespace: {}", self.document_namespace)?;
        for creator in &self.creation_info.creators {
            writeln!(out, "Creator: {creator}")?;
        }
        writeln!(out, "Created: {}", self.creation_info.created)?;

        for package in &self.packages {
            writeln!(out)?;
            writeln!(out, "PackageName: {}", package.name)?;
            writeln!(out, "SPDXID: {}", package.spdx_id)?;
            writeln!(out, "PackageDownloadLocation: {}", package.download_location)?;
            writeln!(out, "FilesAnalyzed: {}", package.files_analyzed)?;
            writeln!(out, "PackageLicenseConcluded: {}", package.license_concluded)?;
            writeln!(out, "PackageLicenseDeclared: {}", package.license_declared)?;
            writeln!(out, "PackageCopyrightText: {}", package.copyright_text)?;
        }

        for file in &self.files {
            writeln!(out)?;
            writeln!(out, "FileName: {}", file.file_name)?;
            writeln!(out, "SPDXID: {}", file.spdx_id)?;
            for checksum in &file.checksums {
                writeln!(out, "FileChecksum: {}: {}", checksum.algorithm, checksum.checksum_value)?;
            }
            writeln!(out, "LicenseConcluded: {}", file.license_concluded)?;
            writeln!(out, "FileCopyrightText: {}", file.copyright_text)?;
        }

        if !self.relationships.is_empty() {
            writeln!(out)?;
        }
        for rel in &self.relationships {
            writeln!(
                out,
                "Relationship: {} {} {}",
                rel.spdx_element_id, rel.relationship_type, rel.related_spdx_element
            )?;
        }

        f.write_str(&out)
    }
}
