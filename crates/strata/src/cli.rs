//! CLI command definitions and handlers.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};

use crate::builder::LayerBuilder;
use crate::config::GlobalArgs;
use crate::inject::InjectionRequest;
use crate::internal::{InternalCommand, parse_mode};
use crate::inventory::{build_inventory, generate_fs_inventory};
use crate::session::Stdin;
use crate::setup::LayerSpec;

/// Strata - artifact injection and layer provenance for OCI builds
#[derive(Parser)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Flags shared by every command and replayed into sessions.
    #[command(flatten)]
    pub global: GlobalArgs,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Copy a file out of a build session into a host directory
    Grab {
        /// Build session (root filesystem) name
        session: String,

        /// File to copy, as seen inside the session
        source: PathBuf,

        /// Host directory receiving the file
        target_dir: PathBuf,

        /// Octal mode applied to the copy
        #[arg(long, value_parser = parse_mode)]
        mode: Option<u32>,

        /// Owning uid applied to the copy
        #[arg(long)]
        uid: Option<u32>,

        /// Owning gid, applied together with --uid
        #[arg(long, requires = "uid")]
        gid: Option<u32>,
    },

    /// Generate provenance artifacts for a built layer
    LayerArtifacts {
        /// Layer tag
        tag: String,

        /// YAML file with the layer's environment and binds
        #[arg(long)]
        layer: Option<PathBuf>,
    },

    /// Write a content inventory of a filesystem tree
    Inventory {
        /// Directory to walk
        root: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Commands run by strata inside a build session
    #[command(hide = true)]
    Internal {
        /// The in-session command.
        #[command(subcommand)]
        command: InternalCommand,
    },
}

impl Cli {
    /// Whether debug logging was requested.
    #[must_use]
    pub fn debug(&self) -> bool {
        self.global.debug
    }

    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        let config = self.global.into_config();

        match self.command {
            Commands::Grab {
                session,
                source,
                target_dir,
                mode,
                uid,
                gid,
            } => {
                let mut request = InjectionRequest::new(source, target_dir);
                if let Some(mode) = mode {
                    request = request.with_mode(mode);
                }
                if let Some(uid) = uid {
                    request = request.with_owner(uid, gid);
                }

                LayerBuilder::new(config)?
                    .inject(&session, &request)
                    .await
                    .wrap_err_with(|| format!("Failed to grab from session {session}"))?;
                Ok(())
            }

            Commands::LayerArtifacts { tag, layer } => {
                let layer = match layer {
                    Some(path) => LayerSpec::from_file(&path)
                        .wrap_err_with(|| format!("Failed to load layer {}", path.display()))?,
                    None => LayerSpec::default(),
                };

                let bom = LayerBuilder::new(config)?
                    .generate_layer_artifacts(&layer, &tag, Stdin::Inherit)
                    .await
                    .wrap_err_with(|| format!("Failed to generate artifacts for layer {tag}"))?;
                println!("{}", bom.display());
                Ok(())
            }

            Commands::Inventory { root, output } => {
                match output {
                    Some(dest) => {
                        generate_fs_inventory(&root, &dest)?;
                    }
                    None => {
                        let inventory = build_inventory(&root)?;
                        println!("{}", serde_json::to_string_pretty(&inventory)?);
                    }
                }
                Ok(())
            }

            Commands::Internal { command } => {
                command.run()?;
                Ok(())
            }
        }
    }
}
