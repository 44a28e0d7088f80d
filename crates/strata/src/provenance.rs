//! Layer provenance: an SBOM generated inside a snapshot of the layer.

use std::fs;
use std::path::{Path, PathBuf};

use strata_common::{SessionPaths, StrataError, StrataResult, paths};

use crate::builder::LayerBuilder;
use crate::dispatch::TrustedChannel;
use crate::session::{OpenSession, StageOptions, Stdin};
use crate::setup::LayerSpec;

impl LayerBuilder {
    /// Generate the SBOM artifact for the layer tagged `tag`.
    ///
    /// A writable snapshot of `tag` is opened as a session, the host
    /// directory `<state_dir>/artifacts/<tag>` is staged at
    /// [`SessionPaths::ARTIFACTS_DIR`], and the trusted binary is re-executed
    /// inside the session with this process's configuration replayed as
    /// flags. It writes [`SessionPaths::LAYER_BOM`] for
    /// [`SessionPaths::BOM_SCAN_ROOT`], which lands in the host directory and
    /// outlives the snapshot. The snapshot is released on every path.
    ///
    /// Returns the host path of the SBOM.
    ///
    /// # Errors
    ///
    /// Returns the first snapshot, setup or dispatch failure.
    pub async fn generate_layer_artifacts(
        &self,
        layer: &LayerSpec,
        tag: &str,
        stdin: Stdin,
    ) -> StrataResult<PathBuf> {
        paths::validate_name(tag)?;
        let artifacts = paths::artifacts_dir(&self.config.state_dir, tag);
        fs::create_dir_all(&artifacts)
            .map_err(|e| StrataError::setup(format!("create {}", artifacts.display()), e))?;

        let snapshot = self.storage.temporary_writable_snapshot(tag)?;

        let mut session = OpenSession::open(&*self.sessions, &self.config, snapshot.name())?;

        let _build = self
            .setup
            .configure_build(&self.config, &mut *session, tag)
            .inspect_err(|err| tracing::error!(tag, error = %err, "build session setup failed"))?;

        let _layer = self
            .setup
            .configure_layer(&self.config, &mut *session, layer, tag)?;

        let _artifacts = session.stage(
            &artifacts,
            Path::new(SessionPaths::ARTIFACTS_DIR),
            StageOptions::default(),
        )?;

        let channel = TrustedChannel::stage(&mut *session, &*self.binary)?;

        let command = channel.replay(
            &self.config,
            ["bom", SessionPaths::BOM_SCAN_ROOT, SessionPaths::LAYER_BOM],
        );
        channel.dispatch(&mut *session, &command, stdin).await?;

        let bom = artifacts.join(SessionPaths::LAYER_BOM_NAME);
        tracing::info!(
            tag,
            snapshot = %snapshot.name(),
            artifact = %bom.display(),
            "Layer artifacts generated"
        );
        Ok(bom)
    }
}
