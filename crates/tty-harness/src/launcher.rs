//! Startup sequence: boot the sandbox, wire the console, install, run.

use std::path::Path;

use anyhow::{Context, Result};
use sandbox_tty::{HostStreams, StreamInstaller};
use sandbox_vfs::{Fd, FsCore};
use tracing::{debug, info, warn};

use crate::artifact::{find_artifact, Artifact, ArtifactError};
use crate::config::HarnessConfig;
use crate::guest::Guest;

pub struct Launcher {
    config: HarnessConfig,
}

impl Launcher {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Find the artifact under `<pkg_dir>/dist`
    pub async fn locate(&self, pkg_dir: &Path) -> Result<Artifact, ArtifactError> {
        find_artifact(&pkg_dir.join("dist"), &self.config.artifact_suffix).await
    }

    /// Create the sandbox filesystem with its console wired to `host`.
    pub fn boot(&self, host: HostStreams) -> Result<FsCore> {
        let fs = FsCore::new(self.config.fs.clone()).context("Failed to create sandbox filesystem")?;
        let installed = StreamInstaller::new(self.config.streams.clone())
            .install(&fs, host)
            .context("Failed to wire console streams")?;
        debug!("console devices: {:?}", installed);

        fs.mkdir_all(&self.config.workdir, 0o755)
            .with_context(|| format!("Failed to create {}", self.config.workdir))?;
        fs.chdir(&self.config.workdir)
            .with_context(|| format!("Failed to enter {}", self.config.workdir))?;
        Ok(fs)
    }

    /// Requirement specifiers for the guest: test dependencies, then the artifact
    pub fn requirements(&self, artifact: &Artifact) -> Vec<String> {
        self.config
            .requirements
            .iter()
            .chain(&self.config.extra_requirements)
            .cloned()
            .chain(std::iter::once(artifact.url()))
            .collect()
    }

    /// Run `guest` against `artifact` and return its exit code.
    pub fn execute(
        &self,
        artifact: &Artifact,
        test_args: &[String],
        guest: &mut dyn Guest,
        host: HostStreams,
    ) -> Result<i32> {
        let fs = self.boot(host)?;

        let requirements = self.requirements(artifact);
        info!("Installing {} packages", requirements.len());
        guest
            .install_packages(&fs, &requirements)
            .context("Package installation failed")?;

        info!("Running tests with args {:?}", test_args);
        let result = guest.run(&fs, test_args);

        for fd in [Fd::STDOUT, Fd::STDERR] {
            if let Err(e) = fs.fsync(fd) {
                warn!("Failed to flush guest fd {}: {}", fd, e);
            }
        }
        result
    }
}
