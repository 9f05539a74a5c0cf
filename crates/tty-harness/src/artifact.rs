//! Locating the locally built artifact the tests run against.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Default file-name suffix of the artifact under test
pub const DEFAULT_ARTIFACT_SUFFIX: &str = "wasm32.whl";

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Cannot read {dir}: {source}")]
    ReadDir {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No file ending in '{suffix}' found in {dir}")]
    NotFound { dir: PathBuf, suffix: String },
}

/// A build artifact found in a distribution directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    pub dist_dir: PathBuf,
    pub file_name: String,
}

impl Artifact {
    pub fn path(&self) -> PathBuf {
        self.dist_dir.join(&self.file_name)
    }

    /// `file:` URL handed to the package installer
    pub fn url(&self) -> String {
        format!("file:{}/{}", self.dist_dir.display(), self.file_name)
    }
}

/// Find the artifact in `dist_dir` whose name ends with `suffix`. When
/// several match, the lexicographically first one wins.
pub async fn find_artifact(dist_dir: &Path, suffix: &str) -> Result<Artifact, ArtifactError> {
    let read_dir_err = |source| ArtifactError::ReadDir {
        dir: dist_dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dist_dir).await.map_err(read_dir_err)?;
    let mut matches = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_dir_err)? {
        if let Some(name) = entry.file_name().to_str() {
            if name.ends_with(suffix) {
                matches.push(name.to_string());
            }
        }
    }

    matches.sort();
    debug!("artifacts matching '{}': {:?}", suffix, matches);
    matches
        .into_iter()
        .next()
        .map(|file_name| Artifact {
            dist_dir: dist_dir.to_path_buf(),
            file_name,
        })
        .ok_or_else(|| ArtifactError::NotFound {
            dir: dist_dir.to_path_buf(),
            suffix: suffix.to_string(),
        })
}
