//! Harness configuration

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use sandbox_tty::WiringConfig;
use sandbox_vfs::FsConfig;
use serde::{Deserialize, Serialize};

use crate::artifact::DEFAULT_ARTIFACT_SUFFIX;

/// Everything the launcher needs besides the package directory
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// File-name suffix identifying the artifact in `<pkg_dir>/dist`
    pub artifact_suffix: String,
    /// Test dependencies installed before the artifact
    pub requirements: Vec<String>,
    /// Appended after `requirements`, before the artifact itself
    pub extra_requirements: Vec<String>,
    /// Sandbox directory the guest starts in
    pub workdir: String,
    pub streams: WiringConfig,
    pub fs: FsConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            artifact_suffix: DEFAULT_ARTIFACT_SUFFIX.to_string(),
            requirements: [
                "cython>=0.29.30,<3.0",
                "wheel==0.37.0",
                "setuptools==59.2.0",
                "hypothesis==6.24.1",
                "pytest==6.2.5",
                "pytz==2021.3",
                "typing_extensions>=4.2.0",
            ]
            .map(String::from)
            .to_vec(),
            extra_requirements: vec!["tomli".to_string()],
            workdir: "/lib/python3.10/site-packages".to_string(),
            streams: WiringConfig::default(),
            fs: FsConfig::default(),
        }
    }
}

/// Load a JSON config, or the defaults when no path is given
pub fn load_config(config_path: Option<&Path>) -> Result<HarnessConfig> {
    match config_path {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            let config: HarnessConfig = serde_json::from_str(&content)
                .with_context(|| format!("Invalid config {}", path.display()))?;
            Ok(config)
        }
        None => Ok(HarnessConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_loading_default() {
        let config = load_config(None).unwrap();
        assert_eq!(config.artifact_suffix, "wasm32.whl");
        assert_eq!(config.requirements.len(), 7);
        assert!(config.requirements.contains(&"pytest==6.2.5".to_string()));
        assert_eq!(config.extra_requirements, vec!["tomli"]);
        assert!(config.fs.standard_streams);
    }

    #[test]
    fn test_config_loading_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(
            temp_file,
            r#"{{"artifact_suffix": "any.whl", "requirements": ["pytest"], "streams": {{"read_chunk_size": 64}}}}"#
        )
        .unwrap();

        let config = load_config(Some(temp_file.path())).unwrap();
        assert_eq!(config.artifact_suffix, "any.whl");
        assert_eq!(config.requirements, vec!["pytest"]);
        assert_eq!(config.streams.read_chunk_size, 64);
        assert_eq!(config.streams.tty_path, "/dev/hosttty");
        assert_eq!(config.workdir, "/lib/python3.10/site-packages");
    }

    #[test]
    fn test_config_loading_invalid() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "not json").unwrap();
        assert!(load_config(Some(temp_file.path())).is_err());
    }
}
