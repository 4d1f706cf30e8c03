//! Config file discovery and parsing
//!
//! Files are YAML or JSON, chosen by extension. A versioned [`ConfigFile`]
//! wraps the run settings.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::RunConfig;

/// Searched in order; the first existing file wins.
const SEARCH_PATHS: &[&str] = &[
    "./suite-runner.yaml",
    "./suite-runner.yml",
    "./suite-runner.json",
    "./.suite-runner/config.yaml",
    "~/.config/suite-runner/config.yaml",
    "~/.suite-runner.yaml",
];

const SUPPORTED_VERSIONS: &[&str] = &["1"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

impl Format {
    /// `.yaml`/`.yml` are YAML, anything else is JSON.
    pub fn of(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => Format::Yaml,
            _ => Format::Json,
        }
    }
}

/// Deserialize `path` in the format its extension names.
pub(crate) fn read<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;
    let value = match Format::of(path) {
        Format::Yaml => serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid YAML in {}", path.display()))?,
        Format::Json => serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?,
    };
    Ok(value)
}

/// On-disk configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default = "current_version")]
    pub version: String,

    #[serde(default)]
    pub run: RunConfig,
}

fn current_version() -> String {
    SUPPORTED_VERSIONS[SUPPORTED_VERSIONS.len() - 1].to_string()
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            version: current_version(),
            run: RunConfig::default(),
        }
    }
}

impl ConfigFile {
    /// First existing file among the search paths
    pub fn find() -> Option<PathBuf> {
        SEARCH_PATHS
            .iter()
            .map(|candidate| home_relative(candidate))
            .find(|path| path.is_file())
    }

    /// The discovered file, or defaults when there is none.
    pub fn load_default() -> Result<Self> {
        match Self::find() {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: Self = read(path)?;
        config
            .validate()
            .with_context(|| format!("Rejected {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_VERSIONS.contains(&self.version.as_str()) {
            anyhow::bail!(
                "config version {:?} is not one of {:?}",
                self.version,
                SUPPORTED_VERSIONS
            );
        }
        let run = &self.run;
        if run.processes == 0 {
            anyhow::bail!("processes must be at least 1");
        }
        if run.max_tasks_per_worker == Some(0) {
            anyhow::bail!("max_tasks_per_worker must be at least 1 when set");
        }
        if run.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be positive");
        }
        Ok(())
    }
}

/// Resolve a leading `~/` against the home directory.
fn home_relative(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
