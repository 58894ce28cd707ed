//! Project configuration read from `docweave.toml`.

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fs::read_to_string,
    path::{Path, PathBuf},
};

use crate::error::BuildError;

pub const CONFIG_FILE_NAME: &str = "docweave.toml";

pub const DEFAULT_VOLUME_NAME: &str = "default";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    pub title: Option<String>,
    #[serde(rename = "volume")]
    pub volumes: Vec<VolumeConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VolumeConfig {
    pub name: String,
    /// Directory holding the volume's pages, relative to the project root.
    pub path: PathBuf,
    pub primary: bool,
    pub numbering: bool,
    /// Word list enabling spell checking, relative to the project root.
    pub dictionary: Option<PathBuf>,
    pub style_checks: bool,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        VolumeConfig {
            name: DEFAULT_VOLUME_NAME.to_string(),
            path: PathBuf::from("."),
            primary: false,
            numbering: false,
            dictionary: None,
            style_checks: true,
        }
    }
}

impl ProjectConfig {
    /// Load `docweave.toml` from the project root, falling back to a single default volume when the
    /// file does not exist. The result is validated and has exactly one primary volume.
    pub fn load<P: AsRef<Path>>(root: P) -> Result<ProjectConfig, BuildError> {
        let path = root.as_ref().join(CONFIG_FILE_NAME);
        let config = if path.exists() {
            tracing::debug!("[Config] Reading {:?}", path);
            let content = read_to_string(&path)?;
            ProjectConfig::from_toml(&content)?
        } else {
            tracing::debug!("[Config] No {CONFIG_FILE_NAME} in {:?}, using defaults", root.as_ref());
            ProjectConfig::default()
        };
        config.normalized()
    }

    pub fn from_toml(content: &str) -> Result<ProjectConfig, BuildError> {
        toml::from_str::<ProjectConfig>(content)
            .map_err(|e| BuildError::Config(format!("invalid {CONFIG_FILE_NAME}: {e}")))
    }

    /// Fill in the default volume, elect a primary volume and reject inconsistent settings.
    pub fn normalized(mut self) -> Result<ProjectConfig, BuildError> {
        if self.volumes.is_empty() {
            self.volumes.push(VolumeConfig::default());
        }

        let mut names = BTreeSet::new();
        for volume in self.volumes.iter() {
            if volume.name.trim().is_empty() {
                return Err(BuildError::Config("volume name cannot be empty".to_string()));
            }
            if !names.insert(volume.name.as_str()) {
                return Err(BuildError::Config(format!(
                    "duplicate volume name '{}'",
                    volume.name
                )));
            }
        }

        let primaries = self.volumes.iter().filter(|v| v.primary).count();
        match primaries {
            0 => self.volumes[0].primary = true,
            1 => {}
            _ => {
                return Err(BuildError::Config(format!(
                    "{primaries} volumes are marked primary, expected at most one"
                )))
            }
        }
        Ok(self)
    }

    pub fn primary(&self) -> Option<&VolumeConfig> {
        self.volumes.iter().find(|v| v.primary)
    }
}
