//! Volume mount configuration.
//!
//! ```toml
//! [[volumes]]
//! scheme = "assets"
//! root = "/home/amy/game/assets"
//!
//! [[volumes]]
//! scheme = "scratch"
//! provider = "memory"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A set of volumes to mount together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VfsConfig {
    #[serde(default)]
    pub volumes: Vec<VolumeConfig>,
}

impl VfsConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// One volume to mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeConfig {
    /// URI scheme the volume is mounted under (e.g., "assets").
    pub scheme: String,

    /// Registered provider that builds the volume.
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Stable identifier; generated when absent.
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub display_name: Option<String>,

    /// OS directory, for providers that need one.
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Start a change watcher when the provider supports one.
    #[serde(default = "default_watch")]
    pub watch: bool,
}

fn default_provider() -> String {
    "physical".to_string()
}

fn default_watch() -> bool {
    true
}

impl VolumeConfig {
    /// A physical volume for `root`, watched.
    pub fn physical(scheme: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            scheme: scheme.into(),
            provider: default_provider(),
            id: None,
            display_name: None,
            root: Some(root.into()),
            watch: default_watch(),
        }
    }

    /// An in-memory volume.
    pub fn memory(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            provider: "memory".to_string(),
            id: None,
            display_name: None,
            root: None,
            watch: default_watch(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[[volumes]]
scheme = "assets"
root = "/srv/game/assets"
id = "6f1c"
display_name = "Game Assets"

[[volumes]]
scheme = "scratch"
provider = "memory"
watch = false
"#;

        let config = VfsConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.volumes.len(), 2);

        let assets = &config.volumes[0];
        assert_eq!(assets.provider, "physical");
        assert_eq!(assets.root, Some(PathBuf::from("/srv/game/assets")));
        assert_eq!(assets.display_name.as_deref(), Some("Game Assets"));
        assert!(assets.watch);

        let scratch = &config.volumes[1];
        assert_eq!(scratch.provider, "memory");
        assert!(!scratch.watch);
        assert!(scratch.root.is_none());
    }

    #[test]
    fn test_empty_config() {
        let config = VfsConfig::from_toml_str("").unwrap();
        assert!(config.volumes.is_empty());
    }

    #[test]
    fn test_missing_scheme_is_error() {
        assert!(VfsConfig::from_toml_str("[[volumes]]\nroot = \"/tmp\"\n").is_err());
    }
}
