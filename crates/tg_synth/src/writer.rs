//! Manifest writing utilities.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use tg_core::{ConfigurationError, SynthResult};

use crate::manifest::Manifest;

/// On-disk manifest format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestFormat {
    #[default]
    Json,
    Yaml,
}

impl ManifestFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManifestFormat::Json => "json",
            ManifestFormat::Yaml => "yaml",
        }
    }

    /// Infer the format from a file extension, defaulting to JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => ManifestFormat::Yaml,
            _ => ManifestFormat::Json,
        }
    }
}

impl fmt::Display for ManifestFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ManifestFormat {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ManifestFormat::Json),
            "yaml" | "yml" => Ok(ManifestFormat::Yaml),
            other => Err(ConfigurationError::InvalidSetting {
                field: "format".to_string(),
                message: format!("unknown manifest format '{}' (json, yaml)", other),
            }),
        }
    }
}

/// Writer for manifest files.
pub struct ManifestWriter;

impl ManifestWriter {
    /// Render the manifest. JSON is pretty-printed with a trailing newline.
    pub fn render(manifest: &Manifest, format: ManifestFormat) -> SynthResult<String> {
        match format {
            ManifestFormat::Json => {
                let mut content = serde_json::to_string_pretty(manifest)?;
                content.push('\n');
                Ok(content)
            }
            ManifestFormat::Yaml => Ok(serde_yaml::to_string(manifest)?),
        }
    }

    /// Write the manifest to `path`, creating parent directories.
    pub fn write(manifest: &Manifest, path: &Path, format: ManifestFormat) -> SynthResult<()> {
        debug!("Writing {} manifest to {:?}", format, path);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, Self::render(manifest, format)?)?;
        Ok(())
    }

    /// Read a manifest back, in either format.
    pub fn read(path: &Path) -> SynthResult<Manifest> {
        debug!("Reading manifest from {:?}", path);
        let content = fs::read_to_string(path)?;
        match ManifestFormat::from_path(path) {
            ManifestFormat::Json => Ok(serde_json::from_str(&content)?),
            ManifestFormat::Yaml => Ok(serde_yaml::from_str(&content)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!("json".parse::<ManifestFormat>().unwrap(), ManifestFormat::Json);
        assert_eq!("YML".parse::<ManifestFormat>().unwrap(), ManifestFormat::Yaml);
        assert!("toml".parse::<ManifestFormat>().is_err());
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ManifestFormat::from_path(Path::new("out/manifest.yaml")), ManifestFormat::Yaml);
        assert_eq!(ManifestFormat::from_path(Path::new("manifest.json")), ManifestFormat::Json);
        assert_eq!(ManifestFormat::from_path(Path::new("manifest")), ManifestFormat::Json);
    }
}
