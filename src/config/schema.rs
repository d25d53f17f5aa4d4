//! Configuration schema for Grist
//!
//! Configuration is stored at `~/.config/grist/config.toml`. Every section
//! and field is optional; missing values fall back to the defaults below.

use crate::stage::ArtifactConstraint;
use crate::staleness::StalenessWindow;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Result store settings
    pub store: StoreConfig,

    /// Staleness windows
    pub freshness: FreshnessConfig,

    /// JDK tools
    pub java: JavaConfig,

    /// Parser generator artifact
    pub antlr: AntlrConfig,

    /// Maven repository
    pub maven: MavenConfig,

    /// Archive output
    pub packaging: PackagingConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Timeout for a single HTTP request
    pub http_timeout_secs: u64,

    /// State root (store, work and repository directories)
    pub state_dir: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            http_timeout_secs: 60,
            state_dir: None,
        }
    }
}

/// Result store settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Abort instead of recomputing when the store is unreadable
    pub strict: bool,
}

/// How long fetched and resolved results are reused
///
/// A window too long to represent as a duration (e.g. `i64::MAX`) never
/// elapses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshnessConfig {
    /// Grammar re-check interval (default: 1 hour)
    pub fetch_secs: u64,

    /// Dependency re-resolution interval (default: 1 day)
    pub resolve_secs: u64,
}

impl FreshnessConfig {
    pub fn fetch_window(&self) -> StalenessWindow {
        StalenessWindow::Seconds(self.fetch_secs)
    }

    pub fn resolve_window(&self) -> StalenessWindow {
        StalenessWindow::Seconds(self.resolve_secs)
    }
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            fetch_secs: 60 * 60,
            resolve_secs: 24 * 60 * 60,
        }
    }
}

/// JDK executables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JavaConfig {
    pub java: String,
    pub javac: String,
    pub jar: String,
}

impl Default for JavaConfig {
    fn default() -> Self {
        Self {
            java: "java".to_string(),
            javac: "javac".to_string(),
            jar: "jar".to_string(),
        }
    }
}

/// Parser generator coordinates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AntlrConfig {
    pub group: String,
    pub artifact: String,

    /// Exact version or Maven range
    pub version: String,

    /// Classifier of the self-contained tool jar
    pub classifier: Option<String>,

    /// Entry point of the generator
    pub main_class: String,
}

impl AntlrConfig {
    pub fn constraint(&self) -> ArtifactConstraint {
        ArtifactConstraint {
            group: self.group.clone(),
            artifact: self.artifact.clone(),
            version: self.version.clone(),
            classifier: self.classifier.clone(),
            extension: "jar".to_string(),
        }
    }
}

impl Default for AntlrConfig {
    fn default() -> Self {
        Self {
            group: "org.antlr".to_string(),
            artifact: "antlr4".to_string(),
            version: "[4.0,)".to_string(),
            classifier: Some("complete".to_string()),
            main_class: "org.antlr.v4.Tool".to_string(),
        }
    }
}

/// Maven repository settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MavenConfig {
    /// Repository base URL (`http(s)://` or `file://`)
    pub repository: String,
}

impl Default for MavenConfig {
    fn default() -> Self {
        Self {
            repository: "https://repo1.maven.org/maven2".to_string(),
        }
    }
}

/// Archive format of the packaged parser
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveFormat {
    /// `jar` tool from the JDK
    #[default]
    Jar,
    Tar,
    TarGz,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagingConfig {
    pub format: ArchiveFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[antlr]"));
        assert!(toml.contains("format = \"jar\""));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.antlr.version, "[4.0,)");
        assert_eq!(config.freshness.fetch_window(), StalenessWindow::hours(1));
        assert_eq!(config.freshness.resolve_window(), StalenessWindow::days(1));
        assert!(!config.store.strict);
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [packaging]
            format = "tar-gz"

            [freshness]
            fetch_secs = 0
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.packaging.format, ArchiveFormat::TarGz);
        assert_eq!(config.freshness.fetch_window(), StalenessWindow::ZERO);
        assert_eq!(config.freshness.resolve_secs, 86_400); // default preserved
    }

    #[test]
    fn huge_window_means_never() {
        let config: Config =
            toml::from_str("[freshness]\nfetch_secs = 9223372036854775807\n").unwrap();
        assert_eq!(config.freshness.fetch_window().as_duration(), None);
        assert!(config.freshness.resolve_window().as_duration().is_some());
    }

    #[test]
    fn antlr_constraint() {
        let constraint = AntlrConfig::default().constraint();
        assert_eq!(constraint.to_string(), "org.antlr:antlr4:[4.0,):complete");
        assert_eq!(constraint.extension, "jar");
    }
}
