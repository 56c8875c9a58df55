use crate::fields::FieldSets;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable pointing at an explicit config file.
pub const CONFIG_ENV_VAR: &str = "OK_PHOTOS_CONFIG";

/// File name looked up in the working directory and the platform config dir.
pub const CONFIG_FILE_NAME: &str = "ok-photos.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub limits: FetchLimits,
    pub api: ApiConfig,
    pub fields: FieldSets,
    pub logging: LoggingConfig,
}

/// Local store location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let path = ProjectDirs::from("ru", "odnoklassniki", "ok-photos")
            .map(|dirs| dirs.data_dir().join("ok-photos.duckdb"))
            .unwrap_or_else(|| PathBuf::from("ok-photos.duckdb"));
        Self { path }
    }
}

/// Maximum number of items a single remote call may return or resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchLimits {
    pub album_page: usize,
    pub photo_page: usize,
    pub like_users_page: usize,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            album_page: 100,
            photo_page: 100,
            like_users_page: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Namespace prepended to every method name (`photos.getAlbums`)
    pub methods_namespace: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            methods_namespace: "photos".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Parse and validate a TOML document. Missing sections take defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file from an explicit path
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Locate and load the config file.
    ///
    /// Order: `$OK_PHOTOS_CONFIG`, `./ok-photos.toml`, the platform config
    /// directory. Falls back to defaults when none exists.
    pub fn discover() -> Result<Self, ConfigError> {
        if let Ok(explicit) = std::env::var(CONFIG_ENV_VAR) {
            tracing::debug!("Loading config from {}", explicit);
            return Self::load(explicit);
        }

        let mut candidates = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dirs) = ProjectDirs::from("ru", "odnoklassniki", "ok-photos") {
            candidates.push(dirs.config_dir().join(CONFIG_FILE_NAME));
        }

        for candidate in candidates {
            if candidate.is_file() {
                tracing::debug!("Loading config from {}", candidate.display());
                return Self::load(candidate);
            }
        }

        tracing::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = [
            ("album_page", self.limits.album_page),
            ("photo_page", self.limits.photo_page),
            ("like_users_page", self.limits.like_users_page),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(ConfigError::Invalid(format!(
                    "limits.{} must be greater than zero",
                    name
                )));
            }
        }

        if self.api.methods_namespace.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "api.methods_namespace must not be empty".to_string(),
            ));
        }

        if let Some(kind) = self.fields.empty_kinds().first() {
            return Err(ConfigError::Invalid(format!(
                "fields.{} must list at least one field",
                kind
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_yields_defaults() {
        let config = AppConfig::from_toml_str("").expect("parse");
        assert_eq!(config.limits, FetchLimits::default());
        assert_eq!(config.api.methods_namespace, "photos");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [limits]
            photo_page = 50

            [database]
            path = "/tmp/photos.duckdb"
            "#,
        )
        .expect("parse");

        assert_eq!(config.limits.photo_page, 50);
        assert_eq!(config.limits.album_page, 100);
        assert_eq!(config.database.path, PathBuf::from("/tmp/photos.duckdb"));
    }

    #[test]
    fn zero_limit_is_rejected() {
        let err = AppConfig::from_toml_str("[limits]\nalbum_page = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("album_page")));
    }

    #[test]
    fn empty_field_set_is_rejected() {
        let err = AppConfig::from_toml_str("[fields]\nuser = []\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("fields.user")));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "[logging]\nlevel = \"debug\"").expect("write");

        let config = AppConfig::load(file.path()).expect("load");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = AppConfig::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
