use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("{0} is required when the rest store backend is selected")]
    Missing(&'static str),
    #[error("similarity threshold {0} is outside [-1, 1]")]
    ThresholdOutOfRange(f32),
    #[error("max upload size must be greater than zero")]
    ZeroUploadLimit,
}

/// Where face embeddings are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Hosted PostgREST table (Supabase).
    Rest,
    /// Local SQLite file.
    Sqlite,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rest" | "supabase" => Ok(Self::Rest),
            "sqlite" => Ok(Self::Sqlite),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Base URL of the hosted project, e.g. `https://xyz.supabase.co`.
    pub url: Option<String>,
    /// API key sent as `apikey` and bearer token.
    pub api_key: Option<String>,
    pub table: String,
    /// SQLite database file for the sqlite backend.
    pub db_path: PathBuf,
    /// Per-request timeout against the hosted table.
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Rest,
            url: None,
            api_key: None,
            table: "face_embeddings".to_string(),
            db_path: facegate_core::default_data_dir().join("faces.db"),
            timeout_secs: 10,
        }
    }
}

/// Daemon configuration: defaults, then an optional TOML file named by
/// `FACEGATE_CONFIG`, then `FACEGATE_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Cosine similarity a probe must strictly exceed to match.
    pub similarity_threshold: f32,
    /// Largest accepted request body, in bytes.
    pub max_upload_bytes: usize,
    /// Origins allowed by CORS.
    pub allowed_origins: Vec<String>,
    pub store: StoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            model_dir: facegate_core::default_model_dir(),
            similarity_threshold: facegate_core::DEFAULT_SIMILARITY_THRESHOLD,
            max_upload_bytes: 10 * 1024 * 1024,
            allowed_origins: vec!["http://localhost:5173".to_string()],
            store: StoreConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var("FACEGATE_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        let config = base.with_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file; absent keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// Apply `FACEGATE_*` overrides read through `lookup`.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(v) = parse_var(&lookup, "FACEGATE_BIND")? {
            self.bind_addr = v;
        }
        if let Some(v) = lookup("FACEGATE_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = parse_var(&lookup, "FACEGATE_SIMILARITY_THRESHOLD")? {
            self.similarity_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "FACEGATE_MAX_UPLOAD_BYTES")? {
            self.max_upload_bytes = v;
        }
        if let Some(v) = lookup("FACEGATE_ALLOWED_ORIGINS") {
            self.allowed_origins = v
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = lookup("FACEGATE_STORE") {
            self.store.backend = v.parse().map_err(|_| ConfigError::InvalidValue {
                key: "FACEGATE_STORE",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("FACEGATE_STORE_URL") {
            self.store.url = Some(v);
        }
        if let Some(v) = lookup("FACEGATE_STORE_KEY") {
            self.store.api_key = Some(v);
        }
        if let Some(v) = lookup("FACEGATE_STORE_TABLE") {
            self.store.table = v;
        }
        if let Some(v) = lookup("FACEGATE_DB_PATH") {
            self.store.db_path = PathBuf::from(v);
        }
        if let Some(v) = parse_var(&lookup, "FACEGATE_STORE_TIMEOUT_SECS")? {
            self.store.timeout_secs = v;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::ThresholdOutOfRange(self.similarity_threshold));
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::ZeroUploadLimit);
        }
        if self.store.backend == StoreBackend::Rest {
            if self.store.url.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::Missing("FACEGATE_STORE_URL"));
            }
            if self.store.api_key.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::Missing("FACEGATE_STORE_KEY"));
            }
        }
        Ok(())
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join(facegate_core::DETECTOR_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn recognizer_model_path(&self) -> String {
        self.model_dir
            .join(facegate_core::RECOGNIZER_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    lookup(key)
        .map(|v| {
            v.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue { key, value: v.clone() })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.bind_addr.port(), 5000);
        assert_eq!(config.similarity_threshold, 0.7);
        assert_eq!(config.allowed_origins, vec!["http://localhost:5173"]);
        assert_eq!(config.store.backend, StoreBackend::Rest);
        assert_eq!(config.store.table, "face_embeddings");
        assert!(config.detector_model_path().ends_with("det_10g.onnx"));
        assert!(config.recognizer_model_path().ends_with("w600k_r50.onnx"));
    }

    #[test]
    fn test_rest_backend_requires_credentials() {
        let err = Config::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("FACEGATE_STORE_URL")));

        let config = Config::default()
            .with_overrides(lookup_from(&[("FACEGATE_STORE_URL", "https://db.example")]))
            .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("FACEGATE_STORE_KEY"))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default()
            .with_overrides(lookup_from(&[
                ("FACEGATE_BIND", "127.0.0.1:8080"),
                ("FACEGATE_SIMILARITY_THRESHOLD", "0.55"),
                ("FACEGATE_ALLOWED_ORIGINS", "http://a.test, http://b.test,"),
                ("FACEGATE_STORE", "sqlite"),
                ("FACEGATE_DB_PATH", "/var/lib/facegate/faces.db"),
                ("FACEGATE_MAX_UPLOAD_BYTES", "1024"),
            ]))
            .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.similarity_threshold, 0.55);
        assert_eq!(config.allowed_origins, vec!["http://a.test", "http://b.test"]);
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.store.db_path, PathBuf::from("/var/lib/facegate/faces.db"));
        assert_eq!(config.max_upload_bytes, 1024);
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_env_value() {
        let err = Config::default()
            .with_overrides(lookup_from(&[("FACEGATE_SIMILARITY_THRESHOLD", "high")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "FACEGATE_SIMILARITY_THRESHOLD",
                ..
            }
        ));

        let err = Config::default()
            .with_overrides(lookup_from(&[("FACEGATE_STORE", "mongo")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "FACEGATE_STORE", .. }));
    }

    #[test]
    fn test_threshold_range() {
        let mut config = Config::default();
        config.store.backend = StoreBackend::Sqlite;
        config.similarity_threshold = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ThresholdOutOfRange(_))
        ));
    }

    #[test]
    fn test_from_file_then_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
similarity_threshold = 0.8
allowed_origins = ["https://app.example"]

[store]
backend = "rest"
url = "https://xyz.supabase.co"
api_key = "file-key"
table = "faces"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path())
            .unwrap()
            .with_overrides(lookup_from(&[("FACEGATE_STORE_KEY", "env-key")]))
            .unwrap();

        assert_eq!(config.similarity_threshold, 0.8);
        assert_eq!(config.allowed_origins, vec!["https://app.example"]);
        assert_eq!(config.store.url.as_deref(), Some("https://xyz.supabase.co"));
        assert_eq!(config.store.api_key.as_deref(), Some("env-key"));
        assert_eq!(config.store.table, "faces");
        assert_eq!(config.store.timeout_secs, 10, "unset keys keep defaults");
        assert_eq!(config.bind_addr.port(), 5000);
        config.validate().unwrap();
    }

    #[test]
    fn test_from_file_missing() {
        let err = Config::from_file(Path::new("/nonexistent/facegate.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
