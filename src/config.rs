use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct LustreConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub background: BackgroundConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// `"http"` or `"stdio"` (MCP).
    pub transport: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    pub index_path: String,
    pub id_map_path: String,
    pub images_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
    pub intra_threads: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub image_top_k: usize,
    pub image_min_percent: f64,
    pub text_top_k: usize,
    pub text_min_percent: f64,
    pub hybrid_top_k: usize,
    /// Per-modality candidate pool size used by hybrid search.
    pub candidate_pool: usize,
    pub query_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BackgroundConfig {
    pub enabled: bool,
    /// File name of the salient-object model inside the embedding cache dir.
    pub model_file: String,
    pub padding: u32,
    pub jpeg_quality: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "http".into(),
            host: "127.0.0.1".into(),
            port: 8000,
            log_level: "info".into(),
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::rooted_at(&default_lustre_dir().join("data"))
    }
}

impl StorageConfig {
    /// All storage paths placed under a single data directory.
    pub fn rooted_at(data_dir: &Path) -> Self {
        let path = |name: &str| data_dir.join(name).to_string_lossy().into_owned();
        Self {
            db_path: path("products.sqlite"),
            index_path: path("catalog.index"),
            id_map_path: path("id_map.csv"),
            images_dir: path("images"),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_lustre_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "clip".into(),
            model: "clip-ViT-B-32".into(),
            cache_dir,
            intra_threads: 4,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            image_top_k: 8,
            image_min_percent: 80.0,
            text_top_k: 8,
            text_min_percent: 10.0,
            hybrid_top_k: 10,
            candidate_pool: 500,
            query_timeout_secs: 30,
        }
    }
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_file: "u2net.onnx".into(),
            padding: 50,
            jpeg_quality: 95,
        }
    }
}

/// Returns `~/.lustre/`
pub fn default_lustre_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".lustre")
}

/// Returns the default config file path: `~/.lustre/config.toml`
pub fn default_config_path() -> PathBuf {
    default_lustre_dir().join("config.toml")
}

impl LustreConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            LustreConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (LUSTRE_DATA_DIR, LUSTRE_DB, LUSTRE_LOG_LEVEL, LUSTRE_PORT).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("LUSTRE_DATA_DIR") {
            self.storage = StorageConfig::rooted_at(&expand_tilde(&val));
        }
        if let Ok(val) = std::env::var("LUSTRE_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("LUSTRE_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("LUSTRE_PORT") {
            match val.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %val, "ignoring invalid LUSTRE_PORT"),
            }
        }
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    pub fn resolved_index_path(&self) -> PathBuf {
        expand_tilde(&self.storage.index_path)
    }

    pub fn resolved_id_map_path(&self) -> PathBuf {
        expand_tilde(&self.storage.id_map_path)
    }

    pub fn resolved_images_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.images_dir)
    }

    pub fn resolved_model_dir(&self) -> PathBuf {
        expand_tilde(&self.embedding.cache_dir)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = LustreConfig::default();
        assert_eq!(config.server.transport, "http");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.embedding.provider, "clip");
        assert_eq!(config.search.candidate_pool, 500);
        assert_eq!(config.search.image_min_percent, 80.0);
        assert!(config.storage.db_path.ends_with("products.sqlite"));
        assert!(config.storage.index_path.ends_with("catalog.index"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"
port = 9100

[storage]
db_path = "/tmp/test.sqlite"

[search]
candidate_pool = 50
"#;
        let config: LustreConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.storage.db_path, "/tmp/test.sqlite");
        assert_eq!(config.search.candidate_pool, 50);
        // defaults still apply for unset fields
        assert_eq!(config.search.hybrid_top_k, 10);
        assert!(config.storage.id_map_path.ends_with("id_map.csv"));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = LustreConfig::default();
        std::env::set_var("LUSTRE_DATA_DIR", "/srv/lustre");
        std::env::set_var("LUSTRE_LOG_LEVEL", "trace");
        std::env::set_var("LUSTRE_PORT", "9000");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/srv/lustre/products.sqlite");
        assert_eq!(config.storage.images_dir, "/srv/lustre/images");
        assert_eq!(config.server.log_level, "trace");
        assert_eq!(config.server.port, 9000);

        // Clean up
        std::env::remove_var("LUSTRE_DATA_DIR");
        std::env::remove_var("LUSTRE_LOG_LEVEL");
        std::env::remove_var("LUSTRE_PORT");
    }
}
