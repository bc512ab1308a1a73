use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flow::orchestrator::DEFAULT_FAQ_MATCH_THRESHOLD;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub paths: PathsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Inclusive similarity threshold for the FAQ fast path.
    pub faq_match_threshold: f32,
    /// Intent similarity below this collapses to the reserved unknown value.
    pub intent_floor: f32,
}

#[derive(Clone, Debug)]
pub struct PathsConfig {
    pub templates_dir: PathBuf,
    pub intent_schema: PathBuf,
    pub knowledge_base: PathBuf,
    pub datasource: PathBuf,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub faq_match_threshold: Option<f32>,
    pub templates_dir: Option<PathBuf>,
    pub intent_schema: Option<PathBuf>,
    pub knowledge_base: Option<PathBuf>,
    pub datasource: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    database: FileDatabase,
    #[serde(default)]
    server: FileServer,
    #[serde(default)]
    engine: FileEngine,
    #[serde(default)]
    paths: FilePaths,
    #[serde(default)]
    logging: FileLogging,
}

#[derive(Debug, Default, Deserialize)]
struct FileDatabase {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FileServer {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct FileEngine {
    faq_match_threshold: Option<f32>,
    intent_floor: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct FilePaths {
    templates_dir: Option<PathBuf>,
    intent_schema: Option<PathBuf>,
    knowledge_base: Option<PathBuf>,
    datasource: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct FileLogging {
    level: Option<String>,
    format: Option<LogFormat>,
}

pub const DEFAULT_CONFIG_FILE: &str = "maildesk.toml";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://maildesk.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 8080 },
            engine: EngineConfig {
                faq_match_threshold: DEFAULT_FAQ_MATCH_THRESHOLD,
                intent_floor: 0.25,
            },
            paths: PathsConfig {
                templates_dir: PathBuf::from("templates"),
                intent_schema: PathBuf::from("config/intent_schema.json"),
                knowledge_base: PathBuf::from("config/knowledge_base.json"),
                datasource: PathBuf::from("config/datasource.json"),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl AppConfig {
    /// Layered load: built-in defaults, then the TOML file, then `MAILDESK_*`
    /// environment variables, then programmatic overrides. Later layers win.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let path = options
            .config_path
            .clone()
            .or_else(|| env::var("MAILDESK_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        match read_file(&path) {
            Ok(Some(file)) => config.apply_file(file),
            Ok(None) => {
                if options.require_file {
                    return Err(ConfigError::MissingConfigFile(path));
                }
            }
            Err(error) => return Err(error),
        }

        config.apply_env()?;
        config.apply_overrides(&options.overrides);
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(url) = file.database.url {
            self.database.url = url;
        }
        if let Some(max_connections) = file.database.max_connections {
            self.database.max_connections = max_connections;
        }
        if let Some(timeout_secs) = file.database.timeout_secs {
            self.database.timeout_secs = timeout_secs;
        }
        if let Some(bind_address) = file.server.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = file.server.port {
            self.server.port = port;
        }
        if let Some(threshold) = file.engine.faq_match_threshold {
            self.engine.faq_match_threshold = threshold;
        }
        if let Some(floor) = file.engine.intent_floor {
            self.engine.intent_floor = floor;
        }
        if let Some(dir) = file.paths.templates_dir {
            self.paths.templates_dir = dir;
        }
        if let Some(path) = file.paths.intent_schema {
            self.paths.intent_schema = path;
        }
        if let Some(path) = file.paths.knowledge_base {
            self.paths.knowledge_base = path;
        }
        if let Some(path) = file.paths.datasource {
            self.paths.datasource = path;
        }
        if let Some(level) = file.logging.level {
            self.logging.level = level;
        }
        if let Some(format) = file.logging.format {
            self.logging.format = format;
        }
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(url) = env::var("MAILDESK_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(bind_address) = env::var("MAILDESK_BIND_ADDRESS") {
            self.server.bind_address = bind_address;
        }
        if let Ok(raw) = env::var("MAILDESK_PORT") {
            self.server.port = raw.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                key: "MAILDESK_PORT".to_string(),
                value: raw.clone(),
            })?;
        }
        if let Ok(level) = env::var("MAILDESK_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(raw) = env::var("MAILDESK_LOG_FORMAT") {
            self.logging.format = match raw.as_str() {
                "compact" => LogFormat::Compact,
                "pretty" => LogFormat::Pretty,
                "json" => LogFormat::Json,
                _ => {
                    return Err(ConfigError::InvalidEnvOverride {
                        key: "MAILDESK_LOG_FORMAT".to_string(),
                        value: raw,
                    })
                }
            };
        }
        if let Ok(raw) = env::var("MAILDESK_FAQ_THRESHOLD") {
            self.engine.faq_match_threshold =
                raw.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                    key: "MAILDESK_FAQ_THRESHOLD".to_string(),
                    value: raw.clone(),
                })?;
        }
        if let Ok(dir) = env::var("MAILDESK_TEMPLATES_DIR") {
            self.paths.templates_dir = PathBuf::from(dir);
        }
        if let Ok(path) = env::var("MAILDESK_INTENT_SCHEMA") {
            self.paths.intent_schema = PathBuf::from(path);
        }
        if let Ok(path) = env::var("MAILDESK_KNOWLEDGE_BASE") {
            self.paths.knowledge_base = PathBuf::from(path);
        }
        if let Ok(path) = env::var("MAILDESK_DATASOURCE") {
            self.paths.datasource = PathBuf::from(path);
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(url) = &overrides.database_url {
            self.database.url = url.clone();
        }
        if let Some(bind_address) = &overrides.bind_address {
            self.server.bind_address = bind_address.clone();
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(level) = &overrides.log_level {
            self.logging.level = level.clone();
        }
        if let Some(format) = overrides.log_format {
            self.logging.format = format;
        }
        if let Some(threshold) = overrides.faq_match_threshold {
            self.engine.faq_match_threshold = threshold;
        }
        if let Some(dir) = &overrides.templates_dir {
            self.paths.templates_dir = dir.clone();
        }
        if let Some(path) = &overrides.intent_schema {
            self.paths.intent_schema = path.clone();
        }
        if let Some(path) = &overrides.knowledge_base {
            self.paths.knowledge_base = path.clone();
        }
        if let Some(path) = &overrides.datasource {
            self.paths.datasource = path.clone();
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation("database.url must not be empty".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.engine.faq_match_threshold) {
            return Err(ConfigError::Validation(format!(
                "engine.faq_match_threshold must be within [0, 1], got {}",
                self.engine.faq_match_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.engine.intent_floor) {
            return Err(ConfigError::Validation(format!(
                "engine.intent_floor must be within [0, 1], got {}",
                self.engine.intent_floor
            )));
        }
        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(ConfigError::Validation(format!(
                "logging.level `{}` is not a valid tracing level",
                self.logging.level
            )));
        }
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<Option<FileConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    let parsed = toml::from_str(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })?;
    Ok(Some(parsed))
}
