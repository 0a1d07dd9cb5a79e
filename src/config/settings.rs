//! TOML-based configuration for Quarry.
//!
//! Supports a config file (quarry.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [ai]
//! provider = "openai"
//! model = "gpt-4o-mini"
//! api_key = "${OPENAI_API_KEY}"
//!
//! [execution]
//! connect_timeout_secs = 10
//! query_timeout_secs = 30
//!
//! [sandbox]
//! timeout_ms = 1000
//! memory_limit_bytes = 67108864
//!
//! [sheets]
//! sample_rows = 10
//! max_rows = 3000
//!
//! [retrieval]
//! database_url = "${VECTOR_DATABASE_URL}"
//! top_k = 5
//!
//! [store]
//! path = "./quarry.db"
//! master_key = "${QUARRY_MASTER_KEY}"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// AI provider gateway.
    pub ai: AiSettings,

    /// Network call budgets.
    pub execution: ExecutionSettings,

    /// Sandboxed code executor limits.
    pub sandbox: SandboxSettings,

    /// Spreadsheet sampling and reading windows.
    pub sheets: SheetSettings,

    /// Vector retrieval for imported documents.
    pub retrieval: RetrievalSettings,

    /// Artifact store.
    pub store: StoreSettings,
}

/// AI provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AiSettings {
    /// Provider name ("openai").
    pub provider: String,

    /// Chat model.
    pub model: String,

    /// API key (supports ${ENV_VAR} expansion).
    pub api_key: Option<String>,

    /// Base URL of the HTTP API.
    pub base_url: String,

    /// Embedding model used for retrieval.
    pub embedding_model: String,

    /// Per-request timeout.
    pub request_timeout_secs: u64,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl AiSettings {
    /// Get the API key with environment variables expanded.
    ///
    /// Falls back to `OPENAI_API_KEY` when no key is configured.
    pub fn resolved_api_key(&self) -> Result<Option<String>, SettingsError> {
        match &self.api_key {
            Some(key) => expand_env_vars(key).map(Some),
            None => Ok(env::var("OPENAI_API_KEY").ok()),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Budgets for database and HTTP calls made during analysis and execution.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionSettings {
    pub connect_timeout_secs: u64,
    pub query_timeout_secs: u64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            query_timeout_secs: 30,
        }
    }
}

impl ExecutionSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

/// Sandbox limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SandboxSettings {
    /// Wall-clock budget per program.
    pub timeout_ms: u64,

    /// Interpreter heap ceiling.
    pub memory_limit_bytes: usize,

    /// VM instructions between deadline checks.
    pub hook_interval: u32,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 1000,
            memory_limit_bytes: 64 * 1024 * 1024,
            hook_interval: 1000,
        }
    }
}

impl SandboxSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Spreadsheet reading windows.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SheetSettings {
    /// Rows read for type inference, header included.
    pub sample_rows: u32,

    /// Rows read per sheet at execution time.
    pub max_rows: u32,

    /// Rightmost column read.
    pub last_column: String,
}

impl Default for SheetSettings {
    fn default() -> Self {
        Self {
            sample_rows: 10,
            max_rows: 3000,
            last_column: "Z".to_string(),
        }
    }
}

impl SheetSettings {
    /// A1 range covering the sample window of `sheet`.
    pub fn sample_range(&self, sheet: &str) -> String {
        format!("{}!A1:{}{}", a1_sheet_name(sheet), self.last_column, self.sample_rows)
    }

    /// A1 range covering the execution window of `sheet`.
    pub fn data_range(&self, sheet: &str) -> String {
        format!("{}!A1:{}{}", a1_sheet_name(sheet), self.last_column, self.max_rows)
    }
}

/// Quote a sheet title for A1 notation when it is not a bare word.
fn a1_sheet_name(sheet: &str) -> String {
    if !sheet.is_empty() && sheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        sheet.to_string()
    } else {
        format!("'{}'", sheet.replace('\'', "''"))
    }
}

/// Vector retrieval configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Postgres URL of the pgvector chunk index (supports ${ENV_VAR} expansion).
    pub database_url: Option<String>,

    /// Chunks retrieved per question.
    pub top_k: u32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            database_url: None,
            top_k: 5,
        }
    }
}

impl RetrievalSettings {
    pub fn resolved_database_url(&self) -> Result<Option<String>, SettingsError> {
        self.database_url.as_deref().map(expand_env_vars).transpose()
    }
}

/// Artifact store configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreSettings {
    /// SQLite file. In-memory when unset.
    pub path: Option<String>,

    /// Base64 AES-256 key sealing stored credentials (supports ${ENV_VAR} expansion).
    pub master_key: Option<String>,
}

impl StoreSettings {
    pub fn resolved_path(&self) -> Result<Option<PathBuf>, SettingsError> {
        self.path
            .as_deref()
            .map(|p| expand_env_vars(p).map(PathBuf::from))
            .transpose()
    }

    pub fn resolved_master_key(&self) -> Result<Option<String>, SettingsError> {
        self.master_key.as_deref().map(expand_env_vars).transpose()
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.check()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `QUARRY_CONFIG`
    /// 2. `./quarry.toml`
    /// 3. `~/.config/quarry/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("QUARRY_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("quarry.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("quarry").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Reject values that would make every call fail.
    fn check(&self) -> Result<(), SettingsError> {
        if self.sandbox.timeout_ms == 0 {
            return Err(SettingsError::InvalidConfig(
                "sandbox.timeout_ms must be positive".into(),
            ));
        }
        if self.sheets.sample_rows < 2 {
            return Err(SettingsError::InvalidConfig(
                "sheets.sample_rows must cover a header and at least one row".into(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(SettingsError::InvalidConfig(
                "retrieval.top_k must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let var_name: String = if chars.peek() == Some(&'{') {
            chars.next();
            chars.by_ref().take_while(|&ch| ch != '}').collect()
        } else {
            let mut name = String::new();
            while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                name.push(ch);
            }
            if name.is_empty() {
                // Lone $
                result.push('$');
                continue;
            }
            name
        };

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
