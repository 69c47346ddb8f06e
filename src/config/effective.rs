//! Merged configuration and where each layer came from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::defaults::LaneConfig;
use super::merge::merge_layers;

/// Schema identifier
pub const SCHEMA_ID: &str = "rebuild-lane/effective_config@1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    User,
    File,
    Cli,
}

/// One contributing layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Hex SHA-256 of the file as read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Merged configuration as reported by `rebuild config`
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub schema_id: String,

    pub created_at: DateTime<Utc>,

    /// The merged configuration, secrets redacted
    pub config: Value,

    /// Layers, lowest precedence first
    pub sources: Vec<ConfigSource>,

    /// Redacted key paths
    pub redactions: Vec<String>,

    #[serde(skip)]
    settings: LaneConfig,
}

const REDACTED: &str = "[REDACTED]";

/// Key fragments that mark a secret
const SECRET_KEYS: &[&str] = &[
    "password",
    "token",
    "secret",
    "private_key",
    "api_key",
    "credential",
];

/// `~/.config/rebuild/config.toml` on Linux.
pub fn default_user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("rebuild").join("config.toml"))
}

struct Layer {
    value: Value,
    source: ConfigSource,
}

impl Layer {
    fn inline(origin: ConfigOrigin, value: Value) -> Self {
        Self {
            value,
            source: ConfigSource {
                origin,
                path: None,
                digest: None,
            },
        }
    }

    /// Read a TOML layer, recording the SHA-256 of the raw bytes.
    fn file(origin: ConfigOrigin, path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
        let digest = hex::encode(Sha256::digest(&bytes));
        let text = std::str::from_utf8(&bytes)
            .map_err(|e| ConfigError::ParseError(format!("{}: invalid UTF-8: {}", path.display(), e)))?;
        let table: toml::Table = text
            .parse()
            .map_err(|e| ConfigError::ParseError(format!("TOML parse error in {}: {}", path.display(), e)))?;
        Ok(Self {
            value: toml_to_json(toml::Value::Table(table)),
            source: ConfigSource {
                origin,
                path: Some(path.display().to_string()),
                digest: Some(digest),
            },
        })
    }
}

impl EffectiveConfig {
    /// Merge the layers, validate, and redact the reported view.
    ///
    /// A missing user file is skipped; a missing explicit file is an error.
    pub fn build(
        user_config_path: Option<&Path>,
        config_path: Option<&Path>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError> {
        let mut layers = vec![Layer::inline(ConfigOrigin::Builtin, LaneConfig::default().to_value()?)];
        if let Some(path) = user_config_path.filter(|p| p.exists()) {
            layers.push(Layer::file(ConfigOrigin::User, path)?);
        }
        if let Some(path) = config_path {
            layers.push(Layer::file(ConfigOrigin::File, path)?);
        }
        if let Some(value) = cli_overrides {
            layers.push(Layer::inline(ConfigOrigin::Cli, value));
        }

        let (values, sources): (Vec<_>, Vec<_>) =
            layers.into_iter().map(|l| (l.value, l.source)).unzip();
        let mut config = merge_layers(values);
        let settings: LaneConfig = serde_json::from_value(config.clone())
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        settings.validate()?;

        let mut redactions = Vec::new();
        redact(&mut config, &mut Vec::new(), &mut redactions);
        debug!(sources = sources.len(), redactions = redactions.len(), "Built effective config");

        Ok(Self {
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            config,
            sources,
            redactions,
            settings,
        })
    }

    /// The typed, unredacted settings.
    pub fn settings(&self) -> &LaneConfig {
        &self.settings
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Look up a dotted path in the redacted view.
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.').try_fold(&self.config, |value, key| value.get(key))
    }

    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get(path)?.as_u64()
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path)?.as_str()
    }
}

fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => Value::from(f),
        toml::Value::Boolean(b) => Value::Bool(b),
        // RFC 3339 text, which chrono reads back
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => items.into_iter().map(toml_to_json).collect(),
        toml::Value::Table(table) => table
            .into_iter()
            .map(|(k, v)| (k, toml_to_json(v)))
            .collect::<serde_json::Map<_, _>>()
            .into(),
    }
}

fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SECRET_KEYS.iter().any(|s| key.contains(s))
}

/// Replace secret-looking scalars with a marker, recording their dotted paths.
fn redact(value: &mut Value, path: &mut Vec<String>, redactions: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                path.push(key.clone());
                let scalar = !(child.is_object() || child.is_array() || child.is_null());
                if scalar && is_secret_key(key) {
                    *child = Value::String(REDACTED.to_string());
                    redactions.push(path.join("."));
                } else {
                    redact(child, path, redactions);
                }
                path.pop();
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter_mut().enumerate() {
                path.push(i.to_string());
                redact(child, path, redactions);
                path.pop();
            }
        }
        _ => {}
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config: {0}")]
    IoError(String),

    #[error("invalid config: {0}")]
    ParseError(String),

    #[error("config value out of range: {0}")]
    ValidationError(String),
}
