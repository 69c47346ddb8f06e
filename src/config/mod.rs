//! Layered configuration
//!
//! Layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. User config (`~/.config/rebuild/config.toml`)
//! 3. Explicit `--config` file
//! 4. CLI overrides

mod defaults;
mod effective;
mod merge;
mod runtime;

pub use defaults::{AttestationConfig, HttpConfig, LaneConfig, RemoteConfig, StoreConfig};
pub use effective::{default_user_config_path, ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use merge::{deep_merge, merge_layers};
