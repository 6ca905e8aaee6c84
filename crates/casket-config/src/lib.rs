//! Configuration system for the Casket session store.
//!
//! Provides TOML-based configuration with:
//! - `[session]` store behaviour, converted into [`casket_session::ProviderSettings`]
//! - `[logging]` file sink settings for the binary
//! - `[client]` settings passed through to the cache client untouched
//!
//! Unknown keys anywhere outside `[client]` are rejected at load time.

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    CONFIG_ENV, CONFIG_FILE, LoadedConfig, load_config, load_config_file, load_config_in,
    xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
