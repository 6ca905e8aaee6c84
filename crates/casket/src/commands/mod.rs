//! CLI command handlers.

pub mod check;
pub mod codecs;
pub mod simulate;

use casket_config::LoadedConfig;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Configuration and where it came from.
    pub config: LoadedConfig,
}
