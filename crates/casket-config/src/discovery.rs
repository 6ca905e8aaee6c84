//! Config file discovery.
//!
//! Resolution order (first hit wins):
//! 1. An explicit path (`--config`)
//! 2. `CASKET_CONFIG` env var
//! 3. `./casket.toml` (project-local)
//! 4. `~/.config/casket/casket.toml` (XDG user config)
//!
//! A file named by `--config` or `CASKET_CONFIG` must exist. When neither is
//! given and nothing is found, defaults are used.

use std::path::{Path, PathBuf};

use crate::{CasketConfig, ConfigError, Result};

/// Default config filename.
pub const CONFIG_FILE: &str = "casket.toml";

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "CASKET_CONFIG";

/// Application name for XDG directory resolution.
const APP_NAME: &str = "casket";

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The parsed and validated configuration.
    pub config: CasketConfig,
    /// File it was read from, `None` when running on defaults.
    pub source: Option<PathBuf>,
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<CasketConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    CasketConfig::from_toml(&contents)
}

/// Load configuration, discovering the file when `explicit` is `None`.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    load_config_in(explicit, Path::new("."))
}

/// Like [`load_config`], resolving the project-local file against `project_dir`.
pub fn load_config_in(explicit: Option<&Path>, project_dir: &Path) -> Result<LoadedConfig> {
    let named = explicit.map(Path::to_path_buf).or_else(env_config_path);
    load_named_or_discover(named, project_dir)
}

fn load_named_or_discover(named: Option<PathBuf>, project_dir: &Path) -> Result<LoadedConfig> {
    if let Some(path) = named {
        return Ok(LoadedConfig {
            config: load_config_file(&path)?,
            source: Some(path),
        });
    }

    for path in candidates(project_dir) {
        if path.is_file() {
            return Ok(LoadedConfig {
                config: load_config_file(&path)?,
                source: Some(path),
            });
        }
    }

    Ok(LoadedConfig {
        config: CasketConfig::default(),
        source: None,
    })
}

fn env_config_path() -> Option<PathBuf> {
    std::env::var_os(CONFIG_ENV)
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
}

fn candidates(project_dir: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::with_capacity(2);
    paths.push(project_dir.join(CONFIG_FILE));
    if let Some(path) = xdg_config_path() {
        paths.push(path);
    }
    paths
}

/// Get the user-level config file path for casket.
pub fn xdg_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME).join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_xdg_config_path_shape() {
        if let Some(p) = xdg_config_path() {
            assert!(p.ends_with("casket/casket.toml"));
        }
    }

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("casket.toml");
        fs::write(
            &path,
            r#"
[session]
compress = true
compression_type = "lz4"
"#,
        )
        .unwrap();

        let config = load_config_file(&path).unwrap();
        assert!(config.session.compress);
        assert_eq!(config.session.compression_type, "lz4");
    }

    #[test]
    fn test_load_config_file_not_found() {
        let err = load_config_file(Path::new("/nonexistent/casket.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(load_config_in(Some(&missing), dir.path()).is_err());
    }

    #[test]
    fn test_named_file_must_exist_even_with_local_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "").unwrap();
        let missing = dir.path().join("elsewhere.toml");

        let err = load_named_or_discover(Some(missing), dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { ref path, .. } if path.ends_with("elsewhere.toml")));
    }

    #[test]
    fn test_project_local_file_found() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            "[session]\nsite_name = \"Local\"\n",
        )
        .unwrap();

        let loaded = load_config_in(None, dir.path()).unwrap();
        // CASKET_CONFIG may point elsewhere in the test environment.
        if std::env::var_os(CONFIG_ENV).is_none() {
            assert_eq!(loaded.source, Some(dir.path().join(CONFIG_FILE)));
            assert_eq!(loaded.config.session.site_name, "Local");
        }
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("casket.toml");
        fs::write(&path, "[session]\nbogus = 1\n").unwrap();
        assert!(matches!(
            load_config_in(Some(&path), dir.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
