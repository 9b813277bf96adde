pub mod error;
pub mod properties;
pub mod resource_pool;

pub use error::*;
pub use properties::{CloudProperties, LockSettings};
pub use resource_pool::{EphemeralDiskProperties, ResourcePool, RootDiskProperties};

use std::path::{Path, PathBuf};

const CONFIG_PATH_ENV: &str = "NODEFLOW_CONFIG_PATH";
const CANDIDATES: [&str; 2] = ["nodeflow.local.yml", "nodeflow.yml"];

/// NodeFlow configuration directory (`~/.config/nodeflow`)
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("nodeflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Locate the configuration file.
///
/// Search order:
/// 1. `NODEFLOW_CONFIG_PATH`
/// 2. current directory: `nodeflow.local.yml`, `nodeflow.yml`
/// 3. `./.nodeflow/` with the same names
/// 4. `~/.config/nodeflow/nodeflow.yml`
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!("{} points at missing file {}", CONFIG_PATH_ENV, path.display());
    }

    let current_dir = std::env::current_dir()?;

    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let local_dir = current_dir.join(".nodeflow");
    if local_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = local_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("nodeflow").join("nodeflow.yml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// Load and validate cloud properties from `path`
pub fn load_from(path: &Path) -> Result<CloudProperties> {
    let content = std::fs::read_to_string(path)?;
    let properties: CloudProperties =
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
    properties.validate()?;
    tracing::debug!("Loaded configuration from {}", path.display());
    Ok(properties)
}

/// Discover the configuration file and load it
pub fn load() -> Result<CloudProperties> {
    load_from(&find_config_file()?)
}
