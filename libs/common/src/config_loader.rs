//! Configuration loading helper functions
//!
//! Settings are layered, lowest to highest priority:
//! 1. `T::default()`
//! 2. Configuration file (format chosen by extension)
//! 3. Environment variables prefixed with `FACTS_` (`__` separates nesting,
//!    e.g. `FACTS_ENGINE__MAX_PASSES=50`)

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::{CommonError, Result};

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "FACTS_";

fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX).split("__")
}

fn file_provider(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| CommonError::Config("Config file must have an extension".to_string()))?;

    // Figment treats a missing file as empty; surface it instead
    std::fs::metadata(path)?;

    Ok(match extension {
        "toml" => figment.merge(Toml::file(path)),
        "yaml" | "yml" => figment.merge(Yaml::file(path)),
        "json" => figment.merge(Json::file(path)),
        _ => {
            return Err(CommonError::Config(format!(
                "Unsupported config file format: {}",
                extension
            )))
        },
    })
}

/// Load configuration from a specific file plus environment overrides
pub fn load_config_from_file<T, P>(path: P) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    debug!("Loading configuration from {}", path.display());

    file_provider(Figment::new(), path)?
        .merge(env_provider())
        .extract()
        .map_err(|e| CommonError::Config(format!("Failed to load configuration from file: {}", e)))
}

/// Load configuration starting from defaults, with an optional file on top
pub fn load_layered<T>(path: Option<&Path>) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Serialize + Default,
{
    let mut figment = Figment::from(Serialized::defaults(T::default()));
    if let Some(path) = path {
        debug!("Loading configuration from {}", path.display());
        figment = file_provider(figment, path)?;
    }

    figment
        .merge(env_provider())
        .extract()
        .map_err(|e| CommonError::Config(format!("Failed to load configuration: {}", e)))
}
