//! API credentials store
//!
//! The api_id/api_hash pair lives in a small TOML file. Resolution layers,
//! weakest first: config file, TG_API_ID/TG_API_HASH environment variables,
//! explicit CLI flags. Each field is overlaid independently.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Credentials file name
pub const CONFIG_FILE: &str = "tgsc.toml";

/// Environment variable holding the API id
pub const ENV_API_ID: &str = "TG_API_ID";

/// Environment variable holding the API hash
pub const ENV_API_HASH: &str = "TG_API_HASH";

/// The developer credentials required to open a client connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCredentials {
    pub api_id: i32,
    pub api_hash: String,
}

/// Which layer a resolved value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Flag,
    Environment,
    File,
}

impl std::fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Flag => "command line",
            Self::Environment => "environment",
            Self::File => "config file",
        })
    }
}

/// Credentials together with where each field was found
#[derive(Debug, Clone)]
pub struct Resolved {
    pub credentials: ApiCredentials,
    pub id_source: CredentialSource,
    pub hash_source: CredentialSource,
}

/// Resolve credentials from flags, environment and the config file
pub fn resolve(flag_id: Option<i32>, flag_hash: Option<&str>) -> Result<Resolved> {
    let file = find_config_file().map(|path| load(&path)).transpose()?;
    let env_id = std::env::var(ENV_API_ID).ok();
    let env_hash = std::env::var(ENV_API_HASH).ok();

    resolve_layers(file, env_id.as_deref(), env_hash.as_deref(), flag_id, flag_hash)
}

fn resolve_layers(
    file: Option<ApiCredentials>,
    env_id: Option<&str>,
    env_hash: Option<&str>,
    flag_id: Option<i32>,
    flag_hash: Option<&str>,
) -> Result<Resolved> {
    let mut id = file
        .as_ref()
        .map(|c| (c.api_id, CredentialSource::File));
    let mut hash = file
        .as_ref()
        .map(|c| (c.api_hash.clone(), CredentialSource::File));

    if let Some(value) = env_id {
        match value.trim().parse::<i32>() {
            Ok(parsed) => id = Some((parsed, CredentialSource::Environment)),
            Err(_) => {
                tracing::warn!("{ENV_API_ID} is set but is not an integer, ignoring");
            }
        }
    }
    if let Some(value) = env_hash {
        hash = Some((value.trim().to_string(), CredentialSource::Environment));
    }

    if let Some(value) = flag_id {
        id = Some((value, CredentialSource::Flag));
    }
    if let Some(value) = flag_hash {
        hash = Some((value.to_string(), CredentialSource::Flag));
    }

    match (id, hash) {
        (Some((api_id, id_source)), Some((api_hash, hash_source))) => Ok(Resolved {
            credentials: ApiCredentials { api_id, api_hash },
            id_source,
            hash_source,
        }),
        _ => Err(Error::ConfigMissing),
    }
}

/// Load credentials from a TOML file
pub fn load(path: &Path) -> Result<ApiCredentials> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Save credentials to a TOML file
pub fn save(credentials: &ApiCredentials, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(credentials)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "saved API credentials");
    Ok(())
}

/// Path the `config` subcommand writes to
pub fn default_config_path() -> PathBuf {
    PathBuf::from(CONFIG_FILE)
}

/// First existing credentials file: working directory, then user config dir
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }

    let user = dirs::config_dir()?.join("tgsc").join(CONFIG_FILE);
    user.is_file().then_some(user)
}
