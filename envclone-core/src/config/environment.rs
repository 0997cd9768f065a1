//! Per-environment configuration files.
//!
//! Each environment has its own dotenv-style file (`.env.prod`,
//! `.env.test`, ...). Files are parsed with `dotenvy::from_path_iter`, which
//! yields key/value pairs without touching the process environment, so two
//! environments can be loaded side by side in one process.

use crate::error::EnvCloneError;
use crate::security::ServiceCredentials;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const URL_KEYS: &[&str] = &["NEXT_PUBLIC_SUPABASE_URL", "DATASTORE_URL"];
const ANON_KEY_KEYS: &[&str] = &["NEXT_PUBLIC_SUPABASE_ANON_KEY", "DATASTORE_ANON_KEY"];
const SERVICE_KEY_KEYS: &[&str] = &["SUPABASE_SERVICE_ROLE_KEY", "DATASTORE_SERVICE_KEY"];

/// Connection profile read from one environment file.
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    /// Environment name as given by the operator
    pub name: String,
    /// File the settings were read from
    pub config_file: PathBuf,
    /// Datastore base URL
    pub url: String,
    /// Anonymous and privileged keys (zeroized on drop)
    pub credentials: ServiceCredentials,
}

/// Candidate file names for an environment, most specific first.
///
/// ```rust
/// use envclone_core::config::candidate_config_files;
///
/// assert_eq!(candidate_config_files("prod"), vec![".env.prod", ".env.production"]);
/// assert_eq!(candidate_config_files("dev"), vec![".env.development"]);
/// assert_eq!(candidate_config_files("staging"), vec![".env.staging"]);
/// ```
pub fn candidate_config_files(name: &str) -> Vec<String> {
    match name.to_lowercase().as_str() {
        "prod" => vec![".env.prod".to_string(), ".env.production".to_string()],
        "production" => vec![".env.production".to_string()],
        "test" => vec![".env.test".to_string()],
        "dev" | "development" => vec![".env.development".to_string()],
        _ => vec![format!(".env.{}", name)],
    }
}

/// Resolves the configuration file for an environment inside `config_dir`.
///
/// Returns the first candidate that exists, or the first candidate when
/// none does (so the not-found error names the expected file).
pub fn resolve_config_file(config_dir: &Path, name: &str) -> PathBuf {
    let candidates = candidate_config_files(name);
    candidates
        .iter()
        .map(|file| config_dir.join(file))
        .find(|path| path.is_file())
        .unwrap_or_else(|| config_dir.join(&candidates[0]))
}

impl EnvironmentConfig {
    /// Builds a configuration without a backing file.
    ///
    /// `config_file` is left empty; callers that compare environments by
    /// file should load them with [`EnvironmentConfig::load`] instead.
    pub fn new(name: impl Into<String>, url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config_file: PathBuf::new(),
            url: url.into(),
            credentials: ServiceCredentials::new(String::new(), service_key.into()),
        }
    }

    /// Reads the configuration of `name` from `config_dir`.
    ///
    /// # Errors
    /// - `EnvironmentNotFound` if the file does not exist
    /// - `ConfigMissing` if the URL or the privileged key is absent or blank
    /// - `Configuration` if the file cannot be parsed
    pub fn load(config_dir: &Path, name: &str) -> crate::Result<Self> {
        let path = resolve_config_file(config_dir, name);
        let vars = read_env_file(&path, name)?;

        let url = lookup(&vars, URL_KEYS);
        let service_key = lookup(&vars, SERVICE_KEY_KEYS);
        let anon_key = lookup(&vars, ANON_KEY_KEYS).unwrap_or_default();

        let mut missing = Vec::new();
        if url.is_none() {
            missing.push(URL_KEYS[0].to_string());
        }
        if service_key.is_none() {
            missing.push(SERVICE_KEY_KEYS[0].to_string());
        }

        match (url, service_key) {
            (Some(url), Some(service_key)) => Ok(Self {
                name: name.to_string(),
                config_file: path,
                url,
                credentials: ServiceCredentials::new(anon_key, service_key),
            }),
            _ => Err(EnvCloneError::ConfigMissing {
                environment: name.to_string(),
                missing,
            }),
        }
    }
}

fn read_env_file(path: &Path, name: &str) -> crate::Result<HashMap<String, String>> {
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(dotenvy::Error::Io(err)) if err.kind() == ErrorKind::NotFound => {
            return Err(EnvCloneError::EnvironmentNotFound {
                name: name.to_string(),
                path: path.display().to_string(),
            });
        }
        Err(err) => {
            return Err(EnvCloneError::configuration(format!(
                "Failed to read {}: {}",
                path.display(),
                err
            )));
        }
    };

    let mut vars = HashMap::new();
    for item in iter {
        let (key, value) = item.map_err(|err| {
            EnvCloneError::configuration(format!("Failed to parse {}: {}", path.display(), err))
        })?;
        vars.insert(key, value);
    }
    Ok(vars)
}

fn lookup(vars: &HashMap<String, String>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| vars.get(*key))
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
        .map(ToString::to_string)
}
