//! Configuration management.
//!
//! Instances and their credentials live in a JSON file:
//!
//! ```json
//! {
//!   "instances": [
//!     {
//!       "name": "sr.ht",
//!       "access_token": "…",
//!       "services": { "git": { "origin": "https://git.sr.ht", "ssh_user": "git" } }
//!     }
//!   ]
//! }
//! ```
//!
//! Resolution is split into pure functions taking explicit inputs and thin
//! wrappers that read the environment, so the rules can be tested directly.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::export::Service;

/// Instance used when no config file exists.
pub const DEFAULT_INSTANCE: &str = "sr.ht";

/// Per-service overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub origin: Option<String>,
    pub ssh_user: Option<String>,
}

/// One `instances` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub name: String,
    pub access_token: Option<String>,
    /// Keyed by short service name (`git`, `todo`, …).
    #[serde(default)]
    pub services: HashMap<String, ServiceConfig>,
}

/// The whole config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub instances: Vec<InstanceConfig>,
}

/// A selected instance with its token resolved.
#[derive(Debug, Clone)]
pub struct Instance {
    pub name: String,
    pub access_token: String,
    services: HashMap<String, ServiceConfig>,
}

impl Instance {
    fn service(&self, service: Service) -> Option<&ServiceConfig> {
        self.services.get(service.short_name())
    }

    /// Origin URL of `service`, e.g. `https://git.sr.ht`.
    #[must_use]
    pub fn origin(&self, service: Service) -> String {
        self.service(service)
            .and_then(|s| s.origin.as_deref())
            .map_or_else(
                || format!("https://{}.{}", service.short_name(), self.name),
                |origin| origin.trim_end_matches('/').to_string(),
            )
    }

    /// Origin of the instance as a whole, recorded in export stamps.
    #[must_use]
    pub fn url(&self) -> String {
        format!("https://{}", self.name)
    }

    /// SSH user for `git` / `hg` remotes.
    #[must_use]
    pub fn ssh_user(&self, service: Service) -> String {
        self.service(service)
            .and_then(|s| s.ssh_user.clone())
            .unwrap_or_else(|| match service {
                Service::Hg => "hg".to_string(),
                _ => "git".to_string(),
            })
    }
}

/// Config file path.
///
/// Priority:
/// 1. `explicit` (`--config`)
/// 2. `env_path` (`HUT_CONFIG`)
/// 3. `<config dir>/hut/config.json`
///
/// # Errors
///
/// Returns [`Error::Config`] if no config directory can be determined.
pub fn config_path(explicit: Option<&Path>, env_path: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = env_path.filter(|p| !p.trim().is_empty()) {
        return Ok(PathBuf::from(path));
    }

    directories::BaseDirs::new()
        .map(|b| b.config_dir().join("hut").join("config.json"))
        .ok_or_else(|| Error::Config("Could not determine config directory".into()))
}

/// Load the config file, or `None` if it does not exist.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file exists but cannot be read or parsed.
pub fn load_config(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file");
        return Ok(None);
    }

    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| Error::Config(format!("Failed to parse config file: {e}")))
}

/// Pick an instance and resolve its token.
///
/// `name` is `--instance`, falling back to `HUT_INSTANCE`, then to the first
/// configured instance. `token_override` (`HUT_TOKEN`) replaces the file's
/// token. Without a config file, a token alone selects [`DEFAULT_INSTANCE`]
/// (or `name`).
///
/// # Errors
///
/// Returns [`Error::InstanceNotFound`] for an unknown name and
/// [`Error::Config`] when no instance or no token is available.
pub fn select_instance(
    config: Option<Config>,
    name: Option<&str>,
    token_override: Option<String>,
) -> Result<Instance> {
    let token_override = token_override.filter(|t| !t.trim().is_empty());

    let Some(config) = config.filter(|c| !c.instances.is_empty()) else {
        let Some(access_token) = token_override else {
            return Err(Error::Config("No config file and no HUT_TOKEN".into()));
        };
        return Ok(Instance {
            name: name.unwrap_or(DEFAULT_INSTANCE).to_string(),
            access_token,
            services: HashMap::new(),
        });
    };

    let selected = match name {
        Some(name) => config
            .instances
            .into_iter()
            .find(|i| i.name == name)
            .ok_or_else(|| Error::InstanceNotFound {
                name: name.to_string(),
            })?,
        None => config
            .instances
            .into_iter()
            .next()
            .ok_or_else(|| Error::Config("No instances configured".into()))?,
    };

    let access_token = token_override
        .or(selected.access_token)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| {
            Error::Config(format!("No access token for instance '{}'", selected.name))
        })?;

    Ok(Instance {
        name: selected.name,
        access_token,
        services: selected.services,
    })
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Resolve the instance for this invocation from flags, environment and
/// config file.
///
/// # Errors
///
/// Returns any error from [`config_path`], [`load_config`] or
/// [`select_instance`].
pub fn resolve_instance(explicit_config: Option<&Path>, instance: Option<&str>) -> Result<Instance> {
    let path = config_path(explicit_config, env_var("HUT_CONFIG").as_deref())?;
    let config = load_config(&path)?;
    let env_instance = env_var("HUT_INSTANCE");
    let name = instance.or(env_instance.as_deref());

    select_instance(config, name, env_var("HUT_TOKEN"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config() -> Config {
        serde_json::from_str(
            r#"{"instances": [
                {"name": "sr.ht", "access_token": "tok1"},
                {"name": "example.org", "access_token": "tok2", "services": {
                    "git": {"origin": "https://code.example.org/", "ssh_user": "vcs"}
                }}
            ]}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_first_instance_is_default() {
        let instance = select_instance(Some(config()), None, None).unwrap();
        assert_eq!(instance.name, "sr.ht");
        assert_eq!(instance.access_token, "tok1");
        assert_eq!(instance.origin(Service::Todo), "https://todo.sr.ht");
        assert_eq!(instance.ssh_user(Service::Git), "git");
        assert_eq!(instance.ssh_user(Service::Hg), "hg");
    }

    #[test]
    fn test_named_instance_with_overrides() {
        let instance = select_instance(Some(config()), Some("example.org"), None).unwrap();
        assert_eq!(instance.origin(Service::Git), "https://code.example.org");
        assert_eq!(instance.ssh_user(Service::Git), "vcs");
        assert_eq!(instance.origin(Service::Lists), "https://lists.example.org");
    }

    #[test]
    fn test_unknown_instance() {
        let result = select_instance(Some(config()), Some("nope"), None);
        assert!(matches!(result, Err(Error::InstanceNotFound { .. })));
    }

    #[test]
    fn test_token_override() {
        let instance =
            select_instance(Some(config()), None, Some("from-env".to_string())).unwrap();
        assert_eq!(instance.access_token, "from-env");

        // Empty override is ignored.
        let instance = select_instance(Some(config()), None, Some(String::new())).unwrap();
        assert_eq!(instance.access_token, "tok1");
    }

    #[test]
    fn test_token_without_config() {
        let instance = select_instance(None, None, Some("tok".to_string())).unwrap();
        assert_eq!(instance.name, DEFAULT_INSTANCE);
        assert_eq!(instance.url(), "https://sr.ht");

        assert!(matches!(select_instance(None, None, None), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_token() {
        let config: Config =
            serde_json::from_str(r#"{"instances": [{"name": "sr.ht"}]}"#).unwrap();
        assert!(matches!(select_instance(Some(config), None, None), Err(Error::Config(_))));
    }

    #[test]
    fn test_config_path_priority() {
        let explicit = PathBuf::from("/tmp/explicit.json");
        assert_eq!(
            config_path(Some(&explicit), Some("/tmp/env.json")).unwrap(),
            explicit
        );
        assert_eq!(
            config_path(None, Some("/tmp/env.json")).unwrap(),
            PathBuf::from("/tmp/env.json")
        );
        assert!(config_path(None, None).unwrap().ends_with("hut/config.json"));
    }

    #[test]
    fn test_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        assert_eq!(load_config(&path).unwrap(), None);

        fs::write(&path, r#"{"instances": [{"name": "sr.ht", "access_token": "t"}]}"#).unwrap();
        let config = load_config(&path).unwrap().unwrap();
        assert_eq!(config.instances[0].name, "sr.ht");

        fs::write(&path, "{").unwrap();
        assert!(matches!(load_config(&path), Err(Error::Config(_))));
    }
}
