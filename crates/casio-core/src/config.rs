//! Optional config from .casiorc or ~/.casiorc (JSON), env, and the registry line of .npmrc.
//! CLI flags override everything here.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::package_manager::PackageManager;
use crate::registry::DEFAULT_REGISTRY_URL;

pub const RC_FILE: &str = ".casiorc";
pub const REGISTRY_ENV: &str = "CASIO_REGISTRY";
pub const PACKAGE_MANAGER_ENV: &str = "CASIO_PACKAGE_MANAGER";

/// Settings gathered from files and env. `None` means "not set here".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {
    pub package_manager: Option<PackageManager>,
    pub registry: Option<String>,
    pub exact: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RcFile {
    package_manager: Option<String>,
    registry: Option<String>,
    exact: Option<bool>,
}

fn read_rc(path: &Path) -> Result<Config> {
    let s = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    let rc: RcFile = serde_json::from_str(&s).map_err(|source| Error::ConfigParse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Config {
        package_manager: rc
            .package_manager
            .as_deref()
            .map(str::parse::<PackageManager>)
            .transpose()?,
        registry: rc.registry.map(|r| r.trim_end_matches('/').to_string()),
        exact: rc.exact,
    })
}

/// The `registry=` value of an .npmrc, with `${VAR}` expanded from the environment.
fn read_npmrc_registry(path: &Path) -> Option<String> {
    let s = std::fs::read_to_string(path).ok()?;
    for raw in s.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        if k.trim() != "registry" {
            continue;
        }
        let mut value = v.trim().to_string();
        if value.starts_with("${") && value.ends_with('}') && value.len() > 3 {
            if let Ok(env_val) = std::env::var(&value[2..value.len() - 1]) {
                value = env_val;
            }
        }
        if !value.is_empty() {
            return Some(value.trim_end_matches('/').to_string());
        }
    }
    None
}

/// Load config for `dir` using the real home directory and process env.
pub fn load_config(dir: &Path) -> Result<Config> {
    load_config_from(dir, dirs::home_dir().as_deref(), |k| std::env::var(k).ok())
}

/// First .casiorc found (project, then home) wins; env overrides it; .npmrc only fills the registry.
pub fn load_config_from(
    dir: &Path,
    home: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Config> {
    let mut candidates: Vec<PathBuf> = vec![dir.join(RC_FILE)];
    if let Some(h) = home {
        candidates.push(h.join(RC_FILE));
    }
    let mut cfg = Config::default();
    for path in &candidates {
        if path.is_file() {
            cfg = read_rc(path)?;
            break;
        }
    }

    if let Some(pm) = env(PACKAGE_MANAGER_ENV).filter(|v| !v.trim().is_empty()) {
        cfg.package_manager = Some(pm.parse::<PackageManager>()?);
    }
    if let Some(r) = env(REGISTRY_ENV).filter(|v| !v.trim().is_empty()) {
        cfg.registry = Some(r.trim_end_matches('/').to_string());
    }
    if cfg.registry.is_none() {
        cfg.registry = read_npmrc_registry(&dir.join(".npmrc"))
            .or_else(|| home.and_then(|h| read_npmrc_registry(&h.join(".npmrc"))));
    }
    Ok(cfg)
}

impl Config {
    pub fn registry_url(&self) -> &str {
        self.registry.as_deref().unwrap_or(DEFAULT_REGISTRY_URL)
    }
}
