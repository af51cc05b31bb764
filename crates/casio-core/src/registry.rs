//! Registry lookup: does `@types/<module>` exist?

use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};
use crate::types::types_package_name;

pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// The registry boundary of the pipeline.
pub trait TypesLookup {
    /// `Ok(Some(module))` with the name as given when `@types/<module>` exists,
    /// `Ok(None)` when the registry answers 404.
    fn types_available(&self, module: &str) -> Result<Option<String>>;
}

/// Scoped names keep the `@` and encode the slash: `@types/lodash` -> `@types%2Flodash`
pub fn encoded_package_path(package: &str) -> String {
    if package.starts_with('@') {
        package.replace('/', "%2F")
    } else {
        package.to_string()
    }
}

/// Packument URL for the `@types` companion of `module`.
pub fn types_metadata_url(registry: &str, module: &str) -> String {
    format!(
        "{}/{}",
        registry.trim_end_matches('/'),
        encoded_package_path(&types_package_name(module))
    )
}

/// 404 is absence; any other status >= 400 is registry trouble.
pub fn interpret_status(status: u16, url: &str) -> Result<bool> {
    match status {
        404 => Ok(false),
        s if s >= 400 => Err(Error::Registry {
            url: url.to_string(),
            status: s,
        }),
        _ => Ok(true),
    }
}

/// Blocking HTTP client for the package metadata endpoint. Shared across lookup threads.
pub struct RegistryClient {
    agent: ureq::Agent,
    base_url: String,
}

impl RegistryClient {
    pub fn new(base_url: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for RegistryClient {
    fn default() -> Self {
        Self::new(DEFAULT_REGISTRY_URL)
    }
}

impl TypesLookup for RegistryClient {
    fn types_available(&self, module: &str) -> Result<Option<String>> {
        let url = types_metadata_url(&self.base_url, module);
        debug!(%url, "checking registry");
        let status = match self.agent.get(&url).call() {
            Ok(resp) => resp.status(),
            Err(ureq::Error::Status(code, _)) => code,
            Err(ureq::Error::Transport(t)) => {
                return Err(Error::Transport {
                    url,
                    message: t.to_string(),
                })
            }
        };
        let available = interpret_status(status, &url)?;
        debug!(module, available, "registry answered {}", status);
        Ok(available.then(|| module.to_string()))
    }
}
