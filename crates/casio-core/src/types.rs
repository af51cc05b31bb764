//! Decide whether an installed module ships its own type declarations.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Modules never checked for types (known false positives).
pub const EXCEPTION_PACKAGES: &[&str] = &["jest"];

pub const TYPES_SCOPE: &str = "@types";
pub const ROOT_DECLARATION_FILE: &str = "index.d.ts";
const MANIFEST_FILE: &str = "package.json";
const DEPS_DIR: &str = "node_modules";

/// Per-module outcome of the type checks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ModuleTypeStatus {
    /// `types`/`typings` in the manifest, a root `index.d.ts`, or an `@types` package itself.
    HasOwnTypes,
    /// No bundled declarations and nothing found on the registry.
    MissingTypes,
    /// No bundled declarations, but `@types/<name>` exists.
    TypesAvailableExternally,
    /// Listed in [`EXCEPTION_PACKAGES`].
    Exception,
    /// Manifest missing or corrupt; treated as needing nothing.
    Unreadable,
}

/// Package name without version: lodash@4 -> lodash, @scope/pkg@1.0 -> @scope/pkg
pub fn base_name(package: &str) -> &str {
    if package.starts_with('@') {
        if let Some(idx) = package.rfind('@') {
            if idx > 0 {
                return &package[..idx];
            }
        }
        package
    } else if let Some(idx) = package.find('@') {
        &package[..idx]
    } else {
        package
    }
}

/// `lodash` -> `@types/lodash`, `@babel/core` -> `@types/babel__core`
pub fn types_package_name(module: &str) -> String {
    let name = base_name(module);
    match name.strip_prefix('@').and_then(|s| s.split_once('/')) {
        Some((scope, pkg)) => format!("{}/{}__{}", TYPES_SCOPE, scope, pkg),
        None => format!("{}/{}", TYPES_SCOPE, name),
    }
}

/// Nearest directory at or above `start` containing a package.json; `start` itself if none.
pub fn find_package_root(start: &Path) -> PathBuf {
    let mut dir = Some(start);
    while let Some(current) = dir {
        if current.join(MANIFEST_FILE).is_file() {
            return current.to_path_buf();
        }
        dir = current.parent();
    }
    start.to_path_buf()
}

/// `<root>/node_modules/<name>`, with scoped names split into their two segments.
pub fn installed_module_dir(root: &Path, module: &str) -> PathBuf {
    base_name(module)
        .split('/')
        .fold(root.join(DEPS_DIR), |dir, segment| dir.join(segment))
}

fn read_manifest(path: &Path) -> Result<serde_json::Value> {
    let s = std::fs::read_to_string(path).map_err(|source| Error::ManifestRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&s).map_err(|source| Error::ManifestParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Classify an installed module under the project rooted at `root`.
pub fn classify_module(module: &str, root: &Path) -> ModuleTypeStatus {
    let name = base_name(module);
    debug!(module = name, "looking at");
    if EXCEPTION_PACKAGES.contains(&name) {
        debug!(module = name, "is an exception");
        return ModuleTypeStatus::Exception;
    }
    if name.starts_with("@types/") {
        return ModuleTypeStatus::HasOwnTypes;
    }

    let install_dir = installed_module_dir(root, name);
    let manifest = match read_manifest(&install_dir.join(MANIFEST_FILE)) {
        Ok(v) => v,
        Err(e) => {
            warn!(module = name, "problem reading module: {}", e);
            return ModuleTypeStatus::Unreadable;
        }
    };

    // A key that is present counts, even with a null value.
    let declares_types = manifest.get("typings").is_some() || manifest.get("types").is_some();
    if declares_types || install_dir.join(ROOT_DECLARATION_FILE).exists() {
        debug!(module = name, "has native types");
        ModuleTypeStatus::HasOwnTypes
    } else {
        debug!(module = name, "missing types");
        ModuleTypeStatus::MissingTypes
    }
}

/// True when the module is installed, has no bundled declarations and is not an exception.
/// Resolves the project root from `cwd`.
pub fn needs_types(module: &str, cwd: &Path) -> bool {
    classify_module(module, &find_package_root(cwd)) == ModuleTypeStatus::MissingTypes
}
