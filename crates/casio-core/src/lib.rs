//! Core library for casio: pick a package manager, install modules through it,
//! then install the `@types` packages the installed modules are missing.
//! Used by the CLI binary; presentation stays behind the [`Progress`] trait.

pub mod config;
pub mod error;
pub mod install;
pub mod package_manager;
pub mod pipeline;
pub mod registry;
pub mod types;

// Re-export main API for CLI
pub use config::{load_config, Config};
pub use error::{Error, Result};
pub use install::{
    build_install_args, install_command_line, install_with_tool, CommandOutput, CommandRunner,
    InstallOptions, SystemRunner,
};
pub use package_manager::{detect_package_manager, select_package_manager, PackageManager};
pub use pipeline::{list_packages_with_message, InstallRequest, InstallSummary, Pipeline, Progress, Silent};
pub use registry::{RegistryClient, TypesLookup, DEFAULT_REGISTRY_URL};
pub use types::{classify_module, needs_types, types_package_name, ModuleTypeStatus, EXCEPTION_PACKAGES};
