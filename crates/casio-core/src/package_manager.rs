//! Package manager selection: explicit choice, or inferred from lockfiles in the working directory.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::Error;

pub const PNPM_LOCKFILE: &str = "pnpm-lock.yaml";
pub const YARN_LOCKFILE: &str = "yarn.lock";

/// Which package manager runs the installs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PackageManager {
    Npm,
    Yarn,
    Pnpm,
}

/// Install invocation for a package manager: `<program> <verb> [dev_flag] [exact_flag] <module>...`
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InstallCommand {
    pub program: &'static str,
    pub verb: &'static str,
    pub dev_flag: &'static str,
    pub exact_flag: &'static str,
}

const NPM_INSTALL: InstallCommand = InstallCommand {
    program: "npm",
    verb: "i",
    dev_flag: "-D",
    exact_flag: "-E",
};

const YARN_INSTALL: InstallCommand = InstallCommand {
    program: "yarn",
    verb: "add",
    dev_flag: "-D",
    exact_flag: "-E",
};

const PNPM_INSTALL: InstallCommand = InstallCommand {
    program: "pnpm",
    verb: "i",
    dev_flag: "-D",
    exact_flag: "-E",
};

impl PackageManager {
    pub const ALL: [PackageManager; 3] = [PackageManager::Npm, PackageManager::Yarn, PackageManager::Pnpm];

    pub fn as_str(self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Yarn => "yarn",
            PackageManager::Pnpm => "pnpm",
        }
    }

    pub fn install_command(self) -> InstallCommand {
        match self {
            PackageManager::Npm => NPM_INSTALL,
            PackageManager::Yarn => YARN_INSTALL,
            PackageManager::Pnpm => PNPM_INSTALL,
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageManager {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "npm" => Ok(PackageManager::Npm),
            "yarn" => Ok(PackageManager::Yarn),
            "pnpm" => Ok(PackageManager::Pnpm),
            _ => Err(Error::UnknownPackageManager(s.to_string())),
        }
    }
}

/// Guess the package manager from lockfiles in `dir`: pnpm, then yarn, else npm.
pub fn detect_package_manager(dir: &Path) -> PackageManager {
    if dir.join(PNPM_LOCKFILE).exists() {
        PackageManager::Pnpm
    } else if dir.join(YARN_LOCKFILE).exists() {
        PackageManager::Yarn
    } else {
        PackageManager::Npm
    }
}

/// Explicit choice wins unchecked; otherwise detect from `dir`.
pub fn select_package_manager(explicit: Option<PackageManager>, dir: &Path) -> PackageManager {
    explicit.unwrap_or_else(|| detect_package_manager(dir))
}
