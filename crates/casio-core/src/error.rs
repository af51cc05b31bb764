use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the install pipeline and its collaborators.
#[derive(Error, Debug)]
pub enum Error {
    /// An install phase was handed no modules. Callers skip the phase.
    #[error("nothing to install")]
    NothingToInstall,

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} install failed{}: {stderr}", exit_suffix(.code))]
    InstallFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to read {path}: {source}")]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("trouble reading {url} from the registry (HTTP {status})")]
    Registry { url: String, status: u16 },

    #[error("registry request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown package manager `{0}` (expected npm, yarn or pnpm)")]
    UnknownPackageManager(String),
}

fn exit_suffix(code: &Option<i32>) -> String {
    code.map(|c| format!(" (exit code {c})")).unwrap_or_default()
}

impl Error {
    #[must_use]
    pub fn is_nothing_to_install(&self) -> bool {
        matches!(self, Error::NothingToInstall)
    }

    /// Process exit code to report for this failure.
    /// A failed install propagates the tool's own non-zero code.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InstallFailed { code: Some(c), .. } if *c != 0 => *c,
            _ => 1,
        }
    }
}
