//! Install invoker: build the package manager's install command and run it as a child process.

use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::package_manager::PackageManager;

/// Flags for one install phase.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InstallOptions {
    pub package_manager: PackageManager,
    pub dev: bool,
    pub exact: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            package_manager: PackageManager::Npm,
            dev: false,
            exact: false,
        }
    }
}

/// Captured result of a finished child process.
#[derive(Clone, Debug, Default)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs a program to completion. The subprocess boundary of the pipeline.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[String], cwd: &Path) -> std::io::Result<CommandOutput>;
}

/// Spawns real processes, blocking until they exit.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String], cwd: &Path) -> std::io::Result<CommandOutput> {
        // npm, yarn and pnpm are .cmd shims on Windows and need the shell to resolve.
        #[cfg(windows)]
        let mut cmd = {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(program);
            c.args(args.iter().map(|a| cmd_escape(a)));
            c
        };
        #[cfg(not(windows))]
        let mut cmd = {
            let mut c = Command::new(program);
            c.args(args);
            c
        };

        let out = cmd
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;
        Ok(CommandOutput {
            code: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }
}

/// Caret-escape the characters `cmd /C` would otherwise interpret, so specs such as
/// `lodash@^4` or `react@>=18` reach the package manager unchanged.
#[cfg_attr(not(windows), allow(dead_code))]
fn cmd_escape(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len());
    for c in arg.chars() {
        if matches!(c, '^' | '&' | '|' | '<' | '>' | '(' | ')' | '%' | '!' | '"') {
            out.push('^');
        }
        out.push(c);
    }
    out
}

/// Arguments after the program name: verb, set flags only, then modules in order.
pub fn build_install_args(modules: &[String], opts: &InstallOptions) -> Vec<String> {
    let cmd = opts.package_manager.install_command();
    let mut args = Vec::with_capacity(modules.len() + 3);
    args.push(cmd.verb.to_string());
    if opts.dev {
        args.push(cmd.dev_flag.to_string());
    }
    if opts.exact {
        args.push(cmd.exact_flag.to_string());
    }
    args.extend(modules.iter().cloned());
    args
}

/// Full command line as the user would type it, for messages and logs.
pub fn install_command_line(modules: &[String], opts: &InstallOptions) -> String {
    let mut parts = vec![opts.package_manager.install_command().program.to_string()];
    parts.extend(build_install_args(modules, opts));
    parts.join(" ")
}

/// Install `modules` with the selected tool in `cwd`. Returns the tool's stdout.
///
/// An empty module list returns [`Error::NothingToInstall`] without running anything.
pub fn install_with_tool(
    runner: &dyn CommandRunner,
    modules: &[String],
    opts: &InstallOptions,
    cwd: &Path,
) -> Result<String> {
    if modules.is_empty() {
        debug!("no modules for this install phase, skipping");
        return Err(Error::NothingToInstall);
    }
    let program = opts.package_manager.install_command().program;
    let args = build_install_args(modules, opts);
    info!(command = %install_command_line(modules, opts), "running install");

    let out = runner
        .run(program, &args, cwd)
        .map_err(|source| Error::Spawn {
            program: program.to_string(),
            source,
        })?;
    if !out.success() {
        return Err(Error::InstallFailed {
            program: program.to_string(),
            code: out.code,
            stderr: out.stderr,
        });
    }
    Ok(out.stdout)
}
