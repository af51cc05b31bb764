//! Thin CLI layer: parse args, styled output, and call into casio-core.
//! Crash-proof: panic caught and reported; failures map to the process exit code.

mod logging;
mod spinner;

use std::env;
use std::io::IsTerminal;

use casio_core::{
    list_packages_with_message, load_config, Error, InstallRequest, PackageManager, Pipeline,
    RegistryClient, SystemRunner,
};
use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;

use crate::spinner::Spinner;

// ---- UI helpers (no-op styling when stdout isn't a TTY) ----

fn use_color() -> bool {
    std::io::stdout().is_terminal() && env::var("NO_COLOR").unwrap_or_default().is_empty()
}

fn success(msg: &str) {
    if use_color() {
        println!("{}", msg.green());
    } else {
        println!("{}", msg);
    }
}

fn error(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.red());
    } else {
        eprintln!("{}", msg);
    }
}

fn cli() -> Command {
    Command::new("casio")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Install npm packages, then the @types packages they are missing")
        .after_help(
            "Examples:\n  casio lodash\n  casio -D left-pad chalk\n  casio --prod -E express\n  casio -p pnpm react react-dom",
        )
        .arg(
            Arg::new("module")
                .required(true)
                .num_args(1..)
                .help("Module(s) to install"),
        )
        .arg(
            Arg::new("dev")
                .short('D')
                .long("dev")
                .action(ArgAction::SetTrue)
                .help("Save the requested modules as devDependencies"),
        )
        .arg(
            Arg::new("prod")
                .short('P')
                .long("prod")
                .action(ArgAction::SetTrue)
                .help("Save @types packages as regular dependencies instead of devDependencies"),
        )
        .arg(
            Arg::new("exact")
                .short('E')
                .long("exact")
                .action(ArgAction::SetTrue)
                .overrides_with("no-exact")
                .help("Save exact versions"),
        )
        .arg(
            Arg::new("no-exact")
                .long("no-exact")
                .action(ArgAction::SetTrue)
                .overrides_with("exact")
                .help("Save version ranges even when .casiorc sets exact"),
        )
        .arg(
            Arg::new("package-manager")
                .short('p')
                .long("package-manager")
                .value_parser(["npm", "yarn", "pnpm"])
                .help("Package manager to use (default: from lockfile, else npm)"),
        )
        .arg(
            Arg::new("registry")
                .long("registry")
                .help("Registry to check for @types packages (or set CASIO_REGISTRY)"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("No spinner or progress notices; errors and warnings only"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Log diagnostics to stderr (-vv for more)"),
        )
}

/// `-E`/`--no-exact` win over the config file; the last of the two on the command line counts.
fn resolve_exact(matches: &ArgMatches, configured: Option<bool>) -> bool {
    if matches.get_flag("exact") {
        true
    } else if matches.get_flag("no-exact") {
        false
    } else {
        configured.unwrap_or(false)
    }
}

fn run(matches: &ArgMatches) -> Result<(), Error> {
    let cwd = env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));
    let config = load_config(&cwd)?;

    let package_manager = match matches.get_one::<String>("package-manager") {
        Some(s) => Some(s.parse::<PackageManager>()?),
        None => config.package_manager,
    };
    let registry = matches
        .get_one::<String>("registry")
        .map(|s| s.as_str())
        .unwrap_or_else(|| config.registry_url());
    let request = InstallRequest {
        modules: matches
            .get_many::<String>("module")
            .map(|it| it.cloned().collect())
            .unwrap_or_default(),
        dev: matches.get_flag("dev"),
        prod: matches.get_flag("prod"),
        exact: resolve_exact(matches, config.exact),
        package_manager,
    };
    let quiet = matches.get_flag("quiet");

    let client = RegistryClient::new(registry);
    let progress = Spinner::new(!quiet, std::io::stdout().is_terminal());
    let summary = Pipeline::new(&SystemRunner, &client, &cwd).run(&request, &progress)?;

    if !quiet {
        let listing =
            list_packages_with_message("Installed type declarations:", &summary.types_installed);
        if !listing.is_empty() {
            success(&listing);
        }
    }
    Ok(())
}

fn main() {
    if !use_color() {
        colored::control::set_override(false);
    }

    let matches = cli().get_matches();
    logging::init(matches.get_count("verbose"));

    let code = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| run(&matches))) {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            error(&e.to_string());
            e.exit_code()
        }
        Err(_) => {
            error("An unexpected error occurred. Please report this issue.");
            1
        }
    };
    std::process::exit(code);
}
