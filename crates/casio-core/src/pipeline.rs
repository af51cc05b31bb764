//! Two-phase install: requested modules first, then the `@types` packages they are missing.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::install::{install_with_tool, CommandRunner, InstallOptions};
use crate::package_manager::{select_package_manager, PackageManager};
use crate::registry::TypesLookup;
use crate::types::{base_name, classify_module, find_package_root, types_package_name, ModuleTypeStatus};

/// What the caller asked for. Immutable for the run.
#[derive(Clone, Debug, Default)]
pub struct InstallRequest {
    pub modules: Vec<String>,
    pub dev: bool,
    pub prod: bool,
    pub exact: bool,
    pub package_manager: Option<PackageManager>,
}

/// Progress presentation. `log` is only shown when progress display is on; `warn` always is.
pub trait Progress {
    fn log(&self, message: &str);
    fn warn(&self, message: &str);
    fn wait_on(&self, message: &str);
    fn succeed(&self);
    fn fail(&self, error: &Error);
}

/// Reports nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct Silent;

impl Progress for Silent {
    fn log(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn wait_on(&self, _message: &str) {}
    fn succeed(&self) {}
    fn fail(&self, _error: &Error) {}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    SelectManager,
    InstallPrimary,
    ClassifyModules,
    LookupTypes,
    InstallTypes,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::SelectManager => "select-manager",
            Stage::InstallPrimary => "install-primary",
            Stage::ClassifyModules => "classify-modules",
            Stage::LookupTypes => "lookup-types",
            Stage::InstallTypes => "install-types",
            Stage::Done => "done",
        };
        f.write_str(s)
    }
}

/// Result of a completed run.
#[derive(Clone, Debug)]
pub struct InstallSummary {
    /// Phase-1 modules, de-duplicated, in request order.
    pub installed: Vec<String>,
    pub statuses: Vec<(String, ModuleTypeStatus)>,
    /// Phase-2 `@types` packages, sorted.
    pub types_installed: Vec<String>,
}

impl InstallSummary {
    pub fn status_of(&self, module: &str) -> Option<ModuleTypeStatus> {
        self.statuses
            .iter()
            .find(|(m, _)| m == module)
            .map(|(_, s)| *s)
    }
}

/// `message` followed by one indented package per line; empty when there are no packages.
pub fn list_packages_with_message(message: &str, packages: &[String]) -> String {
    if packages.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = packages.iter().map(|p| format!(" {}", p)).collect();
    format!("{}\n{}", message, lines.join("\n"))
}

/// One spec per package name, in first-seen order. A later spec for the same name
/// replaces the earlier one, as npm does (`lodash lodash@4` installs `lodash@4`).
fn dedup_by_name(modules: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(modules.len());
    let mut slot: HashMap<&str, usize> = HashMap::new();
    for m in modules {
        let name = base_name(m);
        match slot.get(name) {
            Some(&i) => out[i] = m.clone(),
            None => {
                slot.insert(name, out.len());
                out.push(m.clone());
            }
        }
    }
    out
}

/// Query the registry for every candidate at once. The lookups wait on the network,
/// so they get a pool with one thread per module instead of one per core.
fn lookup_all(lookup: &(dyn TypesLookup + Sync), modules: &[&str]) -> Result<Vec<Option<String>>> {
    if modules.is_empty() {
        return Ok(Vec::new());
    }
    let query = || {
        modules
            .par_iter()
            .map(|m| lookup.types_available(m))
            .collect::<Result<Vec<_>>>()
    };
    match ThreadPoolBuilder::new().num_threads(modules.len()).build() {
        Ok(pool) => pool.install(query),
        Err(e) => {
            warn!(error = %e, "could not start lookup pool, using the shared one");
            query()
        }
    }
}

/// Runs the install flow in one working directory.
pub struct Pipeline<'a> {
    runner: &'a dyn CommandRunner,
    lookup: &'a (dyn TypesLookup + Sync),
    cwd: PathBuf,
}

impl<'a> Pipeline<'a> {
    pub fn new(runner: &'a dyn CommandRunner, lookup: &'a (dyn TypesLookup + Sync), cwd: &Path) -> Self {
        Self {
            runner,
            lookup,
            cwd: cwd.to_path_buf(),
        }
    }

    /// Install the requested modules, then `@types/<name>` for each one that lacks
    /// bundled declarations and has a published companion.
    ///
    /// Stops at the first failed install or registry error; the second phase never
    /// runs after a failed first phase.
    pub fn run(&self, request: &InstallRequest, progress: &dyn Progress) -> Result<InstallSummary> {
        if request.dev && request.prod {
            progress.warn("using both --dev and --prod will probably not do what you expect");
        }

        debug!(stage = %Stage::SelectManager);
        let package_manager = select_package_manager(request.package_manager, &self.cwd);
        progress.log(&format!("Running using {}", package_manager));

        debug!(stage = %Stage::InstallPrimary);
        let modules = dedup_by_name(&request.modules);
        let primary = InstallOptions {
            package_manager,
            dev: request.dev,
            exact: request.exact,
        };
        if !modules.is_empty() {
            progress.wait_on(&format!("Installing {}", modules.join(" ")));
        }
        self.install_phase(&modules, &primary, progress)?;

        debug!(stage = %Stage::ClassifyModules);
        let root = find_package_root(&self.cwd);
        let mut statuses: Vec<(String, ModuleTypeStatus)> = modules
            .par_iter()
            .map(|m| (m.clone(), classify_module(m, &root)))
            .collect();
        let need_types: Vec<&str> = statuses
            .iter()
            .filter(|(_, s)| *s == ModuleTypeStatus::MissingTypes)
            .map(|(m, _)| m.as_str())
            .collect();

        debug!(stage = %Stage::LookupTypes, candidates = need_types.len());
        progress.wait_on("Checking for @types");
        let has_types: HashSet<String> = match lookup_all(self.lookup, &need_types) {
            Ok(found) => found.into_iter().flatten().collect(),
            Err(e) => {
                progress.fail(&e);
                return Err(e);
            }
        };
        progress.succeed();

        for (module, status) in statuses.iter_mut() {
            if has_types.contains(module.as_str()) {
                *status = ModuleTypeStatus::TypesAvailableExternally;
            }
        }

        debug!(stage = %Stage::InstallTypes);
        let requested: HashSet<&str> = modules.iter().map(|m| base_name(m)).collect();
        let mut types_packages: Vec<String> = has_types
            .iter()
            .map(|m| types_package_name(m))
            .filter(|t| !requested.contains(t.as_str()))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        types_packages.sort();
        let secondary = InstallOptions {
            package_manager,
            dev: !request.prod,
            exact: request.exact,
        };
        if !types_packages.is_empty() {
            progress.wait_on(&format!("Installing {}", types_packages.join(" ")));
        }
        self.install_phase(&types_packages, &secondary, progress)?;

        debug!(stage = %Stage::Done);
        info!(
            installed = modules.len(),
            types = types_packages.len(),
            "install finished"
        );
        Ok(InstallSummary {
            installed: modules,
            statuses,
            types_installed: types_packages,
        })
    }

    /// One install phase. An empty list is skipped silently.
    fn install_phase(&self, modules: &[String], opts: &InstallOptions, progress: &dyn Progress) -> Result<()> {
        match install_with_tool(self.runner, modules, opts, &self.cwd) {
            Ok(_) => {
                progress.succeed();
                Ok(())
            }
            Err(Error::NothingToInstall) => Ok(()),
            Err(e) => {
                progress.fail(&e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::CommandOutput;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::sync::{Condvar, Mutex};
    use std::time::Duration;

    struct FakeRunner {
        calls: Mutex<Vec<(String, Vec<String>)>>,
        /// Exit code per call index; missing means 0.
        codes: Vec<i32>,
    }

    impl FakeRunner {
        fn ok() -> Self {
            Self { calls: Mutex::new(Vec::new()), codes: Vec::new() }
        }

        fn failing_first() -> Self {
            Self { calls: Mutex::new(Vec::new()), codes: vec![1] }
        }

        fn calls(&self) -> Vec<(String, Vec<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, program: &str, args: &[String], _cwd: &Path) -> std::io::Result<CommandOutput> {
            let mut calls = self.calls.lock().unwrap();
            let code = self.codes.get(calls.len()).copied().unwrap_or(0);
            calls.push((program.to_string(), args.to_vec()));
            Ok(CommandOutput {
                code: Some(code),
                stdout: String::new(),
                stderr: if code == 0 { String::new() } else { "npm ERR! code E404".into() },
            })
        }
    }

    /// 200 for names in `available`, 500 for names in `broken`, 404 otherwise.
    #[derive(Default)]
    struct FakeRegistry {
        available: Vec<&'static str>,
        broken: Vec<&'static str>,
        queried: Mutex<Vec<String>>,
    }

    impl TypesLookup for FakeRegistry {
        fn types_available(&self, module: &str) -> Result<Option<String>> {
            self.queried.lock().unwrap().push(module.to_string());
            let name = base_name(module);
            if self.broken.contains(&name) {
                return Err(Error::Registry { url: format!("fake/{name}"), status: 500 });
            }
            Ok(self.available.contains(&name).then(|| module.to_string()))
        }
    }

    #[derive(Default)]
    struct Recorded {
        logs: RefCell<Vec<String>>,
        warnings: RefCell<Vec<String>>,
        failures: RefCell<usize>,
    }

    impl Progress for Recorded {
        fn log(&self, message: &str) {
            self.logs.borrow_mut().push(message.to_string());
        }
        fn warn(&self, message: &str) {
            self.warnings.borrow_mut().push(message.to_string());
        }
        fn wait_on(&self, _message: &str) {}
        fn succeed(&self) {}
        fn fail(&self, _error: &Error) {
            *self.failures.borrow_mut() += 1;
        }
    }

    fn project(modules: &HashMap<&str, &str>) -> tempfile::TempDir {
        let td = tempfile::tempdir().expect("tmp");
        std::fs::write(td.path().join("package.json"), r#"{"name":"app"}"#).unwrap();
        for (name, manifest) in modules {
            let dir = crate::types::installed_module_dir(td.path(), name);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("package.json"), manifest).unwrap();
        }
        td
    }

    fn request(modules: &[&str]) -> InstallRequest {
        InstallRequest {
            modules: modules.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn installs_missing_types_as_dev_dependency() {
        let td = project(&HashMap::from([("lodash", r#"{"name":"lodash"}"#)]));
        let runner = FakeRunner::ok();
        let registry = FakeRegistry { available: vec!["lodash"], ..Default::default() };
        let summary = Pipeline::new(&runner, &registry, td.path())
            .run(&request(&["lodash"]), &Silent)
            .unwrap();

        assert_eq!(
            runner.calls(),
            vec![
                ("npm".to_string(), args(&["i", "lodash"])),
                ("npm".to_string(), args(&["i", "-D", "@types/lodash"])),
            ]
        );
        assert_eq!(summary.types_installed, vec!["@types/lodash"]);
        assert_eq!(
            summary.status_of("lodash"),
            Some(ModuleTypeStatus::TypesAvailableExternally)
        );
    }

    #[test]
    fn failed_primary_install_stops_the_run() {
        let td = project(&HashMap::from([("left-pad", r#"{"name":"left-pad"}"#)]));
        let runner = FakeRunner::failing_first();
        let registry = FakeRegistry { available: vec!["left-pad"], ..Default::default() };
        let progress = Recorded::default();
        let err = Pipeline::new(&runner, &registry, td.path())
            .run(&request(&["left-pad"]), &progress)
            .unwrap_err();

        assert!(matches!(err, Error::InstallFailed { code: Some(1), .. }));
        assert_eq!(runner.calls().len(), 1);
        assert!(registry.queried.lock().unwrap().is_empty());
        assert_eq!(*progress.failures.borrow(), 1);
    }

    #[test]
    fn registry_error_aborts_before_second_install() {
        let td = project(&HashMap::from([
            ("express", r#"{"name":"express"}"#),
            ("lodash", r#"{"name":"lodash"}"#),
        ]));
        let runner = FakeRunner::ok();
        let registry = FakeRegistry {
            available: vec!["lodash"],
            broken: vec!["express"],
            ..Default::default()
        };
        let err = Pipeline::new(&runner, &registry, td.path())
            .run(&request(&["express", "lodash"]), &Silent)
            .unwrap_err();
        assert!(matches!(err, Error::Registry { status: 500, .. }));
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn unavailable_types_skip_second_install() {
        let td = project(&HashMap::from([("left-pad", r#"{"name":"left-pad"}"#)]));
        let runner = FakeRunner::ok();
        let registry = FakeRegistry::default();
        let summary = Pipeline::new(&runner, &registry, td.path())
            .run(&request(&["left-pad"]), &Silent)
            .unwrap();
        assert_eq!(runner.calls().len(), 1);
        assert!(summary.types_installed.is_empty());
        assert_eq!(summary.status_of("left-pad"), Some(ModuleTypeStatus::MissingTypes));
    }

    #[test]
    fn only_modules_missing_types_are_looked_up() {
        let td = project(&HashMap::from([
            ("jest", r#"{"name":"jest"}"#),
            ("axios", r#"{"name":"axios","types":"index.d.ts"}"#),
            ("chalk", r#"{"name":"chalk"}"#),
        ]));
        let runner = FakeRunner::ok();
        let registry = FakeRegistry { available: vec!["chalk"], ..Default::default() };
        let summary = Pipeline::new(&runner, &registry, td.path())
            .run(&request(&["jest", "axios", "chalk", "not-installed"]), &Silent)
            .unwrap();

        assert_eq!(*registry.queried.lock().unwrap(), vec!["chalk".to_string()]);
        assert_eq!(summary.status_of("jest"), Some(ModuleTypeStatus::Exception));
        assert_eq!(summary.status_of("axios"), Some(ModuleTypeStatus::HasOwnTypes));
        assert_eq!(summary.status_of("not-installed"), Some(ModuleTypeStatus::Unreadable));
        assert_eq!(runner.calls()[1].1, args(&["i", "-D", "@types/chalk"]));
    }

    #[test]
    fn prod_installs_types_as_regular_dependency_with_exact() {
        let td = project(&HashMap::from([("lodash", r#"{"name":"lodash"}"#)]));
        std::fs::write(td.path().join("yarn.lock"), "").unwrap();
        let runner = FakeRunner::ok();
        let registry = FakeRegistry { available: vec!["lodash"], ..Default::default() };
        let req = InstallRequest { prod: true, exact: true, ..request(&["lodash"]) };
        let progress = Recorded::default();
        Pipeline::new(&runner, &registry, td.path())
            .run(&req, &progress)
            .unwrap();

        assert_eq!(
            runner.calls(),
            vec![
                ("yarn".to_string(), args(&["add", "-E", "lodash"])),
                ("yarn".to_string(), args(&["add", "-E", "@types/lodash"])),
            ]
        );
        assert_eq!(*progress.logs.borrow(), vec!["Running using yarn".to_string()]);
        assert!(progress.warnings.borrow().is_empty());
    }

    #[test]
    fn dev_and_prod_together_warn_but_proceed() {
        let td = project(&HashMap::new());
        let runner = FakeRunner::ok();
        let registry = FakeRegistry::default();
        let req = InstallRequest {
            dev: true,
            prod: true,
            package_manager: Some(PackageManager::Pnpm),
            ..request(&["left-pad"])
        };
        let progress = Recorded::default();
        Pipeline::new(&runner, &registry, td.path())
            .run(&req, &progress)
            .unwrap();
        assert_eq!(progress.warnings.borrow().len(), 1);
        assert_eq!(runner.calls(), vec![("pnpm".to_string(), args(&["i", "-D", "left-pad"]))]);
    }

    #[test]
    fn never_installs_a_name_twice() {
        let td = project(&HashMap::from([
            ("lodash", r#"{"name":"lodash"}"#),
            ("@types/lodash", r#"{"name":"@types/lodash","types":"index.d.ts"}"#),
        ]));
        let runner = FakeRunner::ok();
        let registry = FakeRegistry { available: vec!["lodash"], ..Default::default() };
        let summary = Pipeline::new(&runner, &registry, td.path())
            .run(&request(&["lodash", "@types/lodash", "lodash"]), &Silent)
            .unwrap();
        assert_eq!(
            runner.calls(),
            vec![("npm".to_string(), args(&["i", "lodash", "@types/lodash"]))]
        );
        assert!(summary.types_installed.is_empty());
    }

    #[test]
    fn versioned_duplicate_installs_once() {
        let td = project(&HashMap::from([("lodash", r#"{"name":"lodash"}"#)]));
        let runner = FakeRunner::ok();
        let registry = FakeRegistry { available: vec!["lodash"], ..Default::default() };
        let summary = Pipeline::new(&runner, &registry, td.path())
            .run(&request(&["lodash", "chalk@5", "lodash@4"]), &Silent)
            .unwrap();
        assert_eq!(
            runner.calls(),
            vec![
                ("npm".to_string(), args(&["i", "lodash@4", "chalk@5"])),
                ("npm".to_string(), args(&["i", "-D", "@types/lodash"])),
            ]
        );
        assert_eq!(summary.installed, vec!["lodash@4", "chalk@5"]);
        assert_eq!(*registry.queried.lock().unwrap(), vec!["lodash@4"]);
    }

    /// Answers 404 once `expected` lookups are in flight together, or 500 after a timeout.
    struct Rendezvous {
        expected: usize,
        arrived: Mutex<usize>,
        all_here: Condvar,
    }

    impl TypesLookup for Rendezvous {
        fn types_available(&self, module: &str) -> Result<Option<String>> {
            let mut arrived = self.arrived.lock().unwrap();
            *arrived += 1;
            self.all_here.notify_all();
            let (arrived, timeout) = self
                .all_here
                .wait_timeout_while(arrived, Duration::from_secs(5), |n| *n < self.expected)
                .unwrap();
            if timeout.timed_out() && *arrived < self.expected {
                return Err(Error::Registry { url: format!("fake/{module}"), status: 500 });
            }
            Ok(None)
        }
    }

    #[test]
    fn lookups_run_concurrently_past_core_count() {
        let names: Vec<String> = (0..24).map(|i| format!("untyped-{i}")).collect();
        let manifests: Vec<(String, String)> = names
            .iter()
            .map(|n| (n.clone(), format!(r#"{{"name":"{n}"}}"#)))
            .collect();
        let td = project(
            &manifests
                .iter()
                .map(|(n, m)| (n.as_str(), m.as_str()))
                .collect(),
        );
        let runner = FakeRunner::ok();
        let registry = Rendezvous {
            expected: names.len(),
            arrived: Mutex::new(0),
            all_here: Condvar::new(),
        };
        let modules: Vec<&str> = names.iter().map(String::as_str).collect();
        let summary = Pipeline::new(&runner, &registry, td.path())
            .run(&request(&modules), &Silent)
            .unwrap();
        assert!(summary.types_installed.is_empty());
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn empty_request_runs_nothing() {
        let td = project(&HashMap::new());
        let runner = FakeRunner::ok();
        let registry = FakeRegistry::default();
        let summary = Pipeline::new(&runner, &registry, td.path())
            .run(&InstallRequest::default(), &Silent)
            .unwrap();
        assert!(runner.calls().is_empty());
        assert!(summary.installed.is_empty());
    }

    #[test]
    fn package_listing() {
        assert_eq!(list_packages_with_message("Installed:", &[]), "");
        assert_eq!(
            list_packages_with_message("Installed:", &args(&["@types/a", "@types/b"])),
            "Installed:\n @types/a\n @types/b"
        );
    }
}
