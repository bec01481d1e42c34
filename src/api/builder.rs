use std::{env, path::PathBuf, sync::Arc};

use crate::{
    command::{CommandRunner, SystemRunner},
    config::GoopConfig,
    env::Env,
    Goop,
};

#[derive(Default)]
pub struct GoopBuilder {
    // All other paths are relative to `root`
    root: Option<PathBuf>,
    manifest_file_name: Option<PathBuf>,
    lock_file_name: Option<PathBuf>,
    vendor_directory: Option<PathBuf>,
    jobs: Option<usize>,
    probe_overrides: Option<bool>,
    remote_lookup: Option<bool>,
    runner: Option<Arc<dyn CommandRunner>>,
    env: Option<Env>,
}

impl GoopBuilder {
    /// Project root directory.
    ///
    /// Defaults to the current directory.
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.root = Some(path.into());
        self
    }

    /// Name of the manifest.
    ///
    /// Defaults to `Goopfile`.
    pub fn manifest_file_name(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_file_name = Some(path.into());
        self
    }

    /// Name of the lock file.
    ///
    /// Defaults to `Goopfile.lock`.
    pub fn lock_file_name(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_file_name = Some(path.into());
        self
    }

    /// Location of the vendor directory.
    ///
    /// Defaults to `$GOOP_VENDOR_DIR`, or `.vendor`.
    pub fn vendor_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.vendor_directory = Some(path.into());
        self
    }

    /// How many direct dependencies to fetch in parallel.
    ///
    /// Defaults to `$GOOP_INSTALL_JOBS`, or 1.
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    /// Probe override URLs whose VCS cannot be told from the URL.
    ///
    /// Defaults to `$GOOP_VCS_PROBE`, or `false`.
    pub fn probe_overrides(mut self, probe: bool) -> Self {
        self.probe_overrides = Some(probe);
        self
    }

    /// Look up import paths on hosts goop does not know through their
    /// `go-import` meta tags.
    ///
    /// Defaults to `true`.
    pub fn remote_lookup(mut self, enabled: bool) -> Self {
        self.remote_lookup = Some(enabled);
        self
    }

    /// Runs git, hg and go.
    ///
    /// Defaults to spawning real processes.
    pub fn command_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Environment given to every subprocess, and read for `GOOP_*` settings.
    ///
    /// Defaults to the environment of the current process.
    pub fn env(mut self, env: Env) -> Self {
        self.env = Some(env);
        self
    }

    pub fn try_build(self) -> anyhow::Result<Goop> {
        let Self {
            root,
            manifest_file_name,
            lock_file_name,
            vendor_directory,
            jobs,
            probe_overrides,
            remote_lookup,
            runner,
            env: explicit_env,
        } = self;
        let root = match root {
            Some(root) => root,
            None => env::current_dir()?,
        };
        let base_env = explicit_env.unwrap_or_else(Env::from_process);
        let config = GoopConfig::from_env(&base_env)?;

        let manifest_file_name = manifest_file_name.unwrap_or_else(|| PathBuf::from("Goopfile"));

        let lock_file_name = lock_file_name.unwrap_or_else(|| PathBuf::from("Goopfile.lock"));

        let vendor_dir = root.join(
            vendor_directory
                .or(config.vendor_dir)
                .unwrap_or_else(|| PathBuf::from(".vendor")),
        );

        Ok(Goop {
            root,
            manifest_file_name,
            lock_file_name,
            vendor_dir,
            jobs: jobs.or(config.jobs).unwrap_or(1),
            probe_overrides: probe_overrides.unwrap_or(config.probe_overrides),
            remote_lookup: remote_lookup.unwrap_or(true),
            runner: runner.unwrap_or_else(|| Arc::new(SystemRunner)),
            base_env,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let goop = Goop::builder()
            .root("/project")
            .env(Env::default())
            .try_build()
            .unwrap();
        assert_eq!(goop.vendor_dir(), PathBuf::from("/project/.vendor"));
    }

    #[test]
    fn vendor_directory_from_environment() {
        let goop = Goop::builder()
            .root("/project")
            .env(Env::from_iter([("GOOP_VENDOR_DIR", "deps")]))
            .try_build()
            .unwrap();
        assert_eq!(goop.vendor_dir(), PathBuf::from("/project/deps"));

        let goop = Goop::builder()
            .root("/project")
            .env(Env::from_iter([("GOOP_VENDOR_DIR", "/elsewhere")]))
            .try_build()
            .unwrap();
        assert_eq!(goop.vendor_dir(), PathBuf::from("/elsewhere"));
    }

    #[test]
    fn explicit_vendor_directory_wins() {
        let goop = Goop::builder()
            .root("/project")
            .vendor_directory("vendor")
            .env(Env::from_iter([("GOOP_VENDOR_DIR", "deps")]))
            .try_build()
            .unwrap();
        assert_eq!(goop.vendor_dir(), PathBuf::from("/project/vendor"));
    }
}
