use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    cli::command_handlers::{do_exec, do_init, do_install, do_print_env, do_update},
    command::CommandRunner,
    env::{Env, EnvPatcher},
    install::Installer,
    vcs::{HostingLookup, ImportPathLookup, Resolver},
    workspace::Workspace,
};

mod builder;

pub use builder::GoopBuilder;

pub struct Goop {
    root: PathBuf,
    manifest_file_name: PathBuf,
    lock_file_name: PathBuf,
    vendor_dir: PathBuf,
    jobs: usize,
    probe_overrides: bool,
    remote_lookup: bool,
    runner: Arc<dyn CommandRunner>,
    base_env: Env,
}

impl Goop {
    pub fn builder() -> GoopBuilder {
        GoopBuilder::default()
    }

    pub fn vendor_dir(&self) -> &Path {
        &self.vendor_dir
    }

    /// Installs the locked revisions if there is a lock file, otherwise
    /// installs from the Goopfile and writes the lock file.
    pub fn install(&self) -> anyhow::Result<()> {
        do_install(
            &self.installer()?,
            &self.root,
            &self.manifest_file_name,
            &self.lock_file_name,
        )?;
        Ok(())
    }

    /// Installs from the Goopfile, ignoring the lock file, and rewrites the
    /// lock file.
    pub fn update(&self) -> anyhow::Result<()> {
        do_update(
            &self.installer()?,
            &self.root,
            &self.manifest_file_name,
            &self.lock_file_name,
        )?;
        Ok(())
    }

    /// Runs `name` with the vendor directory in front of `GOPATH` and `PATH`.
    /// A binary installed into the vendor directory wins over one on `PATH`.
    pub fn exec(&self, name: &str, args: &[String]) -> anyhow::Result<()> {
        do_exec(self.runner.as_ref(), &self.env_patcher(), name, args)
    }

    /// Prints the `GOPATH` and `PATH` that `exec` would use.
    pub fn print_env(&self, out: &mut dyn Write) -> anyhow::Result<()> {
        do_print_env(&self.env_patcher(), out)
    }

    /// Generates a Goopfile listing the external packages the project imports.
    pub fn init(&self) -> anyhow::Result<()> {
        do_init(
            self.runner.as_ref(),
            &*self.lookup()?,
            &self.env_patcher(),
            &self.root,
            &self.manifest_file_name,
        )
    }

    fn env_patcher(&self) -> EnvPatcher {
        EnvPatcher::new(self.base_env.clone(), &self.vendor_dir)
    }

    fn lookup(&self) -> anyhow::Result<Box<dyn ImportPathLookup>> {
        Ok(if self.remote_lookup {
            Box::new(HostingLookup::with_remote()?)
        } else {
            Box::new(HostingLookup::offline())
        })
    }

    fn installer(&self) -> anyhow::Result<Installer> {
        let resolver = Resolver::new(self.lookup()?, self.runner.clone())
            .probe_overrides(self.probe_overrides);
        Ok(Installer::new(
            self.runner.clone(),
            resolver,
            Workspace::new(&self.vendor_dir),
            self.base_env.clone(),
        )
        .jobs(self.jobs))
    }
}
