use std::{
    collections::BTreeMap,
    io,
    path::Path,
    sync::{Arc, Mutex},
};

use dashmap::DashMap;
use log::{debug, error, info, warn};
use thiserror::Error;

use crate::{
    command::{CommandError, CommandRunner, Invocation},
    env::{Env, EnvPatcher, GopathMode},
    model::{goopfile, lock::LockError, Dependency, LockFile, ParseError},
    recorder::DownloadRecorder,
    vcs::{RepoRoot, ResolveError, Resolver},
    workspace::{Workspace, WorkspaceError},
};

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Error while reading dependencies: {0}")]
    Parse(#[from] ParseError),
    #[error("Error while resolving repository: {0}")]
    Resolve(#[from] ResolveError),
    #[error("Error while running command: {0}")]
    Command(#[from] CommandError),
    #[error("Error while preparing vendor directory: {0}")]
    Workspace(#[from] WorkspaceError),
    #[error("Error while writing lock file: {0}")]
    Lock(#[from] LockError),
    #[error("Could not determine the checked out revision of {0}")]
    UnresolvedRevision(String),
    #[error("Worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("IO error: {0}")]
    IO(#[from] io::Error),
}

/// A dependency checked out in the staging tree at a known revision.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Staged {
    dependency: Dependency,
    repo_root: RepoRoot,
}

struct Stager {
    runner: Arc<dyn CommandRunner>,
    resolver: Resolver,
    workspace: Workspace,
    env: EnvPatcher,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

impl Stager {
    fn stage(&self, dependency: &Dependency) -> Result<Staged, InstallError> {
        match dependency.url_override() {
            None => info!("Fetching {}...", dependency.pkg),
            Some(url) => info!("Fetching {} from {url}...", dependency.pkg),
        }

        let repo_root = self
            .resolver
            .resolve(&dependency.pkg, dependency.url_override())?;

        // Sub-packages of one repository share a checkout.
        let slot = self
            .in_flight
            .entry(repo_root.root.clone())
            .or_default()
            .value()
            .clone();
        let _guard = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let vcs = repo_root.vcs;
        let staging = self.workspace.staging_path(&repo_root.root);
        let permanent = self.workspace.permanent_path(&repo_root.root);
        let staged_already = std::fs::symlink_metadata(&staging).is_ok();
        let env = self.env.patched(GopathMode::Prepend);

        if staged_already {
            debug!("{} is already staged", repo_root.root);
        } else if permanent.exists() {
            warn!("{} already exists; skipping!", permanent.display());
            self.workspace.link_existing(&repo_root.root)?;
        } else {
            if let Some(parent) = staging.parent() {
                std::fs::create_dir_all(parent)?;
            }
            self.runner
                .run(&vcs.clone_repo(&repo_root.repo_url, &staging).env(env.clone()))?;
        }

        let rev = if dependency.rev.is_empty() {
            let current = self
                .runner
                .output(&vcs.current_revision(&staging).env(env.clone()))?;
            if current.is_empty() {
                return Err(InstallError::UnresolvedRevision(dependency.pkg.clone()));
            }
            current
        } else {
            dependency.rev.clone()
        };

        info!("Checking out \"{rev}\"");
        self.runner.run(&vcs.fetch(&staging).env(env.clone()))?;
        self.runner.run(&vcs.checkout(&staging, &rev).env(env))?;

        Ok(Staged {
            dependency: Dependency {
                rev,
                ..dependency.clone()
            },
            repo_root,
        })
    }
}

/// Fetches dependencies into the vendor tree and works out the revisions to
/// lock.
pub struct Installer {
    stager: Arc<Stager>,
    jobs: usize,
}

impl Installer {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        resolver: Resolver,
        workspace: Workspace,
        base_env: Env,
    ) -> Self {
        let env = EnvPatcher::new(base_env, workspace.vendor_dir());
        Installer {
            stager: Arc::new(Stager {
                runner,
                resolver,
                workspace,
                env,
                in_flight: DashMap::new(),
            }),
            jobs: 1,
        }
    }

    pub fn vendor_dir(&self) -> &Path {
        self.stager.workspace.vendor_dir()
    }

    /// Number of direct dependencies fetched at the same time.
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Reads dependencies from a Goopfile or lock file and installs them.
    pub fn install_from(
        &self,
        source: &Path,
        lock_path: Option<&Path>,
    ) -> Result<LockFile, InstallError> {
        let dependencies = goopfile::from_file(source)?;
        self.install(&dependencies, lock_path)
    }

    /// Installs `dependencies` and returns what was locked. The lock file is
    /// only written if `lock_path` is given.
    ///
    /// The staging tree is removed afterwards whether or not the install
    /// succeeded.
    pub fn install(
        &self,
        dependencies: &[Dependency],
        lock_path: Option<&Path>,
    ) -> Result<LockFile, InstallError> {
        let workspace = &self.stager.workspace;
        workspace.reset_staging()?;

        let result = self.install_staged(dependencies, lock_path);

        match (result, workspace.remove_staging()) {
            (Ok(lock_file), Ok(())) => {
                info!("Done!");
                Ok(lock_file)
            }
            (Ok(_), Err(cleanup)) => Err(cleanup.into()),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(cleanup)) => {
                error!("Could not remove staging directory: {cleanup}");
                Err(err)
            }
        }
    }

    fn install_staged(
        &self,
        dependencies: &[Dependency],
        lock_path: Option<&Path>,
    ) -> Result<LockFile, InstallError> {
        let direct = self.stage_direct(dependencies)?;

        let mut staged: BTreeMap<String, Staged> = direct
            .iter()
            .map(|s| (s.dependency.pkg.clone(), s.clone()))
            .collect();

        for parent in &direct {
            for staged_dependency in self.stage_transitive(parent, &staged)? {
                staged.insert(staged_dependency.dependency.pkg.clone(), staged_dependency);
            }
        }

        let workspace = &self.stager.workspace;
        for s in staged.values() {
            if workspace.promote(&s.repo_root.root)? {
                debug!("Promoted {}", s.repo_root.root);
            }
        }

        for s in staged.values() {
            self.build(s);
        }

        let lock_file: LockFile = staged.into_values().map(|s| s.dependency).collect();
        if let Some(lock_path) = lock_path {
            lock_file.write(lock_path)?;
            info!("Wrote lock file to {}", lock_path.display());
        }
        Ok(lock_file)
    }

    fn stage_direct(&self, dependencies: &[Dependency]) -> Result<Vec<Staged>, InstallError> {
        if self.jobs <= 1 || dependencies.len() <= 1 {
            return dependencies
                .iter()
                .map(|dependency| self.stager.stage(dependency))
                .collect();
        }

        debug!("Staging {} dependencies with {} jobs", dependencies.len(), self.jobs);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(self.jobs)
            .build()?;

        let joined = runtime.block_on(async {
            let handles: Vec<_> = dependencies
                .iter()
                .cloned()
                .map(|dependency| {
                    let stager = self.stager.clone();
                    tokio::task::spawn_blocking(move || stager.stage(&dependency))
                })
                .collect();

            let mut joined = Vec::with_capacity(handles.len());
            for handle in handles {
                joined.push(handle.await);
            }
            joined
        });

        joined
            .into_iter()
            .map(|result| -> Result<Staged, InstallError> { result? })
            .collect()
    }

    /// Runs `go get` in a staged dependency and stages every package it had
    /// to download that is not locked yet.
    fn stage_transitive(
        &self,
        parent: &Staged,
        staged: &BTreeMap<String, Staged>,
    ) -> Result<Vec<Staged>, InstallError> {
        info!("Fetching dependencies for {}...", parent.dependency.pkg);
        let workspace = &self.stager.workspace;

        let env = self
            .stager
            .env
            .patched(GopathMode::Replace)
            .set("GOPATH", workspace.tmp_dir());
        let go_get = Invocation::new("go")
            .args(["get", "-d", "-v", "./..."])
            .current_dir(workspace.staging_path(&parent.repo_root.root))
            .env(env);

        let mut recorder = DownloadRecorder::new(io::stderr());
        self.stager.runner.run_with_stderr(&go_get, &mut recorder)?;

        let mut downloads = recorder.downloads();
        downloads.sort();

        let mut discovered = Vec::new();
        for pkg in downloads {
            if staged.contains_key(&pkg) || discovered.iter().any(|s: &Staged| s.dependency.pkg == pkg) {
                continue;
            }
            discovered.push(self.stager.stage(&Dependency::new(pkg))?);
        }
        Ok(discovered)
    }

    fn build(&self, staged: &Staged) {
        let pkg = &staged.dependency.pkg;
        info!("Installing {pkg}...");
        let go_install = Invocation::new("go")
            .args(["install", "-x"])
            .arg(pkg.as_str())
            .current_dir(self.stager.workspace.permanent_path(&staged.repo_root.root))
            .env(self.stager.env.patched(GopathMode::Replace));
        if let Err(err) = self.stager.runner.run(&go_install) {
            warn!("Could not install {pkg}: {err}");
        }
    }
}
