use std::{
    fmt::{self, Display},
    path::Path,
    str::FromStr,
};

use thiserror::Error;

use crate::command::Invocation;

pub mod lookup;
mod resolver;

pub use lookup::{HostingLookup, ImportPathLookup, LookupError, RepoMetadata};
pub use resolver::Resolver;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("VCS {vcs:?} is not supported (repository {location})")]
    UnsupportedVcs { vcs: String, location: String },
    #[error("Could not resolve import path {import_path}: {source}")]
    LookupFailed {
        import_path: String,
        source: LookupError,
    },
}

/// Version control backends goop knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VcsKind {
    Git,
    Hg,
}

impl VcsKind {
    pub const ALL: [VcsKind; 2] = [VcsKind::Git, VcsKind::Hg];

    pub fn cmd(&self) -> &'static str {
        match self {
            VcsKind::Git => "git",
            VcsKind::Hg => "hg",
        }
    }

    pub fn clone_repo(&self, url: &str, dest: &Path) -> Invocation {
        Invocation::new(self.cmd()).arg("clone").arg(url).path_arg(dest)
    }

    /// Brings remote refs up to date without touching the working copy.
    pub fn fetch(&self, path: &Path) -> Invocation {
        let invocation = match self {
            VcsKind::Git => Invocation::new("git").arg("fetch"),
            VcsKind::Hg => Invocation::new("hg").arg("pull"),
        };
        invocation.current_dir(path)
    }

    pub fn checkout(&self, path: &Path, revision: &str) -> Invocation {
        let invocation = match self {
            VcsKind::Git => Invocation::new("git").arg("checkout"),
            VcsKind::Hg => Invocation::new("hg").arg("update"),
        };
        invocation.arg(revision).current_dir(path).quiet()
    }

    pub fn current_revision(&self, path: &Path) -> Invocation {
        let invocation = match self {
            VcsKind::Git => Invocation::new("git").args(["rev-parse", "--verify", "HEAD"]),
            VcsKind::Hg => Invocation::new("hg").args(["log", "-r", ".", "--template", "{node}"]),
        };
        invocation.current_dir(path)
    }

    /// A read-only remote query that only succeeds if `url` is a repository of
    /// this kind.
    pub fn ping(&self, url: &str) -> Invocation {
        let invocation = match self {
            VcsKind::Git => Invocation::new("git").arg("ls-remote"),
            VcsKind::Hg => Invocation::new("hg").arg("identify"),
        };
        invocation.arg(url).quiet()
    }
}

impl FromStr for VcsKind {
    type Err = ResolveError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "git" => Ok(VcsKind::Git),
            "hg" => Ok(VcsKind::Hg),
            other => Err(ResolveError::UnsupportedVcs {
                vcs: other.to_owned(),
                location: String::new(),
            }),
        }
    }
}

impl Display for VcsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cmd())
    }
}

/// Where a package's repository lives and how to fetch it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRoot {
    /// Import path prefix naming the repository itself.
    pub root: String,
    pub vcs: VcsKind,
    pub repo_url: String,
}

/// Guesses the backend from the shape of a repository URL alone.
pub fn guess_vcs(url: &str) -> Option<VcsKind> {
    if url.starts_with("https://github.com")
        || url.starts_with("git://")
        || url.starts_with("git+ssh://")
        || url.starts_with("git@")
        || url.ends_with(".git")
    {
        Some(VcsKind::Git)
    } else if url.starts_with("ssh://hg@") || url.ends_with(".hg") {
        Some(VcsKind::Hg)
    } else {
        None
    }
}
