use std::{
    io,
    path::{Path, PathBuf},
};

use log::{debug, trace};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("IO error on {}: {error}", .path.display())]
    IO { path: PathBuf, error: io::Error },
}

trait WithPath<T> {
    fn at(self, path: &Path) -> Result<T, WorkspaceError>;
}

impl<T> WithPath<T> for io::Result<T> {
    fn at(self, path: &Path) -> Result<T, WorkspaceError> {
        self.map_err(|error| WorkspaceError::IO {
            path: path.to_path_buf(),
            error,
        })
    }
}

/// The vendor tree: `src/` holds promoted packages, `tmp/` is the staging
/// GOPATH of the current run and `bin/` receives installed binaries.
#[derive(Debug, Clone)]
pub struct Workspace {
    vendor_dir: PathBuf,
}

impl Workspace {
    pub fn new(vendor_dir: impl Into<PathBuf>) -> Self {
        Workspace {
            vendor_dir: vendor_dir.into(),
        }
    }

    pub fn vendor_dir(&self) -> &Path {
        &self.vendor_dir
    }

    pub fn src_dir(&self) -> PathBuf {
        self.vendor_dir.join("src")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.vendor_dir.join("tmp")
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.vendor_dir.join("bin")
    }

    pub fn permanent_path(&self, root: &str) -> PathBuf {
        self.src_dir().join(root)
    }

    pub fn staging_path(&self, root: &str) -> PathBuf {
        self.tmp_dir().join("src").join(root)
    }

    /// Throws away whatever a previous run left in `tmp/` and recreates
    /// `tmp/src`.
    pub fn reset_staging(&self) -> Result<(), WorkspaceError> {
        self.remove_staging()?;
        let staging_src = self.tmp_dir().join("src");
        std::fs::create_dir_all(&staging_src).at(&staging_src)
    }

    pub fn remove_staging(&self) -> Result<(), WorkspaceError> {
        let tmp = self.tmp_dir();
        match std::fs::remove_dir_all(&tmp) {
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other.at(&tmp),
        }
    }

    /// Makes an already vendored repository visible in the staging tree
    /// without fetching it again.
    pub fn link_existing(&self, root: &str) -> Result<(), WorkspaceError> {
        let staging = self.staging_path(root);
        if let Some(parent) = staging.parent() {
            std::fs::create_dir_all(parent).at(parent)?;
        }
        trace!("Linking {} to {}", staging.display(), root);
        symlink_dir(&self.permanent_path(root), &staging).at(&staging)
    }

    /// Moves a staged repository into `src/`. A staged symlink already points
    /// at its permanent location and is just removed.
    ///
    /// Returns `false` if nothing was staged under `root`, which happens when
    /// several packages of one repository were locked.
    pub fn promote(&self, root: &str) -> Result<bool, WorkspaceError> {
        let staging = self.staging_path(root);
        let permanent = self.permanent_path(root);

        let metadata = match std::fs::symlink_metadata(&staging) {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(error) => return Err(error).at(&staging),
        };

        if let Some(parent) = permanent.parent() {
            std::fs::create_dir_all(parent).at(parent)?;
        }

        if metadata.file_type().is_symlink() {
            remove_symlink_dir(&staging).at(&staging)?;
        } else {
            if std::fs::symlink_metadata(&permanent).is_ok() {
                debug!("Replacing {}", permanent.display());
                std::fs::remove_dir_all(&permanent).at(&permanent)?;
            }
            std::fs::rename(&staging, &permanent).at(&permanent)?;
        }
        Ok(true)
    }
}

#[cfg(unix)]
fn symlink_dir(original: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink_dir(original: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(original, link)
}

#[cfg(unix)]
fn remove_symlink_dir(link: &Path) -> io::Result<()> {
    std::fs::remove_file(link)
}

#[cfg(windows)]
fn remove_symlink_dir(link: &Path) -> io::Result<()> {
    std::fs::remove_dir(link)
}
