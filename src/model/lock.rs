use std::{
    collections::{btree_map, BTreeMap},
    io::Write,
    path::Path,
};

use log::debug;
use thiserror::Error;

use super::{goopfile, Dependency, ParseError};

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Dependency {0} has no resolved revision")]
    UnresolvedRevision(String),
    #[error("IO error writing lock file: {0}")]
    IO(#[from] std::io::Error),
}

/// Fully resolved dependencies keyed by package path.
///
/// Iteration (and therefore serialization) is ordered by package path so that
/// the lock file diff only depends on what changed, not on discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockFile {
    dependencies: BTreeMap<String, Dependency>,
}

impl LockFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: &Path) -> Result<LockFile, ParseError> {
        Ok(goopfile::from_file(path)?.into_iter().collect())
    }

    pub fn from_str(s: &str) -> Result<LockFile, ParseError> {
        Ok(goopfile::from_str(s)?.into_iter().collect())
    }

    /// Records a dependency, replacing any previous entry for the same package.
    pub fn insert(&mut self, dependency: Dependency) -> Option<Dependency> {
        self.dependencies
            .insert(dependency.pkg.clone(), dependency)
    }

    pub fn contains(&self, pkg: &str) -> bool {
        self.dependencies.contains_key(pkg)
    }

    pub fn get(&self, pkg: &str) -> Option<&Dependency> {
        self.dependencies.get(pkg)
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn iter(&self) -> btree_map::Values<'_, String, Dependency> {
        self.dependencies.values()
    }

    pub fn to_string(&self) -> Result<String, LockError> {
        let mut out = String::new();
        for dependency in self.iter() {
            if dependency.rev.is_empty() {
                return Err(LockError::UnresolvedRevision(dependency.pkg.clone()));
            }
            out.push_str(&dependency.to_string());
            out.push('\n');
        }
        Ok(out)
    }

    /// Writes the lock file next to its final location and renames it into
    /// place, so readers never observe a half written file.
    pub fn write(&self, path: &Path) -> Result<(), LockError> {
        let content = self.to_string()?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "lock".to_owned());
        let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));
        debug!("Writing lock file through {}", tmp_path.display());
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        if let Err(err) = std::fs::rename(&tmp_path, path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(err.into());
        }
        Ok(())
    }
}

impl FromIterator<Dependency> for LockFile {
    fn from_iter<I: IntoIterator<Item = Dependency>>(iter: I) -> Self {
        let mut lock_file = LockFile::new();
        for dependency in iter {
            lock_file.insert(dependency);
        }
        lock_file
    }
}

impl<'a> IntoIterator for &'a LockFile {
    type Item = &'a Dependency;
    type IntoIter = btree_map::Values<'a, String, Dependency>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
