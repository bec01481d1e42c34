use std::{
    collections::BTreeMap,
    ffi::{OsStr, OsString},
    path::PathBuf,
};

use crate::workspace::Workspace;

#[cfg(windows)]
const LIST_SEPARATOR: &str = ";";
#[cfg(not(windows))]
const LIST_SEPARATOR: &str = ":";

/// A snapshot of environment variables.
///
/// Values are never written back to the process environment; subprocesses get
/// the snapshot explicitly through [`Env::iter`]. Names and values are kept as
/// OS strings so nothing is lost on the way to a subprocess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Env {
    vars: BTreeMap<OsString, OsString>,
}

impl Env {
    /// Captures the current process environment.
    pub fn from_process() -> Self {
        std::env::vars_os().collect()
    }

    /// Value of `key`, if it is set and valid unicode.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_os(key).and_then(OsStr::to_str)
    }

    pub fn get_os(&self, key: &str) -> Option<&OsStr> {
        self.vars.get(OsStr::new(key)).map(OsString::as_os_str)
    }

    pub fn set(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Puts `value` in front of the list stored in `key`. An unset or empty
    /// variable is simply set to `value`.
    pub fn prepend(mut self, key: &str, value: impl AsRef<OsStr>) -> Self {
        let mut joined = value.as_ref().to_owned();
        if let Some(old) = self.get_os(key).filter(|old| !old.is_empty()) {
            joined.push(LIST_SEPARATOR);
            joined.push(old);
        }
        self.vars.insert(key.into(), joined);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.vars.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str()))
    }

    /// `KEY=value` pairs, the way a shell would print them.
    pub fn to_strings(&self) -> Vec<String> {
        self.iter()
            .map(|(k, v)| format!("{}={}", k.to_string_lossy(), v.to_string_lossy()))
            .collect()
    }
}

impl<K: Into<OsString>, V: Into<OsString>> FromIterator<(K, V)> for Env {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Env {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GopathMode {
    /// `GOPATH` is the vendor directory only.
    Replace,
    /// The vendor directory is put in front of the ambient `GOPATH`.
    Prepend,
}

/// Builds subprocess environments that point the Go toolchain at the vendor
/// workspace.
#[derive(Debug, Clone)]
pub struct EnvPatcher {
    base: Env,
    workspace: Workspace,
}

impl EnvPatcher {
    pub fn new(base: Env, vendor_dir: impl Into<PathBuf>) -> Self {
        EnvPatcher {
            base,
            workspace: Workspace::new(vendor_dir),
        }
    }

    pub fn base(&self) -> &Env {
        &self.base
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.workspace.bin_dir()
    }

    pub fn patched(&self, mode: GopathMode) -> Env {
        let vendor_dir = self.workspace.vendor_dir();
        let bin_dir = self.workspace.bin_dir();

        let env = match mode {
            GopathMode::Replace => self.base.clone().set("GOPATH", vendor_dir),
            GopathMode::Prepend => self.base.clone().prepend("GOPATH", vendor_dir),
        };
        env.set("GOBIN", &bin_dir).prepend("PATH", &bin_dir)
    }
}
