use std::{collections::HashMap, path::PathBuf};

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

use crate::env::Env;

/// Settings read from `GOOP_*` environment variables.
pub struct GoopConfig {
    pub vendor_dir: Option<PathBuf>,
    pub jobs: Option<usize>,
    pub probe_overrides: bool,
}

impl GoopConfig {
    pub fn from_env(env: &Env) -> anyhow::Result<Self> {
        let vars = env
            .iter()
            .filter_map(|(key, value)| {
                Some((key.to_str()?.to_owned(), value.to_str()?.to_owned()))
            })
            .collect();
        Ok(RawConfig::load(Some(vars))?.into())
    }
}

impl From<RawConfig> for GoopConfig {
    fn from(raw_config: RawConfig) -> Self {
        Self {
            vendor_dir: raw_config.vendor.dir,
            jobs: raw_config.install.jobs,
            probe_overrides: raw_config.vcs.probe.unwrap_or(false),
        }
    }
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawConfig {
    #[serde(default)]
    vendor: VendorConfig,
    #[serde(default)]
    install: InstallConfig,
    #[serde(default)]
    vcs: VcsConfig,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct VendorConfig {
    dir: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct InstallConfig {
    jobs: Option<usize>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct VcsConfig {
    probe: Option<bool>,
}

impl RawConfig {
    fn load(env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(
                Environment::with_prefix("GOOP")
                    .separator("_")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}
