use clap::{Parser, Subcommand};

/// Dependency manager for Go projects that vendors packages into the project.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub cmd: Command,
    /// Name of the manifest file
    #[clap(short, long, default_value = "Goopfile")]
    pub manifest_location: String,
    /// Name of the lock file
    #[clap(short, long, default_value = "Goopfile.lock")]
    pub lockfile_location: String,
    /// Vendor directory [default: $GOOP_VENDOR_DIR or .vendor]
    #[clap(short, long)]
    pub vendor_directory: Option<String>,
    /// Number of dependencies fetched in parallel [default: $GOOP_INSTALL_JOBS or 1]
    #[clap(short, long)]
    pub jobs: Option<usize>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Installs dependencies from Goopfile.lock, or from Goopfile if there is no lock file
    Install,
    /// Installs the latest revisions allowed by Goopfile and rewrites Goopfile.lock
    Update,
    /// Runs a command with the vendor directory on GOPATH and PATH
    Exec {
        #[clap(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Runs the go tool with the vendor directory on GOPATH and PATH
    Go {
        #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Prints GOPATH and PATH as used by exec
    Env,
    /// Generates a Goopfile from the packages imported by the project
    Init,
}
