use std::process::ExitCode;

use clap::Parser;
use goop::{
    cli::args::{CliArgs, Command},
    command::CommandError,
    Goop,
};

fn run() -> anyhow::Result<()> {
    let cli_args: CliArgs = CliArgs::parse();

    let mut builder = Goop::builder()
        .manifest_file_name(&cli_args.manifest_location)
        .lock_file_name(&cli_args.lockfile_location);
    if let Some(vendor_directory) = &cli_args.vendor_directory {
        builder = builder.vendor_directory(vendor_directory);
    }
    if let Some(jobs) = cli_args.jobs {
        builder = builder.jobs(jobs);
    }
    let goop = builder.try_build()?;

    match cli_args.cmd {
        Command::Install => goop.install(),
        Command::Update => goop.update(),
        Command::Exec { command } => match command.split_first() {
            Some((name, args)) => goop.exec(name, args),
            None => Ok(()),
        },
        Command::Go { args } => goop.exec("go", &args),
        Command::Env => goop.print_env(&mut std::io::stdout().lock()),
        Command::Init => goop.init(),
    }
}

/// The wrapped tool's exit code if a subprocess failed, 1 for anything else.
fn exit_code(error: &anyhow::Error) -> u8 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<CommandError>())
        .and_then(CommandError::exit_code)
        .and_then(|code| u8::try_from(code).ok())
        .filter(|code| *code != 0)
        .unwrap_or(1)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}
