use std::{
    fmt::{self, Display},
    io::{Read, Write},
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use log::{debug, trace};
use thiserror::Error;

use crate::env::Env;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Failed to start `{command}`: {error}")]
    Spawn {
        command: String,
        error: std::io::Error,
    },
    #[error("Command `{command}` failed with {}", describe_exit(.code))]
    Failed { command: String, code: Option<i32> },
    #[error("IO error while running `{command}`: {error}")]
    IO {
        command: String,
        error: std::io::Error,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {code}"),
        None => "no exit status (killed by a signal)".to_owned(),
    }
}

impl CommandError {
    /// Exit code of the failed subprocess, if it ran and exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            CommandError::Failed { code, .. } => *code,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Output {
    /// stdout and stderr go to the console.
    #[default]
    Inherit,
    /// stdout and stderr are discarded.
    Quiet,
}

/// A fully described subprocess call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub dir: Option<PathBuf>,
    pub env: Option<Env>,
    pub output: Output,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Invocation {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn env(mut self, env: Env) -> Self {
        self.env = Some(env);
        self
    }

    pub fn quiet(mut self) -> Self {
        self.output = Output::Quiet;
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(dir) = &self.dir {
            command.current_dir(dir);
        }
        if let Some(env) = &self.env {
            command.env_clear().envs(env.iter());
        }
        command
    }

    fn failed(&self, code: Option<i32>) -> CommandError {
        CommandError::Failed {
            command: self.to_string(),
            code,
        }
    }

    fn spawn_error(&self, error: std::io::Error) -> CommandError {
        CommandError::Spawn {
            command: self.to_string(),
            error,
        }
    }

    fn io_error(&self, error: std::io::Error) -> CommandError {
        CommandError::IO {
            command: self.to_string(),
            error,
        }
    }
}

impl Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Runs external tools. Everything the installer does to the outside world
/// apart from filesystem moves goes through this trait.
pub trait CommandRunner: Send + Sync {
    /// Runs to completion, failing on a non-zero exit.
    fn run(&self, invocation: &Invocation) -> Result<(), CommandError>;

    /// Runs to completion and returns trimmed stdout. stderr goes to the console.
    fn output(&self, invocation: &Invocation) -> Result<String, CommandError>;

    /// Runs to completion, streaming the subprocess's stderr into `stderr`.
    fn run_with_stderr(
        &self,
        invocation: &Invocation,
        stderr: &mut dyn Write,
    ) -> Result<(), CommandError>;
}

/// Spawns real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<(), CommandError> {
        debug!("Running `{invocation}`");
        let mut command = invocation.command();
        if invocation.output == Output::Quiet {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }
        let status = command
            .status()
            .map_err(|error| invocation.spawn_error(error))?;
        if status.success() {
            Ok(())
        } else {
            Err(invocation.failed(status.code()))
        }
    }

    fn output(&self, invocation: &Invocation) -> Result<String, CommandError> {
        debug!("Running `{invocation}`");
        let mut command = invocation.command();
        command.stdin(Stdio::null()).stdout(Stdio::piped());
        if invocation.output == Output::Quiet {
            command.stderr(Stdio::null());
        }
        let output = command
            .output()
            .map_err(|error| invocation.spawn_error(error))?;
        if !output.status.success() {
            return Err(invocation.failed(output.status.code()));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        trace!("`{invocation}` printed {:?}", stdout);
        Ok(stdout.trim().to_owned())
    }

    fn run_with_stderr(
        &self,
        invocation: &Invocation,
        stderr: &mut dyn Write,
    ) -> Result<(), CommandError> {
        debug!("Running `{invocation}`");
        let mut child = invocation
            .command()
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| invocation.spawn_error(error))?;

        if let Some(mut pipe) = child.stderr.take() {
            let mut buf = [0u8; 8192];
            loop {
                let n = pipe.read(&mut buf).map_err(|e| invocation.io_error(e))?;
                if n == 0 {
                    break;
                }
                stderr
                    .write_all(&buf[..n])
                    .map_err(|e| invocation.io_error(e))?;
            }
        }

        let status = child.wait().map_err(|e| invocation.io_error(e))?;
        if status.success() {
            Ok(())
        } else {
            Err(invocation.failed(status.code()))
        }
    }
}
