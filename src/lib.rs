pub mod cli;
pub mod command;
pub mod env;
pub mod install;
pub mod model;
pub mod recorder;
pub mod vcs;
pub mod workspace;

mod api;
mod config;
mod flock;

pub use api::{Goop, GoopBuilder};
