//! Command-line interface for forge
//!
//! ## Module Structure
//!
//! - `args`: CLI argument definitions (clap)
//! - `run`: entry point and command dispatch
//! - `commands`: `generate` and `config`
//! - `chat`: the interactive session
//! - `progress`: terminal rendering of orchestrator events

pub mod args;
mod chat;
mod commands;
mod progress;
mod run;

pub use args::{Cli, Commands};
pub use run::run;
