//! `migra` command-line utilities.
//!
//! This crate powers the `migra` binary (see `crates/migra-cli/src/main.rs`).
//! The public surface is intentionally small: most logic lives in internal modules and is
//! dispatched from [`run`].

mod browse;
mod cli;
mod commands;
mod config;
mod generator;
mod init;

/// Runs the `migra` CLI with an argv-style argument list.
///
/// Most callers should pass `std::env::args().collect()`.
pub async fn run(args: Vec<String>) -> anyhow::Result<()> {
    let cmd = cli::parse_args(&args)?;
    match cmd {
        cli::Command::Help(topic) => {
            cli::print_help(topic);
            Ok(())
        }
        cli::Command::Init(args) => init::run(args),
        cli::Command::New(args) => commands::run_new(args).await,
        cli::Command::Up(args) => commands::run_up(args).await,
        cli::Command::Down(args) => commands::run_down(args).await,
        cli::Command::Status(args) => commands::run_status(args).await,
        cli::Command::Browse(args) => browse::run(args).await,
    }
}
