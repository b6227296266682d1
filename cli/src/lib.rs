//! `successfuel` command line.
//!
//! ## Commands
//!
//! - `successfuel check [--retries N] [--json]`
//! - `successfuel watch [--interval-ms N] [--json]`
//! - `successfuel login --login <LOGIN> [--password-stdin]`
//! - `successfuel logout`
//! - `successfuel profile [--refresh] [--json]`
//! - `successfuel config`

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use successfuel_core::config::{AppConfig, ConfigLoader};

pub mod auth_cmd;
pub mod connectivity_cmd;

use auth_cmd::{LoginArgs, ProfileArgs};
use connectivity_cmd::{CheckArgs, WatchArgs};

#[derive(Debug, Parser)]
#[command(name = "successfuel", version, about = "SuccessFuel API connectivity client")]
pub struct Cli {
    /// Config file (defaults to ./successfuel.toml, then the platform config dir).
    #[arg(long = "config", short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace). Overrides RUST_LOG.
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Probe the API health endpoint, retrying with backoff.
    Check(CheckArgs),
    /// Print connection status changes until Ctrl-C.
    Watch(WatchArgs),
    /// Log in and store the session token.
    Login(LoginArgs),
    /// End the stored session.
    Logout,
    /// Show the logged-in user's profile.
    Profile(ProfileArgs),
    /// Print the effective configuration as TOML.
    Config,
}

impl Cli {
    /// Log filter requested with `-v`, if any.
    pub fn verbosity_filter(&self) -> Option<&'static str> {
        match self.verbose {
            0 => None,
            1 => Some("debug"),
            _ => Some("trace"),
        }
    }

    pub fn load_config(&self) -> anyhow::Result<AppConfig> {
        let config = match &self.config {
            Some(path) => ConfigLoader::new().with_file(path).load()?,
            None => ConfigLoader::load_default()?,
        };
        Ok(config)
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = cli.load_config()?;

    match cli.command {
        Command::Check(args) => connectivity_cmd::run_check(&config, &args).await,
        Command::Watch(args) => {
            connectivity_cmd::run_watch(&config, &args).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Login(args) => {
            auth_cmd::run_login(&config, &args).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Logout => {
            auth_cmd::run_logout(&config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Profile(args) => auth_cmd::run_profile(&config, &args).await,
        Command::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}
