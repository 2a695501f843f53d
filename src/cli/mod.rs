//! Command-line surface (spec §5).
//!
//! A tagged `clap` subcommand enum dispatched without any dynamic
//! lookup table, per the redesign flag replacing the original's
//! `if/else` chain over raw subcommand strings.

mod display;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use inquire::{Password, Text};
use log::{error, info};

use fileshare_core::core::config::RepositoryConfig;
use fileshare_core::core::error::{Error, Result};
use fileshare_core::core::interrupt;
use fileshare_core::core::resolve::{ConflictPrompt, Resolution};
use fileshare_core::core::sync::{self, Direction};
use fileshare_core::transport::http::HttpRemote;
use fileshare_core::transport::Remote;

#[derive(Parser)]
#[command(name = "fileshare", version, about = "Three-way file synchronization client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand)]
pub enum CliCommand {
    /// Turn the current directory into a fileshare repository.
    Init,
    /// Clone a remote repository into the current (empty) directory.
    Clone { url: String },
    /// Show pending local/remote changes without applying them.
    Status,
    /// Apply remote changes to the local working copy.
    Pull,
    /// Apply local changes to the remote.
    Push,
    /// Apply both local and remote changes.
    Sync,
    /// Authenticate against the configured remote.
    Login,
    /// Drop the stored authentication token.
    Logout,
    /// Inspect or change the repository's remote.
    Remote {
        #[command(subcommand)]
        action: RemoteAction,
    },
    /// Set the editor used for resolving textual conflicts.
    SetEditor { path: String },
}

#[derive(Subcommand)]
pub enum RemoteAction {
    Get,
    Set { url: String },
}

/// Interactive conflict prompt backed by `inquire` (spec §4.4, §5).
struct InteractivePrompt;

impl ConflictPrompt for InteractivePrompt {
    fn ask(
        &mut self,
        local: &fileshare_core::core::diff::Diff,
        remote: &fileshare_core::core::diff::Diff,
    ) -> Result<Option<Resolution>> {
        let options = vec!["keep local", "keep remote", "skip for now"];
        let choice = inquire::Select::new(
            &format!(
                "conflict on {}: local is {:?}, remote is {:?}",
                local.file.path().display(),
                local.operation,
                remote.operation
            ),
            options,
        )
        .prompt()
        .map_err(|_| Error::Interrupted)?;

        Ok(match choice {
            "keep local" => Some(Resolution::AcceptLocal),
            "keep remote" => Some(Resolution::AcceptRemote),
            _ => None,
        })
    }
}

pub fn run(cli: Cli) -> Result<()> {
    ctrlc::set_handler(|| {
        println!("waiting for the current operation to finish...");
        interrupt::set();
        if interrupt::count() > 3 {
            std::process::exit(1);
        }
    })
    .map_err(|e| Error::Protocol(format!("could not install signal handler: {e}")))?;

    match cli.command {
        CliCommand::Init => init(),
        CliCommand::Clone { url } => clone(&url),
        CliCommand::Status => status(),
        CliCommand::Pull => run_sync(Direction::PullOnly),
        CliCommand::Push => run_sync(Direction::PushOnly),
        CliCommand::Sync => run_sync(Direction::Both),
        CliCommand::Login => login(),
        CliCommand::Logout => logout(),
        CliCommand::Remote { action } => remote_action(action),
        CliCommand::SetEditor { path } => set_editor(&path),
    }
}

fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().map_err(|e| Error::io(".", e))
}

fn open_config() -> Result<RepositoryConfig> {
    let root = RepositoryConfig::search_repos_root_or_error(&current_dir()?)?;
    RepositoryConfig::open(&root)
}

fn init() -> Result<()> {
    let root = current_dir()?;
    let config = RepositoryConfig::open(&root)?;
    config.save()?;
    println!("{}", format!("initialized an empty fileshare repository in {}", root.display()).green());
    Ok(())
}

fn require_connection(config: &mut RepositoryConfig, remote: &dyn Remote) -> Result<()> {
    if config.is_connected() {
        return Ok(());
    }
    login_with(config, remote)
}

fn login() -> Result<()> {
    let mut config = open_config()?;
    let remote = build_remote(&config)?;
    login_with(&mut config, &remote)
}

fn login_with(config: &mut RepositoryConfig, remote: &dyn Remote) -> Result<()> {
    let username = Text::new("username:").prompt().map_err(|_| Error::Interrupted)?;
    let password = Password::new("password:")
        .without_confirmation()
        .prompt()
        .map_err(|_| Error::Interrupted)?;

    match config.connect(remote, &username, &password) {
        Ok(()) => {
            config.save()?;
            info!("authenticated against {}", config.remote_url().unwrap_or_default());
            println!("{}", "logged in".green());
            Ok(())
        }
        Err(Error::WrongCredentials) => {
            error!("login rejected: wrong credentials");
            println!("{}", "wrong username or password".red());
            Err(Error::WrongCredentials)
        }
        Err(e) => Err(e),
    }
}

fn logout() -> Result<()> {
    let mut config = open_config()?;
    config.logout();
    config.save()?;
    println!("logged out");
    Ok(())
}

fn build_remote(config: &RepositoryConfig) -> Result<HttpRemote> {
    HttpRemote::new(config.remote_domain())
}

fn remote_action(action: RemoteAction) -> Result<()> {
    let mut config = open_config()?;
    match action {
        RemoteAction::Get => {
            println!("{}", config.remote_url()?);
            Ok(())
        }
        RemoteAction::Set { url } => {
            config.set_remote_url(&url)?;
            config.save()?;
            println!("remote set to {url}");
            Ok(())
        }
    }
}

fn set_editor(path: &str) -> Result<()> {
    let mut config = open_config()?;
    config.set_editor(path);
    config.save()?;
    println!("editor set to {path}");
    Ok(())
}

fn spinner(message: &str) -> indicatif::ProgressBar {
    let bar = indicatif::ProgressBar::new_spinner();
    bar.set_message(message.to_string());
    bar.enable_steady_tick(std::time::Duration::from_millis(100));
    bar
}

fn status() -> Result<()> {
    let config = open_config()?;
    let remote = build_remote(&config)?;

    let bar = spinner("comparing local, saved, and remote state...");
    let result = sync::status(&config, &remote);
    bar.finish_and_clear();

    display::print_diff(&result?);
    Ok(())
}

fn run_sync(direction: Direction) -> Result<()> {
    let mut config = open_config()?;
    let remote = build_remote(&config)?;
    require_connection(&mut config, &remote)?;

    let mut prompt = InteractivePrompt;
    let bar = spinner("syncing...");
    let outcomes = sync::run(&mut config, &remote, direction, &mut prompt);
    bar.finish_and_clear();

    display::print_outcomes(&outcomes?);
    Ok(())
}

fn clone(url: &str) -> Result<()> {
    let root = current_dir()?;
    let mut config = RepositoryConfig::open(&root)?;
    config.set_remote_url(url)?;

    let remote = build_remote(&config)?;
    require_connection(&mut config, &remote)?;

    let bar = spinner("cloning...");
    let outcomes = sync::clone(&mut config, &remote);
    bar.finish_and_clear();

    display::print_outcomes(&outcomes?);
    Ok(())
}
