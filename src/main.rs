#![deny(clippy::mod_module_files)]
//! snapjaw - vanilla WoW addon manager

use anyhow::Result;
use std::env;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod error;
mod git;
mod install;
mod signature;
mod status;
mod toc;

use config::{Config, ConfigBackup, BACKUP_FILE_NAME, CONFIG_FILE_NAME};
use error::Error;
use git::{GitClient, SystemGit};

#[derive(Parser)]
#[command(name = "snapjaw")]
#[command(about = "vanilla WoW addon manager")]
#[command(version)]
struct Cli {
    /// path to the Interface/AddOns directory (found from the working directory by default)
    #[arg(long)]
    addons_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// install new addon(s)
    Install {
        /// url to git repository
        url: String,

        /// specific git branch to use
        #[arg(long)]
        branch: Option<String>,
    },

    /// remove installed addon(s)
    Remove {
        /// addon name
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// update installed addon(s)
    Update {
        /// addon name (all outdated addons when omitted)
        names: Vec<String>,
    },

    /// list installed addons
    Status {
        /// also list up to date addons
        #[arg(short, long)]
        verbose: bool,
    },
}

impl Command {
    /// Read-only commands never save the config
    fn is_read_only(&self) -> bool {
        matches!(self, Command::Status { .. })
    }
}

fn main() -> Result<ExitCode> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match run_command(cli) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => match error::user_facing(&e) {
            Some(user_error) => {
                eprintln!("error: {}", user_error);
                Ok(ExitCode::from(1))
            }
            None => Err(e),
        },
    }
}

/// Load the config, run the command and save the config.
///
/// Mutating commands back up the config first; the backup is restored when the
/// command fails with an internal error.
fn run_command(cli: Cli) -> Result<()> {
    let addons_dir = resolve_addons_dir(cli.addons_dir)?;
    let read_only = cli.command.is_read_only();

    let config_path = addons_dir.join(CONFIG_FILE_NAME);
    let backup = if read_only {
        None
    } else {
        Some(ConfigBackup::create(
            &config_path,
            &addons_dir.join(BACKUP_FILE_NAME),
        )?)
    };

    let mut config = Config::load_or_default(&config_path)?;
    if config.is_empty() {
        tracing::debug!("No addons recorded in {:?}", config.path());
    } else {
        tracing::debug!("Loaded {} addon(s) from {:?}", config.len(), config.path());
    }
    let git: Arc<dyn GitClient> = Arc::new(SystemGit::new());
    let mut stdout = io::stdout().lock();

    let result = match cli.command {
        Command::Install { url, branch } => commands::install::handle(
            &mut config,
            git.as_ref(),
            &addons_dir,
            &url,
            branch.as_deref(),
        ),
        Command::Remove { names } => {
            commands::remove::handle(&mut config, &addons_dir, &names, &mut stdout)
        }
        Command::Update { names } => {
            commands::update::handle(&mut config, git, &addons_dir, &names, &mut stdout)
        }
        Command::Status { verbose } => {
            commands::status::handle(&config, git, &addons_dir, verbose, &mut stdout)
        }
    };

    let result = result.and_then(|()| {
        if !read_only {
            tracing::info!("Saving config...");
            config.save()?;
            tracing::info!("Done!");
        }
        Ok(())
    });

    if let Some(backup) = backup {
        let keep = match &result {
            Ok(()) => true,
            Err(e) => error::user_facing(e).is_some(),
        };
        if keep {
            backup.keep();
        }
    }

    result
}

fn resolve_addons_dir(addons_dir: Option<PathBuf>) -> Result<PathBuf> {
    match addons_dir {
        Some(dir) if dir.is_dir() => Ok(dir),
        Some(dir) => Err(Error::InvalidDirectory(dir).into()),
        None => {
            let cwd = env::current_dir()?;
            config::find_addons_dir(&cwd)
                .filter(|dir| dir.is_dir())
                .ok_or_else(|| Error::AddonsDirNotFound.into())
        }
    }
}
