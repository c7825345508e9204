// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use oxitask::{path::default_config_file, Settings, TaskCoordinator};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::{
    io::{self, IsTerminal},
    path::PathBuf,
    process::exit,
};
use tracing::{debug, error};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "oxitask [options] <oxitask-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let coordinator = self.global.coordinator()?;
        match self.command {
            Command::Claim => run_claim(&coordinator),
            Command::Complete(opts) => run_complete(&coordinator, opts),
            Command::Release(opts) => run_release(&coordinator, opts),
            Command::Status(opts) => run_status(&coordinator, opts),
            Command::Cleanup => run_cleanup(&coordinator),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Claim next available task.
    #[command(override_usage = "oxitask claim [options]")]
    Claim,

    /// Complete claimed task.
    #[command(override_usage = "oxitask complete [options] --command-id <id> --session-id <id>")]
    Complete(CompleteOptions),

    /// Release claimed task back to pending.
    #[command(override_usage = "oxitask release [options] --command-id <id> --session-id <id>")]
    Release(ReleaseOptions),

    /// Show current status.
    #[command(override_usage = "oxitask status [options]")]
    Status(StatusOptions),

    /// Clean up stale claims.
    #[command(override_usage = "oxitask cleanup [options]")]
    Cleanup,
}

#[derive(Args, Clone, Debug)]
struct GlobalOptions {
    /// Path to progress.json file.
    #[arg(long, global = true, value_name = "path")]
    pub progress_file: Option<PathBuf>,

    /// Path to configuration file.
    #[arg(long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Log coordination steps to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl GlobalOptions {
    fn coordinator(&self) -> Result<TaskCoordinator> {
        let mut settings = match &self.config {
            Some(path) => Settings::load(path)?,
            None => match default_config_file() {
                Ok(path) => Settings::load(path)?,
                Err(err) => {
                    debug!("{err}, using default settings");
                    Settings::default()
                }
            },
        };

        if let Some(progress_file) = &self.progress_file {
            settings.progress_file = progress_file.clone();
        }

        Ok(settings.coordinator())
    }
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CompleteOptions {
    /// Identifier of claimed command.
    #[arg(long, value_name = "id")]
    pub command_id: String,

    /// Session identifier handed out by claim.
    #[arg(long, value_name = "id")]
    pub session_id: String,

    /// Improvement made, can be repeated.
    #[arg(long = "improvement", value_name = "label")]
    pub improvements: Vec<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ReleaseOptions {
    /// Identifier of claimed command.
    #[arg(long, value_name = "id")]
    pub command_id: String,

    /// Session identifier handed out by claim.
    #[arg(long, value_name = "id")]
    pub session_id: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct StatusOptions {
    /// Print status as JSON.
    #[arg(long)]
    pub json: bool,
}

fn main() {
    let cli = Cli::parse();

    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time()
        .with_ansi(io::stderr().is_terminal())
        .with_writer(io::stderr);
    let fallback = if cli.global.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = cli.run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run_claim(coordinator: &TaskCoordinator) -> Result<()> {
    let task = coordinator.claim()?;
    println!("Successfully claimed task: {}", task.name);
    println!("File: {}", task.filepath);
    println!("Command ID: {}", task.id);
    println!("Session ID: {}", task.session_id);

    Ok(())
}

fn run_complete(coordinator: &TaskCoordinator, opts: CompleteOptions) -> Result<()> {
    let completion = coordinator.complete(&opts.command_id, &opts.session_id, opts.improvements)?;
    println!(
        "Successfully completed task: {} ({}/{})",
        completion.name, completion.completed, completion.total
    );

    Ok(())
}

fn run_release(coordinator: &TaskCoordinator, opts: ReleaseOptions) -> Result<()> {
    let released = coordinator.release(&opts.command_id, &opts.session_id)?;
    println!("Successfully released task: {}", released.name);

    Ok(())
}

fn run_status(coordinator: &TaskCoordinator, opts: StatusOptions) -> Result<()> {
    let status = coordinator.status()?;
    if opts.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Task Status:");
    println!("   Total Commands: {}", status.total_commands);
    println!("   Completed: {}", status.completed);
    println!("   In Progress: {}", status.in_progress);
    println!("   Available: {}", status.available);
    println!("   Stale Claims: {}", status.stale);

    Ok(())
}

fn run_cleanup(coordinator: &TaskCoordinator) -> Result<()> {
    let recovered = coordinator.cleanup()?;
    println!("Cleanup completed. Recovered {recovered} stale claims.");

    Ok(())
}
