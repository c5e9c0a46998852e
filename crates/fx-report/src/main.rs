// Copyright 2026 fx-report Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use fx_report::{Config, DateWindow};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(
    name = "fx-report",
    about = "Monthly USD/RUB to JPY/RUB indicative rate report",
    version,
    after_help = "Run 'fx-report <command> --help' for details on each command.\nRun 'fx-report' with no command to perform a full run."
)]
struct Cli {
    /// Log level when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(flatten)]
    settings: cli::SettingsArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire last month's rates, build the report and mail it
    Run {
        /// Write the report but do not send it
        #[arg(long)]
        no_send: bool,
    },
    /// Print the previous calendar month window
    Window,
    /// Print the records of an export file as JSON
    Parse {
        /// XML export to read
        file: PathBuf,
    },
    /// Build the report from export files already on disk
    Report {
        /// USD/RUB export
        #[arg(long)]
        usd: PathBuf,
        /// JPY/RUB export
        #[arg(long)]
        jpy: PathBuf,
        /// Mail the report after writing it
        #[arg(long)]
        send: bool,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completions
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Credentials usually live in a .env next to the binary.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    let config = || Config::resolve(cli.settings.overrides());

    let result = match cli.command.unwrap_or(Commands::Run { no_send: false }) {
        Commands::Run { no_send } => match config() {
            Ok(config) => cli::run_cmd::run(&config, !no_send).await,
            Err(e) => Err(e.into()),
        },
        Commands::Window => {
            let window = DateWindow::today();
            println!("{}\t{}", window.start_str(), window.end_str());
            Ok(())
        }
        Commands::Parse { file } => {
            cli::parse_cmd::run(&file, cli.settings.clearing.as_deref()).await
        }
        Commands::Report { usd, jpy, send } => match config() {
            Ok(config) => cli::report_cmd::run(&config, &usd, &jpy, send).await,
            Err(e) => Err(e.into()),
        },
        Commands::Doctor => match config() {
            Ok(config) => cli::doctor::run(&config).await,
            Err(e) => Err(e.into()),
        },
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "fx-report", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        eprintln!("  Error: {e:#}");
        std::process::exit(1);
    }

    result
}
