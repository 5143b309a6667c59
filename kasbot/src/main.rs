//! Kasbot CLI - conversational wallet bot
//!
//! A command-line interface for running the Kasbot gateway.

#![allow(clippy::print_stdout)] // CLI program intentionally uses stdout

use clap::{Args, Parser, Subcommand};
use kasbot::config::{
    BotConfig, IssueLevel, TELEGRAM_TOKEN_ENV, config_path as default_config_path, load_config_from,
    save_config_to,
};
use kasbot::error::{BotError, Result};
use kasbot::gateway::GatewayBuilder;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Kasbot - wallet conversations over chat
#[derive(Parser)]
#[command(name = "kasbot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file path
    #[arg(short, long, env = "KASBOT_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init(InitArgs),

    /// Start the bot (all enabled channels)
    Run(RunArgs),

    /// Show bot status and configuration
    Status,

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for the init command
#[derive(Args)]
struct InitArgs {
    /// Force overwrite existing configuration
    #[arg(short, long)]
    force: bool,
}

/// Arguments for the run command
#[derive(Args)]
struct RunArgs {
    /// Disable CLI channel
    #[arg(long)]
    no_cli: bool,

    /// Disable Telegram channel
    #[arg(long)]
    no_telegram: bool,
}

/// Arguments for the config command
#[derive(Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Show configuration file path
    Path,
    /// Validate configuration
    Validate,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "failed to create tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", kasbot::error::DisplayError(&e));
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging with the given verbosity level.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "kasbot={level},{}",
            if verbosity >= 2 { "debug" } else { "warn" }
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity >= 2)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let config_file = cli.config.unwrap_or_else(default_config_path);
    match cli.command {
        Commands::Init(args) => cmd_init(args, &config_file).await,
        Commands::Run(args) => cmd_run(args, &config_file).await,
        Commands::Status => cmd_status(&config_file).await,
        Commands::Config(args) => cmd_config(args, &config_file).await,
    }
}

/// Write the default configuration.
async fn cmd_init(args: InitArgs, config_file: &Path) -> Result<()> {
    if config_file.exists() && !args.force {
        println!("Configuration already exists at: {}", config_file.display());
        println!("Use --force to overwrite.");
        return Ok(());
    }

    save_config_to(&BotConfig::default(), config_file)
        .await
        .map_err(|e| BotError::config(format!("failed to initialize config: {e}")))?;

    println!("Configuration created: {}", config_file.display());
    println!();
    println!("Next steps:");
    println!("  1. export {TELEGRAM_TOKEN_ENV}=<token>   (optional)");
    println!("  2. kasbot run");

    Ok(())
}

/// Start the gateway.
async fn cmd_run(args: RunArgs, config_file: &Path) -> Result<()> {
    tracing::info!(config = %config_file.display(), "starting kasbot");

    let config = load_config_from(config_file).await?;
    for issue in config.validate() {
        match issue.level {
            IssueLevel::Warning => tracing::warn!("{issue}"),
            IssueLevel::Error => tracing::error!("{issue}"),
        }
    }
    if config.has_errors() {
        return Err(BotError::config("configuration has errors, see above"));
    }

    let gateway = GatewayBuilder::new()
        .bot_config(config)
        .enable_cli(!args.no_cli)
        .enable_telegram(!args.no_telegram)
        .build();

    println!("Kasbot running. Press Ctrl+C to stop.\n");
    gateway.run().await
}

/// Show status.
async fn cmd_status(config_file: &Path) -> Result<()> {
    println!("Kasbot Status\n");

    println!("Configuration:");
    println!("  Path:   {}", config_file.display());
    println!(
        "  Exists: {}",
        if config_file.exists() { "yes" } else { "no" }
    );

    match load_config_from(config_file).await {
        Ok(config) => {
            let issues = config.validate();
            println!(
                "  Valid:  {}",
                if config.has_errors() { "no" } else { "yes" }
            );
            println!();
            println!("Conversation:");
            println!("  Trigger:           {}", config.command);
            println!("  Selection timeout: {}s", config.flow.selection_timeout_secs);
            println!("  Reply timeout:     {}s", config.flow.text_timeout_secs);
            println!("  Idle session TTL:  {}s", config.session.idle_ttl_secs);
            println!();
            println!("Channels:");
            println!("  CLI:      {}", enabled(config.channels.cli.enabled));
            println!("  Telegram: {}", enabled(config.channels.telegram.enabled));
            if !issues.is_empty() {
                println!();
                println!("Issues:");
                for issue in issues {
                    println!("  {issue}");
                }
            }
        }
        Err(e) => println!("  Valid:  no ({e})"),
    }

    println!();
    println!("Environment:");
    print_env_status(TELEGRAM_TOKEN_ENV);
    print_env_status("KASBOT_CONFIG");
    print_env_status("RUST_LOG");

    Ok(())
}

/// Configuration management.
async fn cmd_config(args: ConfigArgs, config_file: &Path) -> Result<()> {
    match args.command {
        ConfigCommands::Path => {
            println!("{}", config_file.display());
        }
        ConfigCommands::Show => {
            let mut config = load_config_from(config_file).await?;
            if !config.channels.telegram.token.is_empty() {
                config.channels.telegram.token = "***".to_string();
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigCommands::Validate => {
            let config = load_config_from(config_file).await?;
            let issues = config.validate();
            if issues.is_empty() {
                println!("Configuration is valid");
            }
            for issue in &issues {
                println!("{issue}");
            }
            if config.has_errors() {
                return Err(BotError::config("configuration is invalid"));
            }
        }
    }

    Ok(())
}

const fn enabled(flag: bool) -> &'static str {
    if flag { "enabled" } else { "disabled" }
}

fn print_env_status(var: &str) {
    let status = if std::env::var(var).is_ok() {
        "set"
    } else {
        "not set"
    };
    println!("  {var}: {status}");
}
