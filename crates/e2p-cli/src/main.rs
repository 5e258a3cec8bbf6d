//! E2P CLI - event-to-Parquet buffering and conversion tool.

use anyhow::Result;
use clap::{Parser, Subcommand};
use e2p_core::config::LogFormat;
use e2p_core::Config;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit codes for CLI operations.
///
/// Following Unix conventions:
/// - 0: Success
/// - 1-127: Application errors
/// - 128+N: Signal N received (e.g., 130 = SIGINT)
#[repr(i32)]
#[derive(Debug, Clone, Copy)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// Configuration error (invalid config file, missing required fields)
    ConfigError = 1,
    /// Buffer error (backend unavailable, closed)
    BufferError = 2,
    /// Conversion error (encode, finalize, schema)
    ConvertError = 3,
    /// Sink error (filesystem, object storage)
    SinkError = 4,
    /// General runtime error
    RuntimeError = 10,
    /// Signal interrupt (SIGINT = 2, so 128 + 2 = 130)
    SignalInterrupt = 130,
}

impl ExitCode {
    /// Convert an error to an exit code by inspecting the error message.
    fn from_error(error: &anyhow::Error) -> Self {
        let error_str = error.to_string().to_lowercase();

        if error_str.contains("config") || error_str.contains("toml") || error_str.contains("schema")
        {
            ExitCode::ConfigError
        } else if error_str.contains("buffer") {
            ExitCode::BufferError
        } else if error_str.contains("convert")
            || error_str.contains("encode")
            || error_str.contains("finalize")
        {
            ExitCode::ConvertError
        } else if error_str.contains("sink")
            || error_str.contains("storage")
            || error_str.contains("s3")
        {
            ExitCode::SinkError
        } else {
            ExitCode::RuntimeError
        }
    }
}

mod commands;
mod server;

#[derive(Parser)]
#[command(name = "e2p")]
#[command(about = "Event-to-Parquet buffering and conversion CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ingestion receiver with its HTTP front end
    Serve {
        /// Override the ingress HTTP port
        #[arg(long)]
        ingest_port: Option<u16>,

        /// Override the health/metrics HTTP port
        #[arg(long)]
        health_port: Option<u16>,
    },

    /// Show status and health
    Status {
        /// Health endpoint URL
        #[arg(long, default_value = "http://localhost:8081")]
        url: String,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() {
    let exit_code = run_cli().await;
    std::process::exit(exit_code as i32);
}

/// Main CLI execution logic with proper error handling.
async fn run_cli() -> ExitCode {
    let cli = Cli::parse();

    // Try to load config for log format settings (optional - falls back to JSON)
    let log_format = cli
        .config
        .as_ref()
        .and_then(|path| std::fs::read_to_string(path).ok())
        .and_then(|content| toml::from_str::<Config>(&content).ok())
        .map(|config| config.monitoring.log_format)
        .unwrap_or(LogFormat::Json);

    // Initialize logging
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match cli.verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    match log_format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .init();
        }
    }

    let result = execute_command(cli).await;

    match result {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::from_error(&e)
        }
    }
}

/// Execute the CLI command.
async fn execute_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve {
            ingest_port,
            health_port,
        } => {
            let config = load_config(&cli.config)?;
            commands::serve::run(config, ingest_port, health_port).await?;
        }

        Commands::Status { url } => {
            commands::status::run(&url).await?;
        }

        Commands::Validate => {
            let config = load_config(&cli.config)?;
            config.validate()?;
            println!("Configuration is valid");
        }
    }

    Ok(())
}

fn load_config(path: &Option<PathBuf>) -> Result<Config> {
    let path = path.clone().unwrap_or_else(|| PathBuf::from("config.toml"));

    let content = std::fs::read_to_string(&path)?;
    let config: Config = toml::from_str(&content)?;
    Ok(config)
}
