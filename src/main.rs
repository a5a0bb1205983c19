//! Framelens CLI entry point.

mod cli_logger;

use anyhow::Result;
use clap::{Parser, Subcommand};

use std::path::PathBuf;

use cli_logger::CliLogger;
use framelens::{
    AnalyzeArgs, CompareArgs, Config, Reporter, TraceCommand, analyze_command, compare_command,
    trace_command,
};

#[derive(Debug, Parser)]
#[command(name = "framelens", version, about = "Frame-trace statistics and comparison")]
struct Cli {
    /// Emit machine-readable JSON instead of the pretty reporter.
    #[arg(long, global = true)]
    json: bool,

    /// Disable ANSI styling.
    #[arg(long, global = true)]
    no_color: bool,

    /// Config file path.
    #[arg(long, global = true, default_value = "framelens.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyze one trace into per-marker and per-thread statistics.
    Analyze(AnalyzeArgs),
    /// Compare two traces marker by marker.
    Compare(CompareArgs),
    /// Trace utilities.
    #[command(subcommand)]
    Trace(TraceCommand),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load_optional(&cli.config);
    let json = cli.json || config.reporter == Reporter::Json;
    let logger = CliLogger::new(json, cli.no_color);

    let result = match &cli.command {
        Command::Analyze(args) => analyze_command(&config, args),
        Command::Compare(args) => compare_command(&config, args),
        Command::Trace(command) => trace_command(command),
    };

    match result {
        Ok(value) => logger.print_serialized(&value)?,
        Err(err) => {
            logger.print_error(&err.to_string());
            std::process::exit(1);
        }
    }
    Ok(())
}
