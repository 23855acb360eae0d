//! `stream-mapper`: try mapping configs against captured or live responses.

mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use stream_mapper_harness::{ObservabilitySettings, init_observability_with};

#[derive(Debug, Parser)]
#[command(name = "stream-mapper")]
#[command(about = "Normalize upstream AI event streams with a mapping config")]
struct Cli {
    /// Log every frame outcome (unmapped frames, resolver errors) to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay a captured response body and print canonical events as JSON lines.
    Replay(commands::ReplayArgs),
    /// Call a live endpoint and print canonical events as they arrive.
    Probe(commands::ProbeArgs),
    /// Extract one field from a complete JSON response body.
    Extract(commands::ExtractArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_observability_with(ObservabilitySettings::from_env().frame_outcomes(cli.verbose));

    let mut out = std::io::stdout().lock();
    let mut err = std::io::stderr();
    let result = match cli.command {
        Command::Replay(args) => commands::replay(&args, &mut out, &mut err),
        Command::Probe(args) => commands::probe(&args, &mut out, &mut err).await,
        Command::Extract(args) => commands::extract(&args, &mut out),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(event = "cli.failed", domain = "cli", error = %error);
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}
