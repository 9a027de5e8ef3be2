use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use fmubridge::channel::CommandChannel;
use fmubridge::config::BackendConfig;
use fmubridge::fmi2::{Fmi2Adder, Fmi2Backend};
use fmubridge::fmi3::{Fmi3Adder, Fmi3Backend};
use fmubridge::telemetry;

#[derive(Parser)]
#[command(name = "fmubridge", version, about = "FMI co-simulation backend bridge")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve an FMI 2.0 instance over the command channel.
    Fmi2(ServeArgs),
    /// Serve an FMI 3.0 instance over the command channel.
    Fmi3(ServeArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Dispatcher endpoint, e.g. 127.0.0.1:5000. Falls back to
    /// FMUBRIDGE_DISPATCHER_ENDPOINT, then the built-in default.
    #[arg(long)]
    endpoint: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = BackendConfig::default();
    config.apply_env_overrides();
    telemetry::init(&config.logging);

    let result = match cli.command {
        Command::Fmi2(args) => serve_fmi2(&args, &config),
        Command::Fmi3(args) => serve_fmi3(&args, &config),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if err.is_fatal() => {
            tracing::error!(%err, "backend failed");
            ExitCode::FAILURE
        }
        Err(err) => {
            tracing::warn!(%err, "backend stopped");
            ExitCode::SUCCESS
        }
    }
}

fn endpoint(args: &ServeArgs, config: &BackendConfig) -> String {
    args.endpoint
        .clone()
        .unwrap_or_else(|| config.channel.endpoint.clone())
}

fn serve_fmi2(args: &ServeArgs, config: &BackendConfig) -> fmubridge::Result<()> {
    let channel = CommandChannel::connect(&endpoint(args, config), config.channel.max_frame_bytes)?;
    let mut backend = Fmi2Backend::<Fmi2Adder, _, _>::new(channel);
    let outcome = backend.serve()?;
    tracing::info!(?outcome, "fmi2 backend stopped");
    Ok(())
}

fn serve_fmi3(args: &ServeArgs, config: &BackendConfig) -> fmubridge::Result<()> {
    let channel = CommandChannel::connect(&endpoint(args, config), config.channel.max_frame_bytes)?;
    let mut backend = Fmi3Backend::<Fmi3Adder, _, _>::new(channel);
    let outcome = backend.serve()?;
    tracing::info!(?outcome, "fmi3 backend stopped");
    Ok(())
}
