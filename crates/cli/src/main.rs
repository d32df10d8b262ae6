// courier CLI entry point: talks to a running courierd over HTTP.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod client;
mod commands;
mod exit_code;
mod output;

use client::{resolve_daemon_url, DaemonClient};
use exit_code::ExitCode;
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "courier", about = "Inspect and drive the courier sync daemon")]
struct Cli {
    /// Daemon base URL (defaults to $COURIER_URL, then http://127.0.0.1:8765).
    #[arg(long, global = true)]
    url: Option<String>,

    /// Force JSON output.
    #[arg(long, global = true)]
    json: bool,

    /// Log requests to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: commands::Command,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "courier_cli=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let format = OutputFormat::detect(cli.json);

    let result = match DaemonClient::new(&resolve_daemon_url(cli.url)) {
        Ok(client) => commands::run(cli.command, &client, format).await,
        Err(error) => Err(error),
    };
    match result {
        Ok(()) => ExitCode::Success.into(),
        Err(error) => {
            output::print_anyhow_error(format, &error);
            ExitCode::from_error(&error).into()
        }
    }
}
