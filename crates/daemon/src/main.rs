// courierd: sync daemon entry point.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use courier_common::keys::ContentKey;
use courier_daemon::config::{DaemonConfig, LogConfig, LogFormat};
use courier_daemon::runtime;

#[derive(Parser)]
#[command(name = "courierd", about = "Keeps external systems in step with the learning platform")]
struct Cli {
    /// Config file (defaults to ~/.courier/config.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API and run the worker pool.
    Serve,
    /// Copy the `git_url` setting of existing courses into git repo bindings.
    MigrateBindings {
        #[arg(required = true)]
        content_keys: Vec<String>,
    },
    /// Validate the configuration and list missing settings.
    CheckConfig,
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = DaemonConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    init_tracing(&config.log);

    match cli.command {
        Command::Serve => runtime::serve(config).await.context("courierd terminated"),
        Command::MigrateBindings { content_keys } => {
            let keys = content_keys
                .iter()
                .map(|raw| raw.parse::<ContentKey>())
                .collect::<Result<Vec<_>, _>>()
                .context("invalid content key")?;
            let report = runtime::run_migrate_bindings(&config, &keys)?;
            println!(
                "{} created, {} already bound, {} without git_url",
                report.created.len(),
                report.already_bound.len(),
                report.without_git_url.len()
            );
            for key in &report.created {
                println!("  + {key}");
            }
            Ok(())
        }
        Command::CheckConfig => {
            let warnings = runtime::check_config(&config)?;
            if warnings.is_empty() {
                println!("configuration OK");
            }
            for warning in warnings {
                println!("warning: {warning}");
            }
            Ok(())
        }
    }
}
