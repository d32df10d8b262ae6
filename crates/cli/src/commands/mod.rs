// CLI subcommand dispatch.

use clap::Subcommand;

use crate::client::DaemonClient;
use crate::output::OutputFormat;

pub mod bindings;
pub mod emit;
pub mod export;
pub mod jobs;
pub mod rapid_response;
pub mod status;

#[derive(Subcommand)]
pub enum Command {
    /// Check the daemon and summarize the job queue
    Status(status::StatusArgs),
    /// Publish a domain event to the dispatchers
    Emit(emit::EmitArgs),
    /// Bind a course or library to a git remote
    Bind(bindings::BindArgs),
    /// List git repository bindings
    Bindings(bindings::BindingsArgs),
    /// Export course archives to the export bucket
    Export(export::ExportArgs),
    /// Open or close the rapid-response run of a problem
    Toggle(rapid_response::ToggleArgs),
    /// List rapid-response runs of a course
    Runs(rapid_response::RunsArgs),
    /// Download the CSV report of a rapid-response run
    Report(rapid_response::ReportArgs),
    /// Show queued and recent sync jobs
    Jobs(jobs::JobsArgs),
    /// Show git import/export history
    SyncLog(jobs::SyncLogArgs),
}

pub async fn run(cmd: Command, client: &DaemonClient, format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        Command::Status(args) => status::run(args, client, format).await,
        Command::Emit(args) => emit::run(args, client, format).await,
        Command::Bind(args) => bindings::bind(args, client, format).await,
        Command::Bindings(args) => bindings::list(args, client, format).await,
        Command::Export(args) => export::run(args, client, format).await,
        Command::Toggle(args) => rapid_response::toggle(args, client, format).await,
        Command::Runs(args) => rapid_response::runs(args, client, format).await,
        Command::Report(args) => rapid_response::report(args, client, format).await,
        Command::Jobs(args) => jobs::jobs(args, client, format).await,
        Command::SyncLog(args) => jobs::sync_log(args, client, format).await,
    }
}
