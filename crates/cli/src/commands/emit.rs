// `courier emit`: publish a domain event, as the platform would on save.

use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use reqwest::Method;

use courier_common::events::DomainEvent;
use courier_common::types::PublishReport;

use crate::client::DaemonClient;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct EmitArgs {
    /// Event JSON, e.g. '{"type":"course_published","course_key":"course-v1:Org+Course+Run"}'.
    #[arg(conflicts_with = "file", required_unless_present = "file")]
    event: Option<String>,

    /// Read the event from a file (`-` for stdin).
    #[arg(long, short)]
    file: Option<PathBuf>,
}

/// Parse locally so malformed events never reach the daemon.
fn load_event(args: &EmitArgs) -> anyhow::Result<DomainEvent> {
    let raw = match (&args.event, &args.file) {
        (Some(inline), _) => inline.clone(),
        (None, Some(path)) if path.as_os_str() == "-" => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer).context("failed to read event from stdin")?;
            buffer
        }
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read event file `{}`", path.display()))?,
        (None, None) => anyhow::bail!("an event or --file is required"),
    };
    serde_json::from_str(&raw).context("event is not a valid domain event")
}

pub async fn run(args: EmitArgs, client: &DaemonClient, format: OutputFormat) -> anyhow::Result<()> {
    let event = load_event(&args)?;
    let url = client.endpoint(&["api", "events"], &[])?;
    let report: PublishReport = client.send(Method::POST, url, Some(&event)).await?;
    output::print_output(format, &report, format_human)?;
    Ok(())
}

fn format_human(report: &PublishReport) -> String {
    let mut lines = vec![format!(
        "{} {}: {} job(s) scheduled",
        report.event_type,
        report.subject_id,
        report.scheduled.len()
    )];
    for job in &report.scheduled {
        lines.push(format!("  #{} {} ({})", job.job_id, job.kind, job.dedupe_key));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use courier_common::types::ScheduledJob;

    use super::*;

    fn args(event: Option<&str>, file: Option<PathBuf>) -> EmitArgs {
        EmitArgs { event: event.map(str::to_string), file }
    }

    #[test]
    fn inline_event_is_parsed() {
        let event = load_event(&args(
            Some(r#"{"type":"course_published","course_key":"course-v1:MITx+6.00x+2024"}"#),
            None,
        ))
        .unwrap();
        assert_eq!(event.subject_id(), "course-v1:MITx+6.00x+2024");
    }

    #[test]
    fn event_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event.json");
        std::fs::write(&path, r#"{"type":"course_created","course_key":"course-v1:MITx+6.00x+2025"}"#).unwrap();

        let event = load_event(&args(None, Some(path))).unwrap();
        assert_eq!(event.subject_id(), "course-v1:MITx+6.00x+2025");
    }

    #[test]
    fn unknown_event_type_is_rejected_locally() {
        let error = load_event(&args(Some(r#"{"type":"course_vanished"}"#), None)).unwrap_err();
        assert!(format!("{error:#}").contains("not a valid domain event"));
    }

    #[test]
    fn human_format_lists_scheduled_jobs() {
        let report = PublishReport {
            event_type: "course_published".into(),
            subject_id: "course-v1:MITx+6.00x+2024".into(),
            scheduled: vec![ScheduledJob {
                job_id: 12,
                kind: "export_to_git".into(),
                dedupe_key: "export_to_git:course-v1:MITx+6.00x+2024".into(),
            }],
        };
        let text = format_human(&report);
        assert!(text.contains("1 job(s) scheduled"));
        assert!(text.contains("#12 export_to_git"));
    }
}
