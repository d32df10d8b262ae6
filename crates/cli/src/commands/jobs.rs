// `courier jobs` / `courier sync-log`: queue and git history inspection.

use clap::Args;

use courier_common::types::{JobsReport, SyncLogRecord};

use crate::client::DaemonClient;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct JobsArgs {
    /// Number of recent jobs to show.
    #[arg(long, default_value_t = 20)]
    limit: usize,
}

#[derive(Debug, Args)]
pub struct SyncLogArgs {
    /// Only entries for this course.
    #[arg(long)]
    course: Option<String>,

    #[arg(long, default_value_t = 20)]
    limit: usize,
}

pub async fn jobs(args: JobsArgs, client: &DaemonClient, format: OutputFormat) -> anyhow::Result<()> {
    let url = client.endpoint(&["api", "jobs"], &[("limit", args.limit.to_string())])?;
    let report: JobsReport = client.get(url).await?;
    output::print_output(format, &report, format_jobs)?;
    Ok(())
}

pub async fn sync_log(args: SyncLogArgs, client: &DaemonClient, format: OutputFormat) -> anyhow::Result<()> {
    let mut query = vec![("limit", args.limit.to_string())];
    if let Some(course) = args.course {
        query.push(("course_id", course));
    }
    let entries: Vec<SyncLogRecord> = client.get(client.endpoint(&["api", "sync-log"], &query)?).await?;
    output::print_output(format, &entries, format_sync_log)?;
    Ok(())
}

fn format_jobs(report: &JobsReport) -> String {
    let counts = &report.counts;
    let mut lines = vec![format!(
        "{} pending, {} running, {} done, {} skipped, {} failed, {} dead",
        counts.pending, counts.running, counts.done, counts.skipped, counts.failed, counts.dead
    )];
    for job in &report.recent {
        let mut line = format!(
            "{:>6}  {:<8}  {:<24} {}  (attempts: {})",
            job.id, job.state, job.kind, job.subject_id, job.attempt_count
        );
        if let Some(error) = &job.last_error {
            line.push_str(&format!("\n        last error: {error}"));
        }
        lines.push(line);
    }
    lines.join("\n")
}

fn format_sync_log(entries: &Vec<SyncLogRecord>) -> String {
    if entries.is_empty() {
        return "No sync log entries.".into();
    }
    entries
        .iter()
        .map(|entry| {
            let commit = entry.commit_hash.get(..8).unwrap_or(&entry.commit_hash);
            format!(
                "{}  {:<6}  {}  {}  {}",
                entry.created_at.format("%Y-%m-%d %H:%M"),
                entry.direction,
                entry.course_id,
                commit,
                entry.author
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use courier_common::types::{JobCounts, JobSummary};
    use serde_json::json;

    use super::*;

    #[test]
    fn jobs_show_last_error() {
        let report = JobsReport {
            counts: JobCounts { pending: 0, running: 0, done: 0, skipped: 0, failed: 1, dead: 0 },
            recent: vec![JobSummary {
                id: 7,
                kind: "export_to_git".into(),
                subject_id: "course-v1:A+B+C".into(),
                state: "failed".into(),
                attempt_count: 1,
                last_error: Some("no git repository bound to course-v1:A+B+C".into()),
                created_at: Utc::now(),
            }],
        };
        let text = format_jobs(&report);
        assert!(text.starts_with("0 pending"));
        assert!(text.contains("export_to_git"));
        assert!(text.contains("last error: no git repository bound"));
    }

    #[test]
    fn sync_log_abbreviates_commits() {
        let entry = SyncLogRecord {
            id: 1,
            course_id: "course-v1:A+B+C".into(),
            direction: "export".into(),
            log_payload: json!({}),
            git_log: String::new(),
            repo_dir: "/var/lib/courier/exports/A-B-C".into(),
            commit_hash: "0123456789abcdef".into(),
            author: "Courier Export <export@courier.local>".into(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
        };
        let text = format_sync_log(&vec![entry]);
        assert_eq!(
            text,
            "2024-05-01 09:30  export  course-v1:A+B+C  01234567  Courier Export <export@courier.local>"
        );
    }
}
