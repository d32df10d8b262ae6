// `courier status`: daemon health and job queue counts.

use clap::Args;
use serde::Serialize;

use courier_common::types::{JobCounts, JobsReport};

use crate::client::DaemonClient;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct StatusArgs {}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub url: String,
    pub healthy: bool,
    pub jobs: JobCounts,
}

pub async fn run(_args: StatusArgs, client: &DaemonClient, format: OutputFormat) -> anyhow::Result<()> {
    let health = client.get_text(client.endpoint(&["healthz"], &[])?).await?;
    let report: JobsReport = client.get(client.endpoint(&["api", "jobs"], &[("limit", "0".into())])?).await?;

    let status = StatusReport {
        url: client.base_url().to_string(),
        healthy: health.trim() == "ok",
        jobs: report.counts,
    };
    if status.jobs.dead > 0 {
        output::print_warning(
            format,
            "DEAD_JOBS",
            &format!("{} job(s) exhausted their retries; see: courier jobs", status.jobs.dead),
        );
    }
    output::print_output(format, &status, format_human)?;
    Ok(())
}

fn format_human(status: &StatusReport) -> String {
    let jobs = &status.jobs;
    let mut lines = vec![format!(
        "courierd at {}: {}",
        status.url,
        if status.healthy { "ok" } else { "unhealthy" }
    )];
    lines.push(format!(
        "  jobs: {} pending, {} running, {} done, {} skipped, {} failed, {} dead",
        jobs.pending, jobs.running, jobs.done, jobs.skipped, jobs.failed, jobs.dead
    ));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn counts() -> JobCounts {
        JobCounts { pending: 2, running: 1, done: 10, skipped: 0, failed: 1, dead: 0 }
    }

    #[test]
    fn human_format_lists_every_state() {
        let report = StatusReport { url: "http://127.0.0.1:8765/".into(), healthy: true, jobs: counts() };
        let text = format_human(&report);
        assert!(text.starts_with("courierd at http://127.0.0.1:8765/: ok"));
        assert!(text.contains("2 pending, 1 running, 10 done, 0 skipped, 1 failed, 0 dead"));
    }

    #[tokio::test]
    async fn queries_health_and_jobs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/healthz"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/jobs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "counts": counts() })))
            .expect(1)
            .mount(&server)
            .await;

        let client = DaemonClient::new(&server.uri()).unwrap();
        run(StatusArgs {}, &client, OutputFormat::Json).await.unwrap();
    }
}
