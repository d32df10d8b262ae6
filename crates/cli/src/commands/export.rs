// `courier export`: package courses and upload them to the export bucket.

use anyhow::bail;
use clap::Args;
use reqwest::{Method, StatusCode};

use courier_common::types::{ExportRequest, ExportResponse};

use crate::client::{ApiError, DaemonClient};
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Course keys to export.
    #[arg(required = true)]
    courses: Vec<String>,
}

pub async fn run(args: ExportArgs, client: &DaemonClient, format: OutputFormat) -> anyhow::Result<()> {
    let url = client.endpoint(&["api", "courses", "v0", "export"], &[])?;
    let request = ExportRequest { courses: args.courses };
    let (status, body) = client.send_raw(Method::POST, url, Some(&request)).await?;

    let response = decode_response(status, &body)?;
    output::print_output(format, &response, format_human)?;
    if !response.failed_uploads.is_empty() {
        bail!("{} of {} course(s) failed to export", response.failed_uploads.len(), request.courses.len());
    }
    Ok(())
}

/// Partial failures come back as 400 with the full result; any other
/// error carries the usual envelope.
fn decode_response(status: StatusCode, body: &str) -> anyhow::Result<ExportResponse> {
    let partial = status == StatusCode::BAD_REQUEST && !body.contains("\"error\"");
    if !status.is_success() && !partial {
        return Err(ApiError::from_body(status, body).into());
    }
    Ok(serde_json::from_str(body)?)
}

fn format_human(response: &ExportResponse) -> String {
    let mut lines = Vec::new();
    for (course, url) in &response.successful_uploads {
        lines.push(format!("ok     {course} -> {url}"));
    }
    for (course, error) in &response.failed_uploads {
        lines.push(format!("failed {course}: {error}"));
    }
    lines.join("\n")
}
