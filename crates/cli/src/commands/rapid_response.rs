// `courier toggle` / `runs` / `report`: rapid-response runs.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use reqwest::Method;
use serde::Serialize;

use courier_common::types::{RunSummary, ToggleRequest};

use crate::client::DaemonClient;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct ToggleArgs {
    /// Usage key of the problem block.
    problem_usage_key: String,
}

#[derive(Debug, Args)]
pub struct RunsArgs {
    course_key: String,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    course_key: String,
    run_id: i64,

    /// Write the CSV here instead of stdout.
    #[arg(long, short)]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct SavedReport {
    path: String,
    bytes: usize,
}

pub async fn toggle(args: ToggleArgs, client: &DaemonClient, format: OutputFormat) -> anyhow::Result<()> {
    let url = client.endpoint(&["api", "rapid-response", "toggle"], &[])?;
    let request = ToggleRequest { problem_usage_key: args.problem_usage_key };
    let run: RunSummary = client.send(Method::POST, url, Some(&request)).await?;
    output::print_output(format, &run, |run| {
        format!("run {} for {} is now {}", run.id, run.problem_usage_key, if run.open { "open" } else { "closed" })
    })?;
    Ok(())
}

pub async fn runs(args: RunsArgs, client: &DaemonClient, format: OutputFormat) -> anyhow::Result<()> {
    let url = client.endpoint(&["api", "rapid-response", "runs", &args.course_key], &[])?;
    let runs: Vec<RunSummary> = client.get(url).await?;
    output::print_output(format, &runs, format_runs)?;
    Ok(())
}

pub async fn report(args: ReportArgs, client: &DaemonClient, format: OutputFormat) -> anyhow::Result<()> {
    let run_id = args.run_id.to_string();
    let url = client.endpoint(&["api", "rapid-response", "report", &args.course_key, &run_id], &[])?;
    let csv = client.get_text(url).await?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, &csv).with_context(|| format!("failed to write `{}`", path.display()))?;
            let saved = SavedReport { path: path.display().to_string(), bytes: csv.len() };
            output::print_output(format, &saved, |saved| format!("wrote {} ({} bytes)", saved.path, saved.bytes))?;
        }
        None => print!("{csv}"),
    }
    Ok(())
}

fn format_runs(runs: &Vec<RunSummary>) -> String {
    if runs.is_empty() {
        return "No rapid-response runs.".into();
    }
    runs.iter()
        .map(|run| {
            format!(
                "{:>5}  {}  {:<6}  {}",
                run.id,
                run.created_at.format("%Y-%m-%d %H:%M"),
                if run.open { "open" } else { "closed" },
                run.problem_usage_key
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
