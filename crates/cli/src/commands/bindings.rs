// `courier bind` / `courier bindings`: git repository bindings.

use clap::Args;
use reqwest::Method;

use courier_common::types::{BindingRecord, BindingRequest};

use crate::client::DaemonClient;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct BindArgs {
    /// Course or library key.
    content_key: String,

    /// Git remote the exporter pushes to.
    remote_url: String,

    /// Keep the binding but stop automatic exports.
    #[arg(long)]
    disable_export: bool,
}

#[derive(Debug, Args)]
pub struct BindingsArgs {}

pub async fn bind(args: BindArgs, client: &DaemonClient, format: OutputFormat) -> anyhow::Result<()> {
    let url = client.endpoint(&["api", "bindings", &args.content_key], &[])?;
    let request = BindingRequest { remote_url: args.remote_url, is_export_enabled: !args.disable_export };
    let binding: BindingRecord = client.send(Method::PUT, url, Some(&request)).await?;
    output::print_output(format, &binding, |binding| format!("bound {}", format_binding(binding)))?;
    Ok(())
}

pub async fn list(_args: BindingsArgs, client: &DaemonClient, format: OutputFormat) -> anyhow::Result<()> {
    let bindings: Vec<BindingRecord> = client.get(client.endpoint(&["api", "bindings"], &[])?).await?;
    output::print_output(format, &bindings, format_list)?;
    Ok(())
}

fn format_binding(binding: &BindingRecord) -> String {
    let suffix = if binding.is_export_enabled { "" } else { " (export disabled)" };
    format!("{} -> {}{suffix}", binding.content_key, binding.remote_url)
}

fn format_list(bindings: &Vec<BindingRecord>) -> String {
    if bindings.is_empty() {
        return "No bindings.".into();
    }
    bindings.iter().map(format_binding).collect::<Vec<_>>().join("\n")
}
