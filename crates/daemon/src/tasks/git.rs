// Git export, import of pushed repositories, and repository provisioning.

use anyhow::anyhow;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};

use courier_common::keys::ContentKey;
use courier_common::slug::repo_name_for;

use super::{parse_content_key, SyncTask, TaskContext, TaskError, TaskResult, TaskSuccess};
use crate::clients::github::{GithubClient, NewRepository};
use crate::content::model::Branch;
use crate::content::olx::OlxError;
use crate::git::exporter::{ExportSummary, GitExporter, ImportSummary};
use crate::git::worker::GitWorkerError;
use crate::store::bindings::BindingStore;
use crate::store::sync_log::{NewSyncLogEntry, SyncDirection, SyncLog};

/// Commit author for an export: the publisher when known, the configured
/// default otherwise.
fn export_author(ctx: &TaskContext, published_by: Option<&str>) -> String {
    match published_by.map(str::trim).filter(|name| !name.is_empty()) {
        Some(user) => format!("{user} <{user}@{}>", ctx.config.git.author_email_domain),
        None => ctx.config.git.default_author.clone(),
    }
}

pub async fn export_to_git(ctx: &TaskContext, content_key: &str, published_by: Option<&str>) -> TaskResult {
    let key = parse_content_key(content_key)?;
    if !ctx.config.features.git_export_enabled(key.is_library()) {
        return Ok(TaskSuccess::Skipped(format!("git export disabled for {}", key.content_type().as_str())));
    }

    let binding = ctx.db.with(|conn| BindingStore::new(conn).get(&key))?;
    let Some(binding) = binding else {
        if ctx.config.features.repo_creation_enabled(key.is_library()) {
            ctx.schedule(SyncTask::CreateGitRepo { content_key: key.to_string(), export_after: true })?;
            return Err(TaskError::precondition(format!(
                "no git repository bound to {key}; repository creation scheduled"
            )));
        }
        return Err(TaskError::precondition(format!("no git repository bound to {key}")));
    };
    if !binding.is_export_enabled {
        return Ok(TaskSuccess::Skipped(format!("export disabled for binding of {key}")));
    }

    let tree = ctx
        .published_tree(&key)?
        .ok_or_else(|| TaskError::precondition(format!("{key} has no published content")))?;

    let author = export_author(ctx, published_by);
    let exporter = GitExporter::new(ctx.config.git.export_dir.clone(), ctx.executor.clone());
    let summary = {
        let (key, remote_url, author) = (key.clone(), binding.remote_url.clone(), author.clone());
        tokio::task::spawn_blocking(move || exporter.export(&key, &remote_url, &tree, &author))
            .await
            .map_err(|join| anyhow!("git export panicked: {join}"))?
            .map_err(classify_git_error)?
    };

    record_export(ctx, &key, &binding.remote_url, &author, &summary)?;

    let message = if summary.committed {
        format!("exported {key} to {} at {}", binding.remote_url, summary.commit_hash)
    } else {
        format!("{key} unchanged in {}", binding.remote_url)
    };
    Ok(TaskSuccess::Completed(message))
}

/// Git command failures are the remote's doing; anything else is ours.
fn classify_git_error(error: anyhow::Error) -> TaskError {
    match error.downcast_ref::<GitWorkerError>() {
        Some(GitWorkerError::CommandFailed { .. }) => TaskError::Remote {
            status: None,
            not_provisioned: false,
            message: format!("{error:#}"),
        },
        _ => TaskError::Unexpected(error),
    }
}

/// Pull a pushed repository and store its content as the draft of the
/// course it was exported from.
///
/// The draft is not published, so an import never triggers an export back
/// to the same repository.
pub async fn import_from_git(ctx: &TaskContext, remote_url: &str, pushed_by: Option<&str>) -> TaskResult {
    let exporter = GitExporter::new(ctx.config.git.export_dir.clone(), ctx.executor.clone());
    let summary = {
        let remote_url = remote_url.to_string();
        tokio::task::spawn_blocking(move || exporter.import(&remote_url))
            .await
            .map_err(|join| anyhow!("git import panicked: {join}"))?
            .map_err(classify_import_error)?
    };
    let key = summary.content_key.clone();

    let binding = ctx.db.with(|conn| BindingStore::new(conn).get(&key))?;
    match binding {
        Some(binding) if binding.remote_url != remote_url => {
            return Err(TaskError::precondition(format!(
                "{key} is bound to {}, not {remote_url}",
                binding.remote_url
            )));
        }
        Some(_) => {}
        None => {
            let inserted =
                ctx.db.with(|conn| BindingStore::new(conn).insert_if_absent(&key, remote_url, Utc::now()))?;
            if inserted {
                info!(content_key = %key, remote_url, "repository bound on first import");
            }
        }
    }

    ctx.router.resolve(&key)?.save(&key, Branch::Draft, &summary.tree)?;

    let author = export_author(ctx, pushed_by);
    record_import(ctx, remote_url, &author, &summary)?;

    Ok(TaskSuccess::Completed(format!(
        "imported {key} from {remote_url} at {}",
        summary.commit_hash
    )))
}

/// A repository without a readable export is the pusher's problem; git
/// failures are the remote's.
fn classify_import_error(error: anyhow::Error) -> TaskError {
    match error.downcast_ref::<OlxError>() {
        Some(OlxError::MissingManifest(_) | OlxError::Invalid { .. }) => {
            TaskError::precondition(format!("{error:#}"))
        }
        _ => classify_git_error(error),
    }
}

fn record_import(ctx: &TaskContext, remote_url: &str, author: &str, summary: &ImportSummary) -> anyhow::Result<()> {
    let entry = NewSyncLogEntry {
        course_id: summary.content_key.to_string(),
        direction: SyncDirection::Import,
        log_payload: json!({
            "remote_url": remote_url,
            "blocks": summary.tree.block_count(),
        }),
        git_log: summary.git_log.clone(),
        repo_dir: summary.repo_dir.display().to_string(),
        commit_hash: summary.commit_hash.clone(),
        author: author.to_string(),
    };
    let id = ctx.db.with(|conn| SyncLog::new(conn).append(&entry, Utc::now()))?;
    debug!(content_key = %summary.content_key, sync_log_id = id, "import recorded in sync log");
    Ok(())
}

fn record_export(
    ctx: &TaskContext,
    key: &ContentKey,
    remote_url: &str,
    author: &str,
    summary: &ExportSummary,
) -> anyhow::Result<()> {
    let entry = NewSyncLogEntry {
        course_id: key.to_string(),
        direction: SyncDirection::Export,
        log_payload: json!({
            "remote_url": remote_url,
            "files_written": summary.files_written,
            "committed": summary.committed,
        }),
        git_log: summary.git_log.clone(),
        repo_dir: summary.repo_dir.display().to_string(),
        commit_hash: summary.commit_hash.clone(),
        author: author.to_string(),
    };
    let id = ctx.db.with(|conn| SyncLog::new(conn).append(&entry, Utc::now()))?;
    debug!(content_key = %key, sync_log_id = id, "export recorded in sync log");
    Ok(())
}

pub async fn create_repo(ctx: &TaskContext, content_key: &str, export_after: bool) -> TaskResult {
    let key = parse_content_key(content_key)?;
    if !ctx.config.features.repo_creation_enabled(key.is_library()) {
        return Ok(TaskSuccess::Skipped(format!(
            "repository creation disabled for {}",
            key.content_type().as_str()
        )));
    }
    if let Some(existing) = ctx.db.with(|conn| BindingStore::new(conn).get(&key))? {
        return Ok(TaskSuccess::Skipped(format!("{key} is already bound to {}", existing.remote_url)));
    }

    let github = GithubClient::from_config(ctx.http.clone(), &ctx.config.github)?;
    let display_name = display_name(ctx, &key)?;
    let repo = NewRepository::private(&repo_name_for(&key), &format!("{display_name}, exported from {key}"));
    let created = github.create_repository(&repo).await?;
    let ssh_url = created
        .ssh_url
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| anyhow!("repository {} was created without an ssh_url", repo.name))?;

    let inserted = ctx.db.with(|conn| BindingStore::new(conn).insert_if_absent(&key, &ssh_url, Utc::now()))?;
    if !inserted {
        info!(content_key = %key, "binding registered concurrently; keeping the existing one");
    }
    if export_after {
        ctx.schedule(SyncTask::ExportToGit { content_key: key.to_string(), published_by: None })?;
    }
    Ok(TaskSuccess::Completed(format!("created {} for {key}", repo.name)))
}

fn display_name(ctx: &TaskContext, key: &ContentKey) -> anyhow::Result<String> {
    let store = ctx.router.resolve(key)?;
    for branch in [Branch::Published, Branch::Draft] {
        let name = store
            .load(key, branch)?
            .and_then(|tree| tree.root_block().map(|root| root.display_name.trim().to_string()))
            .filter(|name| !name.is_empty());
        if let Some(name) = name {
            return Ok(name);
        }
    }
    Ok(key.to_string())
}
