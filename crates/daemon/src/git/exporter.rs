// Git export: mirror a published content tree into its bound repository,
// and read a pushed repository back for import.
//
// The local clone lives at `{export_dir}/{repo_dir_name(remote_url)}`, one
// per remote URL. Every export rewrites the worktree from scratch, so blocks
// deleted on the platform disappear from the repository too. Exporting an
// unchanged tree commits nothing.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use courier_common::keys::ContentKey;
use courier_common::slug::repo_dir_name;

use super::worker::{CommandExecutor, CommitOutcome, GitWorker};
use crate::content::model::ContentTree;
use crate::content::olx;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub repo_dir: PathBuf,
    pub files_written: usize,
    pub committed: bool,
    pub commit_hash: String,
    pub git_log: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportSummary {
    pub repo_dir: PathBuf,
    pub content_key: ContentKey,
    pub tree: ContentTree,
    pub commit_hash: String,
    pub git_log: String,
}

pub struct GitExporter<E> {
    export_dir: PathBuf,
    executor: E,
}

impl<E: CommandExecutor + Clone> GitExporter<E> {
    pub fn new(export_dir: impl Into<PathBuf>, executor: E) -> Self {
        Self { export_dir: export_dir.into(), executor }
    }

    pub fn repo_dir_for(&self, remote_url: &str) -> PathBuf {
        self.export_dir.join(repo_dir_name(remote_url))
    }

    pub fn export(
        &self,
        key: &ContentKey,
        remote_url: &str,
        tree: &ContentTree,
        author: &str,
    ) -> Result<ExportSummary> {
        let (repo_dir, git) = self.checkout(remote_url)?;

        clear_worktree(&repo_dir)?;
        let files_written = olx::write_tree(key, tree, &repo_dir)?;

        git.add_all()?;
        let committed = match git.commit(&format!("Export from {key}"), author)? {
            CommitOutcome::Committed => {
                git.push()?;
                true
            }
            CommitOutcome::NothingToCommit => false,
        };
        let commit_hash = git.head_commit()?;
        let git_log = git.last_log()?;

        info!(
            content_key = %key,
            remote_url,
            committed,
            commit = %commit_hash,
            files = files_written,
            "content exported to git"
        );
        Ok(ExportSummary { repo_dir, files_written, committed, commit_hash, git_log })
    }

    /// Bring the local clone of `remote_url` up to date and read the content
    /// tree it holds.
    pub fn import(&self, remote_url: &str) -> Result<ImportSummary> {
        let (repo_dir, git) = self.checkout(remote_url)?;

        let (content_key, tree) = olx::read_tree(&repo_dir)?;
        let commit_hash = git.head_commit()?;
        let git_log = git.last_log()?;

        info!(
            content_key = %content_key,
            remote_url,
            commit = %commit_hash,
            blocks = tree.block_count(),
            "content read from git"
        );
        Ok(ImportSummary { repo_dir, content_key, tree, commit_hash, git_log })
    }

    /// Clone `remote_url` on first use, pull afterwards.
    fn checkout(&self, remote_url: &str) -> Result<(PathBuf, GitWorker<E>)> {
        fs::create_dir_all(&self.export_dir).with_context(|| {
            format!("failed to create export directory `{}`", self.export_dir.display())
        })?;

        let repo_dir = self.repo_dir_for(remote_url);
        let git = GitWorker::with_executor(&repo_dir, self.executor.clone());
        if git.is_cloned() {
            git.pull_rebase()?;
        } else {
            debug!(remote_url, repo_dir = %repo_dir.display(), "cloning repository");
            git.clone_from(remote_url)?;
        }
        Ok((repo_dir, git))
    }
}

/// Remove everything in `dir` except the `.git` directory.
fn clear_worktree(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read `{}`", dir.display()))? {
        let path = entry?.path();
        if path.file_name().is_some_and(|name| name == ".git") {
            continue;
        }
        let removed = if path.is_dir() { fs::remove_dir_all(&path) } else { fs::remove_file(&path) };
        removed.with_context(|| format!("failed to remove `{}`", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::model::fixtures::sample_course;
    use crate::git::worker::testing::{failed, ok, MockExecutor};
    use tempfile::TempDir;

    const REMOTE: &str = "git@github.com:mitodl/course-v1-mitx-6-00x-2024.git";

    fn key() -> ContentKey {
        ContentKey::course("MITx", "6.00x", "2024")
    }

    fn args(mock: &MockExecutor) -> Vec<String> {
        mock.calls().iter().map(|call| call.args[0].clone()).collect()
    }

    #[test]
    fn first_export_clones_commits_and_pushes() {
        let dir = TempDir::new().unwrap();
        let mock = MockExecutor::new(vec![ok(""), ok(""), ok("[main 1a2b] Export\n"), ok(""), ok("1a2b\n"), ok("commit 1a2b\n")]);
        let exporter = GitExporter::new(dir.path().join("repos"), mock.clone());

        let summary = exporter.export(&key(), REMOTE, &sample_course(), "staff <staff@x>").unwrap();

        assert_eq!(args(&mock), vec!["clone", "add", "commit", "push", "rev-parse", "log"]);
        assert!(summary.committed);
        assert_eq!(summary.commit_hash, "1a2b");
        assert_eq!(summary.files_written, 6);
        assert_eq!(summary.repo_dir, dir.path().join("repos").join(repo_dir_name(REMOTE)));
        assert!(summary.repo_dir.join("course.json").exists());
    }

    #[test]
    fn existing_clone_is_pulled_and_stale_files_removed() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join(repo_dir_name(REMOTE));
        fs::create_dir_all(repo.join(".git")).unwrap();
        fs::create_dir_all(repo.join("html")).unwrap();
        fs::write(repo.join("html").join("old.json"), "{}").unwrap();

        let mock = MockExecutor::default();
        let exporter = GitExporter::new(dir.path(), mock.clone());
        exporter.export(&key(), REMOTE, &sample_course(), "a <a@b>").unwrap();

        assert_eq!(args(&mock)[0], "pull");
        assert!(repo.join(".git").exists());
        assert!(!repo.join("html").exists());
        assert!(repo.join("sequential").join("hw1.json").exists());
    }

    #[test]
    fn unchanged_tree_does_not_push() {
        let dir = TempDir::new().unwrap();
        let mock = MockExecutor::new(vec![
            ok(""),
            ok(""),
            failed(1, "nothing to commit, working tree clean\n", ""),
            ok("1a2b\n"),
            ok(""),
        ]);
        let exporter = GitExporter::new(dir.path(), mock.clone());

        let summary = exporter.export(&key(), REMOTE, &sample_course(), "a <a@b>").unwrap();

        assert!(!summary.committed);
        assert!(!args(&mock).contains(&"push".to_string()));
    }

    #[test]
    fn push_failure_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mock = MockExecutor::new(vec![ok(""), ok(""), ok(""), failed(128, "", "permission denied")]);
        let exporter = GitExporter::new(dir.path(), mock);

        let error = exporter.export(&key(), REMOTE, &sample_course(), "a <a@b>").unwrap_err();
        assert!(format!("{error:#}").contains("permission denied"));
    }

    #[test]
    fn remotes_with_the_same_repo_name_use_separate_clones() {
        let dir = TempDir::new().unwrap();
        let exporter = GitExporter::new(dir.path(), MockExecutor::default());

        let ours = exporter.repo_dir_for("git@github.com:mitodl/intro.git");
        let theirs = exporter.repo_dir_for("git@github.com:other-org/intro.git");

        assert_ne!(ours, theirs);
        assert_eq!(ours.parent(), Some(dir.path()));
    }

    #[test]
    fn import_pulls_and_reads_the_pushed_tree() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join(repo_dir_name(REMOTE));
        fs::create_dir_all(repo.join(".git")).unwrap();
        olx::write_tree(&key(), &sample_course(), &repo).unwrap();

        let mock = MockExecutor::new(vec![ok(""), ok("9f8e\n"), ok("commit 9f8e\n")]);
        let exporter = GitExporter::new(dir.path(), mock.clone());

        let summary = exporter.import(REMOTE).unwrap();

        assert_eq!(args(&mock), vec!["pull", "rev-parse", "log"]);
        assert_eq!(summary.content_key, key());
        assert_eq!(summary.tree, sample_course());
        assert_eq!(summary.commit_hash, "9f8e");
        assert_eq!(summary.repo_dir, repo);
    }

    #[test]
    fn import_of_a_repo_without_export_layout_fails() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(repo_dir_name(REMOTE)).join(".git")).unwrap();
        let exporter = GitExporter::new(dir.path(), MockExecutor::default());

        let error = exporter.import(REMOTE).unwrap_err();
        assert!(matches!(error.downcast_ref::<olx::OlxError>(), Some(olx::OlxError::MissingManifest(_))));
    }
}
