// Git subprocess worker. Every command goes through a `CommandExecutor`,
// shared with the `tar` invocations of the archive exporter.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

const NOTHING_TO_COMMIT: &str = "nothing to commit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    NothingToCommit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitWorkerError {
    MissingParent { path: PathBuf },
    SpawnFailed { command: String, message: String },
    CommandFailed { command: String, code: Option<i32>, stderr: String },
}

impl Display for GitWorkerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            GitWorkerError::MissingParent { path } => {
                write!(f, "cannot clone into `{}`: it has no parent directory", path.display())
            }
            GitWorkerError::SpawnFailed { command, message } => {
                write!(f, "failed to run `{command}`: {message}")
            }
            GitWorkerError::CommandFailed { command, code, stderr } => {
                write!(f, "`{command}` failed with code {:?}: {}", code, stderr.trim())
            }
        }
    }
}

impl Error for GitWorkerError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Seam over subprocess execution, shared by `git` and `tar`.
pub trait CommandExecutor: Send + Sync {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandResult, std::io::Error>;
}

impl<T: CommandExecutor + ?Sized> CommandExecutor for Arc<T> {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandResult, std::io::Error> {
        (**self).execute(program, args, cwd)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCommandExecutor;

impl CommandExecutor for ProcessCommandExecutor {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandResult, std::io::Error> {
        let output = Command::new(program).args(args).current_dir(cwd).output()?;
        Ok(CommandResult {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Git operations on one local clone.
#[derive(Debug, Clone)]
pub struct GitWorker<E = ProcessCommandExecutor> {
    repo_path: PathBuf,
    executor: E,
}

impl GitWorker<ProcessCommandExecutor> {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self { repo_path: repo_path.into(), executor: ProcessCommandExecutor }
    }
}

impl<E: CommandExecutor> GitWorker<E> {
    pub fn with_executor(repo_path: impl Into<PathBuf>, executor: E) -> Self {
        Self { repo_path: repo_path.into(), executor }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn is_cloned(&self) -> bool {
        self.repo_path.join(".git").exists()
    }

    /// Clone `remote_url` into the worker's repository path.
    pub fn clone_from(&self, remote_url: &str) -> Result<GitCommandOutput, GitWorkerError> {
        let parent = self
            .repo_path
            .parent()
            .ok_or_else(|| GitWorkerError::MissingParent { path: self.repo_path.clone() })?;
        let target = self.repo_path.to_string_lossy().into_owned();
        self.git_in(parent, ["clone".to_string(), remote_url.to_string(), target])
    }

    /// Stage every change in the worktree, deletions included.
    pub fn add_all(&self) -> Result<GitCommandOutput, GitWorkerError> {
        self.git(["add", "-A"])
    }

    /// Commit staged changes. An empty index is not an error.
    pub fn commit(&self, message: &str, author: &str) -> Result<CommitOutcome, GitWorkerError> {
        match self.git(["commit".to_string(), "-m".to_string(), message.to_string(), format!("--author={author}")]) {
            Ok(_) => Ok(CommitOutcome::Committed),
            Err(GitWorkerError::CommandFailed { stderr, .. }) if stderr.contains(NOTHING_TO_COMMIT) => {
                Ok(CommitOutcome::NothingToCommit)
            }
            Err(error) => Err(error),
        }
    }

    pub fn push(&self) -> Result<GitCommandOutput, GitWorkerError> {
        self.git(["push"])
    }

    pub fn pull_rebase(&self) -> Result<GitCommandOutput, GitWorkerError> {
        self.git(["pull", "--rebase"])
    }

    pub fn head_commit(&self) -> Result<String, GitWorkerError> {
        Ok(self.git(["rev-parse", "HEAD"])?.stdout.trim().to_string())
    }

    pub fn last_log(&self) -> Result<String, GitWorkerError> {
        Ok(self.git(["log", "-1", "--stat"])?.stdout)
    }

    fn git<I, S>(&self, args: I) -> Result<GitCommandOutput, GitWorkerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.git_in(&self.repo_path, args)
    }

    /// Run git in `cwd`. A failing command reports stderr, or stdout when
    /// git wrote its complaint there (as `commit` does).
    fn git_in<I, S>(&self, cwd: &Path, args: I) -> Result<GitCommandOutput, GitWorkerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let command = format!("git {}", args.join(" "));
        let result = self
            .executor
            .execute("git", &args, cwd)
            .map_err(|error| GitWorkerError::SpawnFailed { command: command.clone(), message: error.to_string() })?;

        match result {
            CommandResult { success: true, stdout, stderr, .. } => Ok(GitCommandOutput { stdout, stderr }),
            CommandResult { code, stdout, stderr, .. } => Err(GitWorkerError::CommandFailed {
                command,
                code,
                stderr: if stderr.trim().is_empty() { stdout } else { stderr },
            }),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Invocation {
        pub program: String,
        pub args: Vec<String>,
        pub cwd: PathBuf,
    }

    /// Records invocations and answers from a queue of canned results.
    /// Once the queue is empty every command succeeds with empty output.
    #[derive(Clone, Default)]
    pub struct MockExecutor {
        calls: Arc<Mutex<Vec<Invocation>>>,
        responses: Arc<Mutex<VecDeque<Result<CommandResult, std::io::Error>>>>,
    }

    impl MockExecutor {
        pub fn new(responses: Vec<Result<CommandResult, std::io::Error>>) -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            }
        }

        pub fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().expect("mock calls lock poisoned").clone()
        }
    }

    pub fn ok(stdout: &str) -> Result<CommandResult, std::io::Error> {
        Ok(CommandResult { success: true, code: Some(0), stdout: stdout.to_string(), stderr: String::new() })
    }

    pub fn failed(code: i32, stdout: &str, stderr: &str) -> Result<CommandResult, std::io::Error> {
        Ok(CommandResult {
            success: false,
            code: Some(code),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        })
    }

    impl CommandExecutor for MockExecutor {
        fn execute(
            &self,
            program: &str,
            args: &[String],
            cwd: &Path,
        ) -> Result<CommandResult, std::io::Error> {
            self.calls.lock().expect("mock calls lock poisoned").push(Invocation {
                program: program.to_string(),
                args: args.to_vec(),
                cwd: cwd.to_path_buf(),
            });

            self.responses
                .lock()
                .expect("mock responses lock poisoned")
                .pop_front()
                .unwrap_or_else(|| ok(""))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{failed, ok, MockExecutor};
    use super::*;

    #[test]
    fn add_all_stages_deletions_in_the_repo() {
        let mock = MockExecutor::default();
        let worker = GitWorker::with_executor("/srv/exports/physics", mock.clone());

        worker.add_all().unwrap();

        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "git");
        assert_eq!(calls[0].args, vec!["add", "-A"]);
        assert_eq!(calls[0].cwd, PathBuf::from("/srv/exports/physics"));
    }

    #[test]
    fn clone_runs_in_parent_directory() {
        let mock = MockExecutor::default();
        let worker = GitWorker::with_executor("/srv/exports/physics", mock.clone());

        worker.clone_from("git@github.com:mitodl/physics.git").expect("clone should succeed");

        let calls = mock.calls();
        assert_eq!(calls[0].cwd, PathBuf::from("/srv/exports"));
        assert_eq!(
            calls[0].args,
            vec!["clone", "git@github.com:mitodl/physics.git", "/srv/exports/physics"]
        );
    }

    #[test]
    fn rejected_pull_reports_stderr() {
        let mock = MockExecutor::new(vec![failed(1, "", "error: cannot pull with rebase: You have unstaged changes.\n")]);
        let worker = GitWorker::with_executor("/srv/exports/physics", mock);

        match worker.pull_rebase().unwrap_err() {
            GitWorkerError::CommandFailed { command, code, stderr } => {
                assert_eq!(command, "git pull --rebase");
                assert_eq!(code, Some(1));
                assert!(stderr.contains("unstaged changes"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn commit_passes_message_and_author() {
        let mock = MockExecutor::new(vec![ok("[main abc123] update\n")]);
        let worker = GitWorker::with_executor("/tmp/repo", mock.clone());

        let outcome = worker
            .commit("Export from course-v1:MITx+6.00x+2024", "staff <staff@example.org>")
            .expect("commit should succeed");

        assert_eq!(outcome, CommitOutcome::Committed);
        assert_eq!(
            mock.calls()[0].args,
            vec![
                "commit",
                "-m",
                "Export from course-v1:MITx+6.00x+2024",
                "--author=staff <staff@example.org>"
            ]
        );
    }

    #[test]
    fn clean_worktree_commit_is_not_an_error() {
        let mock = MockExecutor::new(vec![failed(
            1,
            "On branch main\nnothing to commit, working tree clean\n",
            "",
        )]);
        let worker = GitWorker::with_executor("/tmp/repo", mock);

        assert_eq!(worker.commit("noop", "a <a@b>").unwrap(), CommitOutcome::NothingToCommit);
    }

    #[test]
    fn head_commit_is_trimmed() {
        let mock = MockExecutor::new(vec![ok("0123abcd\n")]);
        let worker = GitWorker::with_executor("/tmp/repo", mock.clone());

        assert_eq!(worker.head_commit().unwrap(), "0123abcd");
        assert_eq!(mock.calls()[0].args, vec!["rev-parse", "HEAD"]);
    }

    #[test]
    fn spawn_errors_name_the_command() {
        let mock = MockExecutor::new(vec![Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "git not found",
        ))]);
        let worker = GitWorker::with_executor("/tmp/repo", mock);

        let error = worker.push().unwrap_err();
        assert_eq!(error.to_string(), "failed to run `git push`: git not found");
    }
}
