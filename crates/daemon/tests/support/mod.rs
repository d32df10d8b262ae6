// Shared fixtures for the daemon integration tests.

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Notify;

use courier_daemon::bus::EventBus;
use courier_daemon::config::DaemonConfig;
use courier_daemon::content::backing::MemoryBackingStore;
use courier_daemon::content::model::{ContentBlock, ContentTree};
use courier_daemon::content::router::ContentRouter;
use courier_daemon::export::packager::{ExportPackager, ObjectStore, ObjectStoreError};
use courier_daemon::git::worker::{CommandExecutor, CommandResult};
use courier_daemon::runtime::build_bus;
use courier_daemon::store::SharedDb;
use courier_daemon::tasks::TaskContext;

/// Records every subprocess invocation and reports success.
#[derive(Debug, Clone, Default)]
pub struct RecordingExecutor {
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingExecutor {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandExecutor for RecordingExecutor {
    fn execute(&self, program: &str, args: &[String], _cwd: &Path) -> Result<CommandResult, io::Error> {
        self.calls.lock().unwrap().push(format!("{program} {}", args.join(" ")));
        Ok(CommandResult { success: true, code: Some(0), stdout: String::new(), stderr: String::new() })
    }
}

/// Keeps uploads in memory, keyed by `bucket/key`.
#[derive(Debug, Default)]
pub struct InMemoryBucket {
    objects: Mutex<Vec<(String, usize)>>,
}

#[async_trait]
impl ObjectStore for InMemoryBucket {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), ObjectStoreError> {
        self.objects.lock().unwrap().push((format!("{bucket}/{key}"), body.len()));
        Ok(())
    }

    async fn bucket_location(&self, _bucket: &str) -> Result<String, ObjectStoreError> {
        Ok("us-east-1".into())
    }
}

/// Context with every dispatcher registered, one in-memory content store
/// named `primary` and a recording executor.
pub fn context(config: DaemonConfig) -> (TaskContext, RecordingExecutor) {
    context_with_router(config, ContentRouter::new(Arc::new(MemoryBackingStore::new("primary"))))
}

pub fn context_with_router(config: DaemonConfig, router: ContentRouter) -> (TaskContext, RecordingExecutor) {
    let executor = RecordingExecutor::default();
    let bucket: Arc<dyn ObjectStore> = Arc::new(InMemoryBucket::default());
    let ctx = TaskContext {
        bus: build_bus(&config),
        config: Arc::new(config),
        db: SharedDb::in_memory().unwrap(),
        router,
        executor: Arc::new(executor.clone()),
        http: reqwest::Client::new(),
        packager: ExportPackager::new(bucket, Some("exports".into())),
        wake: Arc::new(Notify::new()),
    };
    (ctx, executor)
}

pub fn sample_course() -> ContentTree {
    ContentTree::from_blocks(
        "course",
        [
            ContentBlock::new("course", "course", "Signals and Systems").with_children(&["week1"]),
            ContentBlock::new("chapter", "week1", "Week 1").with_children(&["hw1"]),
            ContentBlock::new("sequential", "hw1", "Homework 1")
                .with_field("graded", json!(true))
                .with_children(&["problem1"]),
            ContentBlock::new("problem", "problem1", "Question 1"),
        ],
    )
}

/// `io::Write` sink shared with a `tracing_subscriber` fmt layer.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
