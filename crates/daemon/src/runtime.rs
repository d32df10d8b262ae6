// Composition root: turns a `DaemonConfig` into the event bus, the task
// context, the worker pool and the HTTP server.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Notify};
use tracing::{error, info, warn};

use courier_common::keys::ContentKey;

use crate::bus::EventBus;
use crate::clients::http_client;
use crate::config::DaemonConfig;
use crate::content::router::ContentRouter;
use crate::dispatch::{CanvasDispatcher, CourseSyncDispatcher, GitExportDispatcher, UsernameDispatcher};
use crate::export::packager::{ExportPackager, ObjectStore};
use crate::export::s3::S3ObjectStore;
use crate::git::migrate::{migrate_bindings, MigrationReport};
use crate::git::worker::ProcessCommandExecutor;
use crate::http::build_router;
use crate::store::meta_db::MetaDb;
use crate::store::SharedDb;
use crate::tasks::TaskContext;
use crate::worker::{TaskRunner, WorkerPool};

/// Subscribers for every sync pattern, filtered by the configured flags.
pub fn build_bus(config: &DaemonConfig) -> EventBus {
    let features = &config.features;
    EventBus::new()
        .with(UsernameDispatcher::new(features.username_changer))
        .with(GitExportDispatcher::new(features.clone()))
        .with(CourseSyncDispatcher::new(
            features.course_sync,
            config.course_sync.service_worker_username.clone(),
        ))
        .with(CanvasDispatcher::new(features.canvas))
}

pub fn build_context(config: DaemonConfig, db: SharedDb) -> Result<TaskContext> {
    let http = http_client().context("failed to build HTTP client")?;
    let router = ContentRouter::from_config(&config.content, &db)?;
    let object_store: Arc<dyn ObjectStore> = Arc::new(
        S3ObjectStore::from_config(http.clone(), &config.export).context("invalid [export] configuration")?,
    );
    let packager = ExportPackager::new(object_store, config.export.bucket.clone());

    Ok(TaskContext {
        bus: build_bus(&config),
        config: Arc::new(config),
        db,
        router,
        executor: Arc::new(ProcessCommandExecutor),
        http,
        packager,
        wake: Arc::new(Notify::new()),
    })
}

fn open_db(config: &DaemonConfig) -> Result<SharedDb> {
    Ok(SharedDb::new(MetaDb::open(&config.db.path)?))
}

/// `courierd serve`: run until SIGINT/SIGTERM or a fatal task failure.
pub async fn serve(config: DaemonConfig) -> Result<()> {
    for warning in config.warnings() {
        warn!(warning = %warning, "configuration warning");
    }
    let addr = config.listen_addr()?;
    let db = open_db(&config)?;
    info!(db_path = %config.db.path.display(), "meta.db opened");

    let ctx = build_context(config, db)?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind listener on {addr}"))?;
    serve_with(ctx, listener, shutdown_signal()).await
}

/// Serve HTTP on `listener` with the worker pool running alongside.
pub async fn serve_with<S>(ctx: TaskContext, listener: TcpListener, signal: S) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(4);
    let workers = WorkerPool::new(TaskRunner::new(ctx.clone())).start(shutdown_tx.clone())?;

    let fatal = Arc::new(AtomicBool::new(false));
    let fatal_flag = fatal.clone();
    let app = build_router(ctx);
    info!(listen_addr = %listener.local_addr()?, "courierd listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = signal => {}
                _ = shutdown_rx.recv() => fatal_flag.store(true, Ordering::SeqCst),
            }
        })
        .await
        .context("http server exited unexpectedly");

    let _ = shutdown_tx.send(());
    for handle in workers {
        if let Err(error) = handle.await {
            error!(%error, "worker task ended abnormally");
        }
    }
    served?;

    if fatal.load(Ordering::SeqCst) {
        bail!("stopped after a fatal task failure");
    }
    info!("courierd stopped");
    Ok(())
}

/// `courierd migrate-bindings`.
pub fn run_migrate_bindings(config: &DaemonConfig, keys: &[ContentKey]) -> Result<MigrationReport> {
    let db = open_db(config)?;
    let router = ContentRouter::from_config(&config.content, &db)?;
    migrate_bindings(&router, &db, keys)
}

/// `courierd check-config`: build everything `serve` would, against a
/// throwaway database, and return the configuration warnings.
pub fn check_config(config: &DaemonConfig) -> Result<Vec<String>> {
    config.listen_addr()?;
    config.content.validate()?;
    let db = SharedDb::new(MetaDb::open_in_memory()?);
    let ctx = build_context(config.clone(), db)?;
    info!(subscribers = ?ctx.bus.subscriber_names(), "configuration is usable");
    Ok(config.warnings())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(%error, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                error!(%error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
