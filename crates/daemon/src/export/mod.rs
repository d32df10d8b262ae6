// Course archive export: build a tarball from the published tree and hand
// it to the Export Packager.

pub mod archive;
pub mod packager;
pub mod s3;

use std::sync::Arc;

use anyhow::anyhow;
use tracing::info;

use courier_common::keys::ContentKey;

use crate::content::model::Branch;
use crate::content::router::ContentRouter;
use crate::git::worker::CommandExecutor;
use archive::ArchiveBuilder;
use packager::{ExportPackager, ObjectStore, PackagerError};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    Packager(#[from] PackagerError),
    #[error("`{0}` has no published content")]
    NotFound(String),
    #[error("failed to build archive for `{key}`")]
    Archive {
        key: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Archive `key`'s published tree and upload it. Returns the archive URL.
pub async fn export_course(
    router: &ContentRouter,
    executor: Arc<dyn CommandExecutor>,
    packager: &ExportPackager<Arc<dyn ObjectStore>>,
    key: &ContentKey,
) -> Result<String, ExportError> {
    packager.bucket()?;

    let archive_error = |source: anyhow::Error| ExportError::Archive { key: key.to_string(), source };
    let tree = router
        .resolve(key)
        .and_then(|store| store.load(key, Branch::Published))
        .map_err(archive_error)?
        .ok_or_else(|| ExportError::NotFound(key.to_string()))?;

    let owned_key = key.clone();
    let bytes = tokio::task::spawn_blocking(move || ArchiveBuilder::new(executor).build(&owned_key, &tree))
        .await
        .map_err(|join| archive_error(anyhow!("archive builder panicked: {join}")))?
        .map_err(archive_error)?;

    let size = bytes.len();
    let url = packager.upload(&key.to_string(), bytes).await?;
    info!(course_key = %key, size, url = %url, "course archive uploaded");
    Ok(url)
}
