// Content Copier: duplicates one branch of a course onto another key.
//
// Copies happen only when source and destination live in the same backing
// store. A cross-store request writes nothing and says so in its outcome.

use tracing::{debug, warn};

use courier_common::keys::ContentKey;

use super::model::Branch;
use super::router::ContentRouter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    Copied { blocks: usize },
    Unsupported { source_store: String, destination_store: String },
    SourceMissing,
}

#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    #[error("cannot copy `{0}` onto itself")]
    SameKey(String),
    #[error("content store failure while copying `{source_key}` to `{destination_key}`")]
    Store {
        source_key: String,
        destination_key: String,
        #[source]
        error: anyhow::Error,
    },
}

#[derive(Clone)]
pub struct ContentCopier {
    router: ContentRouter,
}

impl ContentCopier {
    pub fn new(router: ContentRouter) -> Self {
        Self { router }
    }

    /// Overwrite the destination's `branch` with the source's.
    pub fn copy(
        &self,
        source: &ContentKey,
        destination: &ContentKey,
        branch: Branch,
    ) -> Result<CopyOutcome, CopyError> {
        if source == destination {
            return Err(CopyError::SameKey(source.to_string()));
        }
        let store_error = |error: anyhow::Error| CopyError::Store {
            source_key: source.to_string(),
            destination_key: destination.to_string(),
            error,
        };

        let source_store = self.router.resolve(source).map_err(store_error)?;
        let destination_store = self.router.resolve(destination).map_err(store_error)?;
        if source_store.store_id() != destination_store.store_id() {
            warn!(
                source = %source,
                destination = %destination,
                source_store = source_store.store_id(),
                destination_store = destination_store.store_id(),
                "cross-store copy is not supported"
            );
            return Ok(CopyOutcome::Unsupported {
                source_store: source_store.store_id().to_string(),
                destination_store: destination_store.store_id().to_string(),
            });
        }

        let Some(tree) = source_store.load(source, branch).map_err(store_error)? else {
            return Ok(CopyOutcome::SourceMissing);
        };
        destination_store.save(destination, branch, &tree).map_err(store_error)?;

        debug!(source = %source, destination = %destination, %branch, blocks = tree.block_count(), "content copied");
        Ok(CopyOutcome::Copied { blocks: tree.block_count() })
    }
}
