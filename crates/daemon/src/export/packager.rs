// Export Packager: names, uploads and locates course archives in the
// export bucket.

use std::sync::Arc;

use async_trait::async_trait;

use courier_common::archive::get_file_name_with_extension;

use crate::clients::ClientError;

#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("object store credentials are not configured")]
    MissingCredentials,
    #[error("request signing failed: {0}")]
    Signing(String),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), ObjectStoreError>;

    async fn bucket_location(&self, bucket: &str) -> Result<String, ObjectStoreError>;
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), ObjectStoreError> {
        (**self).put_object(bucket, key, body).await
    }

    async fn bucket_location(&self, bucket: &str) -> Result<String, ObjectStoreError> {
        (**self).bucket_location(bucket).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PackagerError {
    #[error("export bucket is not configured")]
    BucketNotConfigured,
    #[error("failed to upload `{key}`")]
    Upload {
        key: String,
        #[source]
        source: ObjectStoreError,
    },
    #[error("failed to query the location of bucket `{bucket}`")]
    Location {
        bucket: String,
        #[source]
        source: ObjectStoreError,
    },
}

#[derive(Clone)]
pub struct ExportPackager<O> {
    store: O,
    bucket: Option<String>,
}

impl<O: ObjectStore> ExportPackager<O> {
    pub fn new(store: O, bucket: Option<String>) -> Self {
        Self { store, bucket }
    }

    /// The configured bucket, if it is non-blank.
    pub fn bucket(&self) -> Result<&str, PackagerError> {
        self.bucket
            .as_deref()
            .map(str::trim)
            .filter(|bucket| !bucket.is_empty())
            .ok_or(PackagerError::BucketNotConfigured)
    }

    pub fn is_configured(&self) -> bool {
        self.bucket().is_ok()
    }

    pub fn file_name(&self, content_id: &str) -> String {
        get_file_name_with_extension(content_id)
    }

    /// Public URL of an uploaded archive.
    pub fn file_url(&self, content_id: &str) -> Result<String, PackagerError> {
        Ok(format!("https://{}.s3.amazonaws.com/{}", self.bucket()?, self.file_name(content_id)))
    }

    /// Upload an archive and return its URL. The bucket is checked before
    /// anything is sent.
    pub async fn upload(&self, content_id: &str, archive: Vec<u8>) -> Result<String, PackagerError> {
        let bucket = self.bucket()?;
        let key = self.file_name(content_id);
        self.store
            .put_object(bucket, &key, archive)
            .await
            .map_err(|source| PackagerError::Upload { key: key.clone(), source })?;
        self.file_url(content_id)
    }

    pub async fn bucket_location(&self) -> Result<String, PackagerError> {
        let bucket = self.bucket()?;
        self.store
            .bucket_location(bucket)
            .await
            .map_err(|source| PackagerError::Location { bucket: bucket.to_string(), source })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Bucket → key → body.
    #[derive(Default)]
    pub struct MemoryObjectStore {
        pub objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    }

    impl MemoryObjectStore {
        pub fn keys(&self) -> Vec<(String, String)> {
            self.objects.lock().unwrap().keys().cloned().collect()
        }
    }

    #[async_trait]
    impl ObjectStore for MemoryObjectStore {
        async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), ObjectStoreError> {
            self.objects.lock().unwrap().insert((bucket.to_string(), key.to_string()), body);
            Ok(())
        }

        async fn bucket_location(&self, _bucket: &str) -> Result<String, ObjectStoreError> {
            Ok("us-east-1".into())
        }
    }
}
