//! Existence checks and marker writes against object storage.
use std::{collections::HashMap, fmt::Debug, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{ObjectStore, buffered::BufWriter};
use observability_deps::tracing::{debug, warn};
use tokio::io::AsyncWriteExt;

use crate::paths::StoragePath;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("no object store configured for bucket '{bucket}'")]
    UnknownBucket { bucket: String },

    #[error("failed to check {path}: {source}")]
    Head {
        path: String,
        #[source]
        source: object_store::Error,
    },

    #[error("failed to write data to {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Object storage as seen by the import workflow.
#[async_trait]
pub trait ObjectGateway: Debug + Send + Sync + 'static {
    /// `true` if an object exists at `path`. Only a not-found answer maps to `false`.
    async fn exists(&self, path: &StoragePath) -> Result<bool, GatewayError>;

    /// Create or overwrite the object at `path`. A single attempt.
    async fn write(&self, path: &StoragePath, data: Bytes) -> Result<(), GatewayError>;
}

/// [`ObjectGateway`] backed by one [`ObjectStore`] per bucket.
#[derive(Debug, Default)]
pub struct ObjectStoreGateway {
    stores: HashMap<String, Arc<dyn ObjectStore>>,
}

impl ObjectStoreGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve paths in `bucket` from `store`.
    pub fn with_bucket(mut self, bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        self.stores.insert(bucket.into(), store);
        self
    }

    fn store(&self, path: &StoragePath) -> Result<&Arc<dyn ObjectStore>, GatewayError> {
        self.stores
            .get(path.bucket())
            .ok_or_else(|| GatewayError::UnknownBucket {
                bucket: path.bucket().to_string(),
            })
    }
}

#[async_trait]
impl ObjectGateway for ObjectStoreGateway {
    async fn exists(&self, path: &StoragePath) -> Result<bool, GatewayError> {
        match self.store(path)?.head(&path.object_path()).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(source) => Err(GatewayError::Head {
                path: path.to_string(),
                source,
            }),
        }
    }

    async fn write(&self, path: &StoragePath, data: Bytes) -> Result<(), GatewayError> {
        let store = Arc::clone(self.store(path)?);
        let mut writer = BufWriter::new(store, path.object_path());

        // the writer is either shut down (flushing the upload) or aborted before returning
        let result = match writer.write_all(&data).await {
            Ok(()) => writer.shutdown().await,
            Err(e) => {
                if let Err(abort_error) = writer.abort().await {
                    warn!(%path, error = %abort_error, "failed to abort object write");
                }
                Err(e)
            }
        };

        result.map_err(|source| GatewayError::Write {
            path: path.to_string(),
            source,
        })?;
        debug!(%path, bytes = data.len(), "wrote object");
        Ok(())
    }
}
