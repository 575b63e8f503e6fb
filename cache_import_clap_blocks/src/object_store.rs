//! CLI handling for object store config (via CLI arguments and environment variables).

use std::{fs, num::NonZeroUsize, path::PathBuf, sync::Arc, time::Duration};

use object_store::{DynObjectStore, local::LocalFileSystem, memory::InMemory};
use observability_deps::tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Unable to create data directory {path:?}: {source}")]
    CreatingDataDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Unable to create local store {path:?}: {source}")]
    CreateLocalFileSystem {
        path: PathBuf,
        source: object_store::Error,
    },

    #[error(
        "Specified {object_store:?} for the object store, required configuration missing for {missing}"
    )]
    MissingObjectStoreConfig {
        object_store: ObjectStoreType,
        missing: String,
    },

    #[error("Error configuring GCS: {source}")]
    InvalidGCSConfig { source: object_store::Error },
}

/// Object-store type.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ObjectStoreType {
    /// In-memory.
    Memory,

    /// Filesystem, one directory per bucket.
    File,

    /// GCS.
    #[default]
    Google,
}

impl ObjectStoreType {
    /// Map enum variant to static string, followed inverse of clap parsing rules.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Memory => "memory",
            Self::File => "file",
            Self::Google => "google",
        }
    }
}

/// CLI config for the object store holding the import directories.
#[derive(Debug, Clone, clap::Parser)]
pub struct ObjectStoreConfig {
    /// Which object storage to use.
    ///
    /// Possible values (case insensitive):
    ///
    /// * memory: Effectively no object persistence. Useful for trying out events locally.
    /// * file: Stores objects in the local filesystem. Must also set `--data-dir`.
    /// * google: Google Cloud Storage, with credentials from the environment or
    ///   `--google-service-account`.
    #[clap(
        value_enum,
        long = "object-store",
        env = "CACHE_IMPORT_OBJECT_STORE",
        ignore_case = true,
        default_value_t = ObjectStoreType::default(),
        action,
        verbatim_doc_comment
    )]
    pub object_store: ObjectStoreType,

    /// The directory a `file` object store keeps buckets in.
    #[clap(long = "data-dir", env = "CACHE_IMPORT_DATA_DIR", action)]
    pub data_directory: Option<PathBuf>,

    /// When using Google Cloud Storage as the object store, set this to the
    /// path to the JSON file that contains the Google credentials.
    ///
    /// If not set, application default credentials are used.
    #[clap(
        long = "google-service-account",
        env = "GOOGLE_SERVICE_ACCOUNT",
        action
    )]
    pub google_service_account: Option<String>,

    /// When using a network-based object store, limit the number of connection to this value.
    #[clap(
        long = "object-store-connection-limit",
        env = "OBJECT_STORE_CONNECTION_LIMIT",
        default_value = "16",
        action
    )]
    pub object_store_connection_limit: NonZeroUsize,

    /// The maximum number of times to retry a request.
    ///
    /// Defaults to 0: marker checks and writes are attempted exactly once.
    #[clap(
        long = "object-store-max-retries",
        env = "OBJECT_STORE_MAX_RETRIES",
        default_value = "0",
        action
    )]
    pub max_retries: usize,

    /// The maximum length of time from the initial request
    /// after which no further retries will be attempted.
    #[clap(
        long = "object-store-retry-timeout",
        env = "OBJECT_STORE_RETRY_TIMEOUT",
        value_parser = humantime::parse_duration,
        action
    )]
    pub retry_timeout: Option<Duration>,
}

impl ObjectStoreConfig {
    fn retry_config(&self) -> object_store::RetryConfig {
        let mut retry_config = object_store::RetryConfig::default();
        retry_config.max_retries = self.max_retries;

        if let Some(retry_timeout) = self.retry_timeout {
            retry_config.retry_timeout = retry_timeout;
        }

        retry_config
    }

    /// Create the object store serving `bucket`.
    pub fn make_object_store(&self, bucket: &str) -> Result<Arc<DynObjectStore>, ParseError> {
        if let Some(data_dir) = &self.data_directory {
            if !matches!(&self.object_store, ObjectStoreType::File) {
                warn!(?data_dir, object_store_type=?self.object_store,
                      "--data-dir / `CACHE_IMPORT_DATA_DIR` ignored. It only affects 'file' object stores");
            }
        }

        let object_store: Arc<DynObjectStore> = match &self.object_store {
            ObjectStoreType::Memory => {
                info!(bucket, object_store_type = "Memory", "Object Store");
                Arc::new(InMemory::new())
            }
            ObjectStoreType::File => self.new_local_file_system(bucket)?,
            ObjectStoreType::Google => self.new_gcs(bucket)?,
        };

        Ok(object_store)
    }

    fn new_gcs(&self, bucket: &str) -> Result<Arc<DynObjectStore>, ParseError> {
        use object_store::gcp::GoogleCloudStorageBuilder;
        use object_store::limit::LimitStore;

        info!(bucket, object_store_type = "GCS", "Object Store");

        let mut builder = GoogleCloudStorageBuilder::from_env()
            .with_retry(self.retry_config())
            .with_bucket_name(bucket);
        if let Some(account) = &self.google_service_account {
            builder = builder.with_service_account_path(account);
        }

        let store = builder
            .build()
            .map_err(|source| ParseError::InvalidGCSConfig { source })?;
        Ok(Arc::new(LimitStore::new(
            store,
            self.object_store_connection_limit.get(),
        )))
    }

    fn new_local_file_system(&self, bucket: &str) -> Result<Arc<DynObjectStore>, ParseError> {
        let Some(data_dir) = self.data_directory.as_ref() else {
            return Err(ParseError::MissingObjectStoreConfig {
                object_store: ObjectStoreType::File,
                missing: "data-dir".to_string(),
            });
        };

        let bucket_dir = data_dir.join(bucket);
        info!(?bucket_dir, object_store_type = "Directory", "Object Store");
        fs::create_dir_all(&bucket_dir).map_err(|source| ParseError::CreatingDataDirectory {
            path: bucket_dir.clone(),
            source,
        })?;

        let store = LocalFileSystem::new_with_prefix(&bucket_dir).map_err(|source| {
            ParseError::CreateLocalFileSystem {
                path: bucket_dir.clone(),
                source,
            }
        })?;
        Ok(Arc::new(store))
    }
}
