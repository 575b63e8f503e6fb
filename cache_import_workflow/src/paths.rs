//! Canonical storage locations for cache imports.
//!
//! Every import lives under a root folder in the resource bucket:
//!
//! ```text
//! gs://<bucket>/<some path>/<import name>/config/config.textproto
//! gs://<bucket>/<some path>/<import name>/tmcf_csv/*.{csv,tmcf}
//! gs://<bucket>/<some path>/<import name>/cache/
//! gs://<bucket>/<some path>/<import name>/control/<table id>/{init,launched,completed}.txt
//! ```
//!
//! The import name inside the message that wakes the import controller must match the import
//! name in `config.textproto`. The manifest protos are not public, so the folder name stands in
//! for it.
use std::{fmt, str::FromStr};

use object_store::path::Path as ObjPath;

/// Scheme prefix of every [`StoragePath`].
pub const GCS_SCHEME: &str = "gs://";

/// Directory holding the import's config file
pub const CONFIG_DIRECTORY: &str = "config";

/// Name of the import's config file
pub const CONFIG_FILE: &str = "config.textproto";

/// Directory the tmcf and csv files are dropped off in
pub const DATA_DIRECTORY: &str = "tmcf_csv";

/// Directory the ingestion job reads its cache files from
pub const CACHE_DIRECTORY: &str = "cache";

/// Directory holding the per-table state markers
pub const CONTROL_DIRECTORY: &str = "control";

/// Directory holding files that should wake the import controller
pub const PROCESS_DIRECTORY: &str = "process";

/// File name that, dropped under a [`PROCESS_DIRECTORY`], wakes the import controller
pub const CONTROLLER_TRIGGER_FILE: &str = "trigger.txt";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PathError {
    #[error("unexpected path: {path}, expected {GCS_SCHEME}<bucket>/<object>")]
    MissingScheme { path: String },

    #[error("unexpected path: {path}, bucket is empty")]
    MissingBucket { path: String },

    #[error("unexpected control object: {key}, expected <root>/{CONTROL_DIRECTORY}/<table id>/<file>")]
    MalformedControlKey { key: String },
}

/// A `gs://<bucket>/<key>` location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoragePath {
    bucket: String,
    key: String,
}

impl StoragePath {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Result<Self, PathError> {
        let bucket = bucket.into();
        let key = key.into();
        if bucket.is_empty() {
            return Err(PathError::MissingBucket {
                path: format!("{GCS_SCHEME}/{key}"),
            });
        }
        Ok(Self { bucket, key })
    }

    /// Parse a path of the form `gs://<bucket>/<object>`.
    ///
    /// The object may be empty, the bucket may not.
    pub fn parse(path: &str) -> Result<Self, PathError> {
        let mut parts = path.split('/');
        let (Some("gs:"), Some(""), Some(bucket)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(PathError::MissingScheme {
                path: path.to_string(),
            });
        };
        if bucket.is_empty() {
            return Err(PathError::MissingBucket {
                path: path.to_string(),
            });
        }
        let key = parts.collect::<Vec<_>>().join("/");
        Ok(Self {
            bucket: bucket.to_string(),
            key,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn into_parts(self) -> (String, String) {
        (self.bucket, self.key)
    }

    /// Append `/`-separated segments to the key, skipping empty ones.
    pub fn join(&self, segment: &str) -> Self {
        let key = self
            .key
            .split('/')
            .chain(segment.split('/'))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        Self {
            bucket: self.bucket.clone(),
            key,
        }
    }

    /// The last non-empty segment of the key.
    pub fn base_name(&self) -> &str {
        self.key
            .rsplit('/')
            .find(|s| !s.is_empty())
            .unwrap_or_default()
    }

    /// Location of this path inside its bucket's object store.
    pub fn object_path(&self) -> ObjPath {
        ObjPath::from(self.key.as_str())
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{GCS_SCHEME}{}/{}", self.bucket, self.key)
    }
}

impl FromStr for StoragePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parse `gs://<bucket>/<object>` into its bucket and object.
pub fn parse_path(path: &str) -> Result<(String, String), PathError> {
    StoragePath::parse(path).map(StoragePath::into_parts)
}

/// State markers written to and observed in an import's control directory.
///
/// Only the presence of a marker matters, never its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    Init,
    Launched,
    Completed,
}

impl Marker {
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Init => "init.txt",
            Self::Launched => "launched.txt",
            Self::Completed => "completed.txt",
        }
    }

    /// The marker whose file name `key` ends with, if any.
    pub fn from_key(key: &str) -> Option<Self> {
        [Self::Init, Self::Launched, Self::Completed]
            .into_iter()
            .find(|m| key.ends_with(m.file_name()))
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Storage layout of a single import, derived from its root folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportLocation {
    root: StoragePath,
}

impl ImportLocation {
    pub fn new(root: StoragePath) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &StoragePath {
        &self.root
    }

    /// Name of the import, taken from the root folder name.
    pub fn import_name(&self) -> &str {
        self.root.base_name()
    }

    /// Always `<root>/config/config.textproto`.
    pub fn config_path(&self) -> StoragePath {
        self.root.join(CONFIG_DIRECTORY).join(CONFIG_FILE)
    }

    /// Where csv and tmcf files are expected to be dropped off.
    pub fn data_directory(&self) -> StoragePath {
        self.root.join(DATA_DIRECTORY)
    }

    pub fn cache_directory(&self) -> StoragePath {
        self.root.join(CACHE_DIRECTORY)
    }

    pub fn control_directory(&self) -> StoragePath {
        self.root.join(CONTROL_DIRECTORY)
    }

    pub fn marker_path(&self, table_id: &str, marker: Marker) -> StoragePath {
        self.control_directory()
            .join(table_id)
            .join(marker.file_name())
    }
}

/// An object under `<root>/control/<table id>/`, as named by a storage event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlObject {
    pub location: ImportLocation,
    pub table_id: String,
    pub file_name: String,
}

impl ControlObject {
    /// Split an event key into the import root, table id and file name, rooting the import in
    /// `bucket`.
    pub fn from_key(bucket: &str, key: &str) -> Result<Self, PathError> {
        let malformed = || PathError::MalformedControlKey {
            key: key.to_string(),
        };
        let parts: Vec<&str> = key.split('/').collect();
        if parts.len() < 4 || parts[parts.len() - 3] != CONTROL_DIRECTORY {
            return Err(malformed());
        }
        let table_id = parts[parts.len() - 2];
        let root = parts[..parts.len() - 3].join("/");
        if table_id.is_empty() || root.trim_matches('/').is_empty() {
            return Err(malformed());
        }
        Ok(Self {
            location: ImportLocation::new(StoragePath::new(bucket, root)?),
            table_id: table_id.to_string(),
            file_name: parts[parts.len() - 1].to_string(),
        })
    }
}
