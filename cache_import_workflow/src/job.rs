//! The batch ingestion job that fills a cache table.
use std::fmt::Debug;

use async_trait::async_trait;

use crate::{ClientError, paths::StoragePath, table_admin::TableIdentity};

/// Everything needed to launch one ingestion job from a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLaunchRequest {
    /// Table the job writes into.
    pub table: TableIdentity,
    /// Directory the job reads its cache files from.
    pub data_path: StoragePath,
    /// Directory the job signals completion into.
    pub control_path: StoragePath,
    /// Location of the job template.
    pub template: String,
}

/// A job the launcher accepted. Acceptance says nothing about the job finishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchedJob {
    pub job_id: String,
    pub job_name: String,
}

/// Launches batch ingestion jobs.
#[async_trait]
pub trait JobLauncher: Debug + Send + Sync + 'static {
    async fn launch(&self, request: &JobLaunchRequest) -> Result<LaunchedJob, ClientError>;
}
