//! The Init → Launched → Completed lifecycle of a cache import.
//!
//! All state lives in marker objects under `<root>/control/<table id>/`:
//!
//! * `init.txt` appearing moves the import to Launched: the table is provisioned, the ingestion
//!   job launched and `launched.txt` written.
//! * `completed.txt` is written by the ingestion job when it finishes.
//!
//! Once `launched.txt` exists an init event for the same table is duplicate work. Two init
//! events racing each other can both see it missing; the loser fails creating the table.
use std::sync::Arc;

use bytes::Bytes;
use observability_deps::tracing::{error, info};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{
    ClientError,
    config::ImportConfig,
    gateway::{GatewayError, ObjectGateway},
    job::{JobLaunchRequest, JobLauncher},
    paths::{ControlObject, Marker, PathError},
    table_admin::{ProvisioningError, TableAdmin, TableIdentity},
};

/// Result of undoing table provisioning after a later step failed.
#[derive(Debug)]
pub enum Compensation {
    TableDeleted,
    DeleteFailed(ProvisioningError),
}

impl std::fmt::Display for Compensation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TableDeleted => f.write_str("table deleted"),
            Self::DeleteFailed(e) => write!(f, "table deletion failed: {e}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheImportError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error("failed to check {marker} for table {table_id}: {source}")]
    MarkerCheck {
        table_id: String,
        marker: Marker,
        #[source]
        source: GatewayError,
    },

    #[error("cache was already built for {table_id}")]
    AlreadyBuilt { table_id: String },

    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    #[error("failed to launch ingestion job for table {table_id} ({compensation}): {source}")]
    JobLaunch {
        table_id: String,
        #[source]
        source: ClientError,
        compensation: Compensation,
    },

    #[error("failed to write {marker} for table {table_id} ({compensation}): {source}")]
    MarkerWrite {
        table_id: String,
        marker: Marker,
        #[source]
        source: GatewayError,
        compensation: Compensation,
    },
}

impl CacheImportError {
    /// Outcome of the rollback performed before this error was returned, if any.
    pub fn compensation(&self) -> Option<&Compensation> {
        match self {
            Self::JobLaunch { compensation, .. } | Self::MarkerWrite { compensation, .. } => {
                Some(compensation)
            }
            _ => None,
        }
    }
}

/// The state an event moved the import to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CacheTransition {
    /// Table provisioned and ingestion job launched.
    Launched { table_id: String, job_id: String },
    /// The ingestion job finished.
    Completed { table_id: String },
    /// A control file that does not drive the lifecycle.
    Unchanged { table_id: String, file_name: String },
}

#[derive(Debug)]
pub struct CacheImportStateMachine {
    config: Arc<ImportConfig>,
    gateway: Arc<dyn ObjectGateway>,
    admin: TableAdmin,
    launcher: Arc<dyn JobLauncher>,
}

impl CacheImportStateMachine {
    pub fn new(
        config: Arc<ImportConfig>,
        gateway: Arc<dyn ObjectGateway>,
        admin: TableAdmin,
        launcher: Arc<dyn JobLauncher>,
    ) -> Self {
        Self {
            config,
            gateway,
            admin,
            launcher,
        }
    }

    /// Handle an event for `key`, an object under `<root>/control/<table id>/`.
    pub async fn handle(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<CacheTransition, CacheImportError> {
        let object = ControlObject::from_key(&self.config.bucket, key)?;

        match Marker::from_key(key) {
            Some(Marker::Init) => {
                info!(key, "State Init");
                let job_id = self.launch(&object, cancel).await?;
                info!(key, "State Launched");
                Ok(CacheTransition::Launched {
                    table_id: object.table_id,
                    job_id,
                })
            }
            Some(Marker::Completed) => {
                // TODO: notify the serving layer to load the table once it exposes an API for it
                info!(key, "Completed work");
                Ok(CacheTransition::Completed {
                    table_id: object.table_id,
                })
            }
            Some(Marker::Launched) | None => Ok(CacheTransition::Unchanged {
                table_id: object.table_id,
                file_name: object.file_name,
            }),
        }
    }

    async fn launch(
        &self,
        object: &ControlObject,
        cancel: &CancellationToken,
    ) -> Result<String, CacheImportError> {
        let table_id = &object.table_id;
        let launched_path = object.location.marker_path(table_id, Marker::Launched);

        let launched = self.gateway.exists(&launched_path).await.map_err(|source| {
            CacheImportError::MarkerCheck {
                table_id: table_id.clone(),
                marker: Marker::Launched,
                source,
            }
        })?;
        if launched {
            return Err(CacheImportError::AlreadyBuilt {
                table_id: table_id.clone(),
            });
        }

        let table = TableIdentity::new(
            &self.config.project_id,
            &self.config.instance,
            table_id.as_str(),
        );
        self.admin.setup_bt(&table, cancel).await?;

        let request = JobLaunchRequest {
            table: table.clone(),
            data_path: object.location.cache_directory(),
            control_path: object.location.control_directory(),
            template: self.config.dataflow_template.clone(),
        };
        let job = match self.launcher.launch(&request).await {
            Ok(job) => job,
            Err(source) => {
                error!(%table, error = %source, "failed to launch ingestion job");
                return Err(CacheImportError::JobLaunch {
                    table_id: table_id.clone(),
                    source,
                    compensation: self.compensate(&table).await,
                });
            }
        };
        info!(%table, job_id = %job.job_id, job_name = %job.job_name, "launched ingestion job");

        if let Err(source) = self.gateway.write(&launched_path, Bytes::new()).await {
            error!(%table, path = %launched_path, error = %source, "failed to write launched marker");
            return Err(CacheImportError::MarkerWrite {
                table_id: table_id.clone(),
                marker: Marker::Launched,
                source,
                compensation: self.compensate(&table).await,
            });
        }

        Ok(job.job_id)
    }

    /// Best-effort removal of a table whose import could not proceed.
    async fn compensate(&self, table: &TableIdentity) -> Compensation {
        match self.admin.delete_bt_table(table).await {
            Ok(()) => {
                info!(%table, "deleted table after failed import step");
                Compensation::TableDeleted
            }
            Err(e) => {
                error!(%table, error = %e, "failed to delete table after failed import step");
                Compensation::DeleteFailed(e)
            }
        }
    }
}
