//! Provisioning and teardown of the Bigtable table backing a cache import.
use std::{fmt, fmt::Debug, sync::Arc};

use async_trait::async_trait;
use observability_deps::tracing::info;
use tokio_util::sync::CancellationToken;

use crate::{
    ClientError,
    retry::{RetryError, RetryPolicy},
};

/// Column family every cache table is created with.
pub const COLUMN_FAMILY: &str = "csv";

/// Fully qualified name of a Bigtable table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableIdentity {
    pub project_id: String,
    pub instance: String,
    pub table_id: String,
}

impl TableIdentity {
    pub fn new(
        project_id: impl Into<String>,
        instance: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            instance: instance.into(),
            table_id: table_id.into(),
        }
    }

    /// `projects/<project>/instances/<instance>`
    pub fn instance_name(&self) -> String {
        format!("projects/{}/instances/{}", self.project_id, self.instance)
    }
}

impl fmt::Display for TableIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/tables/{}", self.instance_name(), self.table_id)
    }
}

/// The subset of the Bigtable admin API used to manage cache tables.
#[async_trait]
pub trait TableAdminClient: Debug + Send + Sync + 'static {
    /// Create an empty table. Fails if the table already exists.
    async fn create_table(&self, table: &TableIdentity) -> Result<(), ClientError>;

    async fn create_column_family(
        &self,
        table: &TableIdentity,
        family: &str,
    ) -> Result<(), ClientError>;

    async fn delete_table(&self, table: &TableIdentity) -> Result<(), ClientError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error("unable to create table: {table_id}, got error: {source}")]
    CreateTable {
        table_id: String,
        #[source]
        source: RetryError<ClientError>,
    },

    #[error("unable to create column family: {family} for table: {table_id}, got error: {source}")]
    CreateColumnFamily {
        table_id: String,
        family: &'static str,
        #[source]
        source: ClientError,
    },

    #[error("deadline exceeded creating column family: {family} for table: {table_id}")]
    ColumnFamilyDeadline {
        table_id: String,
        family: &'static str,
    },

    #[error("unable to delete table: {table_id}, got error: {source}")]
    DeleteTable {
        table_id: String,
        #[source]
        source: ClientError,
    },
}

impl ProvisioningError {
    /// Whether table creation stopped because the invocation was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::CreateTable {
                source: RetryError::Cancelled { .. },
                ..
            }
        )
    }
}

/// Creates and deletes cache tables.
///
/// Creation is not idempotent: a table that already exists fails every attempt. Callers guard
/// against duplicate work with the launched marker.
#[derive(Debug, Clone)]
pub struct TableAdmin {
    client: Arc<dyn TableAdminClient>,
    policy: RetryPolicy,
}

impl TableAdmin {
    pub fn new(client: Arc<dyn TableAdminClient>, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Create `table` and its [`COLUMN_FAMILY`].
    ///
    /// Table creation is retried per the [`RetryPolicy`]. Column family creation is attempted
    /// once, bounded by what is left of the same deadline.
    pub async fn setup_bt(
        &self,
        table: &TableIdentity,
        cancel: &CancellationToken,
    ) -> Result<(), ProvisioningError> {
        let deadline = self.policy.deadline_from_now();
        let client = &self.client;

        self.policy
            .run(deadline, cancel, move |attempt| {
                info!(attempt, %table, "creating new bigtable table");
                client.create_table(table)
            })
            .await
            .map_err(|source| ProvisioningError::CreateTable {
                table_id: table.table_id.clone(),
                source,
            })?;

        info!(family = COLUMN_FAMILY, %table, "creating column family");
        match tokio::time::timeout_at(
            deadline,
            self.client.create_column_family(table, COLUMN_FAMILY),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(ProvisioningError::CreateColumnFamily {
                table_id: table.table_id.clone(),
                family: COLUMN_FAMILY,
                source,
            }),
            Err(_) => Err(ProvisioningError::ColumnFamilyDeadline {
                table_id: table.table_id.clone(),
                family: COLUMN_FAMILY,
            }),
        }
    }

    /// Delete `table`. A single attempt.
    pub async fn delete_bt_table(&self, table: &TableIdentity) -> Result<(), ProvisioningError> {
        info!(%table, "deleting bigtable table");
        self.client
            .delete_table(table)
            .await
            .map_err(|source| ProvisioningError::DeleteTable {
                table_id: table.table_id.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{Call, CallLog, FakeTableAdminClient};
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::time::Instant;

    fn table() -> TableIdentity {
        TableIdentity::new("proj", "inst", "T1")
    }

    #[test]
    fn table_identity_names() {
        assert_eq!(
            table().to_string(),
            "projects/proj/instances/inst/tables/T1"
        );
        assert_eq!(table().instance_name(), "projects/proj/instances/inst");
    }

    #[tokio::test(start_paused = true)]
    async fn setup_creates_table_then_family() {
        let log = CallLog::default();
        let client = Arc::new(FakeTableAdminClient::new(&log));
        let admin = TableAdmin::new(client, RetryPolicy::default());

        admin
            .setup_bt(&table(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            log.calls(),
            vec![
                Call::CreateTable("T1".into()),
                Call::CreateColumnFamily("T1".into(), "csv".into()),
            ]
        );
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn setup_retries_table_creation() {
        let log = CallLog::default();
        let client = Arc::new(FakeTableAdminClient::new(&log).fail_create_table(2));
        let admin = TableAdmin::new(client, RetryPolicy::default());
        let start = Instant::now();

        admin
            .setup_bt(&table(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(log.count(|c| matches!(c, Call::CreateTable(_))), 3);
        assert_eq!(log.count(|c| matches!(c, Call::CreateColumnFamily(..))), 1);
        assert_eq!(start.elapsed(), Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn setup_gives_up_after_three_attempts() {
        let log = CallLog::default();
        let client = Arc::new(FakeTableAdminClient::new(&log).fail_create_table(u32::MAX));
        let admin = TableAdmin::new(client, RetryPolicy::default());

        let err = admin
            .setup_bt(&table(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            &err,
            ProvisioningError::CreateTable {
                table_id,
                source: RetryError::Exhausted { attempts: 3, .. },
            } if table_id == "T1"
        ));
        assert_eq!(
            err.to_string(),
            "unable to create table: T1, got error: gave up after 3 attempts: table T1 already exists"
        );
        assert_eq!(log.count(|c| matches!(c, Call::CreateTable(_))), 3);
        assert_eq!(log.count(|c| matches!(c, Call::CreateColumnFamily(..))), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn column_family_failure_is_not_retried() {
        let log = CallLog::default();
        let client = Arc::new(FakeTableAdminClient::new(&log).fail_column_family());
        let admin = TableAdmin::new(client, RetryPolicy::default());

        let err = admin
            .setup_bt(&table(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProvisioningError::CreateColumnFamily { family: "csv", .. }
        ));
        assert_eq!(log.count(|c| matches!(c, Call::CreateTable(_))), 1);
        assert_eq!(log.count(|c| matches!(c, Call::CreateColumnFamily(..))), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_setup_reports_cancellation() {
        let log = CallLog::default();
        let client = Arc::new(FakeTableAdminClient::new(&log).fail_create_table(u32::MAX));
        let admin = TableAdmin::new(client, RetryPolicy::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = admin.setup_bt(&table(), &cancel).await.unwrap_err();

        assert!(err.is_cancelled());
        assert!(log.calls().is_empty());
    }

    #[tokio::test]
    async fn delete_is_a_single_attempt() {
        let log = CallLog::default();
        let client = Arc::new(FakeTableAdminClient::new(&log).fail_delete());
        let admin = TableAdmin::new(client, RetryPolicy::default());

        let err = admin.delete_bt_table(&table()).await.unwrap_err();

        assert!(matches!(err, ProvisioningError::DeleteTable { .. }));
        assert_eq!(log.calls(), vec![Call::DeleteTable("T1".into())]);
    }
}
