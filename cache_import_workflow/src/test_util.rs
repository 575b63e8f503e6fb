//! Recording fakes of the workflow's external collaborators.
use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::{
    ClientError,
    config::ImportConfig,
    gateway::{GatewayError, ObjectGateway},
    job::{JobLaunchRequest, JobLauncher, LaunchedJob},
    paths::StoragePath,
    publish::MessagePublisher,
    table_admin::{TableAdminClient, TableIdentity},
};

pub(crate) fn config() -> ImportConfig {
    ImportConfig {
        project_id: "proj".into(),
        instance: "inst".into(),
        cluster: "clus".into(),
        dataflow_template: "gs://templates/csv2bt".into(),
        bucket: "res".into(),
        controller_trigger_topic: "import-trigger".into(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Exists(String),
    Write(String),
    CreateTable(String),
    CreateColumnFamily(String, String),
    DeleteTable(String),
    Launch {
        table_id: String,
        data_path: String,
        control_path: String,
        template: String,
    },
    Publish(String, String),
}

/// Calls made to any fake sharing this log, in order.
#[derive(Debug, Clone, Default)]
pub(crate) struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    fn push(&self, call: Call) {
        self.0.lock().push(call);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.0.lock().clone()
    }

    pub(crate) fn count(&self, f: impl Fn(&Call) -> bool) -> usize {
        self.0.lock().iter().filter(|c| f(c)).count()
    }
}

fn client_error(message: impl Into<String>) -> ClientError {
    let message: String = message.into();
    message.into()
}

#[derive(Debug)]
pub(crate) struct FakeTableAdminClient {
    log: CallLog,
    create_table_failures: AtomicU32,
    fail_column_family: bool,
    fail_delete: bool,
}

impl FakeTableAdminClient {
    pub(crate) fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            create_table_failures: AtomicU32::new(0),
            fail_column_family: false,
            fail_delete: false,
        }
    }

    /// Fail the next `n` table creations.
    pub(crate) fn fail_create_table(self, n: u32) -> Self {
        self.create_table_failures.store(n, Ordering::SeqCst);
        self
    }

    pub(crate) fn fail_column_family(mut self) -> Self {
        self.fail_column_family = true;
        self
    }

    pub(crate) fn fail_delete(mut self) -> Self {
        self.fail_delete = true;
        self
    }
}

#[async_trait]
impl TableAdminClient for FakeTableAdminClient {
    async fn create_table(&self, table: &TableIdentity) -> Result<(), ClientError> {
        self.log.push(Call::CreateTable(table.table_id.clone()));
        let failed = self
            .create_table_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(client_error(format!(
                "table {} already exists",
                table.table_id
            )));
        }
        Ok(())
    }

    async fn create_column_family(
        &self,
        table: &TableIdentity,
        family: &str,
    ) -> Result<(), ClientError> {
        self.log.push(Call::CreateColumnFamily(
            table.table_id.clone(),
            family.to_string(),
        ));
        if self.fail_column_family {
            return Err(client_error("column family rejected"));
        }
        Ok(())
    }

    async fn delete_table(&self, table: &TableIdentity) -> Result<(), ClientError> {
        self.log.push(Call::DeleteTable(table.table_id.clone()));
        if self.fail_delete {
            return Err(client_error("delete rejected"));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct FakeJobLauncher {
    log: CallLog,
    fail: bool,
}

impl FakeJobLauncher {
    pub(crate) fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            fail: false,
        }
    }

    pub(crate) fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl JobLauncher for FakeJobLauncher {
    async fn launch(&self, request: &JobLaunchRequest) -> Result<LaunchedJob, ClientError> {
        self.log.push(Call::Launch {
            table_id: request.table.table_id.clone(),
            data_path: request.data_path.to_string(),
            control_path: request.control_path.to_string(),
            template: request.template.clone(),
        });
        if self.fail {
            return Err(client_error("launch rejected"));
        }
        Ok(LaunchedJob {
            job_id: "job-1".into(),
            job_name: request.table.table_id.to_lowercase(),
        })
    }
}

#[derive(Debug)]
pub(crate) struct FakeGateway {
    log: CallLog,
    objects: Mutex<HashSet<String>>,
    fail_exists: bool,
    fail_write: bool,
}

impl FakeGateway {
    pub(crate) fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            objects: Default::default(),
            fail_exists: false,
            fail_write: false,
        }
    }

    pub(crate) fn with_object(self, path: &str) -> Self {
        self.objects.lock().insert(path.to_string());
        self
    }

    pub(crate) fn failing_exists(mut self) -> Self {
        self.fail_exists = true;
        self
    }

    pub(crate) fn failing_write(mut self) -> Self {
        self.fail_write = true;
        self
    }
}

#[async_trait]
impl ObjectGateway for FakeGateway {
    async fn exists(&self, path: &StoragePath) -> Result<bool, GatewayError> {
        self.log.push(Call::Exists(path.to_string()));
        if self.fail_exists {
            return Err(GatewayError::Head {
                path: path.to_string(),
                source: object_store::Error::Generic {
                    store: "fake",
                    source: client_error("permission denied"),
                },
            });
        }
        Ok(self.objects.lock().contains(&path.to_string()))
    }

    async fn write(&self, path: &StoragePath, _data: Bytes) -> Result<(), GatewayError> {
        self.log.push(Call::Write(path.to_string()));
        if self.fail_write {
            return Err(GatewayError::Write {
                path: path.to_string(),
                source: std::io::Error::other("connection reset"),
            });
        }
        self.objects.lock().insert(path.to_string());
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct FakePublisher {
    log: CallLog,
    published: AtomicU32,
    fail: bool,
}

impl FakePublisher {
    pub(crate) fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            published: AtomicU32::new(0),
            fail: false,
        }
    }

    pub(crate) fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl MessagePublisher for FakePublisher {
    async fn publish(&self, topic: &str, message: Bytes) -> Result<String, ClientError> {
        self.log.push(Call::Publish(
            topic.to_string(),
            String::from_utf8_lossy(&message).into_owned(),
        ));
        if self.fail {
            return Err(client_error("topic not found"));
        }
        let n = self.published.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("message-{n}"))
    }
}
