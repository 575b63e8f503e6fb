//! Import settings, read from the environment variables the deployment sets.
use std::time::Duration;

use cache_import_workflow::{
    config::{ConfigError, ImportConfig},
    retry::RetryPolicy,
};

/// CLI config for the cache import workflow.
///
/// Every setting is optional on the command line so that a missing one is reported by
/// [`ImportConfig::validate`] under its environment variable name.
#[derive(Debug, Clone, clap::Parser)]
pub struct ImportConfigArgs {
    /// Google Cloud project owning the Bigtable instance and the Dataflow jobs.
    #[clap(long = "project-id", env = "projectID", action)]
    pub project_id: Option<String>,

    /// Bigtable instance cache tables are created in.
    #[clap(long = "instance", env = "instance", action)]
    pub instance: Option<String>,

    /// Bigtable cluster of the instance.
    #[clap(long = "cluster", env = "cluster", action)]
    pub cluster: Option<String>,

    /// Location of the CSV to Bigtable Dataflow template, e.g. `gs://bucket/templates/csv2bt`.
    #[clap(long = "dataflow-template", env = "dataflowTemplate", action)]
    pub dataflow_template: Option<String>,

    /// Bucket holding the import directories.
    #[clap(long = "bucket", env = "bucket", action)]
    pub bucket: Option<String>,

    /// Pub/Sub topic the import controller listens on.
    #[clap(
        long = "controller-trigger-topic",
        env = "controllerTriggerTopic",
        action
    )]
    pub controller_trigger_topic: Option<String>,

    /// How many times to try creating a cache table.
    #[clap(
        long = "table-create-attempts",
        env = "CACHE_IMPORT_TABLE_CREATE_ATTEMPTS",
        default_value = "3",
        value_parser = clap::value_parser!(u32).range(1..),
        action
    )]
    pub table_create_attempts: u32,

    /// How long to wait between attempts to create a cache table.
    #[clap(
        long = "table-create-interval",
        env = "CACHE_IMPORT_TABLE_CREATE_INTERVAL",
        default_value = "60s",
        value_parser = humantime::parse_duration,
        action
    )]
    pub table_create_interval: Duration,

    /// Bound on the time spent provisioning a cache table, column family included.
    #[clap(
        long = "table-create-deadline",
        env = "CACHE_IMPORT_TABLE_CREATE_DEADLINE",
        default_value = "10m",
        value_parser = humantime::parse_duration,
        action
    )]
    pub table_create_deadline: Duration,
}

impl ImportConfigArgs {
    /// The validated import settings.
    pub fn import_config(&self) -> Result<ImportConfig, ConfigError> {
        ImportConfig {
            project_id: self.project_id.clone().unwrap_or_default(),
            instance: self.instance.clone().unwrap_or_default(),
            cluster: self.cluster.clone().unwrap_or_default(),
            dataflow_template: self.dataflow_template.clone().unwrap_or_default(),
            bucket: self.bucket.clone().unwrap_or_default(),
            controller_trigger_topic: self.controller_trigger_topic.clone().unwrap_or_default(),
        }
        .validate()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.table_create_attempts,
            interval: self.table_create_interval,
            deadline: self.table_create_deadline,
        }
    }
}
