//! Launching the CSV to Bigtable ingestion job from a Dataflow template.
use std::collections::BTreeMap;

use async_trait::async_trait;
use cache_import_workflow::{
    ClientError,
    job::{JobLaunchRequest, JobLauncher, LaunchedJob},
    paths::Marker,
};
use observability_deps::tracing::info;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::{GoogleApiClient, Result};

pub const DEFAULT_ENDPOINT: &str = "https://dataflow.googleapis.com";
pub const DEFAULT_REGION: &str = "us-central1";

/// How the template at the configured location was built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TemplateKind {
    /// A staged classic template, launched with `templates:launch`.
    #[default]
    Classic,
    /// A flex template spec file, launched with `flexTemplates:launch`.
    Flex,
}

#[derive(Debug, Clone)]
pub struct DataflowLauncher {
    api: GoogleApiClient,
    region: String,
    kind: TemplateKind,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClassicLaunchRequest {
    job_name: String,
    parameters: BTreeMap<&'static str, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FlexLaunchRequest {
    launch_parameter: FlexLaunchParameter,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FlexLaunchParameter {
    job_name: String,
    container_spec_gcs_path: String,
    parameters: BTreeMap<&'static str, String>,
}

#[derive(Debug, Deserialize)]
struct LaunchResponse {
    job: Job,
}

#[derive(Debug, Deserialize)]
struct Job {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

impl DataflowLauncher {
    pub fn new(api: GoogleApiClient, region: impl Into<String>, kind: TemplateKind) -> Self {
        Self {
            api,
            region: region.into(),
            kind,
        }
    }

    async fn launch_template(&self, request: &JobLaunchRequest) -> Result<LaunchedJob> {
        let job_name = job_name(&request.table.table_id);
        let parameters = parameters(request);
        let location = format!(
            "/v1b3/projects/{}/locations/{}",
            request.table.project_id, self.region
        );

        let response: LaunchResponse = match self.kind {
            TemplateKind::Classic => {
                let mut url = self.api.url(&format!("{location}/templates:launch"))?;
                url.query_pairs_mut()
                    .append_pair("gcsPath", &request.template);
                let body = ClassicLaunchRequest {
                    job_name: job_name.clone(),
                    parameters,
                };
                self.api.send_json(Method::POST, url, Some(&body)).await?
            }
            TemplateKind::Flex => {
                let url = self.api.url(&format!("{location}/flexTemplates:launch"))?;
                let body = FlexLaunchRequest {
                    launch_parameter: FlexLaunchParameter {
                        job_name: job_name.clone(),
                        container_spec_gcs_path: request.template.clone(),
                        parameters,
                    },
                };
                self.api.send_json(Method::POST, url, Some(&body)).await?
            }
        };

        info!(job_id = %response.job.id, %job_name, "launched dataflow job");
        Ok(LaunchedJob {
            job_id: response.job.id,
            job_name: response.job.name.unwrap_or(job_name),
        })
    }
}

#[async_trait]
impl JobLauncher for DataflowLauncher {
    async fn launch(&self, request: &JobLaunchRequest) -> Result<LaunchedJob, ClientError> {
        Ok(self.launch_template(request).await?)
    }
}

/// Dataflow job names are lowercase letters, digits and `-`, starting with a letter.
pub fn job_name(table_id: &str) -> String {
    let name: String = table_id
        .chars()
        .map(|c| match c.to_ascii_lowercase() {
            c @ ('a'..='z' | '0'..='9' | '-') => c,
            _ => '-',
        })
        .collect();
    match name.chars().next() {
        Some(c) if c.is_ascii_lowercase() => name,
        _ => format!("cache-{name}"),
    }
}

fn parameters(request: &JobLaunchRequest) -> BTreeMap<&'static str, String> {
    let completion_file = request
        .control_path
        .join(&request.table.table_id)
        .join(Marker::Completed.file_name());
    BTreeMap::from([
        ("inputFile", format!("{}/*", request.data_path)),
        ("completionFile", completion_file.to_string()),
        ("bigtableProjectId", request.table.project_id.clone()),
        ("bigtableInstanceId", request.table.instance.clone()),
        ("bigtableTableId", request.table.table_id.clone()),
    ])
}
