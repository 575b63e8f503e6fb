use std::sync::Arc;

use cache_import_clap_blocks::{
    gcp::{DataflowTemplateType, GoogleApiConfig},
    import::ImportConfigArgs,
    object_store::{ObjectStoreConfig, ParseError},
};
use cache_import_gcp::{
    GoogleApiClient,
    auth::{AccessTokenSource, GcpAuthTokenSource, StaticToken},
    bigtable::BigtableAdminClient,
    dataflow::{DataflowLauncher, TemplateKind},
    pubsub::PubSubPublisher,
};
use cache_import_workflow::{
    ClientError,
    alert::LogAlerter,
    config::ConfigError,
    gateway::ObjectStoreGateway,
    handler::{Collaborators, EventHandler},
};
use iox_time::SystemProvider;
use observability_deps::tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Cannot parse object store config: {0}")]
    ObjectStoreParsing(#[from] ParseError),

    #[error("Invalid Google API endpoint: {0}")]
    GoogleApi(#[from] cache_import_gcp::Error),

    #[error("Failed to discover Google credentials: {0}")]
    Credentials(#[source] ClientError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Everything needed to build an [`EventHandler`].
#[derive(Debug, clap::Parser)]
pub(crate) struct WorkflowConfig {
    #[clap(flatten)]
    pub(crate) import: ImportConfigArgs,

    #[clap(flatten)]
    pub(crate) google: GoogleApiConfig,

    #[clap(flatten)]
    pub(crate) object_store: ObjectStoreConfig,
}

impl WorkflowConfig {
    /// Validate the import settings, then connect the workflow to Google Cloud.
    pub(crate) async fn event_handler(&self) -> Result<EventHandler, Error> {
        let config = self.import.import_config()?;

        let store = self.object_store.make_object_store(&config.bucket)?;
        let gateway = ObjectStoreGateway::new().with_bucket(config.bucket.clone(), store);

        let tokens = self.token_source().await?;
        let http_client = reqwest::Client::builder()
            .timeout(self.google.request_timeout)
            .build()
            .map_err(Error::HttpClient)?;
        let api = |endpoint: &str| -> Result<GoogleApiClient, Error> {
            Ok(GoogleApiClient::new(endpoint, Arc::clone(&tokens))?
                .with_http_client(http_client.clone()))
        };

        let collaborators = Collaborators {
            gateway: Arc::new(gateway),
            table_admin: Arc::new(BigtableAdminClient::new(api(
                &self.google.bigtable_admin_endpoint,
            )?)),
            launcher: Arc::new(DataflowLauncher::new(
                api(&self.google.dataflow_endpoint)?,
                self.google.dataflow_region.clone(),
                template_kind(self.google.dataflow_template_type),
            )),
            publisher: Arc::new(PubSubPublisher::new(
                api(&self.google.pubsub_endpoint)?,
                config.project_id.clone(),
            )),
            alerter: Arc::new(LogAlerter),
            time_provider: Arc::new(SystemProvider::new()),
        };

        info!(
            project_id = %config.project_id,
            instance = %config.instance,
            bucket = %config.bucket,
            "cache import handler configured"
        );
        Ok(EventHandler::new(
            config,
            collaborators,
            self.import.retry_policy(),
        )?)
    }

    async fn token_source(&self) -> Result<Arc<dyn AccessTokenSource>, Error> {
        if self.google.anonymous {
            return Ok(Arc::new(StaticToken::anonymous()));
        }
        if let Some(token) = &self.google.access_token {
            return Ok(Arc::new(StaticToken::new(token.clone())));
        }
        let source = GcpAuthTokenSource::discover()
            .await
            .map_err(Error::Credentials)?;
        Ok(Arc::new(source))
    }
}

fn template_kind(t: DataflowTemplateType) -> TemplateKind {
    match t {
        DataflowTemplateType::Classic => TemplateKind::Classic,
        DataflowTemplateType::Flex => TemplateKind::Flex,
    }
}

/// Wait for a `SIGTERM` or `SIGINT` to stop the process on UNIX systems
#[cfg(unix)]
pub(crate) async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let (Ok(mut term), Ok(mut int)) = (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) else {
        warn!("failed to register signal handlers, waiting for ctrl+c instead");
        let _ = tokio::signal::ctrl_c().await;
        return;
    };

    tokio::select! {
        _ = term.recv() => info!("Received SIGTERM"),
        _ = int.recv() => info!("Received SIGINT"),
    }
}

/// Wait for a `ctrl+c` to stop the process on Windows systems
#[cfg(windows)]
pub(crate) async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Received SIGINT");
}
