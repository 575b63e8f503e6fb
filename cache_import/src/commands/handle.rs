//! Process a single storage event and exit.
use std::path::PathBuf;

use anyhow::Context;
use cache_import_workflow::{
    paths::StoragePath,
    router::{HandlerError, StorageEvent},
};
use observability_deps::tracing::info;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use trogging::cli::LoggingConfig;

use super::common::{self, WorkflowConfig, wait_for_signal};

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)]
    Workflow(#[from] common::Error),

    #[error("Cannot load event: {0:#}")]
    LoadEvent(#[source] anyhow::Error),

    #[error(transparent)]
    Handler(#[from] HandlerError),
}

#[derive(Debug, clap::Parser)]
#[clap(group(
    clap::ArgGroup::new("event")
        .required(true)
        .args(["object", "event_file"])
))]
pub(crate) struct Config {
    /// logging options
    #[clap(flatten)]
    pub(crate) logging_config: LoggingConfig,

    #[clap(flatten)]
    workflow: WorkflowConfig,

    /// The object the event is about, e.g. `gs://bucket/root/control/table/init.txt`.
    #[clap(action)]
    object: Option<StoragePath>,

    /// A JSON file holding the storage notification payload, `-` for stdin.
    #[clap(long = "event-file", action)]
    event_file: Option<PathBuf>,
}

pub(crate) async fn command(config: Config) -> Result<(), Error> {
    let event = load_event(&config).await.map_err(Error::LoadEvent)?;
    let handler = config.workflow.event_handler().await?;

    let cancel = CancellationToken::new();
    let signal = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            wait_for_signal().await;
            cancel.cancel();
        }
    });

    let report = handler.handle(&event, &cancel).await;
    signal.abort();

    let elapsed = report.elapsed();
    let outcome = report.result?;
    info!(?elapsed, ?outcome, "event handled");
    if let Ok(json) = serde_json::to_string(&outcome) {
        println!("{json}");
    }
    Ok(())
}

async fn load_event(config: &Config) -> anyhow::Result<StorageEvent> {
    if let Some(object) = &config.object {
        let (bucket, name) = object.clone().into_parts();
        return Ok(StorageEvent::new(bucket, name));
    }

    let Some(path) = &config.event_file else {
        anyhow::bail!("either an object or --event-file is required");
    };
    let payload = if path.as_os_str() == "-" {
        let mut payload = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut payload)
            .await
            .context("reading event from stdin")?;
        payload
    } else {
        tokio::fs::read(path)
            .await
            .with_context(|| format!("reading event from {}", path.display()))?
    };
    serde_json::from_slice(&payload).context("decoding event JSON")
}
