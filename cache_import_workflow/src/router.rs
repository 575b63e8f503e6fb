//! Classifies storage events by the shape of their object key and dispatches them.
use std::{fmt, sync::Arc};

use observability_deps::tracing::{debug, info};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    paths::{CONTROL_DIRECTORY, CONTROLLER_TRIGGER_FILE, PROCESS_DIRECTORY},
    state_machine::{CacheImportError, CacheImportStateMachine, CacheTransition},
    trigger::{ControllerTrigger, ControllerTriggered, TriggerError},
};

/// The payload of an object storage notification.
///
/// Only the object name and bucket are read, any other attributes are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEvent {
    /// Object key, e.g. `<root>/control/<table id>/init.txt`
    pub name: String,
    pub bucket: String,
}

impl StorageEvent {
    pub fn new(bucket: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bucket: bucket.into(),
        }
    }
}

/// Why an event was dropped without any work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// Fewer than three `/`-separated segments.
    TooFewSegments,
    /// The third-from-last segment is neither `control` nor `process`.
    IrrelevantDirectory,
    /// Under `process`, but not the controller trigger file.
    NotATriggerFile,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TooFewSegments => "expected 3+ '/'-separated parts",
            Self::IrrelevantDirectory => "not under a control or process directory",
            Self::NotATriggerFile => "not a controller trigger file",
        };
        f.write_str(s)
    }
}

/// Where an event key is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    CacheImport,
    ControllerTrigger,
    Ignore(IgnoreReason),
}

/// Route `key` by its third-from-last segment.
pub fn classify(key: &str) -> Route {
    let parts: Vec<&str> = key.split('/').collect();
    if parts.len() < 3 {
        return Route::Ignore(IgnoreReason::TooFewSegments);
    }
    match parts[parts.len() - 3] {
        CONTROL_DIRECTORY => Route::CacheImport,
        PROCESS_DIRECTORY if key.ends_with(CONTROLLER_TRIGGER_FILE) => Route::ControllerTrigger,
        PROCESS_DIRECTORY => Route::Ignore(IgnoreReason::NotATriggerFile),
        _ => Route::Ignore(IgnoreReason::IrrelevantDirectory),
    }
}

/// What handling an event did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Ignored { reason: IgnoreReason },
    CacheImport(CacheTransition),
    ControllerTriggered(ControllerTriggered),
}

/// Coarse classification of a [`HandlerError`], for alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PathFormat,
    DuplicateWork,
    Provisioning,
    JobLaunch,
    ObjectStore,
    Publish,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PathFormat => "path_format",
            Self::DuplicateWork => "duplicate_work",
            Self::Provisioning => "provisioning",
            Self::JobLaunch => "job_launch",
            Self::ObjectStore => "object_store",
            Self::Publish => "publish",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    CacheImport(#[from] CacheImportError),

    #[error(transparent)]
    ControllerTrigger(#[from] TriggerError),
}

impl HandlerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CacheImport(e) => match e {
                CacheImportError::Path(_) => ErrorKind::PathFormat,
                CacheImportError::AlreadyBuilt { .. } => ErrorKind::DuplicateWork,
                CacheImportError::Provisioning(p) if p.is_cancelled() => ErrorKind::Cancelled,
                CacheImportError::Provisioning(_) => ErrorKind::Provisioning,
                CacheImportError::JobLaunch { .. } => ErrorKind::JobLaunch,
                CacheImportError::MarkerCheck { .. } | CacheImportError::MarkerWrite { .. } => {
                    ErrorKind::ObjectStore
                }
            },
            Self::ControllerTrigger(TriggerError::Publish { .. }) => ErrorKind::Publish,
        }
    }
}

#[derive(Debug)]
pub struct EventRouter {
    state_machine: Arc<CacheImportStateMachine>,
    trigger: ControllerTrigger,
}

impl EventRouter {
    pub fn new(state_machine: Arc<CacheImportStateMachine>, trigger: ControllerTrigger) -> Self {
        Self {
            state_machine,
            trigger,
        }
    }

    /// Dispatch a single event. Irrelevant events succeed without doing anything.
    pub async fn route(
        &self,
        event: &StorageEvent,
        cancel: &CancellationToken,
    ) -> Result<Outcome, HandlerError> {
        match classify(&event.name) {
            Route::CacheImport => {
                debug!(name = %event.name, "dispatching to cache import");
                let transition = self.state_machine.handle(&event.name, cancel).await?;
                Ok(Outcome::CacheImport(transition))
            }
            Route::ControllerTrigger => {
                debug!(name = %event.name, "dispatching to controller trigger");
                let triggered = self.trigger.trigger(&event.bucket, &event.name).await?;
                Ok(Outcome::ControllerTriggered(triggered))
            }
            Route::Ignore(reason) => {
                info!(name = %event.name, %reason, "ignoring irrelevant trigger");
                Ok(Outcome::Ignored { reason })
            }
        }
    }
}
