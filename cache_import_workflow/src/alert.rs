//! Escalation of failed events to whoever operates the handler.
use std::fmt::Debug;

use async_trait::async_trait;
use observability_deps::tracing::error;

use crate::router::{HandlerError, StorageEvent};

/// Notified once for every event whose handling failed.
#[async_trait]
pub trait Alerter: Debug + Send + Sync + 'static {
    async fn alert(&self, event: &StorageEvent, error: &HandlerError);
}

/// Reports failures as error-level log records, which the hosting platform alerts on.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlerter;

#[async_trait]
impl Alerter for LogAlerter {
    async fn alert(&self, event: &StorageEvent, error: &HandlerError) {
        let mut causes = Vec::new();
        let mut source = std::error::Error::source(error);
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        error!(
            kind = %error.kind(),
            bucket = %event.bucket,
            name = %event.name,
            %error,
            causes = %causes.join(": "),
            "cache import handler failed"
        );
    }
}
