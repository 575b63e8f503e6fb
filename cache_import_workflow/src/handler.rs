//! Entry point for a single storage notification.
use std::{fmt::Debug, sync::Arc, time::Duration};

use iox_time::{Time, TimeProvider};
use observability_deps::tracing::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::{
    alert::Alerter,
    config::{ConfigError, ImportConfig},
    gateway::ObjectGateway,
    job::JobLauncher,
    publish::MessagePublisher,
    retry::RetryPolicy,
    router::{ErrorKind, EventRouter, HandlerError, Outcome, StorageEvent},
    state_machine::CacheImportStateMachine,
    table_admin::{TableAdmin, TableAdminClient},
    trigger::ControllerTrigger,
};

/// The external services an [`EventHandler`] talks to.
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub gateway: Arc<dyn ObjectGateway>,
    pub table_admin: Arc<dyn TableAdminClient>,
    pub launcher: Arc<dyn JobLauncher>,
    pub publisher: Arc<dyn MessagePublisher>,
    pub alerter: Arc<dyn Alerter>,
    pub time_provider: Arc<dyn TimeProvider>,
}

/// What happened to one event.
#[derive(Debug)]
pub struct HandlerReport {
    pub bucket: String,
    pub name: String,
    pub started_at: Time,
    pub finished_at: Time,
    pub result: Result<Outcome, HandlerError>,
}

impl HandlerReport {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.result.as_ref().err().map(HandlerError::kind)
    }

    pub fn elapsed(&self) -> Duration {
        self.finished_at
            .checked_duration_since(self.started_at)
            .unwrap_or_default()
    }
}

#[derive(Debug)]
pub struct EventHandler {
    router: EventRouter,
    alerter: Arc<dyn Alerter>,
    time_provider: Arc<dyn TimeProvider>,
}

impl EventHandler {
    /// Validate `config` and wire up the workflow components.
    pub fn new(
        config: ImportConfig,
        collaborators: Collaborators,
        policy: RetryPolicy,
    ) -> Result<Self, ConfigError> {
        let config = Arc::new(config.validate()?);
        let Collaborators {
            gateway,
            table_admin,
            launcher,
            publisher,
            alerter,
            time_provider,
        } = collaborators;

        let trigger = ControllerTrigger::new(config.controller_trigger_topic.clone(), publisher)?;
        let state_machine = CacheImportStateMachine::new(
            config,
            gateway,
            TableAdmin::new(table_admin, policy),
            launcher,
        );

        Ok(Self {
            router: EventRouter::new(Arc::new(state_machine), trigger),
            alerter,
            time_provider,
        })
    }

    /// Handle `event`, alerting if it fails. Never panics on a bad event.
    pub async fn handle(&self, event: &StorageEvent, cancel: &CancellationToken) -> HandlerReport {
        let started_at = self.time_provider.now();
        info!(bucket = %event.bucket, name = %event.name, "handling storage event");

        let result = self.router.route(event, cancel).await;
        if let Err(e) = &result {
            warn!(kind = %e.kind(), name = %event.name, "storage event failed");
            self.alerter.alert(event, e).await;
        }

        HandlerReport {
            bucket: event.bucket.clone(),
            name: event.name.clone(),
            started_at,
            finished_at: self.time_provider.now(),
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        router::IgnoreReason,
        test_util::{
            Call, CallLog, FakeGateway, FakeJobLauncher, FakePublisher, FakeTableAdminClient,
            config,
        },
    };
    use async_trait::async_trait;
    use iox_time::MockProvider;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Default)]
    struct RecordingAlerter {
        alerts: Mutex<Vec<(String, ErrorKind)>>,
    }

    #[async_trait]
    impl Alerter for RecordingAlerter {
        async fn alert(&self, event: &StorageEvent, error: &HandlerError) {
            self.alerts.lock().push((event.name.clone(), error.kind()));
        }
    }

    fn collaborators(
        log: &CallLog,
        alerter: Arc<dyn Alerter>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Collaborators {
        Collaborators {
            gateway: Arc::new(FakeGateway::new(log)),
            table_admin: Arc::new(FakeTableAdminClient::new(log)),
            launcher: Arc::new(FakeJobLauncher::new(log)),
            publisher: Arc::new(FakePublisher::new(log)),
            alerter,
            time_provider,
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let log = CallLog::default();
        let mut c = config();
        c.dataflow_template = String::new();

        let err = EventHandler::new(
            c,
            collaborators(
                &log,
                Arc::new(RecordingAlerter::default()),
                Arc::new(MockProvider::new(Time::from_timestamp_nanos(0))),
            ),
            RetryPolicy::default(),
        )
        .unwrap_err();

        assert_eq!(err.to_string(), "dataflowTemplate is not set in environment");
    }

    #[tokio::test]
    async fn success_is_reported_without_alert() {
        let log = CallLog::default();
        let alerter = Arc::new(RecordingAlerter::default());
        let time = Arc::new(MockProvider::new(Time::from_timestamp_nanos(1_000)));
        let handler = EventHandler::new(
            config(),
            collaborators(&log, Arc::<RecordingAlerter>::clone(&alerter), time),
            RetryPolicy::default(),
        )
        .unwrap();

        let report = handler
            .handle(
                &StorageEvent::new("res", "x/y/other/T1/init.txt"),
                &CancellationToken::new(),
            )
            .await;

        assert!(report.is_success());
        assert_eq!(report.error_kind(), None);
        assert_eq!(report.started_at, Time::from_timestamp_nanos(1_000));
        assert_eq!(report.elapsed(), Duration::ZERO);
        assert_eq!(
            report.result.unwrap(),
            Outcome::Ignored {
                reason: IgnoreReason::IrrelevantDirectory
            }
        );
        assert!(alerter.alerts.lock().is_empty());
    }

    #[tokio::test]
    async fn failure_alerts_once() {
        let log = CallLog::default();
        let alerter = Arc::new(RecordingAlerter::default());
        let time = Arc::new(MockProvider::new(Time::from_timestamp_nanos(0)));
        let mut collaborators =
            collaborators(&log, Arc::<RecordingAlerter>::clone(&alerter), time);
        collaborators.publisher = Arc::new(FakePublisher::new(&log).failing());
        let handler = EventHandler::new(config(), collaborators, RetryPolicy::default()).unwrap();

        let report = handler
            .handle(
                &StorageEvent::new("res", "x/y/process/run/trigger.txt"),
                &CancellationToken::new(),
            )
            .await;

        assert!(!report.is_success());
        assert_eq!(report.error_kind(), Some(ErrorKind::Publish));
        assert_eq!(
            *alerter.alerts.lock(),
            vec![("x/y/process/run/trigger.txt".to_string(), ErrorKind::Publish)]
        );
        assert_eq!(log.count(|c| matches!(c, Call::Publish(..))), 1);
    }

    #[tokio::test]
    async fn init_event_launches_import() {
        let log = CallLog::default();
        let handler = EventHandler::new(
            config(),
            collaborators(
                &log,
                Arc::new(RecordingAlerter::default()),
                Arc::new(MockProvider::new(Time::from_timestamp_nanos(0))),
            ),
            RetryPolicy::default(),
        )
        .unwrap();

        let report = handler
            .handle(
                &StorageEvent::new("res", "x/y/control/T1/init.txt"),
                &CancellationToken::new(),
            )
            .await;

        assert!(report.is_success());
        assert_eq!(
            log.count(|c| matches!(c, Call::Write(p) if p == "gs://res/x/y/control/T1/launched.txt")),
            1
        );
    }
}
