//! Wakes the import controller when a file lands in an import's process directory.
use std::sync::Arc;

use bytes::Bytes;
use observability_deps::tracing::info;
use serde::Serialize;

use crate::{ClientError, config::ConfigError, publish::MessagePublisher};

/// Mount point the import controller reads bucket objects from.
pub const BIGSTORE_ROOT: &str = "/bigstore";

#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("failed to publish {path} to topic {topic}: {source}")]
    Publish {
        topic: String,
        path: String,
        #[source]
        source: ClientError,
    },
}

/// A message the import controller was sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerTriggered {
    pub topic: String,
    pub path: String,
    pub message_id: String,
}

#[derive(Debug, Clone)]
pub struct ControllerTrigger {
    topic: String,
    publisher: Arc<dyn MessagePublisher>,
}

impl ControllerTrigger {
    pub fn new(
        topic: impl Into<String>,
        publisher: Arc<dyn MessagePublisher>,
    ) -> Result<Self, ConfigError> {
        let topic = topic.into();
        if topic.trim().is_empty() {
            return Err(ConfigError::Missing {
                name: "controllerTriggerTopic",
            });
        }
        Ok(Self { topic, publisher })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish the absolute path of `bucket`/`key` to the controller topic.
    pub async fn trigger(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<ControllerTriggered, TriggerError> {
        let path = absolute_path(bucket, key);
        info!(topic = %self.topic, %path, "triggering import controller");

        let message_id = self
            .publisher
            .publish(&self.topic, Bytes::from(path.clone()))
            .await
            .map_err(|source| TriggerError::Publish {
                topic: self.topic.clone(),
                path: path.clone(),
                source,
            })?;

        Ok(ControllerTriggered {
            topic: self.topic.clone(),
            path,
            message_id,
        })
    }
}

/// `/bigstore/<bucket>/<key>`, cleaned lexically: repeated and trailing slashes and `.`
/// segments are dropped, and `..` removes the segment before it but never climbs above `/`.
pub fn absolute_path(bucket: &str, key: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in BIGSTORE_ROOT
        .split('/')
        .chain(bucket.split('/'))
        .chain(key.split('/'))
    {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}
