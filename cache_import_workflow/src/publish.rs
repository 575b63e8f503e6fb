//! Sending messages to a topic on the message bus.
use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;

use crate::ClientError;

/// Publishes messages to a message bus topic.
#[async_trait]
pub trait MessagePublisher: Debug + Send + Sync + 'static {
    /// Publish a single message and return the id the bus assigned to it.
    async fn publish(&self, topic: &str, message: Bytes) -> Result<String, ClientError>;
}
