//! Pub/Sub API v1 publishing.
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use cache_import_workflow::{ClientError, publish::MessagePublisher};
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::{GoogleApiClient, Result};

pub const DEFAULT_ENDPOINT: &str = "https://pubsub.googleapis.com";

#[derive(Debug, Clone)]
pub struct PubSubPublisher {
    api: GoogleApiClient,
    project_id: String,
}

#[derive(Debug, Serialize)]
struct PublishRequest {
    messages: Vec<PubsubMessage>,
}

#[derive(Debug, Serialize)]
struct PubsubMessage {
    /// base64 encoded payload
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

impl PubSubPublisher {
    /// Short topic names are resolved within `project_id`.
    pub fn new(api: GoogleApiClient, project_id: impl Into<String>) -> Self {
        Self {
            api,
            project_id: project_id.into(),
        }
    }

    /// `projects/<project>/topics/<topic>` for a short name, otherwise `topic` unchanged.
    pub fn topic_name(&self, topic: &str) -> String {
        if topic.starts_with("projects/") {
            topic.to_string()
        } else {
            format!("projects/{}/topics/{topic}", self.project_id)
        }
    }

    async fn publish_one(&self, topic: &str, message: &[u8]) -> Result<String> {
        let url = self
            .api
            .url(&format!("/v1/{}:publish", self.topic_name(topic)))?;
        let body = PublishRequest {
            messages: vec![PubsubMessage {
                data: STANDARD.encode(message),
            }],
        };
        let response: PublishResponse = self.api.send_json(Method::POST, url, Some(&body)).await?;
        Ok(response.message_ids.into_iter().next().unwrap_or_default())
    }
}

#[async_trait]
impl MessagePublisher for PubSubPublisher {
    async fn publish(&self, topic: &str, message: Bytes) -> Result<String, ClientError> {
        Ok(self.publish_one(topic, &message).await?)
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::test_helpers::{TOKEN, api_client};

    #[test]
    fn short_topic_names_are_qualified() {
        let publisher = PubSubPublisher::new(api_client("http://localhost".into()), "proj");
        assert_eq!(
            publisher.topic_name("import-trigger"),
            "projects/proj/topics/import-trigger"
        );
        assert_eq!(
            publisher.topic_name("projects/other/topics/t"),
            "projects/other/topics/t"
        );
    }

    #[tokio::test]
    async fn publish() {
        let path = "/bigstore/res/x/y/process/run/trigger.txt";
        let mut mock_server = Server::new_async().await;
        let mock = mock_server
            .mock("POST", "/v1/projects/proj/topics/import-trigger:publish")
            .match_header("Authorization", format!("Bearer {TOKEN}").as_str())
            .match_body(Matcher::Json(json!({
                "messages": [{"data": STANDARD.encode(path)}],
            })))
            .with_status(200)
            .with_body(r#"{"messageIds": ["4242"]}"#)
            .create_async()
            .await;

        let publisher = PubSubPublisher::new(api_client(mock_server.url()), "proj");
        let id = publisher
            .publish("import-trigger", Bytes::from(path))
            .await
            .expect("publish");

        assert_eq!(id, "4242");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_topic_is_an_error() {
        let mut mock_server = Server::new_async().await;
        let mock = mock_server
            .mock("POST", "/v1/projects/proj/topics/gone:publish")
            .with_status(404)
            .with_body("Resource not found")
            .create_async()
            .await;

        let publisher = PubSubPublisher::new(api_client(mock_server.url()), "proj");
        let err = publisher
            .publish("gone", Bytes::from_static(b"/bigstore/res/a"))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("404"), "{err}");
        mock.assert_async().await;
    }
}
