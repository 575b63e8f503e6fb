//! REST clients for the Google Cloud services behind the cache import workflow.
//!
//! Each client implements one of the collaborator traits from `cache_import_workflow`:
//!
//! * [`bigtable::BigtableAdminClient`]: Bigtable Admin API v2
//! * [`dataflow::DataflowLauncher`]: Dataflow API v1b3 template launches
//! * [`pubsub::PubSubPublisher`]: Pub/Sub API v1
pub mod auth;
pub mod bigtable;
pub mod dataflow;
pub mod pubsub;

use std::sync::Arc;

use observability_deps::tracing::debug;
use reqwest::{IntoUrl, Method, StatusCode};
use secrecy::ExposeSecret;
use serde::{Serialize, de::DeserializeOwned};
use url::Url;

use crate::auth::AccessTokenSource;

/// Primary error type for the Google API clients
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("base URL error: {0}")]
    BaseUrl(#[source] reqwest::Error),

    #[error("request URL error: {0}")]
    RequestUrl(#[from] url::ParseError),

    #[error("failed to obtain access token: {0}")]
    Auth(#[source] cache_import_workflow::ClientError),

    #[error("failed to parse JSON response: {0}")]
    Json(#[source] reqwest::Error),

    #[error("failed to parse plaintext response: {0}")]
    Text(#[source] reqwest::Error),

    #[error("server responded with error [{code}]: {message}")]
    ApiError { code: StatusCode, message: String },

    #[error("failed to send {method} {url} request: {source}")]
    RequestSend {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl Error {
    fn request_send(method: Method, url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::RequestSend {
            method,
            url: url.into(),
            source,
        }
    }

    /// The HTTP status of an API error response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::ApiError { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Authenticated JSON requests against one Google API endpoint.
#[derive(Debug, Clone)]
pub struct GoogleApiClient {
    /// e.g. `https://bigtableadmin.googleapis.com`
    base_url: Url,
    tokens: Arc<dyn AccessTokenSource>,
    http_client: reqwest::Client,
}

impl GoogleApiClient {
    pub fn new<U: IntoUrl>(base_url: U, tokens: Arc<dyn AccessTokenSource>) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into_url().map_err(Error::BaseUrl)?,
            tokens,
            http_client: reqwest::Client::new(),
        })
    }

    /// Use `http_client` for requests, e.g. one with a request timeout.
    pub fn with_http_client(mut self, http_client: reqwest::Client) -> Self {
        self.http_client = http_client;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Send a request, failing on any non-success status.
    pub(crate) async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&(impl Serialize + Sync)>,
    ) -> Result<reqwest::Response> {
        let mut req = self.http_client.request(method.clone(), url.clone());
        if let Some(body) = body {
            req = req.json(body);
        }
        if let Some(token) = self.tokens.token().await.map_err(Error::Auth)? {
            req = req.bearer_auth(token.expose_secret());
        }

        debug!(%method, %url, "sending google api request");
        let resp = req
            .send()
            .await
            .map_err(|src| Error::request_send(method, url.path(), src))?;

        match resp.status() {
            code if code.is_success() => Ok(resp),
            code => Err(Error::ApiError {
                code,
                message: resp.text().await.map_err(Error::Text)?,
            }),
        }
    }

    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&(impl Serialize + Sync)>,
    ) -> Result<T> {
        self.send(method, url, body)
            .await?
            .json()
            .await
            .map_err(Error::Json)
    }
}
