//! Receive storage event notifications over HTTP.
//!
//! Accepts either the bare object resource a storage trigger delivers, or a Pub/Sub push
//! envelope wrapping it.
use std::{collections::HashMap, convert::Infallible, sync::Arc};

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::BytesMut;
use cache_import_clap_blocks::socket_addr::SocketAddr;
use cache_import_workflow::{
    handler::{EventHandler, HandlerReport},
    router::StorageEvent,
};
use hyper::{
    Body, Method, Request, Response, StatusCode,
    body::HttpBody,
    header::CONTENT_TYPE,
    server::conn::{AddrIncoming, AddrStream},
};
use observability_deps::tracing::{info, warn};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use trogging::cli::LoggingConfig;

use super::common::{self, WorkflowConfig, wait_for_signal};

pub(crate) const DEFAULT_HTTP_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)]
    Workflow(#[from] common::Error),

    #[error("Failed to bind address: {0}")]
    BindAddress(#[source] hyper::Error),

    #[error("Server error: {0}")]
    Server(#[source] hyper::Error),
}

#[derive(Debug, clap::Parser)]
pub(crate) struct Config {
    /// logging options
    #[clap(flatten)]
    pub(crate) logging_config: LoggingConfig,

    #[clap(flatten)]
    workflow: WorkflowConfig,

    /// The address on which to receive storage events.
    ///
    /// A bare port number, as given in `PORT` by serverless platforms, listens on all
    /// interfaces.
    #[clap(
        long = "http-bind",
        env = "PORT",
        default_value = DEFAULT_HTTP_BIND_ADDR,
        action
    )]
    http_bind_address: SocketAddr,

    /// Maximum size of an event payload, in bytes.
    #[clap(
        long = "max-http-request-size",
        env = "CACHE_IMPORT_MAX_HTTP_REQUEST_SIZE",
        default_value = "1048576", // 1 MiB
        action
    )]
    max_http_request_size: usize,
}

pub(crate) async fn command(config: Config) -> Result<(), Error> {
    let handler = Arc::new(config.workflow.event_handler().await?);

    let addr = AddrIncoming::bind(&config.http_bind_address).map_err(Error::BindAddress)?;
    info!(address = %addr.local_addr(), "listening for storage events");

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            wait_for_signal().await;
            shutdown.cancel();
        }
    });

    let receiver = Arc::new(EventReceiver {
        handler,
        shutdown: shutdown.clone(),
        max_request_size: config.max_http_request_size,
    });
    serve(addr, receiver, shutdown).await.map_err(Error::Server)?;
    info!("event receiver stopped");
    Ok(())
}

async fn serve(
    addr: AddrIncoming,
    receiver: Arc<EventReceiver>,
    shutdown: CancellationToken,
) -> Result<(), hyper::Error> {
    hyper::Server::builder(addr)
        .serve(hyper::service::make_service_fn(|_conn: &AddrStream| {
            let receiver = Arc::clone(&receiver);
            let service = hyper::service::service_fn(move |request: Request<Body>| {
                let receiver = Arc::clone(&receiver);
                async move { Ok::<_, Infallible>(receiver.route_request(request).await) }
            });
            futures::future::ready(Ok::<_, Infallible>(service))
        }))
        .with_graceful_shutdown(shutdown.cancelled())
        .await
}

#[derive(Debug, thiserror::Error)]
enum DecodeError {
    #[error("error reading request body: {0}")]
    Body(#[source] hyper::Error),

    #[error("request body exceeds {max} bytes")]
    TooLarge { max: usize },

    #[error("invalid event JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid base64 message data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("push message carries neither data nor bucketId/objectId attributes")]
    EmptyMessage,
}

/// A Pub/Sub push delivery of a storage notification.
#[derive(Debug, Deserialize)]
struct PushEnvelope {
    message: PushMessage,
}

#[derive(Debug, Deserialize)]
struct PushMessage {
    #[serde(default)]
    data: String,
    #[serde(default)]
    attributes: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
struct ReportBody<'a, T: Serialize> {
    bucket: &'a str,
    name: &'a str,
    started_at: String,
    finished_at: String,
    #[serde(flatten)]
    result: T,
}

#[derive(Debug, Serialize)]
struct FailureBody {
    kind: String,
    error: String,
}

#[derive(Debug)]
struct EventReceiver {
    handler: Arc<EventHandler>,
    shutdown: CancellationToken,
    max_request_size: usize,
}

impl EventReceiver {
    async fn route_request(&self, req: Request<Body>) -> Response<Body> {
        match (req.method(), req.uri().path()) {
            (&Method::GET, "/health") => Response::new(Body::from("OK")),
            (&Method::POST, _) => match self.read_event(req).await {
                Ok(event) => {
                    let report = self.handler.handle(&event, &self.shutdown).await;
                    report_response(&report)
                }
                Err(e) => {
                    warn!(error = %e, "rejecting undecodable event");
                    text_response(StatusCode::BAD_REQUEST, e.to_string())
                }
            },
            (_, "/health") => text_response(StatusCode::METHOD_NOT_ALLOWED, "GET only"),
            _ => text_response(StatusCode::METHOD_NOT_ALLOWED, "POST storage events"),
        }
    }

    async fn read_event(&self, req: Request<Body>) -> Result<StorageEvent, DecodeError> {
        let mut body = req.into_body();
        let mut payload = BytesMut::new();
        while let Some(chunk) = body.data().await {
            let chunk = chunk.map_err(DecodeError::Body)?;
            if payload.len() + chunk.len() > self.max_request_size {
                return Err(DecodeError::TooLarge {
                    max: self.max_request_size,
                });
            }
            payload.extend_from_slice(&chunk);
        }
        decode_event(&payload)
    }
}

fn decode_event(payload: &[u8]) -> Result<StorageEvent, DecodeError> {
    let value: serde_json::Value = serde_json::from_slice(payload)?;
    if value.get("message").is_none() {
        return Ok(serde_json::from_value(value)?);
    }

    let PushEnvelope { message } = serde_json::from_value(value)?;
    if !message.data.is_empty() {
        let data = STANDARD.decode(message.data.as_bytes())?;
        return Ok(serde_json::from_slice(&data)?);
    }

    // notifications configured without a payload only carry attributes
    match (
        message.attributes.get("bucketId"),
        message.attributes.get("objectId"),
    ) {
        (Some(bucket), Some(name)) => Ok(StorageEvent::new(bucket.clone(), name.clone())),
        _ => Err(DecodeError::EmptyMessage),
    }
}

fn report_response(report: &HandlerReport) -> Response<Body> {
    let started_at = report.started_at.to_rfc3339();
    let finished_at = report.finished_at.to_rfc3339();
    let (status, body) = match &report.result {
        Ok(outcome) => (
            StatusCode::OK,
            serde_json::to_string(&ReportBody {
                bucket: &report.bucket,
                name: &report.name,
                started_at,
                finished_at,
                result: outcome,
            }),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::to_string(&ReportBody {
                bucket: &report.bucket,
                name: &report.name,
                started_at,
                finished_at,
                result: FailureBody {
                    kind: e.kind().to_string(),
                    error: e.to_string(),
                },
            }),
        ),
    };

    match body {
        Ok(body) => Response::builder()
            .status(status)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap_or_else(|_| Response::new(Body::empty())),
        Err(e) => text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn text_response(status: StatusCode, body: impl Into<Body>) -> Response<Body> {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
}
