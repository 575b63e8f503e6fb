//! OAuth2 access tokens for Google APIs.
use std::{fmt, sync::Arc};

use async_trait::async_trait;
use cache_import_workflow::ClientError;
use secrecy::Secret;

/// Scope covering Bigtable Admin, Dataflow and Pub/Sub.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Supplies the bearer token sent with each API request.
#[async_trait]
pub trait AccessTokenSource: fmt::Debug + Send + Sync + 'static {
    /// `None` sends the request unauthenticated.
    async fn token(&self) -> Result<Option<Secret<String>>, ClientError>;
}

/// Tokens from the ambient Google credentials: a service account key, the metadata server,
/// or the gcloud CLI.
pub struct GcpAuthTokenSource {
    provider: Arc<dyn gcp_auth::TokenProvider>,
}

impl GcpAuthTokenSource {
    /// Discover credentials from the environment.
    pub async fn discover() -> Result<Self, ClientError> {
        let provider = gcp_auth::provider().await?;
        Ok(Self { provider })
    }
}

// gcp_auth providers are not Debug
impl fmt::Debug for GcpAuthTokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcpAuthTokenSource")
            .field("provider", &"<TokenProvider>")
            .finish()
    }
}

#[async_trait]
impl AccessTokenSource for GcpAuthTokenSource {
    async fn token(&self) -> Result<Option<Secret<String>>, ClientError> {
        let token = self.provider.token(&[CLOUD_PLATFORM_SCOPE]).await?;
        Ok(Some(Secret::new(token.as_str().to_string())))
    }
}

/// A fixed token, e.g. from `gcloud auth print-access-token`, or none for emulators.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<Secret<String>>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(Secret::new(token.into())))
    }

    /// Send no `Authorization` header at all.
    pub fn anonymous() -> Self {
        Self(None)
    }
}

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn token(&self) -> Result<Option<Secret<String>>, ClientError> {
        Ok(self.0.clone())
    }
}
