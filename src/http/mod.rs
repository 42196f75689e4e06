pub mod reqwest_transport;
pub mod retry;

#[cfg(test)]
pub mod testing;

use async_trait::async_trait;
use base64::Engine;
use thiserror::Error;

pub use reqwest::Method;
pub use reqwest_transport::ReqwestTransport;
pub use retry::{ResilientClient, RetryPolicy};

/// One outgoing call, fully resolved (headers included).
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    /// Connect, DNS, reset or connect timeout. Always a candidate for retry.
    #[error("{0}")]
    Network(String),
    /// The request could not be built or did not complete for a reason a retry won't fix.
    #[error("{0}")]
    Request(String),
}

/// The connection pool shared by every request of one extractor.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// How a client authenticates against its service.
#[derive(Debug, Clone)]
pub enum Auth {
    /// Azure DevOps personal access token, sent as basic auth with an empty user.
    Basic { token: String },
    /// Completion endpoint key, sent in the `api-key` header.
    ApiKey { key: String },
}

impl Auth {
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = match self {
            Auth::Basic { token } => {
                let encoded =
                    base64::engine::general_purpose::STANDARD.encode(format!(":{token}"));
                vec![("Authorization", format!("Basic {encoded}"))]
            }
            Auth::ApiKey { key } => vec![("api-key", key.clone())],
        };
        headers.push(("Content-Type", "application/json".into()));
        headers.push(("Accept", "application/json".into()));
        headers
    }
}
