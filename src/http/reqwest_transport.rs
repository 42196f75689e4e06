use std::time::Duration;

use async_trait::async_trait;

use super::{HttpRequest, HttpResponse, Transport, TransportError};
use crate::error::{Error, Result};

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::ClientBuild)?;
        Ok(Self { client })
    }
}

impl Drop for ReqwestTransport {
    fn drop(&mut self) {
        tracing::debug!("HTTP transport released");
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let mut builder = self.client.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await.map_err(classify)?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(classify)?;

        Ok(HttpResponse { status, body })
    }
}

/// Connect failures (DNS and connect timeouts included), connections dropped
/// mid-exchange and broken bodies are network errors. A read timeout, a bad
/// URL or a redirect loop is not.
fn classify(e: reqwest::Error) -> TransportError {
    let read_timeout = e.is_timeout() && !e.is_connect();
    if !read_timeout && (e.is_connect() || e.is_request() || e.is_body()) {
        TransportError::Network(e.to_string())
    } else {
        TransportError::Request(e.to_string())
    }
}
