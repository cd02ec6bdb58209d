//! Direct HTTP transport.
//!
//! One shared `reqwest` client; the identity headers change per request.

use super::{RequestIdentity, Transport, TransportResponse};
use crate::error::TransportError;
use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, PRAGMA, REFERER, USER_AGENT};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self { client, timeout })
    }
}

impl Transport for HttpTransport {
    #[instrument(level = "debug", skip_all, fields(%url, identity = identity.index))]
    async fn get(
        &self,
        url: &str,
        identity: &RequestIdentity,
    ) -> Result<TransportResponse, TransportError> {
        let t0 = Instant::now();
        let result = self
            .client
            .get(url)
            .header(USER_AGENT, &identity.user_agent)
            .header(ACCEPT, identity.accept)
            .header(ACCEPT_LANGUAGE, "zh-CN,zh;q=0.9,en;q=0.8")
            .header(REFERER, &identity.referer)
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Err(TransportError::Timeout(self.timeout)),
            Err(e) => return Err(e.into()),
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) if e.is_timeout() => return Err(TransportError::Timeout(self.timeout)),
            Err(e) => return Err(e.into()),
        };
        debug!(
            status,
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "HTTP response received"
        );
        Ok(TransportResponse { status, body })
    }
}
