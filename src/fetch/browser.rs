//! Browser-driven transport over the W3C WebDriver protocol.
//!
//! Talks to a running WebDriver server (chromedriver, geckodriver, a Selenium
//! grid) with plain HTTP calls. Each request opens a fresh headless session,
//! navigates, waits a random settle interval for client-side rendering, reads
//! the page source and closes the session again.
//!
//! The page's own HTTP status is not visible through WebDriver, so a
//! retrieved page source is reported as status 200. Anti-bot interstitials
//! are still caught by the fetcher's minimum body size check.

use super::{RequestIdentity, Transport, TransportResponse};
use crate::error::TransportError;
use rand::{Rng, rng};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

const HIDE_WEBDRIVER_SCRIPT: &str =
    "Object.defineProperty(navigator, 'webdriver', {get: () => undefined})";

#[derive(Debug, Deserialize)]
struct WebDriverReply {
    value: Value,
}

#[derive(Debug, Clone)]
pub struct BrowserTransport {
    client: Client,
    webdriver_url: String,
    settle_min: Duration,
    settle_max: Duration,
    headless: bool,
}

impl BrowserTransport {
    pub fn new(
        webdriver_url: &str,
        settle_min: Duration,
        settle_max: Duration,
        request_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self {
            client,
            webdriver_url: webdriver_url.trim_end_matches('/').to_string(),
            settle_min,
            settle_max: settle_max.max(settle_min),
            headless: true,
        })
    }

    /// Run with a visible window instead, for debugging selectors.
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Session capabilities for a headless Chrome that hides automation flags.
    fn capabilities(&self, identity: &RequestIdentity) -> Value {
        let mut args = vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-blink-features=AutomationControlled".to_string(),
            format!("--user-agent={}", identity.user_agent),
        ];
        if self.headless {
            args.insert(0, "--headless".to_string());
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": args,
                        "excludeSwitches": ["enable-automation"],
                        "prefs": { "profile.managed_default_content_settings.images": 2 }
                    }
                }
            }
        })
    }

    async fn command(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, TransportError> {
        let url = format!("{}{}", self.webdriver_url, path);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let status = response.status();
        let reply: WebDriverReply = response
            .json()
            .await
            .map_err(|e| TransportError::WebDriver(format!("undecodable reply from {path}: {e}")))?;

        if !status.is_success() {
            let error = reply.value.get("error").and_then(Value::as_str).unwrap_or("unknown");
            let message = reply.value.get("message").and_then(Value::as_str).unwrap_or("");
            return Err(TransportError::WebDriver(format!("{status} {error}: {message}")));
        }
        Ok(reply.value)
    }

    async fn page_source(&self, session: &str, url: &str) -> Result<String, TransportError> {
        self.command(
            reqwest::Method::POST,
            &format!("/session/{session}/url"),
            Some(json!({ "url": url })),
        )
        .await?;

        if let Err(e) = self
            .command(
                reqwest::Method::POST,
                &format!("/session/{session}/execute/sync"),
                Some(json!({ "script": HIDE_WEBDRIVER_SCRIPT, "args": [] })),
            )
            .await
        {
            debug!(error = %e, "Could not hide webdriver flag; continuing");
        }

        let settle = {
            let low = self.settle_min.as_millis() as u64;
            let high = self.settle_max.as_millis() as u64;
            Duration::from_millis(rng().random_range(low..=high))
        };
        debug!(?settle, "Waiting for page to settle");
        sleep(settle).await;

        let source = self
            .command(reqwest::Method::GET, &format!("/session/{session}/source"), None)
            .await?;
        source
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| TransportError::WebDriver("page source is not a string".into()))
    }
}

impl Transport for BrowserTransport {
    #[instrument(level = "info", skip_all, fields(%url, identity = identity.index))]
    async fn get(
        &self,
        url: &str,
        identity: &RequestIdentity,
    ) -> Result<TransportResponse, TransportError> {
        let created = self
            .command(
                reqwest::Method::POST,
                "/session",
                Some(self.capabilities(identity)),
            )
            .await?;
        let session = created
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| TransportError::WebDriver("no sessionId in reply".into()))?
            .to_string();
        debug!(%session, "WebDriver session opened");

        let result = self.page_source(&session, url).await;

        if let Err(e) = self
            .command(reqwest::Method::DELETE, &format!("/session/{session}"), None)
            .await
        {
            warn!(%session, error = %e, "Failed to close WebDriver session");
        }

        result.map(|body| TransportResponse { status: 200, body })
    }

    fn call_budget(&self, request_timeout: Duration) -> Duration {
        // five WebDriver calls (open, navigate, script, source, close), each bounded by the
        // client timeout, plus the settle wait
        request_timeout * 5 + self.settle_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> RequestIdentity {
        RequestIdentity {
            index: 2,
            user_agent: "Mozilla/5.0 test".into(),
            accept: "text/html",
            referer: "https://s.weibo.com/".into(),
        }
    }

    fn transport(url: &str) -> BrowserTransport {
        BrowserTransport::new(
            url,
            Duration::from_millis(1),
            Duration::from_millis(2),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[test]
    fn test_capabilities_carry_identity() {
        let caps = transport("http://localhost:9515/").capabilities(&identity());
        let args = caps["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"]
            .as_array()
            .unwrap();
        assert!(args.iter().any(|a| a == "--headless"));
        assert!(args.iter().any(|a| a == "--user-agent=Mozilla/5.0 test"));

        let visible = transport("http://localhost:9515").headless(false).capabilities(&identity());
        let args = visible["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"]
            .as_array()
            .unwrap();
        assert!(!args.iter().any(|a| a == "--headless"));
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        assert_eq!(
            transport("http://localhost:9515/").webdriver_url,
            "http://localhost:9515"
        );
    }

    #[test]
    fn test_budget_includes_settle_time() {
        let t = transport("http://localhost:9515");
        assert_eq!(
            t.call_budget(Duration::from_secs(1)),
            Duration::from_secs(5) + Duration::from_millis(2)
        );
    }

    #[tokio::test]
    async fn test_missing_webdriver_server_is_transport_error() {
        let err = transport("http://127.0.0.1:1")
            .get("https://s.weibo.com/top/summary", &identity())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Connect(_) | TransportError::Request(_)
        ));
    }
}
