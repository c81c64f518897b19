// =============================================================================
// fetch.rs -- THE POLITE BUT STUBBORN HTTP CLIENT
// =============================================================================
//
// Every byte the engine reads from the outside world comes through here.
// The contract is deliberately blunt: you get `Some(data)` or you get `None`.
// Timeouts, DNS failures, 500s, 401s, 403s, malformed JSON -- all of them
// mean "this call produced nothing". We log it and move on. An incomplete
// report beats a crashed run.
//
// No retries. A failed call is a failed call. The next scheduled run will
// try again, and it will not remember that we failed.
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

/// User agent for API calls. CourtListener asks clients to identify themselves.
const API_USER_AGENT: &str = "LawsuitRadarEngine/1.0 (ai-lawsuit-monitor; batch)";

/// User agent for HTML pages and news articles. Some sites refuse anything
/// that does not look like a browser.
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Query string pairs. Owned values because most of them are ids.
pub type Query = Vec<(&'static str, String)>;

/// A page body and the URL it was actually served from after redirects.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub final_url: String,
    pub body: String,
}

/// Read-only access to the outside world. The discovery chain, the
/// aggregator and the news pipeline only ever see this trait.
#[async_trait]
pub trait RecordsFetch: Send + Sync {
    /// GET a JSON document from the records API.
    async fn get_json(&self, url: &str, query: &Query) -> Option<Value>;

    /// GET an HTML page (or any text) with a browser-like user agent,
    /// following redirects.
    async fn get_page(&self, url: &str) -> Option<Page>;

    /// Just the body of `get_page`.
    async fn get_html(&self, url: &str) -> Option<String> {
        self.get_page(url).await.map(|page| page.body)
    }

    /// GET raw bytes, for PDFs.
    async fn get_bytes(&self, url: &str) -> Option<Vec<u8>>;
}

/// Canonical form of a request: the URL plus its sorted query pairs. Used to
/// recognize a page we have already read.
pub fn request_key(url: &str, query: &Query) -> String {
    if query.is_empty() {
        return url.to_string();
    }
    let mut pairs: Vec<String> = query.iter().map(|(k, v)| format!("{k}={v}")).collect();
    pairs.sort();
    format!("{url}?{}", pairs.join("&"))
}

/// The real thing, backed by reqwest.
pub struct HttpFetcher {
    api: reqwest::Client,
    browser: reqwest::Client,
    token: Option<String>,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, token: Option<String>) -> anyhow::Result<Self> {
        let api = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(API_USER_AGENT)
            .build()?;
        let browser = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(BROWSER_USER_AGENT)
            .build()?;

        if token.is_none() {
            warn!("No CourtListener token configured -- running on public data only");
        }

        Ok(Self { api, browser, token })
    }

    /// Send a request and hand back the response only if it is a 2xx.
    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> Option<reqwest::Response> {
        let response = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(url = url, error = %e, "Request failed -- treating as no data");
                return None;
            }
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            debug!(url = url, status = %status, "Auth refused -- treating as no data");
            return None;
        }
        if !status.is_success() {
            warn!(url = url, status = %status, "Non-success status -- treating as no data");
            return None;
        }
        Some(response)
    }
}

#[async_trait]
impl RecordsFetch for HttpFetcher {
    async fn get_json(&self, url: &str, query: &Query) -> Option<Value> {
        let mut request = self.api.get(url).header(ACCEPT, "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Token {token}"));
        }

        let response = self.send(request, url).await?;
        match response.json::<Value>().await {
            Ok(json) => Some(json),
            Err(e) => {
                warn!(url = url, error = %e, "JSON parse error -- treating as no data");
                None
            }
        }
    }

    async fn get_page(&self, url: &str) -> Option<Page> {
        let response = self.send(self.browser.get(url), url).await?;
        let final_url = response.url().to_string();
        match response.text().await {
            Ok(body) => Some(Page { final_url, body }),
            Err(e) => {
                debug!(url = url, error = %e, "Failed to read page body");
                None
            }
        }
    }

    async fn get_bytes(&self, url: &str) -> Option<Vec<u8>> {
        let response = self.send(self.browser.get(url), url).await?;
        match response.bytes().await {
            Ok(bytes) => Some(bytes.to_vec()),
            Err(e) => {
                debug!(url = url, error = %e, "Failed to read binary body");
                None
            }
        }
    }
}

/// An in-memory records API for tests. Responses are keyed by the URL plus
/// its sorted query string; every call is logged so tests can count them.
/// Pages can sit behind a redirect, in which case the body is stored under
/// the target URL.
#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeRecords {
        json: HashMap<String, Value>,
        html: HashMap<String, String>,
        redirects: HashMap<String, String>,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeRecords {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_json(mut self, url: &str, query: Query, body: Value) -> Self {
            self.json.insert(request_key(url, &query), body);
            self
        }

        pub fn with_html(mut self, url: &str, body: &str) -> Self {
            self.html.insert(url.to_string(), body.to_string());
            self
        }

        pub fn with_redirect(mut self, from: &str, to: &str) -> Self {
            self.redirects.insert(from.to_string(), to.to_string());
            self
        }

        pub fn calls_matching(&self, needle: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.contains(needle))
                .count()
        }
    }

    #[async_trait]
    impl RecordsFetch for FakeRecords {
        async fn get_json(&self, url: &str, query: &Query) -> Option<Value> {
            let k = request_key(url, query);
            self.calls.lock().unwrap().push(k.clone());
            self.json.get(&k).cloned()
        }

        async fn get_page(&self, url: &str) -> Option<Page> {
            self.calls.lock().unwrap().push(url.to_string());
            let final_url = self.redirects.get(url).cloned().unwrap_or_else(|| url.to_string());
            let body = self.html.get(&final_url).cloned()?;
            Some(Page { final_url, body })
        }

        async fn get_bytes(&self, url: &str) -> Option<Vec<u8>> {
            self.calls.lock().unwrap().push(url.to_string());
            None
        }
    }
}
