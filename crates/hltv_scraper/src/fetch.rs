//! Fetch gateway: cache-checked page retrieval, either straight from the
//! origin with browser-like headers or through the bypass service.

use crate::cache::ResponseCache;
use crate::error::FetchError;
use crate::session::{BypassCommand, BypassResponse, SessionHandle};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DIRECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const BYPASS_TIMEOUT: Duration = Duration::from_secs(60);

const USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchMode {
    /// Plain GET against the origin.
    Direct,
    /// Route every fetch through the bypass service at `bypass_url`.
    Proxied { bypass_url: String },
}

impl FetchMode {
    pub fn name(&self) -> &'static str {
        match self {
            FetchMode::Direct => "direct",
            FetchMode::Proxied { .. } => "proxied",
        }
    }
}

pub struct FetchGateway {
    mode: FetchMode,
    client: reqwest::Client,
    bypass_client: reqwest::Client,
    cache: Arc<ResponseCache>,
    session: Arc<SessionHandle>,
    ua_index: AtomicUsize,
}

impl FetchGateway {
    pub fn new(
        mode: FetchMode,
        cache: Arc<ResponseCache>,
        session: Arc<SessionHandle>,
    ) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(DIRECT_TIMEOUT)
            .gzip(true)
            .build()
            .map_err(FetchError::Client)?;

        let bypass_client = reqwest::Client::builder()
            .timeout(BYPASS_TIMEOUT)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            mode,
            client,
            bypass_client,
            cache,
            session,
            ua_index: AtomicUsize::new(0),
        })
    }

    pub fn mode(&self) -> &FetchMode {
        &self.mode
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Raw HTML for `url`. Successful bodies are cached under `url`; failures
    /// never are.
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        if let Some(body) = self.cache.get(url) {
            debug!("cache hit {}", url);
            return Ok(body);
        }

        let body = match &self.mode {
            FetchMode::Direct => self.fetch_direct(url).await?,
            FetchMode::Proxied { bypass_url } => self.fetch_proxied(bypass_url, url).await?,
        };

        info!("fetched {} ({} bytes, {})", url, body.len(), self.mode.name());
        self.cache.put(url, body.clone());
        Ok(body)
    }

    /// Opens a bypass session. Proxied mode only; on failure fetches simply
    /// go out without a session. Keeps an already live session.
    pub async fn start(&self) {
        let FetchMode::Proxied { bypass_url } = &self.mode else {
            return;
        };
        if let Some(id) = self.session.current().await {
            debug!("bypass session {} already live", id);
            return;
        }

        match self.call_bypass(bypass_url, &BypassCommand::create_session()).await {
            Ok(BypassResponse { session: Some(id), .. }) => {
                info!("bypass session created: {}", id);
                self.session.set(id).await;
            }
            Ok(_) => warn!("bypass service returned no session id, continuing without one"),
            Err(e) => warn!("bypass session setup failed, continuing without one: {}", e),
        }
    }

    /// Destroys the live bypass session, if any. Errors are only logged.
    pub async fn stop(&self) {
        let Some(id) = self.session.take().await else {
            return;
        };
        let FetchMode::Proxied { bypass_url } = &self.mode else {
            return;
        };

        match self.call_bypass(bypass_url, &BypassCommand::destroy_session(&id)).await {
            Ok(_) => info!("bypass session destroyed: {}", id),
            Err(e) => warn!("bypass session teardown failed for {}: {}", id, e),
        }
    }

    async fn fetch_direct(&self, url: &str) -> Result<String, FetchError> {
        let resp = self
            .client
            .get(url)
            .header(USER_AGENT, self.next_user_agent())
            .send()
            .await
            .map_err(|source| FetchError::Transport { url: url.to_string(), source })?;

        let status = resp.status();
        if !status.is_success() {
            warn!("origin HTTP {} for {}", status, url);
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = resp
            .text()
            .await
            .map_err(|source| FetchError::Body { url: url.to_string(), source })?;

        if looks_like_challenge_page(&body) {
            return Err(FetchError::Challenge { url: url.to_string() });
        }
        Ok(body)
    }

    async fn fetch_proxied(&self, bypass_url: &str, url: &str) -> Result<String, FetchError> {
        let session = self.session.current().await;
        let max_timeout_ms = BYPASS_TIMEOUT.as_millis() as u64;
        let cmd = BypassCommand::get(url, session.as_deref(), max_timeout_ms);

        let resp = self.call_bypass(bypass_url, &cmd).await?;
        let solution = resp
            .solution
            .ok_or_else(|| FetchError::Bypass(format!("no page content returned for {url}")))?;

        // The service reports "ok" whenever it reached the origin, whatever
        // the origin answered.
        if let Some(status) = solution.status.filter(|s| !(200..300).contains(s)) {
            warn!("origin HTTP {} for {} (via bypass)", status, url);
            return Err(FetchError::Status { url: url.to_string(), status });
        }

        solution
            .response
            .ok_or_else(|| FetchError::Bypass(format!("no page content returned for {url}")))
    }

    /// One control-API round trip. A non-"ok" envelope becomes
    /// `FetchError::Bypass` with the service's message.
    async fn call_bypass(
        &self,
        bypass_url: &str,
        cmd: &BypassCommand<'_>,
    ) -> Result<BypassResponse, FetchError> {
        let endpoint = format!("{}/v1", bypass_url.trim_end_matches('/'));
        let resp = self
            .bypass_client
            .post(&endpoint)
            .json(cmd)
            .send()
            .await
            .map_err(|source| FetchError::Transport { url: endpoint.clone(), source })?;

        // The service answers errors with HTTP 500 and a JSON envelope, so
        // read the body before looking at the status.
        let http_status = resp.status();
        let raw = resp
            .text()
            .await
            .map_err(|source| FetchError::Body { url: endpoint.clone(), source })?;

        let envelope: BypassResponse = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(e) if http_status.is_success() => {
                return Err(FetchError::Bypass(format!("{} returned malformed JSON: {}", cmd.cmd, e)));
            }
            Err(_) => {
                return Err(FetchError::Bypass(format!("{} returned HTTP {}", cmd.cmd, http_status)));
            }
        };

        if !envelope.is_ok() {
            let message = if envelope.message.is_empty() {
                format!("{} failed with status {:?}", cmd.cmd, envelope.status)
            } else {
                envelope.message
            };
            return Err(FetchError::Bypass(message));
        }
        Ok(envelope)
    }

    fn next_user_agent(&self) -> &'static str {
        let i = self.ua_index.fetch_add(1, Ordering::Relaxed);
        USER_AGENTS[i % USER_AGENTS.len()]
    }
}

/// Cloudflare-style interstitial served with a 200.
pub fn looks_like_challenge_page(html: &str) -> bool {
    let head = &html[..floor_char_boundary(html, 4096)];
    head.to_ascii_lowercase().contains("<title>just a moment")
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut i = max;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
