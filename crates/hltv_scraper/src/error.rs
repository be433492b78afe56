use thiserror::Error;

/// Every way a page fetch can fail. The Display text is what ends up in the
/// `502 {"error": ...}` body.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("origin returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("origin served an anti-bot challenge page for {url}")]
    Challenge { url: String },

    #[error("bypass service error: {0}")]
    Bypass(String),

    #[error("failed to read response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}
