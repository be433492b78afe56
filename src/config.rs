use anyhow::{bail, Context, Result};
use hltv_scraper::{FetchMode, HLTV_BASE_URL};
use std::env;
use std::path::PathBuf;
use url::Url;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BYPASS_URL: &str = "http://localhost:8191";
pub const DEFAULT_LOG_DIR: &str = "logs";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub fetch_mode: FetchMode,
    pub origin_base: Url,
    /// `None` disables the JSONL audit log.
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| get(key).map(|v| v.trim().to_string());

        let port = match get("PORT").filter(|v| !v.is_empty()) {
            Some(v) => v.parse::<u16>().context("Invalid PORT")?,
            None => DEFAULT_PORT,
        };

        let bypass_env = get("FLARESOLVERR_URL").filter(|v| !v.is_empty());
        let mode_env = get("FETCH_MODE").filter(|v| !v.is_empty());
        let mode = match mode_env.as_deref() {
            Some(m) => m.to_ascii_lowercase(),
            None if bypass_env.is_some() => "proxied".to_string(),
            None => "direct".to_string(),
        };

        let fetch_mode = match mode.as_str() {
            "direct" => FetchMode::Direct,
            "proxied" | "flaresolverr" => {
                let bypass_url = bypass_env.unwrap_or_else(|| DEFAULT_BYPASS_URL.to_string());
                Url::parse(&bypass_url).context("Invalid FLARESOLVERR_URL")?;
                FetchMode::Proxied { bypass_url }
            }
            other => bail!("Invalid FETCH_MODE {other:?} (expected \"direct\" or \"proxied\")"),
        };

        let origin = get("ORIGIN_BASE_URL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| HLTV_BASE_URL.to_string());
        let origin_base = Url::parse(&origin).context("Invalid ORIGIN_BASE_URL")?;
        if origin_base.cannot_be_a_base() {
            bail!("Invalid ORIGIN_BASE_URL: {origin} cannot carry a path");
        }

        let log_dir = match get("FEED_LOG_DIR") {
            Some(v) if v.is_empty() => None,
            Some(v) => Some(PathBuf::from(v)),
            None => Some(PathBuf::from(DEFAULT_LOG_DIR)),
        };

        Ok(Self {
            port,
            fetch_mode,
            origin_base,
            log_dir,
        })
    }
}
