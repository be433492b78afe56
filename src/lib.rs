//! hltv-ics — HLTV team schedule as a subscribable iCalendar feed.
//!
//! Pipeline per request: team page URL → cache-checked fetch (direct or via
//! the bypass service) → match extraction → time window + sort → ICS text.

pub mod config;
pub mod feed;
pub mod routes;

pub use config::Config;
pub use feed::{Feed, FeedAssembler, FeedError, FeedRequest};
pub use routes::{router, AppState};
