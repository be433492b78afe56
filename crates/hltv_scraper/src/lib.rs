//! HLTV.org team schedule scraper.
//!
//! Team page: `https://www.hltv.org/team/<team_id>/<slug>`
//! Match page: `https://www.hltv.org/matches/<match_id>/<team1>-vs-<team2>`
//!
//! HLTV sits behind Cloudflare, so pages come either straight from the origin
//! with browser headers or through a local bypass service (FlareSolverr API).

pub mod cache;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod session;

pub use cache::{CacheEntry, Clock, ResponseCache, SystemClock};
pub use error::FetchError;
pub use extract::{MatchExtractor, MatchRecord, Matches};
pub use fetch::{FetchGateway, FetchMode};
pub use session::SessionHandle;

pub const HLTV_BASE_URL: &str = "https://www.hltv.org";
