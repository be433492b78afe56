//! Team page → match records.
//!
//! HLTV team match tab layout:
//!
//! ```text
//! <table class="match-table">
//!   <thead><tr><th>Event name</th></tr></thead>
//!   <tbody>
//!     <tr class="team-row">
//!       <td class="date-cell"><span data-unix="1700000000000">14/11/2023</span></td>
//!       <td class="team-center-cell">
//!         <a class="team-name team-1">Alpha</a> ... <a class="team-name team-2">Beta</a>
//!       </td>
//!       <td class="matchpage-button-cell"><a class="matchpage-button" href="/matches/12345/alpha-vs-beta">Match</a></td>
//!     </tr>
//!   </tbody>
//!   <thead>...next event...</thead>
//! </table>
//! ```
//!
//! Parsing is two steps: `lower` turns the DOM into plain typed nodes, then
//! [`Matches`] walks those nodes. The walk never touches the HTML parser.

use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

static TABLE: LazyLock<Selector> = LazyLock::new(|| sel("table.match-table"));
static HEADER_CELL: LazyLock<Selector> = LazyLock::new(|| sel("th, td"));
static ROW: LazyLock<Selector> = LazyLock::new(|| sel("tr"));
static UNIX: LazyLock<Selector> = LazyLock::new(|| sel("[data-unix]"));
static TEAM_1: LazyLock<Selector> = LazyLock::new(|| sel(".team-name.team-1"));
static TEAM_2: LazyLock<Selector> = LazyLock::new(|| sel(".team-name.team-2"));
static MATCH_BUTTON: LazyLock<Selector> = LazyLock::new(|| sel("a.matchpage-button"));
static MATCH_LINK: LazyLock<Selector> = LazyLock::new(|| sel(r#"a[href*="/matches/"]"#));

static MATCH_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/matches/(\d+)(?:/|$)").expect("match id pattern"));

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

/// One match as found on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    pub team_a: String,
    pub team_b: String,
    pub event_name: String,
    pub start_time: DateTime<Utc>,
    pub detail_url: Option<Url>,
    pub match_id: Option<u64>,
}

impl MatchRecord {
    /// `"A vs B"`, or whichever side is known.
    pub fn teams(&self) -> String {
        match (self.team_a.is_empty(), self.team_b.is_empty()) {
            (false, false) => format!("{} vs {}", self.team_a, self.team_b),
            (false, true) => self.team_a.clone(),
            (true, false) => self.team_b.clone(),
            (true, true) => String::new(),
        }
    }

    /// `"A vs B — Event"` with missing parts left out.
    pub fn summary(&self) -> String {
        let teams = self.teams();
        match (teams.is_empty(), self.event_name.is_empty()) {
            (false, false) => format!("{} — {}", teams, self.event_name),
            (false, true) => teams,
            (true, false) => self.event_name.clone(),
            (true, true) => "Match".to_string(),
        }
    }

    pub fn description(&self) -> String {
        let mut lines = Vec::with_capacity(3);
        if !self.event_name.is_empty() {
            lines.push(format!("Event: {}", self.event_name));
        }
        let teams = self.teams();
        if !teams.is_empty() {
            lines.push(format!("Teams: {teams}"));
        }
        if let Some(url) = &self.detail_url {
            lines.push(format!("Match page: {url}"));
        }
        lines.join("\n")
    }
}

/// A `match-table`, as an ordered list of header and body groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchTable {
    pub groups: Vec<Group>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Group {
    /// Sets the event name for the body rows that follow.
    Header { event_name: String },
    Body { rows: Vec<RowNode> },
}

/// Raw fields of one body row; nothing parsed yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowNode {
    pub unix_ms: Option<String>,
    pub team_a: String,
    pub team_b: String,
    pub href: Option<String>,
}

pub struct MatchExtractor {
    base: Url,
}

impl MatchExtractor {
    /// `base` resolves relative match links, e.g. `https://www.hltv.org`.
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    pub fn extract(&self, html: &str) -> Matches {
        Matches::new(lower(html), self.base.clone())
    }
}

/// Parses `html` and lowers every match table into typed nodes.
pub fn lower(html: &str) -> Vec<MatchTable> {
    let document = Html::parse_document(html);
    document.select(&TABLE).map(lower_table).collect()
}

fn lower_table(table: ElementRef<'_>) -> MatchTable {
    let mut groups = Vec::new();
    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "thead" => groups.push(Group::Header {
                event_name: child
                    .select(&HEADER_CELL)
                    .next()
                    .map(collapsed_text)
                    .unwrap_or_default(),
            }),
            "tbody" => groups.push(Group::Body {
                rows: child.select(&ROW).map(lower_row).collect(),
            }),
            _ => {}
        }
    }
    MatchTable { groups }
}

fn lower_row(row: ElementRef<'_>) -> RowNode {
    let unix_ms = row
        .value()
        .attr("data-unix")
        .or_else(|| row.select(&UNIX).find_map(|e| e.value().attr("data-unix")))
        .map(str::to_string);

    let href = row
        .select(&MATCH_BUTTON)
        .chain(row.select(&MATCH_LINK))
        .find_map(|a| a.value().attr("href"))
        .map(str::to_string);

    RowNode {
        unix_ms,
        team_a: row.select(&TEAM_1).next().map(collapsed_text).unwrap_or_default(),
        team_b: row.select(&TEAM_2).next().map(collapsed_text).unwrap_or_default(),
        href,
    }
}

fn collapsed_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lazy walk over lowered tables. The event name carries across rows and
/// body groups until the next header, and resets at each new table.
pub struct Matches {
    tables: std::vec::IntoIter<MatchTable>,
    groups: std::vec::IntoIter<Group>,
    rows: std::vec::IntoIter<RowNode>,
    event_name: String,
    base: Url,
}

impl Matches {
    pub fn new(tables: Vec<MatchTable>, base: Url) -> Self {
        Self {
            tables: tables.into_iter(),
            groups: Vec::new().into_iter(),
            rows: Vec::new().into_iter(),
            event_name: String::new(),
            base,
        }
    }

    fn record(&self, row: RowNode) -> Option<MatchRecord> {
        let Some(start_time) = row.unix_ms.as_deref().and_then(parse_unix_ms) else {
            debug!("dropping row without start time: {:?}", row);
            return None;
        };

        let detail_url = row
            .href
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .and_then(|h| self.base.join(h).ok());
        let match_id = detail_url.as_ref().and_then(match_id_from_url);

        Some(MatchRecord {
            team_a: row.team_a,
            team_b: row.team_b,
            event_name: self.event_name.clone(),
            start_time,
            detail_url,
            match_id,
        })
    }
}

impl Iterator for Matches {
    type Item = MatchRecord;

    fn next(&mut self) -> Option<MatchRecord> {
        loop {
            if let Some(row) = self.rows.next() {
                match self.record(row) {
                    Some(record) => return Some(record),
                    None => continue,
                }
            }

            if let Some(group) = self.groups.next() {
                match group {
                    Group::Header { event_name } => self.event_name = event_name,
                    Group::Body { rows } => self.rows = rows.into_iter(),
                }
                continue;
            }

            let table = self.tables.next()?;
            self.groups = table.groups.into_iter();
            self.event_name.clear();
        }
    }
}

/// Epoch milliseconds (integer, or a float some pages emit) → instant.
pub fn parse_unix_ms(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let millis = match raw.parse::<i64>() {
        Ok(ms) => ms,
        Err(_) => {
            let f = raw.parse::<f64>().ok().filter(|f| f.is_finite())?;
            f.trunc() as i64
        }
    };
    DateTime::from_timestamp_millis(millis)
}

/// `12345` from `https://www.hltv.org/matches/12345/alpha-vs-beta`.
pub fn match_id_from_url(url: &Url) -> Option<u64> {
    MATCH_ID
        .captures(url.path())
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
