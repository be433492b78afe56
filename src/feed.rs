//! Feed assembly: team page URL → fetch → extract → window/sort → ICS.

use chrono::{DateTime, Duration, Utc};
use hltv_scraper::{FetchError, FetchGateway, MatchExtractor, MatchRecord};
use ics_writer::CalendarEvent;
use std::num::IntErrorKind;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use url::Url;

pub const DEFAULT_DURATION_MINUTES: i64 = 120;
pub const MIN_DURATION_MINUTES: i64 = 1;
pub const MAX_DURATION_MINUTES: i64 = 1440;
/// Events that ended up to this long ago are still listed.
pub const PAST_GRACE_MINUTES: i64 = 5;
/// Path segment used when the request carries no team slug.
pub const DEFAULT_SLUG: &str = "team";
pub const FALLBACK_CALENDAR_NAME: &str = "HLTV Matches";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("invalid team url: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Clone, Default)]
pub struct FeedRequest {
    pub team_id: String,
    pub slug: Option<String>,
    /// Raw `duration` query value, minutes.
    pub duration: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Feed {
    pub source_url: Url,
    pub calendar_name: String,
    pub duration_minutes: i64,
    pub event_count: usize,
    pub ics: String,
}

pub struct FeedAssembler {
    gateway: Arc<FetchGateway>,
    extractor: MatchExtractor,
    origin: Url,
}

impl FeedAssembler {
    pub fn new(gateway: Arc<FetchGateway>, origin: Url) -> Self {
        Self {
            gateway,
            extractor: MatchExtractor::new(origin.clone()),
            origin,
        }
    }

    pub fn gateway(&self) -> &FetchGateway {
        &self.gateway
    }

    pub async fn build(&self, req: &FeedRequest) -> Result<Feed, FeedError> {
        self.build_at(req, Utc::now()).await
    }

    /// Same as [`build`](Self::build) with an explicit "now", which drives
    /// both the past-event cutoff and DTSTAMP.
    pub async fn build_at(&self, req: &FeedRequest, now: DateTime<Utc>) -> Result<Feed, FeedError> {
        let duration_minutes = effective_duration(req.duration.as_deref());
        let source_url = team_url(&self.origin, &req.team_id, req.slug.as_deref())?;

        let html = self.gateway.fetch(source_url.as_str()).await?;
        let records = self.extractor.extract(&html);
        let events = assemble_events(records, duration_minutes, now);
        debug!("{} events for {}", events.len(), source_url);

        let calendar_name = calendar_name(&source_url);
        let ics = ics_writer::encode(&events, &calendar_name, now);

        Ok(Feed {
            source_url,
            calendar_name,
            duration_minutes,
            event_count: events.len(),
            ics,
        })
    }
}

/// Minutes per event: integer query value clamped to `[1, 1440]`, 120 when
/// absent or not a number. Integers too large for `i64` saturate.
pub fn effective_duration(raw: Option<&str>) -> i64 {
    raw.and_then(|s| parse_minutes(s.trim()))
        .unwrap_or(DEFAULT_DURATION_MINUTES)
        .clamp(MIN_DURATION_MINUTES, MAX_DURATION_MINUTES)
}

fn parse_minutes(raw: &str) -> Option<i64> {
    match raw.parse::<i64>() {
        Ok(v) => Some(v),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => Some(i64::MAX),
            IntErrorKind::NegOverflow => Some(i64::MIN),
            _ => None,
        },
    }
}

/// `{origin}/team/{id}/{slug}`
pub fn team_url(origin: &Url, team_id: &str, slug: Option<&str>) -> Result<Url, FeedError> {
    if team_id.is_empty() || !team_id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FeedError::InvalidUrl(format!("team id {team_id:?} is not numeric")));
    }
    let slug = slug.map(str::trim).filter(|s| !s.is_empty()).unwrap_or(DEFAULT_SLUG);

    let mut url = origin.clone();
    url.path_segments_mut()
        .map_err(|_| FeedError::InvalidUrl(format!("origin {origin} cannot carry a path")))?
        .pop_if_empty()
        .extend(["team", team_id, slug]);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// `HLTV · <slug>` from `/team/<id>/<slug>`; generic label otherwise.
pub fn calendar_name(team_url: &Url) -> String {
    let segments: Vec<&str> = match team_url.path_segments() {
        Some(segments) => segments.collect(),
        None => return FALLBACK_CALENDAR_NAME.to_string(),
    };

    let slug = segments
        .windows(3)
        .rev()
        .find(|w| w[0] == "team" && !w[1].is_empty())
        .map(|w| w[2])
        .filter(|s| !s.is_empty() && *s != DEFAULT_SLUG);

    match slug {
        Some(slug) => format!("HLTV · {slug}"),
        None => FALLBACK_CALENDAR_NAME.to_string(),
    }
}

/// `None` when the end instant falls outside chrono's representable range.
pub fn to_event(record: &MatchRecord, duration_minutes: i64) -> Option<CalendarEvent> {
    let end = record
        .start_time
        .checked_add_signed(Duration::minutes(duration_minutes.max(MIN_DURATION_MINUTES)))?;
    let uid = match record.match_id {
        Some(id) => format!("match-{id}"),
        None => format!("match-{}", record.start_time.timestamp_millis()),
    };
    let description = record.description();

    Some(CalendarEvent {
        uid,
        start: record.start_time,
        end: Some(end),
        summary: Some(record.summary()),
        description: (!description.is_empty()).then_some(description),
        url: record.detail_url.as_ref().map(|u| u.to_string()),
    })
}

/// Drops events that ended more than the grace window before `now` (and
/// records whose end cannot be represented), then sorts by start. The sort is stable, so equal starts keep page order.
pub fn assemble_events(
    records: impl IntoIterator<Item = MatchRecord>,
    duration_minutes: i64,
    now: DateTime<Utc>,
) -> Vec<CalendarEvent> {
    let cutoff = now - Duration::minutes(PAST_GRACE_MINUTES);
    let mut events: Vec<CalendarEvent> = records
        .into_iter()
        .filter_map(|r| to_event(&r, duration_minutes))
        .filter(|e| e.end.is_some_and(|end| end >= cutoff))
        .collect();
    events.sort_by_key(|e| e.start);
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn origin() -> Url {
        Url::parse(hltv_scraper::HLTV_BASE_URL).unwrap()
    }

    fn at_ms(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).single().unwrap()
    }

    fn record(start_ms: i64, a: &str, b: &str, match_id: Option<u64>) -> MatchRecord {
        MatchRecord {
            team_a: a.into(),
            team_b: b.into(),
            event_name: String::new(),
            start_time: at_ms(start_ms),
            detail_url: match_id.map(|id| origin().join(&format!("/matches/{id}/x")).unwrap()),
            match_id,
        }
    }

    #[test]
    fn duration_defaults_and_clamps() {
        assert_eq!(effective_duration(None), 120);
        assert_eq!(effective_duration(Some("")), 120);
        assert_eq!(effective_duration(Some("abc")), 120);
        assert_eq!(effective_duration(Some("90")), 90);
        assert_eq!(effective_duration(Some(" 45 ")), 45);
        assert_eq!(effective_duration(Some("0")), 1);
        assert_eq!(effective_duration(Some("-30")), 1);
        assert_eq!(effective_duration(Some("1440")), 1440);
        assert_eq!(effective_duration(Some("99999")), 1440);
    }

    #[test]
    fn duration_clamp_matches_formula() {
        for v in [-100_000, -1, 0, 1, 2, 119, 120, 121, 1439, 1440, 1441, 1_000_000] {
            let expected = v.clamp(1, 1440);
            assert_eq!(effective_duration(Some(&v.to_string())), expected);
        }
        // beyond i64
        assert_eq!(effective_duration(Some("99999999999999999999")), 1440);
        assert_eq!(effective_duration(Some("-99999999999999999999")), 1);
        assert_eq!(effective_duration(Some("9".repeat(60).as_str())), 1440);
        assert_eq!(effective_duration(Some("12abc")), 120);
    }

    #[test]
    fn builds_canonical_team_url() {
        let url = team_url(&origin(), "4608", Some("natus-vincere")).unwrap();
        assert_eq!(url.as_str(), "https://www.hltv.org/team/4608/natus-vincere");

        let url = team_url(&origin(), "4608", None).unwrap();
        assert_eq!(url.as_str(), "https://www.hltv.org/team/4608/team");

        let url = team_url(&origin(), "1", Some("  ")).unwrap();
        assert_eq!(url.as_str(), "https://www.hltv.org/team/1/team");

        let url = team_url(&origin(), "1", Some("a b/c")).unwrap();
        assert_eq!(url.as_str(), "https://www.hltv.org/team/1/a%20b%2Fc");
    }

    #[test]
    fn rejects_bad_team_ids() {
        for id in ["", "abc", "12a", "../1"] {
            assert!(matches!(team_url(&origin(), id, None), Err(FeedError::InvalidUrl(_))), "{id}");
        }
        let no_base = Url::parse("mailto:someone@example.org").unwrap();
        assert!(matches!(team_url(&no_base, "1", None), Err(FeedError::InvalidUrl(_))));
    }

    #[test]
    fn keeps_origin_path_prefix() {
        let base = Url::parse("http://127.0.0.1:8080/mirror/").unwrap();
        let url = team_url(&base, "7", Some("x")).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/mirror/team/7/x");
    }

    #[test]
    fn calendar_name_from_slug() {
        let url = team_url(&origin(), "4608", Some("natus-vincere")).unwrap();
        assert_eq!(calendar_name(&url), "HLTV · natus-vincere");

        let url = team_url(&origin(), "4608", None).unwrap();
        assert_eq!(calendar_name(&url), FALLBACK_CALENDAR_NAME);

        let url = Url::parse("https://www.hltv.org/results").unwrap();
        assert_eq!(calendar_name(&url), FALLBACK_CALENDAR_NAME);

        let url = Url::parse("mailto:x@y.z").unwrap();
        assert_eq!(calendar_name(&url), FALLBACK_CALENDAR_NAME);
    }

    #[test]
    fn uid_depends_only_on_match_id() {
        let a = to_event(&record(1_000_000, "A", "B", Some(12345)), 120).unwrap();
        let b = to_event(&record(9_000_000, "C", "D", Some(12345)), 60).unwrap();
        assert_eq!(a.uid, "match-12345");
        assert_eq!(a.uid, b.uid);
    }

    #[test]
    fn uid_falls_back_to_start_millis() {
        let event = to_event(&record(1_700_000_000_123, "A", "B", None), 120).unwrap();
        assert_eq!(event.uid, "match-1700000000123");
        assert_eq!(event.url, None);
    }

    #[test]
    fn end_is_start_plus_duration() {
        let event = to_event(&record(0, "A", "B", None), 90).unwrap();
        assert_eq!(event.end.unwrap() - event.start, Duration::minutes(90));
        let event = to_event(&record(0, "A", "B", None), 0).unwrap();
        assert!(event.end.unwrap() > event.start);
    }

    #[test]
    fn unrepresentable_end_drops_the_record() {
        let last = DateTime::<Utc>::MAX_UTC.timestamp_millis();
        assert!(to_event(&record(last, "A", "B", None), 120).is_none());

        let html = r#"<table class="match-table"><tbody>
            <tr><td><span data-unix="8210266876799999">far</span></td>
                <td><a class="team-name team-1">Far</a><a class="team-name team-2">Future</a></td></tr>
            <tr><td><span data-unix="1700000000000">soon</span></td>
                <td><a class="team-name team-1">Alpha</a><a class="team-name team-2">Beta</a></td></tr>
            </tbody></table>"#;
        let records = MatchExtractor::new(origin()).extract(html);
        let events = assemble_events(records, 120, at_ms(1_700_000_000_000));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].summary.as_deref(), Some("Alpha vs Beta"));
    }

    #[test]
    fn drop_rule_uses_grace_window() {
        let now = at_ms(10_000_000_000);
        let minute = 60_000;
        let duration = 120;
        // end = start + 120min; keep iff end >= now - 5min
        let boundary_start = now.timestamp_millis() - (duration + PAST_GRACE_MINUTES) * minute;
        let records = vec![
            record(boundary_start - 1, "gone", "", None),
            record(boundary_start, "edge", "", None),
            record(boundary_start + minute, "recent", "", None),
            record(now.timestamp_millis() + minute, "future", "", None),
        ];
        let kept: Vec<_> = assemble_events(records, duration, now)
            .into_iter()
            .filter_map(|e| e.summary)
            .collect();
        assert_eq!(kept, ["edge", "recent", "future"]);
    }

    #[test]
    fn sorts_by_start_keeping_ties_in_page_order() {
        let now = at_ms(0);
        let records = vec![
            record(3_000_000, "third", "", None),
            record(1_000_000, "first-a", "", None),
            record(2_000_000, "second", "", None),
            record(1_000_000, "first-b", "", None),
        ];
        let order: Vec<_> = assemble_events(records, 120, now)
            .into_iter()
            .filter_map(|e| e.summary)
            .collect();
        assert_eq!(order, ["first-a", "first-b", "second", "third"]);
    }

    #[test]
    fn major_final_scenario() {
        let html = r#"<table class="match-table">
            <thead><tr><th>Major Final</th></tr></thead>
            <tbody><tr class="team-row">
              <td class="date-cell"><span data-unix="1700000000000">14/11/2023</span></td>
              <td><a class="team-name team-1">Alpha</a><a class="team-name team-2">Beta</a></td>
              <td><a class="matchpage-button" href="/matches/12345/alpha-vs-beta">Match</a></td>
            </tr></tbody></table>"#;
        let records = MatchExtractor::new(origin()).extract(html);
        let now = at_ms(1_700_000_000_000 - 60_000);
        let events = assemble_events(records, effective_duration(None), now);

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.uid, "match-12345");
        assert_eq!(event.summary.as_deref(), Some("Alpha vs Beta — Major Final"));
        assert_eq!(event.start, at_ms(1_700_000_000_000));
        assert_eq!(event.end, Some(event.start + Duration::minutes(120)));
        assert_eq!(
            event.url.as_deref(),
            Some("https://www.hltv.org/matches/12345/alpha-vs-beta")
        );
        assert_eq!(
            event.description.as_deref(),
            Some("Event: Major Final\nTeams: Alpha vs Beta\nMatch page: https://www.hltv.org/matches/12345/alpha-vs-beta")
        );
    }
}
