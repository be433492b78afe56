//! ICS writer — minimal RFC 5545 output for published match feeds.
//!
//! Only what a subscribed read-only calendar needs: a VCALENDAR wrapper,
//! VEVENTs with a display VALARM, UTC timestamps, text escaping and
//! 75-character line folding. Every line ends with CRLF.

use chrono::{DateTime, Utc};

pub const PRODID: &str = "-//hltv-ics//Team Matches//EN";
pub const LINE_END: &str = "\r\n";
pub const FOLD_WIDTH: usize = 75;
pub const ALARM_MINUTES_BEFORE: u32 = 15;

const ALARM_FALLBACK_TEXT: &str = "Match starting soon";

/// One VEVENT worth of data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    pub uid: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
}

/// `20231114T221320Z`
pub fn format_utc(ts: &DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Escapes a TEXT value. CR is dropped, never escaped.
pub fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            ',' => out.push_str("\\,"),
            ';' => out.push_str("\\;"),
            '\r' => {}
            other => out.push(other),
        }
    }
    out
}

/// Inverse of [`escape_text`] (modulo the stripped CRs).
pub fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Folds one content line into `FOLD_WIDTH`-char chunks, continuation chunks
/// prefixed by a single space.
pub fn fold_line(line: &str) -> String {
    if line.chars().count() <= FOLD_WIDTH {
        return line.to_string();
    }

    let chars: Vec<char> = line.chars().collect();
    chars
        .chunks(FOLD_WIDTH)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("\r\n ")
}

/// Removes folding continuations (`CRLF` followed by one space or tab).
pub fn unfold(text: &str) -> String {
    text.replace("\r\n ", "").replace("\r\n\t", "")
}

/// Renders a complete VCALENDAR document. `dtstamp` is shared by every event.
pub fn encode(events: &[CalendarEvent], calendar_name: &str, dtstamp: DateTime<Utc>) -> String {
    let mut doc = Document::default();
    let name = escape_text(calendar_name);
    let stamp = format_utc(&dtstamp);

    doc.line("BEGIN:VCALENDAR");
    doc.line("VERSION:2.0");
    doc.line(&format!("PRODID:{PRODID}"));
    doc.line("CALSCALE:GREGORIAN");
    doc.line("METHOD:PUBLISH");
    doc.line(&format!("NAME:{name}"));
    doc.line(&format!("X-WR-CALNAME:{name}"));

    for event in events {
        write_event(&mut doc, event, &stamp);
    }

    doc.line("END:VCALENDAR");
    doc.finish()
}

fn write_event(doc: &mut Document, event: &CalendarEvent, stamp: &str) {
    doc.line("BEGIN:VEVENT");
    doc.line(&format!("UID:{}", escape_text(&event.uid)));
    doc.line(&format!("DTSTAMP:{stamp}"));
    doc.line(&format!("DTSTART:{}", format_utc(&event.start)));
    if let Some(end) = &event.end {
        doc.line(&format!("DTEND:{}", format_utc(end)));
    }
    if let Some(summary) = &event.summary {
        doc.line(&format!("SUMMARY:{}", escape_text(summary)));
    }
    if let Some(description) = &event.description {
        doc.line(&format!("DESCRIPTION:{}", escape_text(description)));
    }
    // URL is a URI value, not TEXT.
    if let Some(url) = &event.url {
        doc.line(&format!("URL:{url}"));
    }

    let alarm_text = event
        .summary
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or(ALARM_FALLBACK_TEXT);
    doc.line("BEGIN:VALARM");
    doc.line("ACTION:DISPLAY");
    doc.line(&format!("DESCRIPTION:{}", escape_text(alarm_text)));
    doc.line(&format!("TRIGGER:-PT{ALARM_MINUTES_BEFORE}M"));
    doc.line("END:VALARM");
    doc.line("END:VEVENT");
}

#[derive(Default)]
struct Document {
    buf: String,
}

impl Document {
    fn line(&mut self, content: &str) {
        self.buf.push_str(&fold_line(content));
        self.buf.push_str(LINE_END);
    }

    fn finish(self) -> String {
        self.buf
    }
}
