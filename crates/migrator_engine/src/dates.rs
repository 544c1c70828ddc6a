//! Publication date discovery.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use regex::{Captures, Regex};
use scraper::Html;

use crate::selector::builtin;

/// Export timestamp layout.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Checked in order; within one selector, in document order.
const DATE_SELECTORS: &[&str] = &[
    "time[datetime]",
    r#"meta[property="article:published_time"]"#,
    r#"meta[name="date"]"#,
    r#"[itemprop="datePublished"]"#,
    ".entry-date",
    ".post-date",
    ".published",
    ".date",
];

const MONTH: &str = r"(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)";

static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})(?:[T ](\d{2}):(\d{2})(?::(\d{2}))?)?")
        .expect("valid regex")
});

static MONTH_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b{MONTH}\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?,?\s+(\d{{4}})\b"
    ))
    .expect("valid regex")
});

static DAY_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+{MONTH}\.?,?\s+(\d{{4}})\b"
    ))
    .expect("valid regex")
});

static US_NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("valid regex"));

/// Parse the first recognizable date in `text`.
///
/// Accepts RFC 3339, ISO `YYYY-MM-DD` with optional time, `March 8, 2023`,
/// `Mar 8 2023`, `8 March 2023` and `M/D/YYYY`. Offsets are dropped; the
/// wall-clock time of the source is kept.
pub fn parse_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    if let Some(caps) = ISO_DATE.captures(text) {
        if let Some(dt) = iso_from_captures(&caps) {
            return Some(dt);
        }
    }
    if let Some(caps) = MONTH_FIRST.captures(text) {
        let date = ymd(&caps[3], month_number(&caps[1])?, &caps[2])?;
        return Some(date.and_time(NaiveTime::MIN));
    }
    if let Some(caps) = DAY_FIRST.captures(text) {
        let date = ymd(&caps[3], month_number(&caps[2])?, &caps[1])?;
        return Some(date.and_time(NaiveTime::MIN));
    }
    if let Some(caps) = US_NUMERIC.captures(text) {
        let month: u32 = caps[1].parse().ok()?;
        let date = ymd(&caps[3], month, &caps[2])?;
        return Some(date.and_time(NaiveTime::MIN));
    }
    None
}

fn iso_from_captures(caps: &Captures) -> Option<NaiveDateTime> {
    let month: u32 = caps[2].parse().ok()?;
    let date = ymd(&caps[1], month, &caps[3])?;
    let part = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    let time = match (part(4), part(5)) {
        (Some(h), Some(m)) => NaiveTime::from_hms_opt(h, m, part(6).unwrap_or(0))?,
        _ => NaiveTime::MIN,
    };
    Some(date.and_time(time))
}

fn ymd(year: &str, month: u32, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month, day.parse().ok()?)
}

fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.chars().take(3).collect::<String>().to_ascii_lowercase();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// Publication date of a page, from the first date-bearing element that
/// parses. `datetime`/`content` attributes win over element text.
pub fn extract_published_date(document: &Html) -> Option<NaiveDateTime> {
    for spec in DATE_SELECTORS {
        let Some(selector) = builtin(spec) else {
            continue;
        };
        for element in document.select(&selector) {
            let attr = element
                .value()
                .attr("datetime")
                .or_else(|| element.value().attr("content"));
            if let Some(date) = attr.and_then(parse_date) {
                return Some(date);
            }
            let text = element.text().collect::<Vec<_>>().join(" ");
            if let Some(date) = parse_date(&text) {
                return Some(date);
            }
        }
    }
    None
}
