use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Parse an ISO8601 date string, as returned in `publishedAt`.
pub fn parse_iso8601_to_datetime(date_str: &str) -> Option<DateTime<Utc>> {
    if date_str.is_empty() {
        return None;
    }
    date_str.parse::<DateTime<Utc>>().ok()
}

/// Parse an ISO8601 duration (P1DT2H3M4S / PT1H2M3S) to whole minutes.
///
/// The total is rounded to the nearest minute; exactly 30 leftover seconds
/// round down, so "PT1H5M30S" is 65 and "PT45S" is 1. Malformed input is 0.
pub fn parse_iso8601_duration_to_minutes(duration_str: &str) -> i64 {
    let Some(body) = duration_str.strip_prefix('P') else {
        return 0;
    };

    let mut total_seconds = 0.0;
    let mut current_number = String::new();
    let mut in_time_part = false;

    for ch in body.chars() {
        if ch.is_ascii_digit() || ch == '.' {
            current_number.push(ch);
            continue;
        }
        if ch == 'T' {
            in_time_part = true;
            current_number.clear();
            continue;
        }
        if let Ok(num) = current_number.parse::<f64>() {
            match (ch, in_time_part) {
                ('D', false) => total_seconds += num * 86400.0,
                ('W', false) => total_seconds += num * 7.0 * 86400.0,
                ('H', true) => total_seconds += num * 3600.0,
                ('M', true) => total_seconds += num * 60.0,
                ('S', true) => total_seconds += num,
                _ => {}
            }
        }
        current_number.clear();
    }

    let whole_minutes = (total_seconds / 60.0).floor();
    let leftover = total_seconds - whole_minutes * 60.0;
    if leftover > 30.0 {
        whole_minutes as i64 + 1
    } else {
        whole_minutes as i64
    }
}

fn channel_id_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^UC[a-zA-Z0-9_-]{22}$").ok())
        .as_ref()
}

pub fn is_channel_id(candidate: &str) -> bool {
    channel_id_pattern().is_some_and(|re| re.is_match(candidate))
}

/// Accepts a bare channel id or a https://www.youtube.com/channel/<id> URL.
pub fn extract_youtube_channel_id(input: &str) -> Option<String> {
    let input = input.trim();
    if is_channel_id(input) {
        return Some(input.to_string());
    }

    let parsed_url = Url::parse(input).ok()?;
    match parsed_url.host_str()? {
        "www.youtube.com" | "youtube.com" | "m.youtube.com" => {
            let mut segments = parsed_url.path_segments()?;
            if segments.next()? != "channel" {
                return None;
            }
            let id = segments.next()?;
            is_channel_id(id).then(|| id.to_string())
        }
        _ => None,
    }
}

/// Monday of the ISO week containing `date`.
pub fn start_of_week(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}
