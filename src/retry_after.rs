//! `Retry-After` header interpretation.
//!
//! The header carries either a number of seconds or an HTTP date. Anything
//! that does not yield a non-negative delay is reported as `None` so the
//! caller can fall back to its configured delay.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};

/// IMF-fixdate, RFC 850 and asctime layouts with the weekday removed, in
/// order of preference.
const HTTP_DATE_FORMATS: [&str; 3] = [
    "%d %b %Y %H:%M:%S GMT",
    "%d-%b-%y %H:%M:%S GMT",
    "%b %e %H:%M:%S %Y",
];

const WEEKDAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// Delay requested by the `Retry-After` header in `headers`, relative to `now`.
pub fn retry_after_delay(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }

    if let Some((negative, digits)) = split_decimal(raw) {
        let seconds: u64 = digits.parse().ok()?;
        if negative && seconds > 0 {
            return None;
        }
        return seconds.checked_mul(1000).map(Duration::from_millis);
    }

    let at = parse_http_date(raw)?;
    (at - now).to_std().ok()
}

/// Splits `[+-]digits[.digits]` into its sign and integer digits. The
/// fraction is dropped, so seconds truncate toward zero.
fn split_decimal(raw: &str) -> Option<(bool, &str)> {
    let (negative, unsigned) = match raw.as_bytes().first() {
        Some(b'-') => (true, &raw[1..]),
        Some(b'+') => (false, &raw[1..]),
        _ => (false, raw),
    };
    let (digits, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let all_digits = |part: &str| part.bytes().all(|byte| byte.is_ascii_digit());
    if digits.is_empty() || !all_digits(digits) || !all_digits(fraction) {
        return None;
    }
    Some((negative, digits))
}

/// Parses an HTTP date, accepting any RFC 2822 date as a last resort.
///
/// A leading weekday name is skipped rather than checked against the date,
/// so `Thu, 21 Oct 2015 07:28:00 GMT` parses even though that day was a
/// Wednesday.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = strip_weekday(value.trim());
    HTTP_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
        .or_else(|| {
            DateTime::parse_from_rfc2822(value)
                .ok()
                .map(|date| date.with_timezone(&Utc))
        })
}

fn strip_weekday(value: &str) -> &str {
    let token_len = value
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(value.len());
    let token = value[..token_len].to_ascii_lowercase();
    let is_weekday = WEEKDAYS
        .iter()
        .any(|day| *day == token || (token.len() == 3 && day.starts_with(token.as_str())));
    if !is_weekday {
        return value;
    }
    let rest = &value[token_len..];
    rest.strip_prefix(',').unwrap_or(rest).trim_start()
}
