//! Field normalizers shared across adapters.
//!
//! All of these are pure and infallible or `Option`-returning; the adapter
//! decides whether a parse failure skips an item or falls back to a default.

use chrono::{DateTime, NaiveTime, TimeZone, Utc};

/// Human-readable salary text from optional numeric bounds and a currency
/// code. A bound that is absent or zero counts as undisclosed; with no usable
/// bound the whole salary is undisclosed.
pub fn format_salary(from: Option<i64>, to: Option<i64>, currency: &str) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(from) = from.filter(|v| *v > 0) {
        parts.push(format!("от {from}"));
    }
    if let Some(to) = to.filter(|v| *v > 0) {
        parts.push(format!("до {to}"));
    }
    if parts.is_empty() {
        None
    } else {
        Some(format!("{} {currency}", parts.join(" ")))
    }
}

/// superjob reports "not disclosed" as both payment bounds set to exactly
/// zero, which is not the same thing as the bounds being absent.
pub fn sj_salary(
    payment_from: Option<i64>,
    payment_to: Option<i64>,
    currency: &str,
) -> Option<String> {
    if payment_from == Some(0) && payment_to == Some(0) {
        return None;
    }
    format_salary(payment_from, payment_to, currency)
}

/// hh.ru timestamps look like `2026-02-24T12:00:00+0300`.
pub fn parse_hh_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// superjob timestamps are epoch seconds.
pub fn parse_epoch_seconds(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

/// fl.ru shows relative dates ("сегодня в 14:30", "вчера в 09:15"). Anything
/// that is not one of those two shapes resolves to `now` — an approximation,
/// not a precise parse.
pub fn parse_relative_date(text: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    let date = if text.contains("сегодня") {
        now.date_naive()
    } else if text.contains("вчера") {
        match now.date_naive().pred_opt() {
            Some(date) => date,
            None => return now,
        }
    } else {
        return now;
    };
    let Some(raw_time) = text.split_whitespace().last() else {
        return now;
    };
    let Ok(time) = NaiveTime::parse_from_str(raw_time, "%H:%M") else {
        return now;
    };
    date.and_time(time).and_utc()
}

/// fl.ru price text; "Договорная" means negotiable, i.e. undisclosed.
pub fn fl_salary(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.contains("Договорная") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// hh.ru splits the search-result description across two snippet fields.
pub fn hh_description(requirement: Option<&str>, responsibility: Option<&str>) -> String {
    format!(
        "{} {}",
        requirement.unwrap_or_default(),
        responsibility.unwrap_or_default()
    )
    .trim()
    .to_string()
}
