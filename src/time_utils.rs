// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.

use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Current time, formatted with [`format_utc_rfc3339`].
pub fn now_rfc3339() -> String {
    format_utc_rfc3339(Utc::now())
}

/// First day of the calendar month containing `date`, as `YYYY-MM-DD`.
pub fn month_start(date: DateTime<Utc>) -> String {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
        .unwrap_or_else(|| date.date_naive())
        .format("%Y-%m-%d")
        .to_string()
}
