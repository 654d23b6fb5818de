//! Retrieval window planning
//!
//! The remote API caps how much history one retrieval may span, so a session
//! covering a long period is split into consecutive date windows that are
//! fetched oldest first.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

use crate::api::provider_offset;

/// One retrieval window, inclusive on both ends, in provider-zone dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Split the span from `start` to `now` into windows of at most
/// `max_window_days` days, oldest first.
///
/// Every window but the last spans exactly `max_window_days`; the last
/// carries the remainder and always ends at `now`. A start at or after `now`
/// yields a single degenerate window so a session always retrieves
/// something.
pub fn plan_windows(start: NaiveDate, now: NaiveDate, max_window_days: i64) -> Vec<Window> {
    if start >= now {
        return vec![Window {
            start: now,
            end: now,
        }];
    }

    let mut windows = Vec::new();
    let mut cursor = start;

    while (now - cursor).num_days() > max_window_days {
        let end = cursor + Duration::days(max_window_days);
        windows.push(Window { start: cursor, end });
        cursor = end;
    }

    windows.push(Window {
        start: cursor,
        end: now,
    });
    windows
}

/// The UTC half-open interval `[start of first day, start of day after
/// last)` a window covers, with day boundaries taken in the provider zone.
pub fn window_bounds_utc(window: &Window) -> (DateTime<Utc>, DateTime<Utc>) {
    let midnight = NaiveTime::MIN;
    let offset = provider_offset();

    let start = window
        .start
        .and_time(midnight)
        .and_local_timezone(offset)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    let end = (window.end + Duration::days(1))
        .and_time(midnight)
        .and_local_timezone(offset)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    (start, end)
}
