//! Recurrence expansion -- converts a recurrence description into concrete calendar dates.
//!
//! DAILY and WEEKLY patterns are expanded through the `rrule` crate with a Sunday
//! week start, so a WEEKLY block is the Sunday-to-Saturday week containing the
//! anchor. Weekdays of the first block that fall before `start` are dropped, not
//! shifted into the next block. MONTHLY keeps the anchor's day-of-month and
//! clamps to the last day of shorter months.
//!
//! Expansion never fails: invalid input yields an empty list.

use chrono::{Months, NaiveDate, Utc};
use rrule::RRuleSet;
use tracing::{debug, warn};

use crate::model::{join_by_day, Frequency, RecurrencePattern, WeekdayCode};

/// Default generation horizon when a pattern has no end date.
pub const DEFAULT_HORIZON_YEARS: u32 = 2;

/// Expand a recurrence into a sorted, duplicate-free list of dates.
///
/// # Arguments
/// - `start` -- First candidate date (inclusive), also the pattern anchor
/// - `until` -- Last candidate date (inclusive); `start + 2 years` when `None`
/// - `freq` -- Recurrence frequency
/// - `interval` -- Step between periods; `0` yields nothing
/// - `by_day` -- Weekdays to emit for WEEKLY; ignored otherwise
pub fn generate_dates(
    start: NaiveDate,
    until: Option<NaiveDate>,
    freq: Frequency,
    interval: u32,
    by_day: &[WeekdayCode],
) -> Vec<NaiveDate> {
    generate_dates_with_horizon(start, until, freq, interval, by_day, DEFAULT_HORIZON_YEARS)
}

/// Expand a stored pattern from `start`, bounded by the earlier of the pattern's
/// `until` and `start` plus the horizon.
pub fn expand_pattern(
    start: NaiveDate,
    pattern: &RecurrencePattern,
    horizon_years: u32,
) -> Vec<NaiveDate> {
    let until = [pattern.until, horizon_end(start, horizon_years)]
        .into_iter()
        .flatten()
        .min();
    generate_dates_with_horizon(
        start,
        until,
        pattern.freq,
        pattern.interval,
        &pattern.by_day,
        horizon_years,
    )
}

/// Like [`generate_dates`] with an explicit open-ended horizon.
pub fn generate_dates_with_horizon(
    start: NaiveDate,
    until: Option<NaiveDate>,
    freq: Frequency,
    interval: u32,
    by_day: &[WeekdayCode],
    horizon_years: u32,
) -> Vec<NaiveDate> {
    let until = match until {
        Some(until) => until,
        None => match horizon_end(start, horizon_years) {
            Some(end) => end,
            None => return Vec::new(),
        },
    };

    if interval == 0 || until < start {
        return Vec::new();
    }

    let mut dates = match freq {
        Frequency::Monthly => expand_monthly(start, until, interval),
        Frequency::Daily | Frequency::Weekly => {
            if freq == Frequency::Weekly && by_day.is_empty() {
                return Vec::new();
            }
            match expand_with_rrule(start, until, freq, interval, by_day) {
                Ok(dates) => dates,
                Err(message) => {
                    warn!(%start, %until, freq = freq.as_str(), interval, "recurrence expansion failed: {message}");
                    return Vec::new();
                }
            }
        }
    };

    // Range filter before emission: the first WEEKLY block may reach back before `start`.
    dates.retain(|d| *d >= start && *d <= until);
    dates.sort();
    dates.dedup();

    debug!(%start, %until, freq = freq.as_str(), interval, count = dates.len(), "expanded recurrence");
    dates
}

/// `start` plus the horizon, clamped at month end (Feb 29 + 2y -> Feb 28).
pub fn horizon_end(start: NaiveDate, horizon_years: u32) -> Option<NaiveDate> {
    start.checked_add_months(Months::new(horizon_years.checked_mul(12)?))
}

fn expand_monthly(start: NaiveDate, until: NaiveDate, interval: u32) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut step: u32 = 0;
    // Always offset from the anchor so a clamped month (Jan 31 -> Feb 29) does not drift.
    while let Some(date) = step
        .checked_mul(interval)
        .and_then(|months| start.checked_add_months(Months::new(months)))
    {
        if date > until {
            break;
        }
        dates.push(date);
        step += 1;
    }
    dates
}

fn expand_with_rrule(
    start: NaiveDate,
    until: NaiveDate,
    freq: Frequency,
    interval: u32,
    by_day: &[WeekdayCode],
) -> Result<Vec<NaiveDate>, String> {
    // Build the RRULE. WKST=SU makes the WEEKLY interval count Sunday-started weeks.
    let mut rrule_str = format!("FREQ={};INTERVAL={};WKST=SU", freq.as_str(), interval);
    if freq == Frequency::Weekly {
        rrule_str.push_str(&format!(";BYDAY={}", join_by_day(by_day)));
    }
    rrule_str.push_str(&format!(";UNTIL={}T000000Z", until.format("%Y%m%d")));

    let rrule_text = format!(
        "DTSTART;TZID=UTC:{}T000000\nRRULE:{}",
        start.format("%Y%m%d"),
        rrule_str
    );

    let rrule_set: RRuleSet = rrule_text.parse().map_err(|e| format!("{}", e))?;

    // UNTIL bounds the iterator, so walk it to the end instead of capping with `all(limit)`.
    Ok((&rrule_set)
        .into_iter()
        .map(|dt| dt.with_timezone(&Utc).date_naive())
        .take_while(|date| *date <= until)
        .collect())
}
