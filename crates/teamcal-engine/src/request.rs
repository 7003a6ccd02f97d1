//! Request and response shapes exchanged with outer surfaces, plus scope inference.
//!
//! Field names are camelCase on the wire. Times accept `HH:MM` or `HH:MM:SS`.

use chrono::{NaiveDate, NaiveTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TeamcalError};
use crate::model::{
    AvailabilityStatus, DateRange, Frequency, RecurrencePattern, SlotContent, WeekdayCode,
};

/// Serde adapter for wall-clock times.
pub mod wall_clock {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<NaiveTime> {
        let raw = raw.trim();
        NaiveTime::parse_from_str(raw, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
            .ok()
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M:%S").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| {
            de::Error::custom(format!("invalid time '{raw}', expected HH:MM or HH:MM:SS"))
        })
    }
}

/// Parse a JSON request body, reporting malformed input as a validation error.
pub fn parse_body<T: DeserializeOwned>(raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| TeamcalError::validation(e.to_string()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceInput {
    pub freq: Frequency,
    #[serde(default)]
    pub interval: Option<u32>,
    #[serde(default)]
    pub by_day: Option<Vec<WeekdayCode>>,
    #[serde(default)]
    pub until: Option<NaiveDate>,
}

impl RecurrenceInput {
    /// Validate and normalize into a stored pattern.
    pub fn pattern(&self) -> Result<RecurrencePattern> {
        let interval = self.interval.unwrap_or(1);
        if interval == 0 {
            return Err(TeamcalError::validation("recurrence interval must be at least 1"));
        }
        let mut by_day = self.by_day.clone().unwrap_or_default();
        by_day.sort();
        by_day.dedup();
        if self.freq == Frequency::Weekly && by_day.is_empty() {
            return Err(TeamcalError::validation("WEEKLY recurrence requires at least one byDay"));
        }
        if self.freq != Frequency::Weekly {
            by_day.clear();
        }
        Ok(RecurrencePattern {
            freq: self.freq,
            interval,
            by_day,
            until: self.until,
        })
    }
}

/// A date range as sent by clients; `end` defaults to `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeInput {
    pub start: NaiveDate,
    #[serde(default)]
    pub end: Option<NaiveDate>,
}

impl RangeInput {
    pub fn to_range(self) -> Result<DateRange> {
        let end = self.end.unwrap_or(self.start);
        if end < self.start {
            return Err(TeamcalError::validation(format!(
                "range end {end} is before range start {}",
                self.start
            )));
        }
        Ok(DateRange::new(self.start, end))
    }
}

fn validate_times(time_start: NaiveTime, time_end: NaiveTime) -> Result<()> {
    if time_start >= time_end {
        return Err(TeamcalError::validation("timeStart must be before timeEnd"));
    }
    Ok(())
}

/// Body of `POST /availability`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAvailability {
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(with = "wall_clock")]
    pub time_start: NaiveTime,
    #[serde(with = "wall_clock")]
    pub time_end: NaiveTime,
    pub status: AvailabilityStatus,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub recurrence: Option<RecurrenceInput>,
    #[serde(default)]
    pub apply_to_range: Option<RangeInput>,
}

impl CreateAvailability {
    pub fn validate(&self) -> Result<()> {
        validate_times(self.time_start, self.time_end)?;
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(TeamcalError::validation("endDate must not be before startDate"));
            }
        }
        if let Some(recurrence) = &self.recurrence {
            let pattern = recurrence.pattern()?;
            if let Some(until) = pattern.until {
                if until < self.start_date {
                    return Err(TeamcalError::validation(
                        "recurrence until must not be before startDate",
                    ));
                }
            }
        }
        if let Some(range) = self.apply_to_range {
            range.to_range()?;
        }
        Ok(())
    }

    pub fn content(&self) -> SlotContent {
        SlotContent {
            time_start: self.time_start,
            time_end: self.time_end,
            status: self.status,
            description: normalize_description(self.description.as_deref()),
        }
    }
}

/// Body of `PUT /availability/instance/{id}[/all]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAvailability {
    #[serde(with = "wall_clock")]
    pub time_start: NaiveTime,
    #[serde(with = "wall_clock")]
    pub time_end: NaiveTime,
    pub status: AvailabilityStatus,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub recurrence: Option<RecurrenceInput>,
    #[serde(default)]
    pub apply_from_date: Option<NaiveDate>,
    #[serde(default)]
    pub apply_to_range: Option<RangeInput>,
    /// Edit this occurrence in place without detaching it from its series.
    #[serde(default)]
    pub keep_in_series: bool,
}

impl UpdateAvailability {
    pub fn validate(&self) -> Result<()> {
        validate_times(self.time_start, self.time_end)?;
        if let Some(recurrence) = &self.recurrence {
            recurrence.pattern()?;
        }
        if let Some(range) = self.apply_to_range {
            range.to_range()?;
        }
        Ok(())
    }

    pub fn content(&self) -> SlotContent {
        SlotContent {
            time_start: self.time_start,
            time_end: self.time_end,
            status: self.status,
            description: normalize_description(self.description.as_deref()),
        }
    }

    /// Scope implied by the request path and body.
    pub fn scope(&self, series_path: bool) -> Result<Scope> {
        Ok(Scope::infer(
            series_path,
            self.apply_from_date,
            self.apply_to_range.map(RangeInput::to_range).transpose()?,
            self.keep_in_series,
        ))
    }
}

/// Body of `DELETE /availability/instance/{id}[/all]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAvailability {
    #[serde(default)]
    pub apply_from_date: Option<NaiveDate>,
    #[serde(default)]
    pub apply_to_range: Option<RangeInput>,
}

impl DeleteAvailability {
    pub fn scope(&self, series_path: bool) -> Result<Scope> {
        Ok(Scope::infer(
            series_path,
            self.apply_from_date,
            self.apply_to_range.map(RangeInput::to_range).transpose()?,
            false,
        ))
    }
}

/// Blast radius of an update or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Only the targeted occurrence, detached from its series.
    This,
    /// Only the targeted occurrence, kept in its series as a modified exception.
    Override,
    /// Every occurrence of the series on or after the targeted one.
    Future,
    /// Every occurrence of the series inside the range.
    Range(DateRange),
    /// The whole series.
    All,
}

impl Scope {
    /// `/all` wins; otherwise a range beats a pivot date, which beats an override flag.
    pub fn infer(
        series_path: bool,
        apply_from_date: Option<NaiveDate>,
        apply_to_range: Option<DateRange>,
        keep_in_series: bool,
    ) -> Scope {
        if series_path {
            Scope::All
        } else if let Some(range) = apply_to_range {
            Scope::Range(range)
        } else if apply_from_date.is_some() {
            Scope::Future
        } else if keep_in_series {
            Scope::Override
        } else {
            Scope::This
        }
    }
}

/// Query of `GET /availability`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Honored only for elevated actors.
    pub user_ids: Vec<Uuid>,
}

impl AvailabilityQuery {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            user_ids: Vec::new(),
        }
    }

    pub fn with_users(mut self, user_ids: Vec<Uuid>) -> Self {
        self.user_ids = user_ids;
        self
    }

    pub fn range(&self) -> Result<DateRange> {
        if self.end < self.start {
            return Err(TeamcalError::validation("end must not be before start"));
        }
        Ok(DateRange::new(self.start, self.end))
    }
}

/// Parse a comma-joined list of user ids.
pub fn parse_user_ids(raw: &str) -> Result<Vec<Uuid>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            Uuid::parse_str(part)
                .map_err(|_| TeamcalError::validation(format!("invalid user id '{part}'")))
        })
        .collect()
}

fn normalize_description(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

/// Response of a create. Always a success; skipped dates signal partial creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOutcome {
    pub success: bool,
    pub message: String,
    pub created_dates: Vec<NaiveDate>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_dates: Vec<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl CreateOutcome {
    pub fn is_partial(&self) -> bool {
        !self.skipped_dates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn series_path_wins_over_body() {
        let range = DateRange::new(d(2024, 1, 1), d(2024, 1, 5));
        assert_eq!(Scope::infer(true, Some(d(2024, 1, 1)), Some(range), true), Scope::All);
    }

    #[test]
    fn range_beats_pivot_beats_override() {
        let range = DateRange::new(d(2024, 1, 1), d(2024, 1, 5));
        assert_eq!(
            Scope::infer(false, Some(d(2024, 1, 3)), Some(range), true),
            Scope::Range(range)
        );
        assert_eq!(Scope::infer(false, Some(d(2024, 1, 3)), None, true), Scope::Future);
        assert_eq!(Scope::infer(false, None, None, true), Scope::Override);
        assert_eq!(Scope::infer(false, None, None, false), Scope::This);
    }

    #[test]
    fn update_body_accepts_short_times() {
        let body: UpdateAvailability = parse_body(
            r#"{"timeStart":"09:00","timeEnd":"10:30:00","status":"BUSY","applyToRange":{"start":"2024-01-02"}}"#,
        )
        .unwrap();
        assert_eq!(body.time_start, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(
            body.scope(false).unwrap(),
            Scope::Range(DateRange::new(d(2024, 1, 2), d(2024, 1, 2)))
        );
    }

    #[test]
    fn weekly_recurrence_requires_by_day() {
        let input = RecurrenceInput {
            freq: Frequency::Weekly,
            interval: None,
            by_day: Some(vec![]),
            until: None,
        };
        assert!(matches!(input.pattern(), Err(TeamcalError::Validation(_))));
    }

    #[test]
    fn by_day_is_sorted_and_deduplicated() {
        let input = RecurrenceInput {
            freq: Frequency::Weekly,
            interval: Some(2),
            by_day: Some(vec![WeekdayCode::Fr, WeekdayCode::Mo, WeekdayCode::Fr]),
            until: None,
        };
        let pattern = input.pattern().unwrap();
        assert_eq!(pattern.by_day, vec![WeekdayCode::Mo, WeekdayCode::Fr]);
        assert_eq!(pattern.interval, 2);
    }

    #[test]
    fn malformed_body_is_a_validation_error() {
        let err = parse_body::<CreateAvailability>(r#"{"startDate":"2024-13-01"}"#).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn user_ids_parse_from_comma_list() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(parse_user_ids(&format!("{a}, {b},")).unwrap(), vec![a, b]);
        assert!(parse_user_ids("nope").is_err());
    }
}
