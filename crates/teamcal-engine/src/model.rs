//! Domain types shared by the expander, the store and the service.
//!
//! Dates are calendar dates and times are naive wall-clock values; nothing in
//! this crate is timezone-aware.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TeamcalError;

/// Declared availability of a user for a time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AvailabilityStatus {
    Available,
    Busy,
    Tentative,
}

impl AvailabilityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AvailabilityStatus::Available => "AVAILABLE",
            AvailabilityStatus::Busy => "BUSY",
            AvailabilityStatus::Tentative => "TENTATIVE",
        }
    }
}

impl FromStr for AvailabilityStatus {
    type Err = TeamcalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AVAILABLE" => Ok(AvailabilityStatus::Available),
            "BUSY" => Ok(AvailabilityStatus::Busy),
            "TENTATIVE" => Ok(AvailabilityStatus::Tentative),
            other => Err(TeamcalError::validation(format!(
                "invalid status '{other}', expected AVAILABLE, BUSY or TENTATIVE"
            ))),
        }
    }
}

impl fmt::Display for AvailabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recurrence frequency. Only the three simple frequencies are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
        }
    }
}

impl FromStr for Frequency {
    type Err = TeamcalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DAILY" => Ok(Frequency::Daily),
            "WEEKLY" => Ok(Frequency::Weekly),
            "MONTHLY" => Ok(Frequency::Monthly),
            other => Err(TeamcalError::validation(format!(
                "unsupported frequency '{other}'"
            ))),
        }
    }
}

/// Two-letter weekday code as used in BYDAY lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WeekdayCode {
    Su,
    Mo,
    Tu,
    We,
    Th,
    Fr,
    Sa,
}

impl WeekdayCode {
    pub fn as_str(self) -> &'static str {
        match self {
            WeekdayCode::Su => "SU",
            WeekdayCode::Mo => "MO",
            WeekdayCode::Tu => "TU",
            WeekdayCode::We => "WE",
            WeekdayCode::Th => "TH",
            WeekdayCode::Fr => "FR",
            WeekdayCode::Sa => "SA",
        }
    }

    pub fn weekday(self) -> Weekday {
        match self {
            WeekdayCode::Su => Weekday::Sun,
            WeekdayCode::Mo => Weekday::Mon,
            WeekdayCode::Tu => Weekday::Tue,
            WeekdayCode::We => Weekday::Wed,
            WeekdayCode::Th => Weekday::Thu,
            WeekdayCode::Fr => Weekday::Fri,
            WeekdayCode::Sa => Weekday::Sat,
        }
    }

    pub fn from_weekday(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Sun => WeekdayCode::Su,
            Weekday::Mon => WeekdayCode::Mo,
            Weekday::Tue => WeekdayCode::Tu,
            Weekday::Wed => WeekdayCode::We,
            Weekday::Thu => WeekdayCode::Th,
            Weekday::Fri => WeekdayCode::Fr,
            Weekday::Sat => WeekdayCode::Sa,
        }
    }
}

impl FromStr for WeekdayCode {
    type Err = TeamcalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "SU" => Ok(WeekdayCode::Su),
            "MO" => Ok(WeekdayCode::Mo),
            "TU" => Ok(WeekdayCode::Tu),
            "WE" => Ok(WeekdayCode::We),
            "TH" => Ok(WeekdayCode::Th),
            "FR" => Ok(WeekdayCode::Fr),
            "SA" => Ok(WeekdayCode::Sa),
            other => Err(TeamcalError::validation(format!(
                "invalid weekday code '{other}'"
            ))),
        }
    }
}

/// A recurrence pattern: frequency, interval, weekday set and optional end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrencePattern {
    pub freq: Frequency,
    pub interval: u32,
    /// Only meaningful for [`Frequency::Weekly`].
    #[serde(default)]
    pub by_day: Vec<WeekdayCode>,
    pub until: Option<NaiveDate>,
}

impl RecurrencePattern {
    /// Render the pattern as an RFC 5545 RRULE value (without the `RRULE:` prefix).
    pub fn to_rrule(&self) -> String {
        let mut parts = vec![format!("FREQ={}", self.freq.as_str())];
        if self.interval > 1 {
            parts.push(format!("INTERVAL={}", self.interval));
        }
        if self.freq == Frequency::Weekly && !self.by_day.is_empty() {
            parts.push(format!("BYDAY={}", join_by_day(&self.by_day)));
        }
        if let Some(until) = self.until {
            parts.push(format!("UNTIL={}", until.format("%Y%m%d")));
        }
        parts.join(";")
    }
}

/// Join weekday codes into the comma-separated form stored in the database.
pub fn join_by_day(days: &[WeekdayCode]) -> String {
    days.iter()
        .map(|d| d.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a comma-separated weekday list. Empty input yields an empty list.
pub fn parse_by_day(raw: &str) -> Result<Vec<WeekdayCode>, TeamcalError> {
    raw.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(WeekdayCode::from_str)
        .collect()
}

/// A wall-clock time range on a single day, half-open `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Minutes since midnight of the start (fractional seconds included).
    pub fn start_minutes(&self) -> f64 {
        minutes_since_midnight(self.start)
    }

    pub fn end_minutes(&self) -> f64 {
        minutes_since_midnight(self.end)
    }

    /// Touching boundaries do not overlap.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start_minutes() < other.end_minutes() && self.end_minutes() > other.start_minutes()
    }
}

fn minutes_since_midnight(time: NaiveTime) -> f64 {
    f64::from(time.hour() * 60 + time.minute()) + f64::from(time.second()) / 60.0
}

/// An inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Every day of the range, in order. Empty when `end < start`.
    pub fn days(&self) -> Vec<NaiveDate> {
        self.start
            .iter_days()
            .take_while(|d| *d <= self.end)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "ADMIN" => Role::Admin,
            _ => Role::User,
        }
    }
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn user(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::User,
        }
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    pub fn is_elevated(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn can_modify(&self, owner: Uuid) -> bool {
        self.user_id == owner || self.is_elevated()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub department: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.id,
            role: self.role,
        }
    }
}

/// A stored recurrence pattern owning zero or more instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Earliest live instance date.
    pub start_date: NaiveDate,
    /// Latest live instance date.
    pub end_date: Option<NaiveDate>,
    pub time_start: NaiveTime,
    pub time_end: NaiveTime,
    pub status: AvailabilityStatus,
    pub description: Option<String>,
    pub pattern: RecurrencePattern,
}

/// Lifecycle of a materialized instance relative to its rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    /// Produced by the rule and still matching it.
    Generated,
    /// A single-occurrence content override kept inside the series.
    Modified,
    /// A suppressed occurrence. Kept so regeneration cannot bring it back.
    Tombstoned,
}

impl InstanceState {
    /// Value of the `exception_type` column.
    pub fn exception_type(self) -> Option<&'static str> {
        match self {
            InstanceState::Generated => None,
            InstanceState::Modified => Some("modified"),
            InstanceState::Tombstoned => Some("deleted"),
        }
    }

    pub fn from_exception_type(raw: Option<&str>) -> Self {
        match raw {
            Some("modified") => InstanceState::Modified,
            Some("deleted") => InstanceState::Tombstoned,
            _ => InstanceState::Generated,
        }
    }

    pub fn is_exception(self) -> bool {
        self != InstanceState::Generated
    }
}

/// One concrete date's availability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub id: Uuid,
    /// `None` for standalone instances.
    pub rule_id: Option<Uuid>,
    pub user_id: Uuid,
    pub instance_date: NaiveDate,
    pub time_start: NaiveTime,
    pub time_end: NaiveTime,
    pub status: AvailabilityStatus,
    pub description: Option<String>,
    pub state: InstanceState,
}

impl Instance {
    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.time_start, self.time_end)
    }

    pub fn is_live(&self) -> bool {
        self.state != InstanceState::Tombstoned
    }
}

/// Content applied by an update: times, status and description.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotContent {
    pub time_start: NaiveTime,
    pub time_end: NaiveTime,
    pub status: AvailabilityStatus,
    pub description: Option<String>,
}
