//! Calendar view of materialized availability.
//!
//! Reads never expand recurrences: every item is an instance materialized at write
//! time, joined with its rule for display metadata. Status maps to a color pair
//! (green for available, red for busy, amber for everything else).

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use uuid::Uuid;

use crate::model::{AvailabilityStatus, Frequency, Rule, WeekdayCode};
use crate::request::wall_clock;
use crate::store::CalendarRow;

/// Background and border colors for a rendered slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorPair {
    pub background: &'static str,
    pub border: &'static str,
}

pub const AVAILABLE_COLORS: ColorPair = ColorPair {
    background: "#34D399",
    border: "#10B981",
};

pub const BUSY_COLORS: ColorPair = ColorPair {
    background: "#F87171",
    border: "#EF4444",
};

pub const FALLBACK_COLORS: ColorPair = ColorPair {
    background: "#FBBF24",
    border: "#F59E0B",
};

pub fn status_colors(status: AvailabilityStatus) -> ColorPair {
    match status {
        AvailabilityStatus::Available => AVAILABLE_COLORS,
        AvailabilityStatus::Busy => BUSY_COLORS,
        _ => FALLBACK_COLORS,
    }
}

/// Recurrence metadata of the series an item still belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceSummary {
    pub freq: Frequency,
    pub interval: u32,
    pub by_day: Vec<WeekdayCode>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
    #[serde(with = "wall_clock")]
    pub time_start: NaiveTime,
    #[serde(with = "wall_clock")]
    pub time_end: NaiveTime,
    pub rrule: String,
}

impl From<&Rule> for RecurrenceSummary {
    fn from(rule: &Rule) -> Self {
        Self {
            freq: rule.pattern.freq,
            interval: rule.pattern.interval,
            by_day: rule.pattern.by_day.clone(),
            start_date: rule.start_date,
            end_date: rule.end_date,
            until: rule.pattern.until,
            time_start: rule.time_start,
            time_end: rule.time_end,
            rrule: rule.pattern.to_rrule(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemProps {
    pub description: String,
    pub instance_id: Uuid,
    pub rule_id: Option<Uuid>,
    pub is_recurring: bool,
    pub user_id: Uuid,
    pub user_name: Option<String>,
    pub is_exception: bool,
}

/// One rendered calendar entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarItem {
    pub id: Uuid,
    /// The status label.
    pub title: String,
    /// `YYYY-MM-DDTHH:MM:SS`, naive local time.
    pub start: String,
    pub end: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<RecurrenceSummary>,
    pub background_color: &'static str,
    pub border_color: &'static str,
    pub extended_props: ItemProps,
}

impl From<CalendarRow> for CalendarItem {
    fn from(row: CalendarRow) -> Self {
        let CalendarRow {
            instance,
            rule,
            user_name,
        } = row;
        let colors = status_colors(instance.status);
        let date = instance.instance_date.format("%Y-%m-%d");

        CalendarItem {
            id: instance.id,
            title: instance.status.as_str().to_string(),
            start: format!("{}T{}", date, instance.time_start.format("%H:%M:%S")),
            end: format!("{}T{}", date, instance.time_end.format("%H:%M:%S")),
            recurrence: rule.as_ref().map(RecurrenceSummary::from),
            background_color: colors.background,
            border_color: colors.border,
            extended_props: ItemProps {
                description: instance.description.clone().unwrap_or_default(),
                instance_id: instance.id,
                rule_id: instance.rule_id,
                is_recurring: instance.rule_id.is_some(),
                user_id: instance.user_id,
                user_name,
                is_exception: instance.state.is_exception(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tentative_uses_fallback_colors() {
        assert_eq!(status_colors(AvailabilityStatus::Tentative), FALLBACK_COLORS);
        assert_eq!(status_colors(AvailabilityStatus::Available).background, "#34D399");
        assert_eq!(status_colors(AvailabilityStatus::Busy).border, "#EF4444");
    }
}
