//! Detect time overlaps between candidate slots and a user's existing instances.
//!
//! Times are compared as minutes since midnight on the same date. Adjacent slots
//! (where one ends exactly when another starts) are NOT conflicts. One conflict
//! is reported per overlapping pair, so a date overlapping two existing slots
//! yields two entries.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{AvailabilityStatus, Instance, TimeRange};
use crate::store;

/// A slot someone wants to create on a given date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub date: NaiveDate,
    pub range: TimeRange,
}

/// A detected overlap between a candidate and an existing instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub date: NaiveDate,
    pub new_range: TimeRange,
    pub existing_range: TimeRange,
    pub existing_status: AvailabilityStatus,
    pub existing_description: Option<String>,
}

impl Conflict {
    /// One-line summary, e.g. `2024-01-03: 09:00–10:00 overlaps`.
    pub fn summary(&self) -> String {
        format!(
            "{}: {}–{} overlaps",
            self.date.format("%Y-%m-%d"),
            self.new_range.start.format("%H:%M"),
            self.new_range.end.format("%H:%M")
        )
    }
}

/// Find all pairwise overlaps between candidates and existing instances.
///
/// Tombstoned instances never conflict.
pub fn find_overlaps(candidates: &[Candidate], existing: &[Instance]) -> Vec<Conflict> {
    let mut by_date: HashMap<NaiveDate, Vec<&Instance>> = HashMap::new();
    for instance in existing.iter().filter(|i| i.is_live()) {
        by_date.entry(instance.instance_date).or_default().push(instance);
    }

    let mut conflicts = Vec::new();
    for candidate in candidates {
        let Some(slots) = by_date.get(&candidate.date) else {
            continue;
        };
        for slot in slots {
            let existing_range = slot.time_range();
            if candidate.range.overlaps(&existing_range) {
                conflicts.push(Conflict {
                    date: candidate.date,
                    new_range: candidate.range,
                    existing_range,
                    existing_status: slot.status,
                    existing_description: slot.description.clone(),
                });
            }
        }
    }

    conflicts
}

/// Find conflicts against the user's persisted, non-deleted instances.
///
/// Existing instances for every candidate date are fetched in a single query.
pub fn find_conflicts(conn: &Connection, user_id: Uuid, candidates: &[Candidate]) -> Result<Vec<Conflict>> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let dates: Vec<NaiveDate> = candidates
        .iter()
        .map(|c| c.date)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let existing = store::live_instances_on_dates(conn, user_id, &dates)?;
    Ok(find_overlaps(candidates, &existing))
}

/// Render up to `limit` conflict summaries, with a truncation marker when more exist.
pub fn describe_conflicts(conflicts: &[Conflict], limit: usize) -> String {
    let mut details = conflicts
        .iter()
        .take(limit)
        .map(Conflict::summary)
        .collect::<Vec<_>>()
        .join(", ");
    if conflicts.len() > limit {
        details.push_str(" and more...");
    }
    details
}
