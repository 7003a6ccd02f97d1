//! Keep materialized instances consistent with their rule.
//!
//! Every function here takes the caller's connection or transaction and does not
//! commit on its own. A failure anywhere leaves the enclosing transaction to roll
//! back, so a rule never ends up without the instances its pattern implies.

use chrono::NaiveDate;
use rusqlite::{params, Connection};
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::expander::expand_pattern;
use crate::model::{Instance, InstanceState, Rule};
use crate::store;

/// Outcome of a rule range repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRepair {
    /// The rule still has live instances and now spans exactly them.
    Resized { start: NaiveDate, end: NaiveDate },
    /// No live instances were left; the rule and its residual rows are gone.
    RuleRemoved,
    /// The rule did not exist.
    Missing,
}

/// Insert one generated instance per date for `rule`.
///
/// Dates that already have a row for this rule, tombstones included, are
/// skipped, so re-running with the same input changes nothing. Returns the
/// number of rows actually inserted.
pub fn materialize(conn: &Connection, rule: &Rule, dates: &[NaiveDate]) -> Result<usize> {
    let mut created = 0;
    for date in dates {
        let instance = Instance {
            id: Uuid::new_v4(),
            rule_id: Some(rule.id),
            user_id: rule.user_id,
            instance_date: *date,
            time_start: rule.time_start,
            time_end: rule.time_end,
            status: rule.status,
            description: rule.description.clone(),
            state: InstanceState::Generated,
        };
        created += store::insert_instance(conn, &instance)?;
    }
    debug!(rule_id = %rule.id, requested = dates.len(), created, "materialized instances");
    Ok(created)
}

/// Counts from a regeneration pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Regeneration {
    pub removed: usize,
    pub created: usize,
}

/// Rebuild a rule's generated instances from `pivot` onward using its current pattern.
///
/// Only plain generated rows are removed. `Modified` overrides and tombstones
/// survive, even when the pattern changes shape, and their dates are not
/// re-materialized.
pub fn regenerate_from(
    conn: &Connection,
    rule: &Rule,
    pivot: NaiveDate,
    horizon_years: u32,
) -> Result<Regeneration> {
    let dates = expand_pattern(pivot, &rule.pattern, horizon_years);

    let removed = conn.execute(
        "DELETE FROM availability_instances
         WHERE rule_id = ?1 AND instance_date >= ?2 AND exception_type IS NULL",
        params![rule.id.to_string(), pivot],
    )?;
    let created = materialize(conn, rule, &dates)?;

    debug!(rule_id = %rule.id, %pivot, removed, created, "regenerated series");
    Ok(Regeneration { removed, created })
}

/// Shrink or grow a rule's stored date range to its live instances.
///
/// When nothing live remains the rule is hard-deleted along with any
/// tombstones still referencing it.
pub fn repair_rule_range(conn: &Connection, rule_id: Uuid) -> Result<RangeRepair> {
    if store::get_rule(conn, rule_id)?.is_none() {
        return Ok(RangeRepair::Missing);
    }

    let (min, max): (Option<NaiveDate>, Option<NaiveDate>) = conn.query_row(
        "SELECT MIN(instance_date), MAX(instance_date)
         FROM availability_instances
         WHERE rule_id = ?1 AND exception_type IS NOT 'deleted'",
        params![rule_id.to_string()],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    match (min, max) {
        (Some(start), Some(end)) => {
            store::set_rule_range(conn, rule_id, start, end)?;
            debug!(%rule_id, %start, %end, "resized rule range");
            Ok(RangeRepair::Resized { start, end })
        }
        _ => {
            let residual = store::delete_rule_cascade(conn, rule_id)?;
            debug!(%rule_id, residual, "removed rule with no live instances");
            Ok(RangeRepair::RuleRemoved)
        }
    }
}
