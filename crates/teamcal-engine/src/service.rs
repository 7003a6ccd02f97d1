//! Create, read, update and delete availability with scoped series semantics.
//!
//! Each mutation runs in a single transaction: candidate expansion, conflict
//! filtering, rule and instance writes and rule range repair either all land or
//! none do. The change notification fires only after commit.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::{info, warn};
use uuid::Uuid;

use crate::availability::CalendarItem;
use crate::config::EngineConfig;
use crate::conflict::{self, Candidate};
use crate::error::{Result, TeamcalError};
use crate::expander::{expand_pattern, generate_dates_with_horizon, horizon_end};
use crate::model::{
    Actor, DateRange, Instance, InstanceState, RecurrencePattern, Rule, SlotContent, TimeRange,
    User,
};
use crate::notify::{AvailabilityChanged, ChangeNotifier, TracingNotifier};
use crate::request::{
    AvailabilityQuery, CreateAvailability, CreateOutcome, RecurrenceInput, Scope,
    UpdateAvailability,
};
use crate::store::sync::{self, RangeRepair};
use crate::store::{self, AvailabilityStore, DateFilter};

/// Orchestrates the expander, the conflict detector and the store.
pub struct AvailabilityService<N = TracingNotifier> {
    store: AvailabilityStore,
    notifier: N,
    config: EngineConfig,
}

impl<N: ChangeNotifier> AvailabilityService<N> {
    pub fn new(store: AvailabilityStore, notifier: N, config: EngineConfig) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    pub fn store(&self) -> &AvailabilityStore {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register a user; the first one becomes an admin.
    pub fn register_user(
        &mut self,
        name: &str,
        email: &str,
        department: Option<&str>,
    ) -> Result<User> {
        store::register_user(&mut self.store, name, email, department)
    }

    /// Create availability for the acting user.
    ///
    /// Dates that overlap the user's existing slots are skipped. If every
    /// candidate overlaps, nothing is written and a conflict error is returned.
    pub fn create(&mut self, actor: &Actor, request: &CreateAvailability) -> Result<CreateOutcome> {
        request.validate()?;
        let content = request.content();
        let pattern = request
            .recurrence
            .as_ref()
            .map(RecurrenceInput::pattern)
            .transpose()?;

        let candidates = self.candidate_dates(request, pattern.as_ref())?;
        if candidates.is_empty() {
            return Err(TeamcalError::validation("No dates to create"));
        }

        let range = TimeRange::new(content.time_start, content.time_end);
        let slots: Vec<Candidate> = candidates
            .iter()
            .map(|date| Candidate { date: *date, range })
            .collect();

        let tx = self.store.transaction()?;
        let conflicts = conflict::find_conflicts(&tx, actor.user_id, &slots)?;
        let conflicted: BTreeSet<NaiveDate> = conflicts.iter().map(|c| c.date).collect();
        let (to_create, skipped): (Vec<NaiveDate>, Vec<NaiveDate>) = candidates
            .into_iter()
            .partition(|date| !conflicted.contains(date));
        let details = (!conflicts.is_empty())
            .then(|| conflict::describe_conflicts(&conflicts, self.config.max_conflict_details));

        let (Some(first), Some(last)) = (to_create.first().copied(), to_create.last().copied())
        else {
            warn!(user_id = %actor.user_id, conflicts = conflicts.len(), "every candidate date conflicts");
            return Err(TeamcalError::Conflict {
                details: details.unwrap_or_default(),
            });
        };

        let rule_id = match pattern {
            Some(pattern) => {
                let rule = Rule {
                    id: Uuid::new_v4(),
                    user_id: actor.user_id,
                    start_date: first,
                    end_date: Some(last),
                    time_start: content.time_start,
                    time_end: content.time_end,
                    status: content.status,
                    description: content.description.clone(),
                    pattern,
                };
                store::insert_rule(&tx, &rule)?;
                sync::materialize(&tx, &rule, &to_create)?;
                Some(rule.id)
            }
            None => {
                for date in &to_create {
                    store::insert_instance(&tx, &standalone(actor.user_id, *date, &content))?;
                }
                None
            }
        };

        tx.commit()?;
        info!(
            user_id = %actor.user_id,
            created = to_create.len(),
            skipped = skipped.len(),
            rule_id = ?rule_id,
            "created availability"
        );
        self.notify(actor.user_id);

        let outcome = if skipped.is_empty() {
            CreateOutcome {
                success: true,
                message: "Availability created successfully".to_string(),
                created_dates: to_create,
                skipped_dates: skipped,
                rule_id,
                warning: None,
                details: None,
            }
        } else {
            CreateOutcome {
                success: true,
                message: format!(
                    "Created on {} date(s). Skipped {} conflicting date(s).",
                    to_create.len(),
                    skipped.len()
                ),
                created_dates: to_create,
                skipped_dates: skipped,
                rule_id,
                warning: Some("Partial creation due to conflicts".to_string()),
                details,
            }
        };
        Ok(outcome)
    }

    /// Calendar items for the requested users and inclusive date range.
    ///
    /// Non-admin actors only ever see their own availability, whatever the query asks for.
    pub fn list(&self, actor: &Actor, query: &AvailabilityQuery) -> Result<Vec<CalendarItem>> {
        let range = query.range()?;
        let targets = if actor.is_elevated() && !query.user_ids.is_empty() {
            query.user_ids.clone()
        } else {
            vec![actor.user_id]
        };

        let rows = store::calendar_rows(self.store.conn(), &targets, range)?;
        Ok(rows.into_iter().map(CalendarItem::from).collect())
    }

    /// Update the targeted instance and, depending on `scope`, its series.
    pub fn update(
        &mut self,
        actor: &Actor,
        instance_id: Uuid,
        scope: Scope,
        request: &UpdateAvailability,
    ) -> Result<()> {
        request.validate()?;
        let content = request.content();
        let pattern = request
            .recurrence
            .as_ref()
            .map(RecurrenceInput::pattern)
            .transpose()?;
        let horizon = self.config.generation_horizon_years;

        let tx = self.store.transaction()?;
        let target = load_target(&tx, actor, instance_id)?;

        match (target.rule_id, pattern) {
            (Some(rule_id), Some(pattern)) => {
                let pivot = request.apply_from_date.unwrap_or(target.instance_date);
                reshape_series(&tx, rule_id, &content, &pattern, scope, pivot, horizon)?;
            }
            (None, Some(pattern)) => {
                start_series(&tx, &target, &content, pattern, horizon)?;
            }
            (Some(rule_id), None) => match scope {
                Scope::All => {
                    store::update_rule_content(&tx, rule_id, &content)?;
                    store::apply_content_to_series(&tx, rule_id, &content)?;
                }
                Scope::Range(range) => {
                    store::detach_and_edit(&tx, rule_id, DateFilter::Within(range), &content)?;
                }
                Scope::Future => {
                    let from = DateFilter::From(target.instance_date);
                    store::detach_and_edit(&tx, rule_id, from, &content)?;
                }
                Scope::Override => {
                    store::update_instance(
                        &tx,
                        target.id,
                        &content,
                        Some(rule_id),
                        InstanceState::Modified,
                    )?;
                }
                Scope::This => {
                    store::update_instance(&tx, target.id, &content, None, InstanceState::Generated)?;
                }
            },
            (None, None) => {
                store::update_instance(&tx, target.id, &content, None, InstanceState::Generated)?;
            }
        }

        if let Some(rule_id) = target.rule_id {
            sync::repair_rule_range(&tx, rule_id)?;
        }

        tx.commit()?;
        info!(%instance_id, scope = ?scope, owner = %target.user_id, "updated availability");
        self.notify(target.user_id);
        Ok(())
    }

    /// Delete the targeted instance and, depending on `scope`, its series.
    ///
    /// Only `Scope::All` hard-deletes; everything else leaves tombstones.
    pub fn delete(&mut self, actor: &Actor, instance_id: Uuid, scope: Scope) -> Result<()> {
        let tx = self.store.transaction()?;
        let target = load_target(&tx, actor, instance_id)?;

        match (target.rule_id, scope) {
            (Some(rule_id), Scope::Range(range)) => {
                store::tombstone_series(&tx, rule_id, DateFilter::Within(range))?;
                sync::repair_rule_range(&tx, rule_id)?;
            }
            (Some(rule_id), Scope::Future) => {
                store::tombstone_series(&tx, rule_id, DateFilter::From(target.instance_date))?;
                sync::repair_rule_range(&tx, rule_id)?;
            }
            (Some(rule_id), Scope::All) => {
                store::delete_rule_cascade(&tx, rule_id)?;
            }
            (rule_id, _) => {
                store::tombstone_instance(&tx, target.id)?;
                if let Some(rule_id) = rule_id {
                    sync::repair_rule_range(&tx, rule_id)?;
                }
            }
        }

        tx.commit()?;
        info!(%instance_id, scope = ?scope, owner = %target.user_id, "deleted availability");
        self.notify(target.user_id);
        Ok(())
    }

    fn candidate_dates(
        &self,
        request: &CreateAvailability,
        pattern: Option<&RecurrencePattern>,
    ) -> Result<Vec<NaiveDate>> {
        let Some(pattern) = pattern else {
            let end = request.end_date.unwrap_or(request.start_date);
            return Ok(DateRange::new(request.start_date, end).days());
        };

        let horizon = self.config.generation_horizon_years;
        let range = request.apply_to_range.map(|r| r.to_range()).transpose()?;
        let start = range.map_or(request.start_date, |r| r.start);
        // The earliest of the explicit range end, the pattern end and the horizon wins.
        let until = [
            range.map(|r| r.end),
            pattern.until,
            horizon_end(request.start_date, horizon),
        ]
        .into_iter()
        .flatten()
        .min();

        Ok(generate_dates_with_horizon(
            start,
            until,
            pattern.freq,
            pattern.interval,
            &pattern.by_day,
            horizon,
        ))
    }

    fn notify(&self, user_id: Uuid) {
        self.notifier
            .availability_changed(AvailabilityChanged { user_id });
    }
}

/// Resolve a live instance and check the actor may modify it.
fn load_target(conn: &Connection, actor: &Actor, instance_id: Uuid) -> Result<Instance> {
    let instance = store::get_instance(conn, instance_id)?
        .filter(Instance::is_live)
        .ok_or(TeamcalError::NotFound(instance_id))?;
    if !actor.can_modify(instance.user_id) {
        warn!(%instance_id, actor = %actor.user_id, "rejected modification of foreign availability");
        return Err(TeamcalError::Forbidden);
    }
    Ok(instance)
}

fn standalone(user_id: Uuid, date: NaiveDate, content: &SlotContent) -> Instance {
    Instance {
        id: Uuid::new_v4(),
        rule_id: None,
        user_id,
        instance_date: date,
        time_start: content.time_start,
        time_end: content.time_end,
        status: content.status,
        description: content.description.clone(),
        state: InstanceState::Generated,
    }
}

/// Replace a series' pattern and rebuild it from `pivot`.
///
/// With `Scope::All` the new content is also applied to the non-overridden
/// instances before the pivot; otherwise those keep what they had.
fn reshape_series(
    conn: &Connection,
    rule_id: Uuid,
    content: &SlotContent,
    pattern: &RecurrencePattern,
    scope: Scope,
    pivot: NaiveDate,
    horizon: u32,
) -> Result<()> {
    store::update_rule_content(conn, rule_id, content)?;
    store::update_rule_pattern(conn, rule_id, pattern)?;
    if scope == Scope::All {
        store::apply_content_to_series(conn, rule_id, content)?;
    }
    let rule = store::get_rule(conn, rule_id)?.ok_or(TeamcalError::NotFound(rule_id))?;
    sync::regenerate_from(conn, &rule, pivot, horizon)?;
    Ok(())
}

/// Turn a standalone instance into the first occurrence of a new series.
fn start_series(
    conn: &Connection,
    target: &Instance,
    content: &SlotContent,
    pattern: RecurrencePattern,
    horizon: u32,
) -> Result<()> {
    let rule = Rule {
        id: Uuid::new_v4(),
        user_id: target.user_id,
        start_date: target.instance_date,
        end_date: pattern.until,
        time_start: content.time_start,
        time_end: content.time_end,
        status: content.status,
        description: content.description.clone(),
        pattern,
    };
    store::insert_rule(conn, &rule)?;
    store::update_instance(conn, target.id, content, Some(rule.id), InstanceState::Generated)?;

    let dates = expand_pattern(target.instance_date, &rule.pattern, horizon);
    sync::materialize(conn, &rule, &dates)?;

    if let RangeRepair::Resized { start, end } = sync::repair_rule_range(conn, rule.id)? {
        info!(rule_id = %rule.id, %start, %end, "converted instance into a series");
    }
    Ok(())
}
