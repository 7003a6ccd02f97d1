//! SQLite-backed storage for users, recurrence rules and materialized instances.
//!
//! [`AvailabilityStore`] owns the connection and hands out transactions. The
//! free functions in this module take a `&Connection` so they can run against
//! either the bare connection or an open [`Transaction`].

pub mod migrations;
pub mod sync;

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use uuid::Uuid;

use crate::error::{Result, TeamcalError};
use crate::model::{
    join_by_day, parse_by_day, AvailabilityStatus, DateRange, Frequency, Instance, InstanceState,
    RecurrencePattern, Role, Rule, SlotContent, User,
};

/// SQLite database holding availability rules and instances.
pub struct AvailabilityStore {
    conn: Connection,
}

impl AvailabilityStore {
    /// Open (or create) the database file at `path` and bring its schema up to date.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for tests and dry runs).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::migrate(&conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a transaction. Dropping it without `commit()` rolls everything back.
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }
}

/// Instance selection by date for series-wide operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFilter {
    /// Every date on or after the pivot.
    From(NaiveDate),
    /// Every date inside the inclusive range.
    Within(DateRange),
}

impl DateFilter {
    fn bounds(self) -> (NaiveDate, Option<NaiveDate>) {
        match self {
            DateFilter::From(pivot) => (pivot, None),
            DateFilter::Within(range) => (range.start, Some(range.end)),
        }
    }
}

// === Row helpers ===

fn conversion_error(idx: usize, err: impl std::fmt::Display) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.to_string().into())
}

fn uuid_at(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn optional_uuid_at(row: &Row, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn status_at(row: &Row, idx: usize) -> rusqlite::Result<AvailabilityStatus> {
    let raw: String = row.get(idx)?;
    AvailabilityStatus::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

const INSTANCE_COLUMNS: &str = "i.id, i.rule_id, i.user_id, i.instance_date, i.time_start, \
     i.time_end, i.status, i.description, i.exception_type";

const RULE_COLUMNS: &str = "r.id, r.user_id, r.start_date, r.end_date, r.time_start, r.time_end, \
     r.status, r.description, r.freq, r.interval, r.by_day, r.until";

/// Build an Instance from the first nine columns of a row, starting at `offset`.
fn instance_from_row(row: &Row, offset: usize) -> rusqlite::Result<Instance> {
    let exception_type: Option<String> = row.get(offset + 8)?;
    Ok(Instance {
        id: uuid_at(row, offset)?,
        rule_id: optional_uuid_at(row, offset + 1)?,
        user_id: uuid_at(row, offset + 2)?,
        instance_date: row.get(offset + 3)?,
        time_start: row.get(offset + 4)?,
        time_end: row.get(offset + 5)?,
        status: status_at(row, offset + 6)?,
        description: row.get(offset + 7)?,
        state: InstanceState::from_exception_type(exception_type.as_deref()),
    })
}

/// Build a Rule from twelve columns of a row, starting at `offset`.
fn rule_from_row(row: &Row, offset: usize) -> rusqlite::Result<Rule> {
    let freq_raw: String = row.get(offset + 8)?;
    let freq = Frequency::from_str(&freq_raw).map_err(|e| conversion_error(offset + 8, e))?;
    let by_day_raw: String = row.get(offset + 10)?;
    let by_day = parse_by_day(&by_day_raw).map_err(|e| conversion_error(offset + 10, e))?;
    Ok(Rule {
        id: uuid_at(row, offset)?,
        user_id: uuid_at(row, offset + 1)?,
        start_date: row.get(offset + 2)?,
        end_date: row.get(offset + 3)?,
        time_start: row.get(offset + 4)?,
        time_end: row.get(offset + 5)?,
        status: status_at(row, offset + 6)?,
        description: row.get(offset + 7)?,
        pattern: RecurrencePattern {
            freq,
            interval: row.get(offset + 9)?,
            by_day,
            until: row.get(offset + 11)?,
        },
    })
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    let role: String = row.get(4)?;
    let created_at: String = row.get(5)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| conversion_error(5, e))?
        .with_timezone(&Utc);
    Ok(User {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        department: row.get(3)?,
        role: Role::parse(&role),
        created_at,
    })
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

/// A JSON array of strings, bound as one parameter and unpacked with `json_each`.
fn json_array(values: impl Iterator<Item = String>) -> String {
    serde_json::Value::from(values.collect::<Vec<_>>()).to_string()
}

// === Users ===

/// Register a user. The first user ever registered becomes an admin.
///
/// The emptiness check and the insert run in one transaction, so the bootstrap
/// decision is made against committed state rather than anything cached.
pub fn register_user(
    store: &mut AvailabilityStore,
    name: &str,
    email: &str,
    department: Option<&str>,
) -> Result<User> {
    if name.trim().len() < 2 {
        return Err(TeamcalError::validation("name must be at least 2 characters"));
    }
    if !email.contains('@') {
        return Err(TeamcalError::validation(format!("invalid email '{email}'")));
    }

    let tx = store.transaction()?;
    if find_user_by_email(&tx, email)?.is_some() {
        return Err(TeamcalError::validation("Email already exists!"));
    }

    let existing: i64 = tx.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    let role = if existing == 0 { Role::Admin } else { Role::User };

    let user = User {
        id: Uuid::new_v4(),
        name: name.trim().to_string(),
        email: email.to_string(),
        department: department.map(str::to_string),
        role,
        created_at: Utc::now(),
    };
    tx.execute(
        "INSERT INTO users (id, name, email, department, role, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user.id.to_string(),
            user.name,
            user.email,
            user.department,
            user.role.as_str(),
            user.created_at.to_rfc3339(),
        ],
    )?;
    tx.commit()?;

    tracing::info!(user_id = %user.id, role = user.role.as_str(), "registered user");
    Ok(user)
}

pub fn get_user(conn: &Connection, id: Uuid) -> Result<Option<User>> {
    Ok(conn
        .query_row(
            "SELECT id, name, email, department, role, created_at FROM users WHERE id = ?1",
            params![id.to_string()],
            user_from_row,
        )
        .optional()?)
}

pub fn find_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    Ok(conn
        .query_row(
            "SELECT id, name, email, department, role, created_at FROM users WHERE email = ?1",
            params![email],
            user_from_row,
        )
        .optional()?)
}

// === Rules ===

pub fn insert_rule(conn: &Connection, rule: &Rule) -> Result<()> {
    let ts = now();
    conn.execute(
        "INSERT INTO availability_rules
         (id, user_id, start_date, end_date, time_start, time_end, status, description,
          freq, interval, by_day, until, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
        params![
            rule.id.to_string(),
            rule.user_id.to_string(),
            rule.start_date,
            rule.end_date,
            rule.time_start,
            rule.time_end,
            rule.status.as_str(),
            rule.description,
            rule.pattern.freq.as_str(),
            rule.pattern.interval,
            join_by_day(&rule.pattern.by_day),
            rule.pattern.until,
            ts,
        ],
    )?;
    Ok(())
}

pub fn get_rule(conn: &Connection, id: Uuid) -> Result<Option<Rule>> {
    let sql = format!("SELECT {RULE_COLUMNS} FROM availability_rules r WHERE r.id = ?1");
    Ok(conn
        .query_row(&sql, params![id.to_string()], |row| rule_from_row(row, 0))
        .optional()?)
}

/// Overwrite a rule's time, status and description.
pub fn update_rule_content(conn: &Connection, id: Uuid, content: &SlotContent) -> Result<()> {
    conn.execute(
        "UPDATE availability_rules
         SET time_start = ?1, time_end = ?2, status = ?3, description = ?4, updated_at = ?5
         WHERE id = ?6",
        params![
            content.time_start,
            content.time_end,
            content.status.as_str(),
            content.description,
            now(),
            id.to_string(),
        ],
    )?;
    Ok(())
}

/// Replace a rule's recurrence pattern.
pub fn update_rule_pattern(conn: &Connection, id: Uuid, pattern: &RecurrencePattern) -> Result<()> {
    conn.execute(
        "UPDATE availability_rules
         SET freq = ?1, interval = ?2, by_day = ?3, until = ?4, updated_at = ?5
         WHERE id = ?6",
        params![
            pattern.freq.as_str(),
            pattern.interval,
            join_by_day(&pattern.by_day),
            pattern.until,
            now(),
            id.to_string(),
        ],
    )?;
    Ok(())
}

pub fn set_rule_range(conn: &Connection, id: Uuid, start: NaiveDate, end: NaiveDate) -> Result<()> {
    conn.execute(
        "UPDATE availability_rules SET start_date = ?1, end_date = ?2, updated_at = ?3 WHERE id = ?4",
        params![start, end, now(), id.to_string()],
    )?;
    Ok(())
}

/// Hard-delete a rule together with every instance row still referencing it.
pub fn delete_rule_cascade(conn: &Connection, id: Uuid) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM availability_instances WHERE rule_id = ?1",
        params![id.to_string()],
    )?;
    conn.execute(
        "DELETE FROM availability_rules WHERE id = ?1",
        params![id.to_string()],
    )?;
    Ok(removed)
}

// === Instances ===

/// Insert an instance. Returns 0 when a row for the same `(rule_id, date)` already
/// exists, tombstones included.
pub fn insert_instance(conn: &Connection, instance: &Instance) -> Result<usize> {
    let ts = now();
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO availability_instances
         (id, rule_id, user_id, instance_date, time_start, time_end, status, description,
          exception_type, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        params![
            instance.id.to_string(),
            instance.rule_id.map(|id| id.to_string()),
            instance.user_id.to_string(),
            instance.instance_date,
            instance.time_start,
            instance.time_end,
            instance.status.as_str(),
            instance.description,
            instance.state.exception_type(),
            ts,
        ],
    )?;
    Ok(inserted)
}

pub fn get_instance(conn: &Connection, id: Uuid) -> Result<Option<Instance>> {
    let sql = format!("SELECT {INSTANCE_COLUMNS} FROM availability_instances i WHERE i.id = ?1");
    Ok(conn
        .query_row(&sql, params![id.to_string()], |row| instance_from_row(row, 0))
        .optional()?)
}

/// All instances of a rule, tombstones included, ordered by date.
pub fn instances_for_rule(conn: &Connection, rule_id: Uuid) -> Result<Vec<Instance>> {
    let sql = format!(
        "SELECT {INSTANCE_COLUMNS} FROM availability_instances i
         WHERE i.rule_id = ?1 ORDER BY i.instance_date"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![rule_id.to_string()], |row| instance_from_row(row, 0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Live instances of a user on any of the given dates, fetched in one query.
pub fn live_instances_on_dates(
    conn: &Connection,
    user_id: Uuid,
    dates: &[NaiveDate],
) -> Result<Vec<Instance>> {
    if dates.is_empty() {
        return Ok(Vec::new());
    }

    // The date set binds as a single JSON array so large creates stay under
    // SQLite's host parameter limit.
    let sql = format!(
        "SELECT {INSTANCE_COLUMNS} FROM availability_instances i
         WHERE i.user_id = ?1
           AND i.instance_date IN (SELECT value FROM json_each(?2))
           AND i.exception_type IS NOT 'deleted'
         ORDER BY i.instance_date, i.time_start"
    );
    let date_set = json_array(dates.iter().map(|d| d.format("%Y-%m-%d").to_string()));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user_id.to_string(), date_set], |row| {
        instance_from_row(row, 0)
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Overwrite one instance's content, attachment and state.
pub fn update_instance(
    conn: &Connection,
    id: Uuid,
    content: &SlotContent,
    rule_id: Option<Uuid>,
    state: InstanceState,
) -> Result<()> {
    conn.execute(
        "UPDATE availability_instances
         SET rule_id = ?1, time_start = ?2, time_end = ?3, status = ?4, description = ?5,
             exception_type = ?6, updated_at = ?7
         WHERE id = ?8",
        params![
            rule_id.map(|r| r.to_string()),
            content.time_start,
            content.time_end,
            content.status.as_str(),
            content.description,
            state.exception_type(),
            now(),
            id.to_string(),
        ],
    )?;
    Ok(())
}

/// Apply content to every live, non-overridden instance of a rule.
pub fn apply_content_to_series(conn: &Connection, rule_id: Uuid, content: &SlotContent) -> Result<usize> {
    let updated = conn.execute(
        "UPDATE availability_instances
         SET time_start = ?1, time_end = ?2, status = ?3, description = ?4, updated_at = ?5
         WHERE rule_id = ?6 AND exception_type IS NULL",
        params![
            content.time_start,
            content.time_end,
            content.status.as_str(),
            content.description,
            now(),
            rule_id.to_string(),
        ],
    )?;
    Ok(updated)
}

/// Detach the selected live instances of a rule and overwrite their content.
///
/// Detached rows become plain standalone instances (`rule_id` NULL, no exception).
pub fn detach_and_edit(
    conn: &Connection,
    rule_id: Uuid,
    filter: DateFilter,
    content: &SlotContent,
) -> Result<usize> {
    let (lo, hi) = filter.bounds();
    let updated = conn.execute(
        "UPDATE availability_instances
         SET rule_id = NULL, time_start = ?1, time_end = ?2, status = ?3, description = ?4,
             exception_type = NULL, updated_at = ?5
         WHERE rule_id = ?6
           AND instance_date >= ?7
           AND (?8 IS NULL OR instance_date <= ?8)
           AND exception_type IS NOT 'deleted'",
        params![
            content.time_start,
            content.time_end,
            content.status.as_str(),
            content.description,
            now(),
            rule_id.to_string(),
            lo,
            hi,
        ],
    )?;
    Ok(updated)
}

/// Tombstone the selected live instances of a rule.
pub fn tombstone_series(conn: &Connection, rule_id: Uuid, filter: DateFilter) -> Result<usize> {
    let (lo, hi) = filter.bounds();
    let updated = conn.execute(
        "UPDATE availability_instances
         SET exception_type = 'deleted', updated_at = ?1
         WHERE rule_id = ?2
           AND instance_date >= ?3
           AND (?4 IS NULL OR instance_date <= ?4)
           AND exception_type IS NOT 'deleted'",
        params![now(), rule_id.to_string(), lo, hi],
    )?;
    Ok(updated)
}

pub fn tombstone_instance(conn: &Connection, id: Uuid) -> Result<usize> {
    let updated = conn.execute(
        "UPDATE availability_instances SET exception_type = 'deleted', updated_at = ?1 WHERE id = ?2",
        params![now(), id.to_string()],
    )?;
    Ok(updated)
}

// === Read path ===

/// A live instance joined with its rule (if still attached) and owner name.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarRow {
    pub instance: Instance,
    pub rule: Option<Rule>,
    pub user_name: Option<String>,
}

/// Live instances of the given users within the inclusive date range,
/// ordered by date then start time.
pub fn calendar_rows(conn: &Connection, user_ids: &[Uuid], range: DateRange) -> Result<Vec<CalendarRow>> {
    if user_ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT {INSTANCE_COLUMNS}, u.name, {RULE_COLUMNS}
         FROM availability_instances i
         LEFT JOIN users u ON u.id = i.user_id
         LEFT JOIN availability_rules r ON r.id = i.rule_id
         WHERE i.instance_date BETWEEN ?1 AND ?2
           AND i.user_id IN (SELECT value FROM json_each(?3))
           AND i.exception_type IS NOT 'deleted'
         ORDER BY i.instance_date, i.time_start"
    );
    let user_set = json_array(user_ids.iter().map(Uuid::to_string));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![range.start, range.end, user_set], |row| {
        let instance = instance_from_row(row, 0)?;
        let user_name: Option<String> = row.get(9)?;
        let rule_id: Option<String> = row.get(10)?;
        let rule = match rule_id {
            Some(_) => Some(rule_from_row(row, 10)?),
            None => None,
        };
        Ok(CalendarRow {
            instance,
            rule,
            user_name,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
