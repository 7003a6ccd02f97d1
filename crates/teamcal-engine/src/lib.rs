//! # teamcal-engine
//!
//! Recurring availability for small teams: expand recurrence patterns into
//! concrete dates, reject slots that overlap what a user already published, and
//! keep materialized instances in sync with their rule through scoped edits.
//!
//! Recurrences are expanded once, at write time. Reads only ever see stored
//! instances, so a calendar query never depends on the expander.
//!
//! ## Modules
//!
//! - [`expander`] — recurrence pattern → sorted list of dates
//! - [`conflict`] — half-open overlap detection against existing instances
//! - [`store`] — SQLite persistence, migrations and series synchronization
//! - [`service`] — create / list / update / delete with series scopes
//! - [`availability`] — calendar items for the read path
//! - [`request`] — wire shapes and scope inference
//! - [`notify`] — change notifications for live viewers
//! - [`config`] — TOML configuration
//! - [`model`] — domain types
//! - [`error`] — Error types

pub mod availability;
pub mod config;
pub mod conflict;
pub mod error;
pub mod expander;
pub mod model;
pub mod notify;
pub mod request;
pub mod service;
pub mod store;

pub use availability::CalendarItem;
pub use config::EngineConfig;
pub use conflict::{find_conflicts, find_overlaps, Conflict};
pub use error::TeamcalError;
pub use expander::generate_dates;
pub use model::{Actor, AvailabilityStatus, Frequency, RecurrencePattern, WeekdayCode};
pub use notify::{BroadcastNotifier, ChangeNotifier, NoopNotifier, TracingNotifier};
pub use request::{CreateAvailability, CreateOutcome, Scope, UpdateAvailability};
pub use service::AvailabilityService;
pub use store::AvailabilityStore;
