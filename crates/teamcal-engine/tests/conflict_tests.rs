//! Tests for conflict detection.

use chrono::{NaiveDate, NaiveTime};
use teamcal_engine::conflict::{describe_conflicts, Candidate};
use teamcal_engine::model::{Instance, InstanceState, TimeRange};
use teamcal_engine::store::{self, AvailabilityStore};
use teamcal_engine::{find_conflicts, find_overlaps, AvailabilityStatus};
use uuid::Uuid;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn candidate(date: NaiveDate, start: NaiveTime, end: NaiveTime) -> Candidate {
    Candidate {
        date,
        range: TimeRange::new(start, end),
    }
}

fn instance(user_id: Uuid, date: NaiveDate, start: NaiveTime, end: NaiveTime) -> Instance {
    Instance {
        id: Uuid::new_v4(),
        rule_id: None,
        user_id,
        instance_date: date,
        time_start: start,
        time_end: end,
        status: AvailabilityStatus::Busy,
        description: Some("standup".to_string()),
        state: InstanceState::Generated,
    }
}

#[test]
fn partial_overlap_detected() {
    let user = Uuid::new_v4();
    let existing = vec![instance(user, d(2024, 1, 3), t(9, 30), t(10, 30))];
    let conflicts = find_overlaps(&[candidate(d(2024, 1, 3), t(9, 0), t(10, 0))], &existing);

    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].date, d(2024, 1, 3));
    assert_eq!(conflicts[0].existing_status, AvailabilityStatus::Busy);
    assert_eq!(conflicts[0].existing_description.as_deref(), Some("standup"));
}

#[test]
fn touching_boundaries_do_not_conflict() {
    let user = Uuid::new_v4();
    let existing = vec![
        instance(user, d(2024, 1, 3), t(8, 0), t(9, 0)),
        instance(user, d(2024, 1, 3), t(10, 0), t(11, 0)),
    ];
    let conflicts = find_overlaps(&[candidate(d(2024, 1, 3), t(9, 0), t(10, 0))], &existing);
    assert!(conflicts.is_empty());
}

#[test]
fn containment_is_a_conflict() {
    let user = Uuid::new_v4();
    let existing = vec![instance(user, d(2024, 1, 3), t(9, 15), t(9, 45))];
    let conflicts = find_overlaps(&[candidate(d(2024, 1, 3), t(9, 0), t(10, 0))], &existing);
    assert_eq!(conflicts.len(), 1);
}

#[test]
fn different_dates_do_not_conflict() {
    let user = Uuid::new_v4();
    let existing = vec![instance(user, d(2024, 1, 4), t(9, 0), t(10, 0))];
    let conflicts = find_overlaps(&[candidate(d(2024, 1, 3), t(9, 0), t(10, 0))], &existing);
    assert!(conflicts.is_empty());
}

#[test]
fn one_conflict_per_overlapping_pair() {
    let user = Uuid::new_v4();
    let existing = vec![
        instance(user, d(2024, 1, 3), t(8, 30), t(9, 30)),
        instance(user, d(2024, 1, 3), t(9, 45), t(11, 0)),
    ];
    let conflicts = find_overlaps(&[candidate(d(2024, 1, 3), t(9, 0), t(10, 0))], &existing);
    assert_eq!(conflicts.len(), 2);
    assert!(conflicts.iter().all(|c| c.date == d(2024, 1, 3)));
}

#[test]
fn tombstones_never_conflict() {
    let user = Uuid::new_v4();
    let mut deleted = instance(user, d(2024, 1, 3), t(9, 0), t(10, 0));
    deleted.state = InstanceState::Tombstoned;
    let conflicts = find_overlaps(&[candidate(d(2024, 1, 3), t(9, 0), t(10, 0))], &[deleted]);
    assert!(conflicts.is_empty());
}

#[test]
fn seconds_are_part_of_the_comparison() {
    let user = Uuid::new_v4();
    let existing = vec![instance(
        user,
        d(2024, 1, 3),
        NaiveTime::from_hms_opt(9, 59, 30).unwrap(),
        t(11, 0),
    )];
    let conflicts = find_overlaps(&[candidate(d(2024, 1, 3), t(9, 0), t(10, 0))], &existing);
    assert_eq!(conflicts.len(), 1);
}

#[test]
fn summary_format() {
    let user = Uuid::new_v4();
    let existing = vec![instance(user, d(2024, 1, 3), t(9, 0), t(10, 0))];
    let conflicts = find_overlaps(&[candidate(d(2024, 1, 3), t(9, 0), t(10, 0))], &existing);
    assert_eq!(conflicts[0].summary(), "2024-01-03: 09:00–10:00 overlaps");
}

#[test]
fn describe_truncates_with_marker() {
    let user = Uuid::new_v4();
    let existing: Vec<Instance> = (1..=4)
        .map(|day| instance(user, d(2024, 1, day), t(9, 0), t(10, 0)))
        .collect();
    let candidates: Vec<Candidate> = (1..=4)
        .map(|day| candidate(d(2024, 1, day), t(9, 0), t(10, 0)))
        .collect();
    let conflicts = find_overlaps(&candidates, &existing);

    let details = describe_conflicts(&conflicts, 2);
    assert_eq!(
        details,
        "2024-01-01: 09:00–10:00 overlaps, 2024-01-02: 09:00–10:00 overlaps and more..."
    );
    assert!(!describe_conflicts(&conflicts, 10).ends_with("and more..."));
}

#[test]
fn persisted_instances_of_other_users_are_ignored() {
    let mut store = AvailabilityStore::open_in_memory().unwrap();
    let alice = store::register_user(&mut store, "Alice", "alice@example.com", None).unwrap();
    let bob = store::register_user(&mut store, "Bob", "bob@example.com", None).unwrap();

    store::insert_instance(store.conn(), &instance(bob.id, d(2024, 1, 3), t(9, 0), t(10, 0))).unwrap();

    let slot = [candidate(d(2024, 1, 3), t(9, 0), t(10, 0))];
    assert!(find_conflicts(store.conn(), alice.id, &slot).unwrap().is_empty());
    assert_eq!(find_conflicts(store.conn(), bob.id, &slot).unwrap().len(), 1);
}

#[test]
fn persisted_tombstones_are_ignored() {
    let mut store = AvailabilityStore::open_in_memory().unwrap();
    let alice = store::register_user(&mut store, "Alice", "alice@example.com", None).unwrap();

    let row = instance(alice.id, d(2024, 1, 3), t(9, 0), t(10, 0));
    store::insert_instance(store.conn(), &row).unwrap();
    store::tombstone_instance(store.conn(), row.id).unwrap();

    let slot = [candidate(d(2024, 1, 3), t(9, 30), t(10, 30))];
    assert!(find_conflicts(store.conn(), alice.id, &slot).unwrap().is_empty());
}
