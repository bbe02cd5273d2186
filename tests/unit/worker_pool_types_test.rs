//! Tests for pool identifiers, outcomes, stats, and channel value types

use prometheus_task_engine::core::{
    Capacity, Payload, PoolStats, TaskFault, UnitId, UnitOutcome,
};
use serde_json::json;

#[test]
fn test_unit_ids_are_unique_and_ordered() {
    let first = UnitId::next();
    let second = UnitId::next();
    assert_ne!(first, second);
    assert!(first < second);
    assert_eq!(format!("{}", first), format!("unit-{}", first.as_u64()));
}

#[test]
fn test_unit_id_serializes_as_number() {
    let id = UnitId::next();
    let json = serde_json::to_value(id).unwrap();
    assert_eq!(json, json!(id.as_u64()));
    let back: UnitId = serde_json::from_value(json).unwrap();
    assert_eq!(back, id);
}

#[test]
fn test_only_finished_is_success() {
    assert!(UnitOutcome::Finished(json!(1)).is_success());
    assert!(!UnitOutcome::Failed(TaskFault::msg("x")).is_success());
    assert!(!UnitOutcome::TimedOut.is_success());
    assert!(!UnitOutcome::Signaled(9).is_success());
}

#[test]
fn test_pool_stats_default_and_json() {
    let stats = PoolStats::default();
    assert_eq!(stats.in_progress, 0);
    assert_eq!(stats.submitted, 0);

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["finished"], json!(0));
    assert_eq!(json["timed_out"], json!(0));
}

#[test]
fn test_capacity_serde_names() {
    assert_eq!(serde_json::to_value(Capacity::Infinite).unwrap(), json!("infinite"));
    assert_eq!(
        serde_json::to_value(Capacity::Buffered(4)).unwrap(),
        json!({"buffered": 4})
    );
    let parsed: Capacity = serde_json::from_value(json!("unbuffered")).unwrap();
    assert_eq!(parsed, Capacity::default());
}

#[test]
fn test_payload_views() {
    let bytes = Payload::from(vec![0xff, 0x00]);
    assert_eq!(bytes.as_bytes(), &[0xff, 0x00]);
    assert_eq!(bytes.as_str(), None);

    let text = Payload::from("line");
    assert_eq!(text.as_bytes(), b"line");
    assert_eq!(text.as_str(), Some("line"));
}
