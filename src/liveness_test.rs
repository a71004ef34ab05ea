use super::*;
use serde_json::json;

const TIMEOUT: i64 = 60_000;

#[test]
fn attachment_serializes_to_wire_shape() {
    let value = Attachment::stamped(1_234).to_value();
    assert_eq!(value, json!({"lastPongAt": 1_234}));
}

#[test]
fn attachment_round_trips() {
    let original = Attachment::stamped(now_ms());
    let restored = Attachment::from_value(&original.to_value()).expect("decode");
    assert_eq!(restored, original);
}

#[test]
fn empty_object_decodes_without_stamp() {
    let att = Attachment::from_value(&json!({})).expect("decode");
    assert!(att.last_pong_at.is_none());
}

#[test]
fn malformed_values_fail_to_decode() {
    assert!(Attachment::from_value(&json!({"lastPongAt": "soon"})).is_none());
    assert!(Attachment::from_value(&json!(null)).is_none());
    assert!(Attachment::from_value(&json!([1, 2, 3])).is_none());
}

#[test]
fn fresh_stamp_keeps() {
    let now = 100_000;
    let verdict = assess(Some(Attachment::stamped(now - 30_000)), now, TIMEOUT);
    assert_eq!(verdict, SweepVerdict::Keep);
}

#[test]
fn stale_stamp_evicts() {
    let now = 100_000;
    let verdict = assess(Some(Attachment::stamped(now - 90_000)), now, TIMEOUT);
    assert_eq!(verdict, SweepVerdict::Evict);
}

#[test]
fn age_exactly_at_timeout_keeps() {
    // Eviction requires age strictly greater than the timeout.
    let now = 100_000;
    let verdict = assess(Some(Attachment::stamped(now - TIMEOUT)), now, TIMEOUT);
    assert_eq!(verdict, SweepVerdict::Keep);
}

#[test]
fn missing_or_malformed_stamp_heals_instead_of_evicting() {
    assert_eq!(assess(None, 100_000, TIMEOUT), SweepVerdict::Heal);
    assert_eq!(assess(Some(Attachment { last_pong_at: None }), 100_000, TIMEOUT), SweepVerdict::Heal);
}

#[test]
fn now_ms_is_monotonic_enough() {
    let a = now_ms();
    let b = now_ms();
    assert!(a > 0);
    assert!(b >= a);
}
