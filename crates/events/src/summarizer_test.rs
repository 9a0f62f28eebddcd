//! Tests for legacy event summarization

use super::*;
use serde_json::Value;

fn records(raw: &[&str]) -> EventRecords {
    raw.iter()
        .map(|s| RawValue::from_string(s.to_string()).unwrap())
        .collect()
}

fn parse_all(records: &EventRecords) -> Vec<Value> {
    records
        .iter()
        .map(|r| serde_json::from_str(r.get()).unwrap())
        .collect()
}

fn find_kind<'a>(events: &'a [Value], kind: &str) -> Vec<&'a Value> {
    events
        .iter()
        .filter(|e| e.get("kind").and_then(Value::as_str) == Some(kind))
        .collect()
}

const FEATURE_A_V1: &str = r#"{"kind":"feature","creationDate":1000,"key":"flag-a","version":3,"variation":1,"value":true,"default":false,"userKey":"u1"}"#;

#[test]
fn two_identical_evaluations_become_count_2() {
    let input = records(&[FEATURE_A_V1, FEATURE_A_V1]);
    let out = summarize(&input, 1);
    let events = parse_all(&out);

    let summaries = find_kind(&events, "summary");
    assert_eq!(summaries.len(), 1);
    let counters = &summaries[0]["features"]["flag-a"]["counters"];
    assert_eq!(counters.as_array().unwrap().len(), 1);
    assert_eq!(counters[0]["count"], 2);
    assert_eq!(counters[0]["version"], 3);
    assert_eq!(counters[0]["variation"], 1);
    assert_eq!(counters[0]["value"], true);
}

#[test]
fn distinct_variations_get_separate_counters() {
    let other = r#"{"kind":"feature","creationDate":1001,"key":"flag-a","version":3,"variation":0,"value":false,"default":false,"userKey":"u2"}"#;
    let input = records(&[FEATURE_A_V1, other]);
    let out = summarize(&input, 1);
    let events = parse_all(&out);

    let summary = find_kind(&events, "summary")[0];
    let counters = summary["features"]["flag-a"]["counters"].as_array().unwrap();
    assert_eq!(counters.len(), 2);
    assert!(counters.iter().all(|c| c["count"] == 1));
}

#[test]
fn index_event_carries_latest_known_version() {
    let newer = r#"{"kind":"feature","creationDate":1002,"key":"flag-a","version":5,"variation":1,"value":true,"default":false}"#;
    let input = records(&[FEATURE_A_V1, newer]);
    let out = summarize(&input, 1);
    let events = parse_all(&out);

    let index = find_kind(&events, "index");
    assert_eq!(index.len(), 1);
    assert_eq!(index[0]["key"], "flag-a");
    assert_eq!(index[0]["version"], 5);
}

#[test]
fn unknown_flag_counter_is_marked_unknown() {
    let unknown = r#"{"kind":"feature","creationDate":1000,"key":"missing","value":null,"default":null}"#;
    let out = summarize(&records(&[unknown]), 2);
    let events = parse_all(&out);

    let summary = find_kind(&events, "summary")[0];
    let counters = summary["features"]["missing"]["counters"].as_array().unwrap();
    assert_eq!(counters[0]["unknown"], true);
    assert!(counters[0].get("version").is_none());
}

#[test]
fn identify_and_custom_pass_through_verbatim() {
    let identify = r#"{"kind":"identify","creationDate":1,"user":{"key":"u1"}}"#;
    let custom = r#"{"kind":"custom","creationDate":2,"key":"click","user":{"key":"u1"}}"#;
    let input = records(&[identify, FEATURE_A_V1, custom]);
    let out = summarize(&input, 1);

    // exact raw bytes preserved for pass-through kinds
    let raw: Vec<&str> = out.iter().map(|r| r.get()).collect();
    assert!(raw.contains(&identify));
    assert!(raw.contains(&custom));
}

#[test]
fn summary_dates_span_the_batch() {
    let early = r#"{"kind":"feature","creationDate":500,"key":"flag-a","version":3,"variation":1,"value":true,"default":false}"#;
    let input = records(&[FEATURE_A_V1, early]);
    let out = summarize(&input, 1);
    let events = parse_all(&out);

    let summary = find_kind(&events, "summary")[0];
    assert_eq!(summary["startDate"], 500);
    assert_eq!(summary["endDate"], 1000);
}

#[test]
fn deterministic_for_a_given_batch() {
    let other = r#"{"kind":"feature","creationDate":900,"key":"flag-b","version":1,"variation":0,"value":"x","default":"y"}"#;
    let input = records(&[FEATURE_A_V1, other, FEATURE_A_V1]);

    let a: Vec<String> = summarize(&input, 1).iter().map(|r| r.get().into()).collect();
    let b: Vec<String> = summarize(&input, 1).iter().map(|r| r.get().into()).collect();
    assert_eq!(a, b);
}

#[test]
fn reapplying_at_schema_3_is_identity() {
    let input = records(&[FEATURE_A_V1, FEATURE_A_V1]);
    let once = summarize(&input, 1);
    let twice = summarize(&once, SUMMARY_SCHEMA_VERSION);

    let once_raw: Vec<&str> = once.iter().map(|r| r.get()).collect();
    let twice_raw: Vec<&str> = twice.iter().map(|r| r.get()).collect();
    assert_eq!(once_raw, twice_raw);
}

#[test]
fn summary_and_index_kinds_survive_legacy_reapplication() {
    // a mislabeled legacy batch that already contains summarized kinds
    // must not be double-counted
    let input = records(&[FEATURE_A_V1]);
    let once = summarize(&input, 1);
    let again = summarize(&once, 1);

    let events = parse_all(&again);
    assert_eq!(find_kind(&events, "summary").len(), 1);
    assert_eq!(find_kind(&events, "index").len(), 1);
}

#[test]
fn empty_batch_summarizes_to_nothing() {
    let out = summarize(&records(&[]), 1);
    assert!(out.is_empty());
}
