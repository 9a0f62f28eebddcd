//! Event summarizer
//!
//! Reduces legacy per-evaluation event batches (schema < 3) to the
//! summarized form modern SDKs produce themselves: one summary event with
//! a counter per distinct (flag, version, variation, value) tuple, one
//! index event per referenced flag, and identify/custom/alias events
//! passed through verbatim.
//!
//! The transform is stateless and deterministic for a given batch, and it
//! is the identity on input that is already at schema 3 or later.

use std::collections::BTreeMap;

use serde_json::value::RawValue;
use serde_json::{Map, Value, json};

use crate::{EventRecords, SUMMARY_SCHEMA_VERSION};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct CounterKey {
    flag_key: String,
    /// `None` when the SDK did not know the flag ("unknown" evaluation)
    version: Option<u64>,
    variation: Option<i64>,
    /// Canonical JSON of the evaluation value
    value: String,
}

#[derive(Debug)]
struct CounterEntry {
    value: Value,
    default: Value,
    count: u64,
}

/// Summarize one legacy batch received at `payload_version` (1 or 2)
///
/// Output order is deterministic: index events sorted by flag key, then
/// non-feature events in input order, then the summary event.
pub fn summarize(records: &EventRecords, payload_version: i64) -> EventRecords {
    if payload_version >= SUMMARY_SCHEMA_VERSION {
        return records.clone();
    }

    let mut counters: BTreeMap<CounterKey, CounterEntry> = BTreeMap::new();
    let mut flag_versions: BTreeMap<String, u64> = BTreeMap::new();
    let mut passthrough: Vec<Box<RawValue>> = Vec::new();
    let mut start_date: Option<u64> = None;
    let mut end_date: Option<u64> = None;

    for raw in records {
        let event: Value = match serde_json::from_str(raw.get()) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "skipping undecodable legacy event");
                continue;
            }
        };

        match event.get("kind").and_then(Value::as_str) {
            Some("feature") => {
                if let Some(date) = event.get("creationDate").and_then(Value::as_u64) {
                    start_date = Some(start_date.map_or(date, |d| d.min(date)));
                    end_date = Some(end_date.map_or(date, |d| d.max(date)));
                }
                tally(&mut counters, &mut flag_versions, &event);
            }
            // already-summarized or unknown kinds pass through untouched,
            // which also makes re-application at schema 3 the identity
            _ => passthrough.push(raw.clone()),
        }
    }

    tracing::debug!(
        payload_version,
        features = counters.len(),
        passthrough = passthrough.len(),
        "summarized legacy event batch"
    );

    let mut out: EventRecords = Vec::new();
    for (key, version) in &flag_versions {
        out.push(to_raw(json!({
            "kind": "index",
            "key": key,
            "version": version,
        })));
    }
    out.extend(passthrough);
    if !counters.is_empty() {
        out.push(to_raw(summary_event(counters, start_date, end_date)));
    }
    out
}

fn tally(
    counters: &mut BTreeMap<CounterKey, CounterEntry>,
    flag_versions: &mut BTreeMap<String, u64>,
    event: &Value,
) {
    let Some(flag_key) = event.get("key").and_then(Value::as_str) else {
        tracing::warn!("feature event without a flag key, skipping");
        return;
    };

    let version = event.get("version").and_then(Value::as_u64);
    let variation = event.get("variation").and_then(Value::as_i64);
    let value = event.get("value").cloned().unwrap_or(Value::Null);
    let default = event.get("default").cloned().unwrap_or(Value::Null);

    if let Some(v) = version {
        let known = flag_versions.entry(flag_key.to_string()).or_insert(v);
        *known = (*known).max(v);
    }

    let key = CounterKey {
        flag_key: flag_key.to_string(),
        version,
        variation,
        value: value.to_string(),
    };
    let entry = counters.entry(key).or_insert(CounterEntry {
        value,
        default,
        count: 0,
    });
    match entry.count.checked_add(1) {
        Some(next) => entry.count = next,
        None => {
            tracing::warn!(flag_key, "summary counter saturated");
            entry.count = u64::MAX;
        }
    }
}

fn summary_event(
    counters: BTreeMap<CounterKey, CounterEntry>,
    start_date: Option<u64>,
    end_date: Option<u64>,
) -> Value {
    let mut features: Map<String, Value> = Map::new();

    for (key, entry) in counters {
        let feature = features
            .entry(key.flag_key.clone())
            .or_insert_with(|| json!({"default": entry.default, "counters": []}));

        let mut counter = Map::new();
        if let Some(version) = key.version {
            counter.insert("version".into(), json!(version));
        } else {
            counter.insert("unknown".into(), json!(true));
        }
        if let Some(variation) = key.variation {
            counter.insert("variation".into(), json!(variation));
        }
        counter.insert("value".into(), entry.value);
        counter.insert("count".into(), json!(entry.count));

        feature["counters"]
            .as_array_mut()
            .expect("counters is always an array")
            .push(Value::Object(counter));
    }

    json!({
        "kind": "summary",
        "startDate": start_date.unwrap_or(0),
        "endDate": end_date.unwrap_or(0),
        "features": features,
    })
}

fn to_raw(value: Value) -> Box<RawValue> {
    RawValue::from_string(value.to_string()).expect("serialized JSON is valid")
}

#[cfg(test)]
#[path = "summarizer_test.rs"]
mod tests;
