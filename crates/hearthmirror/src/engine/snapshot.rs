use std::collections::HashMap;

use serde_json::Value;
use tokio::time::Instant;

/// Outcome of comparing an incoming device record with the cached snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Classification {
    /// Same content as the last rendered state
    Unchanged,
    /// No prior snapshot for this device id
    FirstSeen,
    /// Content differs from the last rendered state
    Changed,
}

#[derive(Debug, Clone)]
struct SnapshotEntry {
    /// Canonical serialization of the last rendered record
    serialized: String,

    /// When the current highlight should be removed, if one is showing
    flash_deadline: Option<Instant>,
}

/// Last rendered state per device id.
///
/// Entries are created on first observation and overwritten on every change; they are never
/// removed while the client runs.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    entries: HashMap<String, SnapshotEntry>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(&self, device_id: &str, serialized: &str) -> Classification {
        match self.entries.get(device_id) {
            None => Classification::FirstSeen,
            Some(entry) if entry.serialized == serialized => Classification::Unchanged,
            Some(_) => Classification::Changed,
        }
    }

    /// Record `serialized` as the last rendered state. A pending flash deadline is kept.
    pub fn store(&mut self, device_id: &str, serialized: String) {
        match self.entries.get_mut(device_id) {
            Some(entry) => entry.serialized = serialized,
            None => {
                self.entries.insert(
                    device_id.to_string(),
                    SnapshotEntry {
                        serialized,
                        flash_deadline: None,
                    },
                );
            }
        }
    }

    pub fn get(&self, device_id: &str) -> Option<&str> {
        self.entries.get(device_id).map(|e| e.serialized.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Set (or restart) the highlight deadline of a cached device.
    pub fn arm_flash(&mut self, device_id: &str, deadline: Instant) {
        if let Some(entry) = self.entries.get_mut(device_id) {
            entry.flash_deadline = Some(deadline);
        }
    }

    pub fn flash_deadline(&self, device_id: &str) -> Option<Instant> {
        self.entries.get(device_id).and_then(|e| e.flash_deadline)
    }

    /// Earliest pending highlight deadline across all devices.
    pub fn next_flash_deadline(&self) -> Option<Instant> {
        self.entries.values().filter_map(|e| e.flash_deadline).min()
    }

    /// Disarm and return every device whose highlight deadline is at or before `now`.
    pub fn take_expired_flashes(&mut self, now: Instant) -> Vec<String> {
        let mut expired = Vec::new();
        for (id, entry) in self.entries.iter_mut() {
            if entry.flash_deadline.is_some_and(|d| d <= now) {
                entry.flash_deadline = None;
                expired.push(id.clone());
            }
        }
        expired.sort();
        expired
    }
}

/// Serialize `value` with object keys in sorted order at every level, so two records with the
/// same content always produce the same string.
///
/// Keys are re-inserted in sorted order, which holds whether or not serde_json's `preserve_order`
/// feature is switched on by another crate in the build.
pub fn canonical_json(value: &Value) -> String {
    sorted(value).to_string()
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.clone(), sorted(value)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        scalar => scalar.clone(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    #[test]
    fn test_canonical_json_ignores_key_order() {
        let a: Value = serde_json::from_str(r#"{"is_on":true,"mode":"cool","nested":{"b":1,"a":2}}"#)
            .unwrap();
        let b: Value = serde_json::from_str(r#"{"nested":{"a":2,"b":1},"mode":"cool","is_on":true}"#)
            .unwrap();
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(
            canonical_json(&a),
            r#"{"is_on":true,"mode":"cool","nested":{"a":2,"b":1}}"#
        );
    }

    #[test]
    fn test_canonical_json_sorts_keys_inside_arrays() {
        let mut record = serde_json::Map::new();
        record.insert("z".to_string(), json!(1));
        record.insert("a".to_string(), json!([{ "y": null, "b": 2.5 }]));

        assert_eq!(
            canonical_json(&Value::Object(record)),
            r#"{"a":[{"b":2.5,"y":null}],"z":1}"#
        );
    }

    #[test]
    fn test_canonical_json_distinguishes_content() {
        assert_ne!(
            canonical_json(&json!({ "is_on": true })),
            canonical_json(&json!({ "is_on": false }))
        );
        assert_ne!(
            canonical_json(&json!({ "temperature": 22 })),
            canonical_json(&json!({ "temperature": "22" }))
        );
    }

    #[test]
    fn test_classify_lifecycle() {
        let mut cache = SnapshotCache::new();
        assert_eq!(cache.classify("ac", "a"), Classification::FirstSeen);

        cache.store("ac", "a".to_string());
        assert_eq!(cache.classify("ac", "a"), Classification::Unchanged);
        assert_eq!(cache.classify("ac", "b"), Classification::Changed);

        cache.store("ac", "b".to_string());
        assert_eq!(cache.get("ac"), Some("b"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flash_deadline_restarts() {
        let mut cache = SnapshotCache::new();
        cache.store("ac", "a".to_string());

        let start = Instant::now();
        cache.arm_flash("ac", start + Duration::from_millis(1200));
        cache.arm_flash("ac", start + Duration::from_millis(2000));
        assert_eq!(
            cache.next_flash_deadline(),
            Some(start + Duration::from_millis(2000))
        );

        assert!(cache
            .take_expired_flashes(start + Duration::from_millis(1500))
            .is_empty());
        assert_eq!(
            cache.take_expired_flashes(start + Duration::from_millis(2000)),
            vec!["ac".to_string()]
        );
        assert_eq!(cache.next_flash_deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_flash_ignores_unknown_device() {
        let mut cache = SnapshotCache::new();
        cache.arm_flash("ghost", Instant::now());
        assert!(cache.is_empty());
        assert_eq!(cache.next_flash_deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_keeps_pending_flash() {
        let mut cache = SnapshotCache::new();
        cache.store("ac", "a".to_string());
        let deadline = Instant::now() + Duration::from_millis(1200);
        cache.arm_flash("ac", deadline);
        cache.store("ac", "b".to_string());
        assert_eq!(cache.flash_deadline("ac"), Some(deadline));
    }
}
