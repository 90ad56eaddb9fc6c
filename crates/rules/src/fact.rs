//! Time-bounded fact memory.
//!
//! A fact becomes valid `valid_delay` after it was recorded and expires at
//! `valid_until`. Reading the memory evicts expired facts as a side effect,
//! handing each one to the caller exactly once.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ripple_core::sync::lock;
use ripple_core::{Event, NodeId, Notification, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactKind {
    DataUpdate,
    Event,
}

/// An immutable observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub name: String,
    pub value: Value,
    pub kind: FactKind,
}

impl Fact {
    pub fn data(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
            kind: FactKind::DataUpdate,
        }
    }

    pub fn event(event: &Event) -> Self {
        Self {
            name: event.kind.clone(),
            value: serde_json::to_value(event).unwrap_or(Value::Null),
            kind: FactKind::Event,
        }
    }

    /// Attribute and property writes are data updates; events are events.
    pub fn from_notification(notification: &Notification) -> Self {
        match notification {
            Notification::Attribute { name, value } => Self::data(name.clone(), value.clone()),
            Notification::Property { label, value } => Self::data(label.clone(), value.clone()),
            Notification::Event(event) => Self::event(event),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedFact {
    pub fact: Fact,
    pub source: NodeId,
    pub created_at: DateTime<Utc>,
    pub valid_delay: Duration,
    pub valid_until: DateTime<Utc>,
}

impl CachedFact {
    pub fn new(
        fact: Fact,
        source: NodeId,
        created_at: DateTime<Utc>,
        valid_delay: Duration,
        valid_for: Duration,
    ) -> Self {
        let valid_until = offset(created_at, valid_for);
        Self {
            fact,
            source,
            created_at,
            valid_delay,
            valid_until,
        }
    }

    pub fn valid_from(&self) -> DateTime<Utc> {
        offset(self.created_at, self.valid_delay)
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.valid_from() && now < self.valid_until
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.valid_until
    }
}

fn offset(t: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(d)
        .ok()
        .and_then(|d| t.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Facts accumulated by a rule since the last clear.
#[derive(Debug, Default)]
pub struct FactMemory {
    facts: Mutex<Vec<CachedFact>>,
}

impl FactMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, fact: CachedFact) {
        lock(&self.facts).push(fact);
    }

    /// Facts valid at `now`. Expired facts are evicted and passed to
    /// `on_expired` after the memory lock is released.
    pub fn facts_at(&self, now: DateTime<Utc>, mut on_expired: impl FnMut(&CachedFact)) -> Vec<CachedFact> {
        let (valid, expired) = {
            let mut facts = lock(&self.facts);
            let (expired, kept): (Vec<_>, Vec<_>) =
                facts.drain(..).partition(|f| f.is_expired_at(now));
            *facts = kept;
            let valid: Vec<CachedFact> = facts.iter().filter(|f| f.is_valid_at(now)).cloned().collect();
            (valid, expired)
        };
        for fact in &expired {
            on_expired(fact);
        }
        valid
    }

    pub fn clear(&self) {
        lock(&self.facts).clear();
    }

    /// Stored facts, including ones not yet valid or already expired.
    pub fn len(&self) -> usize {
        lock(&self.facts).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.facts).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
    }

    fn cached(name: &str, created: i64, delay_ms: u64, valid_ms: u64) -> CachedFact {
        CachedFact::new(
            Fact::data(name, json!(1)),
            Uuid::new_v4(),
            at(created),
            Duration::from_millis(delay_ms),
            Duration::from_millis(valid_ms),
        )
    }

    #[test]
    fn validity_window() {
        let f = cached("t", 0, 100, 1_000);
        assert!(!f.is_valid_at(at(50)));
        assert!(f.is_valid_at(at(100)));
        assert!(f.is_valid_at(at(999)));
        assert!(!f.is_valid_at(at(1_000)));
        assert!(f.is_expired_at(at(1_000)));
        assert!(!f.is_expired_at(at(999)));
    }

    #[test]
    fn read_evicts_expired_exactly_once() {
        let memory = FactMemory::new();
        memory.push(cached("short", 0, 0, 100));
        memory.push(cached("long", 0, 0, 10_000));

        let mut expired = Vec::new();
        let valid = memory.facts_at(at(500), |f| expired.push(f.fact.name.clone()));
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].fact.name, "long");
        assert_eq!(expired, vec!["short".to_string()]);
        assert_eq!(memory.len(), 1);

        let mut again = 0;
        memory.facts_at(at(600), |_| again += 1);
        assert_eq!(again, 0);
    }

    #[test]
    fn pending_facts_are_kept_but_not_returned() {
        let memory = FactMemory::new();
        memory.push(cached("later", 0, 1_000, 5_000));
        assert!(memory.facts_at(at(10), |_| {}).is_empty());
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.facts_at(at(1_500), |_| {}).len(), 1);
    }

    #[test]
    fn notifications_become_facts() {
        let property = Notification::Property { label: "temp".into(), value: json!(21) };
        let fact = Fact::from_notification(&property);
        assert_eq!(fact.kind, FactKind::DataUpdate);
        assert_eq!(fact.name, "temp");

        let event = Event::new("alarm", Uuid::new_v4()).with_message("too hot");
        let fact = Fact::from_notification(&Notification::Event(event));
        assert_eq!(fact.kind, FactKind::Event);
        assert_eq!(fact.name, "alarm");
        assert_eq!(fact.value["message"], json!("too hot"));
    }

    #[test]
    fn clear_empties_memory() {
        let memory = FactMemory::new();
        memory.push(cached("a", 0, 0, 100));
        memory.clear();
        assert!(memory.is_empty());
    }
}
