use super::model::{HealthMap, PoolSnapshot, Upstream};
use std::sync::Arc;

/// Supplies the raw, unfiltered pool configuration. Implemented by the
/// enclosing application's real config layer; a file-backed default lives in
/// `crate::config`. Deliberately not a singleton (§9 Design Note) — the
/// `Proxy` is constructed with one injected at startup, which is also what
/// makes it trivial to swap in a test double.
pub trait ConfigProvider: Send + Sync {
    /// Returns the current ordered list of upstreams. Must be non-blocking
    /// and return an owned copy, never a live reference, so that a snapshot
    /// taken from it is immune to subsequent registry mutation.
    fn snapshot_pool(&self) -> Vec<Upstream>;

    /// Loopback port to bind the Acceptor on.
    fn port(&self) -> u16;

    /// Per-attempt upstream timeout, in seconds, clamped to [10, 600] by the
    /// provider itself.
    fn request_timeout_seconds(&self) -> u64;
}

/// Calls the `ConfigProvider` once and filters the result down to the
/// upstreams eligible for dispatch, sorted by `static_priority` ascending.
/// This is the only place invalid upstreams are dropped — once a
/// `PoolSnapshot` exists, every member of it is known-valid.
pub fn capture_snapshot(provider: &dyn ConfigProvider) -> PoolSnapshot {
    let mut upstreams: Vec<Upstream> = provider
        .snapshot_pool()
        .into_iter()
        .filter(Upstream::is_valid)
        .collect();

    upstreams.sort_by_key(|u| u.static_priority);

    PoolSnapshot::new(upstreams)
}

/// The registry pairs a `ConfigProvider` with the process-lifetime
/// `HealthMap`. It holds no pool state of its own beyond the health
/// penalties — the pool membership itself is always re-read from the
/// provider at snapshot time, so registry mutations made by the provider
/// (the user editing the pool in the settings window) are visible to the
/// very next request without any explicit invalidation step.
pub struct PoolRegistry {
    provider: Arc<dyn ConfigProvider>,
    health: HealthMap,
}

impl PoolRegistry {
    pub fn new(provider: Arc<dyn ConfigProvider>) -> Self {
        Self {
            provider,
            health: HealthMap::new(),
        }
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        capture_snapshot(self.provider.as_ref())
    }

    pub fn health(&self) -> &HealthMap {
        &self.health
    }

    pub fn port(&self) -> u16 {
        self.provider.port()
    }

    pub fn request_timeout_seconds(&self) -> u64 {
        self.provider.request_timeout_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    struct FixedProvider(Vec<Upstream>);

    impl ConfigProvider for FixedProvider {
        fn snapshot_pool(&self) -> Vec<Upstream> {
            self.0.clone()
        }
        fn port(&self) -> u16 {
            32000
        }
        fn request_timeout_seconds(&self) -> u64 {
            120
        }
    }

    fn upstream(name: &str, priority: i64, valid: bool) -> Upstream {
        Upstream {
            id: Uuid::new_v4(),
            name: name.into(),
            base_url: "http://up/".into(),
            credential: if valid { "k".into() } else { String::new() },
            static_priority: priority,
        }
    }

    #[test]
    fn filters_invalid_and_sorts_by_priority() {
        let provider = FixedProvider(vec![
            upstream("b", 1, true),
            upstream("bad", 0, false),
            upstream("a", -5, true),
        ]);
        let snapshot = capture_snapshot(&provider);
        let names: Vec<&str> = snapshot.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn empty_provider_yields_empty_snapshot() {
        let provider = FixedProvider(vec![]);
        let snapshot = capture_snapshot(&provider);
        assert!(snapshot.is_empty());
    }
}
