use crate::pool::Upstream;
use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// The small, in-process record the menu layer polls or subscribes to (§9
/// Design Note: publish-subscribe, never inverted so the UI drives the
/// proxy). Each field is its own lock-free cell — `ArcSwapOption` for the
/// two fields with non-trivial payloads, following the same pattern the
/// teacher uses for `ClusterState::discovered_nodes` — so a reader never
/// blocks behind the Dispatcher's writer, matching §5's "no reader holds a
/// lock across I/O" rule (there's no lock to hold at all).
pub struct ObservableState {
    current_upstream: ArcSwapOption<Upstream>,
    is_requesting: AtomicBool,
    last_success: ArcSwapOption<(Upstream, u64)>,
}

impl ObservableState {
    pub fn new() -> Self {
        Self {
            current_upstream: ArcSwapOption::empty(),
            is_requesting: AtomicBool::new(false),
            last_success: ArcSwapOption::empty(),
        }
    }

    pub fn set_current_upstream(&self, upstream: Option<Upstream>) {
        self.current_upstream.store(upstream.map(Arc::new));
    }

    pub fn current_upstream(&self) -> Option<Upstream> {
        self.current_upstream.load_full().map(|u| (*u).clone())
    }

    pub fn set_requesting(&self, requesting: bool) {
        self.is_requesting.store(requesting, Ordering::Release);
    }

    pub fn is_requesting(&self) -> bool {
        self.is_requesting.load(Ordering::Acquire)
    }

    pub fn record_success(&self, upstream: Upstream) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.last_success.store(Some(Arc::new((upstream, now))));
    }

    /// Returns `(upstream, unix_timestamp_secs)` of the most recent success,
    /// or `None` if no dispatch has ever succeeded.
    pub fn last_success(&self) -> Option<(Upstream, u64)> {
        self.last_success.load_full().map(|pair| (*pair).clone())
    }
}

impl Default for ObservableState {
    fn default() -> Self {
        Self::new()
    }
}
