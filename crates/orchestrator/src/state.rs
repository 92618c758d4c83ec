//! Per-URL run state tracking

use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{info, warn};

use parade_common::{AuditError, RunSummary, UrlState};

#[derive(Default)]
struct Inner {
    order: Vec<String>,
    states: HashMap<String, UrlState>,
}

/// Records the lifecycle of every URL in discovery order.
///
/// Transitions only move forward: `Pending → InProgress → Success | Failure`.
/// A transition that would go backwards is refused and logged.
#[derive(Default)]
pub struct StateTracker {
    inner: RwLock<Inner>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_pending(&self, url: &str) -> bool {
        self.transition(url, UrlState::Pending)
    }

    pub fn mark_in_progress(&self, url: &str) -> bool {
        self.transition(url, UrlState::InProgress)
    }

    pub fn mark_success(&self, url: &str) -> bool {
        self.transition(url, UrlState::Success)
    }

    pub fn mark_failure(&self, url: &str, error: AuditError) -> bool {
        self.transition(url, UrlState::Failure(error))
    }

    fn transition(&self, url: &str, next: UrlState) -> bool {
        let mut inner = self.inner.write();
        match inner.states.get_mut(url) {
            Some(current) if current.can_transition_to(&next) => {
                *current = next;
                true
            }
            Some(current) => {
                warn!(url, from = %current, to = %next, "refusing state regression");
                false
            }
            None => {
                inner.order.push(url.to_string());
                inner.states.insert(url.to_string(), next);
                true
            }
        }
    }

    #[must_use]
    pub fn get(&self, url: &str) -> Option<UrlState> {
        self.inner.read().states.get(url).cloned()
    }

    /// Every URL with its state, in the order first seen.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, UrlState)> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|url| Some((url.clone(), inner.states.get(url)?.clone())))
            .collect()
    }

    #[must_use]
    pub fn summary(&self) -> RunSummary {
        let inner = self.inner.read();
        let mut summary = RunSummary {
            total: inner.order.len(),
            ..RunSummary::default()
        };
        for state in inner.states.values() {
            match state {
                UrlState::Pending => summary.pending += 1,
                UrlState::InProgress => summary.in_progress += 1,
                UrlState::Success => summary.succeeded += 1,
                UrlState::Failure(_) => summary.failed += 1,
            }
        }
        summary
    }

    pub fn log_summary(&self) {
        let summary = self.summary();
        info!("Run Summary:");
        info!("  Total pages: {}", summary.total);
        info!("  Succeeded: {}", summary.succeeded);
        info!("  Failed: {}", summary.failed);
        if summary.pending + summary.in_progress > 0 {
            info!("  Unfinished: {}", summary.pending + summary.in_progress);
        }
        if summary.succeeded + summary.failed > 0 {
            info!("  Success rate: {:.1}%", summary.success_rate());
        }
        for (url, state) in self.snapshot() {
            if let UrlState::Failure(error) = state {
                warn!(%url, "failed: {error}");
            }
        }
    }
}
