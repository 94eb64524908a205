//! Debounced highlight refresh, at most one pending per host.
//!
//! The scheduler owns no timers. The caller stamps changes with
//! [`Instant::now`] and polls [`RefreshScheduler::take_due`] from whatever
//! event loop it has.

use std::collections::HashMap;
use std::time::Duration;

use web_time::Instant;

use crate::config::OverlayConfig;
use crate::dom::NodeId;

#[derive(Debug, Clone)]
pub struct RefreshScheduler {
    delay: Duration,
    pending: HashMap<NodeId, Instant>,
}

impl RefreshScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: HashMap::new(),
        }
    }

    pub fn from_config(config: &OverlayConfig) -> Self {
        Self::new(config.refresh_delay())
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule a refresh of `host` one delay after `now`.
    ///
    /// Replaces a pending refresh for the same host. Returns true if one was replaced.
    pub fn schedule(&mut self, host: NodeId, now: Instant) -> bool {
        let replaced = self.pending.insert(host, now + self.delay).is_some();
        tracing::trace!(target: "weaver::refresh", %host, replaced, "scheduled refresh");
        replaced
    }

    /// Drop the pending refresh for `host`. Returns whether one was pending.
    pub fn cancel(&mut self, host: NodeId) -> bool {
        self.pending.remove(&host).is_some()
    }

    pub fn is_pending(&self, host: NodeId) -> bool {
        self.pending.contains_key(&host)
    }

    /// Earliest pending deadline, for arming a single timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    /// Remove and return every host whose deadline is at or before `now`, in deadline order.
    pub fn take_due(&mut self, now: Instant) -> Vec<NodeId> {
        let mut due: Vec<(Instant, NodeId)> = self
            .pending
            .iter()
            .filter(|&(_, &deadline)| deadline <= now)
            .map(|(&host, &deadline)| (deadline, host))
            .collect();
        due.sort();
        for (_, host) in &due {
            self.pending.remove(host);
        }
        if !due.is_empty() {
            tracing::debug!(target: "weaver::refresh", count = due.len(), "refreshes due");
        }
        due.into_iter().map(|(_, host)| host).collect()
    }
}

impl Default for RefreshScheduler {
    fn default() -> Self {
        Self::from_config(&OverlayConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;

    #[test]
    fn test_reschedule_replaces_pending() {
        let mut doc = Document::new();
        let host = doc.element("div");
        let mut scheduler = RefreshScheduler::new(Duration::from_millis(100));
        let t0 = Instant::now();

        assert!(!scheduler.schedule(host, t0));
        assert!(scheduler.schedule(host, t0 + Duration::from_millis(80)));

        // The first deadline has passed, but it was replaced.
        assert!(scheduler.take_due(t0 + Duration::from_millis(120)).is_empty());
        assert_eq!(scheduler.take_due(t0 + Duration::from_millis(180)), vec![host]);
        assert!(!scheduler.is_pending(host));
    }

    #[test]
    fn test_due_in_deadline_order() {
        let mut doc = Document::new();
        let a = doc.element("div");
        let b = doc.element("div");
        let mut scheduler = RefreshScheduler::new(Duration::from_millis(50));
        let t0 = Instant::now();

        scheduler.schedule(b, t0);
        scheduler.schedule(a, t0 + Duration::from_millis(10));
        assert_eq!(scheduler.next_deadline(), Some(t0 + Duration::from_millis(50)));
        assert_eq!(scheduler.take_due(t0 + Duration::from_millis(100)), vec![b, a]);
        assert_eq!(scheduler.next_deadline(), None);
    }

    #[test]
    fn test_cancel() {
        let mut doc = Document::new();
        let host = doc.element("div");
        let mut scheduler = RefreshScheduler::default();
        assert_eq!(scheduler.delay(), Duration::from_millis(250));

        scheduler.schedule(host, Instant::now());
        assert!(scheduler.cancel(host));
        assert!(!scheduler.cancel(host));
        assert!(scheduler.take_due(Instant::now() + Duration::from_secs(1)).is_empty());
    }
}
