//! Network quiescence tracking.
//!
//! A page counts as rendered once its navigation has committed and no more
//! than `max_inflight` requests have been outstanding for a full `window`.
//! The load event is not required: a hung subresource would otherwise hold
//! it back forever.

use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::ScrapeConfig;

/// When the network counts as quiet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdlePolicy {
    pub max_inflight: usize,
    pub window: Duration,
}

impl Default for IdlePolicy {
    fn default() -> Self {
        Self {
            max_inflight: 2,
            window: Duration::from_millis(500),
        }
    }
}

impl From<&ScrapeConfig> for IdlePolicy {
    fn from(config: &ScrapeConfig) -> Self {
        Self {
            max_inflight: config.idle_max_inflight,
            window: config.idle_window(),
        }
    }
}

/// Request bookkeeping fed from `Network.*` and `Page.*` events.
#[derive(Debug)]
pub struct NetworkIdle {
    inflight: HashSet<String>,
    committed: bool,
    last_change: Instant,
}

impl NetworkIdle {
    pub fn new(now: Instant) -> Self {
        Self {
            inflight: HashSet::new(),
            committed: false,
            last_change: now,
        }
    }

    /// Feed one DevTools event.
    pub fn observe(&mut self, method: &str, params: &Value, now: Instant) {
        let request_id = params.get("requestId").and_then(Value::as_str);
        match (method, request_id) {
            ("Network.requestWillBeSent", Some(id)) => {
                self.inflight.insert(id.to_string());
            }
            ("Network.loadingFinished" | "Network.loadingFailed", Some(id)) => {
                self.inflight.remove(id);
            }
            ("Page.frameNavigated", _) if is_main_frame(params) => {
                self.committed = true;
            }
            ("Page.loadEventFired", _) => {
                self.committed = true;
            }
            _ => return,
        }
        self.last_change = now;
    }

    /// Mark the navigation as committed without waiting for an event.
    pub fn commit(&mut self, now: Instant) {
        if !self.committed {
            self.committed = true;
            self.last_change = now;
        }
    }

    pub fn inflight(&self) -> usize {
        self.inflight.len()
    }

    /// Moment the page becomes quiet if nothing else happens, or `None` while
    /// nothing has committed yet or it is too busy.
    pub fn quiet_at(&self, policy: &IdlePolicy) -> Option<Instant> {
        if self.committed && self.inflight.len() <= policy.max_inflight {
            Some(self.last_change + policy.window)
        } else {
            None
        }
    }

    pub fn is_quiet(&self, now: Instant, policy: &IdlePolicy) -> bool {
        self.quiet_at(policy).map_or(false, |at| now >= at)
    }
}

fn is_main_frame(params: &Value) -> bool {
    params
        .get("frame")
        .map_or(false, |frame| frame.get("parentId").is_none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(id: &str) -> Value {
        json!({ "requestId": id })
    }

    #[test]
    fn test_not_quiet_before_commit() {
        let start = Instant::now();
        let idle = NetworkIdle::new(start);
        let policy = IdlePolicy::default();
        assert!(idle.quiet_at(&policy).is_none());
        assert!(!idle.is_quiet(start + Duration::from_secs(10), &policy));
    }

    #[test]
    fn test_quiet_after_window_with_few_requests() {
        let start = Instant::now();
        let policy = IdlePolicy::default();
        let mut idle = NetworkIdle::new(start);

        idle.observe("Network.requestWillBeSent", &request("1"), start);
        idle.observe("Network.requestWillBeSent", &request("2"), start);
        let loaded_at = start + Duration::from_millis(100);
        idle.observe("Page.loadEventFired", &json!({}), loaded_at);

        assert_eq!(idle.inflight(), 2);
        assert_eq!(idle.quiet_at(&policy), Some(loaded_at + policy.window));
        assert!(!idle.is_quiet(loaded_at + Duration::from_millis(499), &policy));
        assert!(idle.is_quiet(loaded_at + Duration::from_millis(500), &policy));
    }

    #[test]
    fn test_busy_network_blocks_quiet() {
        let start = Instant::now();
        let policy = IdlePolicy::default();
        let mut idle = NetworkIdle::new(start);

        idle.observe("Page.loadEventFired", &json!({}), start);
        for id in ["a", "b", "c"] {
            idle.observe("Network.requestWillBeSent", &request(id), start);
        }
        assert!(idle.quiet_at(&policy).is_none());

        let later = start + Duration::from_millis(300);
        idle.observe("Network.loadingFailed", &request("b"), later);
        assert_eq!(idle.quiet_at(&policy), Some(later + policy.window));
    }

    #[test]
    fn test_redirects_reuse_request_id() {
        let start = Instant::now();
        let mut idle = NetworkIdle::new(start);
        idle.observe("Network.requestWillBeSent", &request("1"), start);
        idle.observe("Network.requestWillBeSent", &request("1"), start);
        idle.observe("Network.loadingFinished", &request("1"), start);
        assert_eq!(idle.inflight(), 0);
    }

    #[test]
    fn test_unrelated_events_do_not_reset_window() {
        let start = Instant::now();
        let policy = IdlePolicy::default();
        let mut idle = NetworkIdle::new(start);
        idle.observe("Page.loadEventFired", &json!({}), start);
        idle.observe(
            "Network.dataReceived",
            &request("1"),
            start + Duration::from_millis(400),
        );
        assert_eq!(idle.quiet_at(&policy), Some(start + policy.window));
    }

    #[test]
    fn test_hung_subresource_does_not_block_quiet() {
        let start = Instant::now();
        let policy = IdlePolicy::default();
        let mut idle = NetworkIdle::new(start);

        idle.observe("Network.requestWillBeSent", &request("doc"), start);
        idle.observe("Page.frameNavigated", &json!({ "frame": { "id": "main" } }), start);
        let settled = start + Duration::from_millis(200);
        idle.observe("Network.requestWillBeSent", &request("img"), settled);
        idle.observe("Network.loadingFinished", &request("doc"), settled);

        assert_eq!(idle.inflight(), 1);
        assert_eq!(idle.quiet_at(&policy), Some(settled + policy.window));
        assert!(idle.is_quiet(settled + policy.window, &policy));
    }

    #[test]
    fn test_child_frame_navigation_does_not_commit() {
        let start = Instant::now();
        let mut idle = NetworkIdle::new(start);
        idle.observe(
            "Page.frameNavigated",
            &json!({ "frame": { "id": "ad", "parentId": "main" } }),
            start,
        );
        assert!(idle.quiet_at(&IdlePolicy::default()).is_none());

        idle.commit(start + Duration::from_millis(50));
        assert_eq!(
            idle.quiet_at(&IdlePolicy::default()),
            Some(start + Duration::from_millis(550))
        );
    }
}
