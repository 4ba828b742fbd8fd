//! Latching circuit breaker: accumulates error reports and fires a
//! callback exactly once when the threshold is reached, then latches so
//! further calls are no-ops until `reset()`.

use parking_lot::Mutex;

struct State {
    count: u32,
    reason: Option<String>,
}

pub struct KillSwitch {
    threshold: u32,
    on_trigger: Box<dyn Fn(&str) + Send + Sync>,
    state: Mutex<State>,
}

impl KillSwitch {
    pub fn new(threshold: u32, on_trigger: impl Fn(&str) + Send + Sync + 'static) -> Self {
        KillSwitch {
            threshold,
            on_trigger: Box::new(on_trigger),
            state: Mutex::new(State {
                count: 0,
                reason: None,
            }),
        }
    }

    /// Records an error; fires the trigger callback exactly once when the
    /// cumulative count reaches `threshold`. Once tripped, further calls are
    /// no-ops until `reset()`.
    pub fn record_error(&self, reason: &str) {
        let mut state = self.state.lock();
        if state.reason.is_some() {
            return;
        }
        state.count += 1;
        if state.count >= self.threshold {
            state.reason = Some(reason.to_string());
            (self.on_trigger)(reason);
        }
    }

    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.count = 0;
        state.reason = None;
    }

    pub fn tripped(&self) -> bool {
        self.state.lock().reason.is_some()
    }

    pub fn reason(&self) -> Option<String> {
        self.state.lock().reason.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn fires_exactly_once_at_threshold() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        let switch = KillSwitch::new(3, move |_reason| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });
        switch.record_error("a");
        switch.record_error("b");
        assert!(!switch.tripped());
        switch.record_error("c");
        assert!(switch.tripped());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_clears_tripped_state() {
        let switch = KillSwitch::new(1, |_| {});
        switch.record_error("boom");
        assert!(switch.tripped());
        switch.reset();
        assert!(!switch.tripped());
        assert!(switch.reason().is_none());
    }

    #[test]
    fn stays_latched_across_further_errors_without_reset() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        let switch = KillSwitch::new(2, move |_reason| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });
        switch.record_error("a");
        switch.record_error("b");
        switch.record_error("c");
        switch.record_error("d");
        switch.record_error("e");
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reason_reflects_the_triggering_error() {
        let switch = KillSwitch::new(1, |_| {});
        switch.record_error("feed disconnect");
        assert_eq!(switch.reason().as_deref(), Some("feed disconnect"));
    }
}
