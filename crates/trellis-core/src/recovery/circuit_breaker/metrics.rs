//! Time-windowed call, failure and transition logs

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::types::{FailureRecord, StateTransition};

const MAX_CALL_RECORDS: usize = 1000;
const MAX_FAILURE_RECORDS: usize = 1000;
const MAX_TRANSITIONS: usize = 100;

#[derive(Debug, Clone, Copy)]
struct CallRecord {
    at: Instant,
    success: bool,
    response_time: Duration,
}

/// Bounded ring buffers backing a circuit's rate calculations
#[derive(Debug, Default)]
pub(super) struct BreakerMetrics {
    calls: VecDeque<CallRecord>,
    failures: VecDeque<(Instant, FailureRecord)>,
    transitions: VecDeque<StateTransition>,
}

fn push_bounded<T>(buf: &mut VecDeque<T>, item: T, cap: usize) {
    if buf.len() == cap {
        buf.pop_front();
    }
    buf.push_back(item);
}

impl BreakerMetrics {
    pub(super) fn record_call(&mut self, success: bool, response_time: Duration) {
        push_bounded(
            &mut self.calls,
            CallRecord {
                at: Instant::now(),
                success,
                response_time,
            },
            MAX_CALL_RECORDS,
        );
    }

    pub(super) fn record_failure(&mut self, record: FailureRecord) {
        push_bounded(
            &mut self.failures,
            (Instant::now(), record),
            MAX_FAILURE_RECORDS,
        );
    }

    pub(super) fn record_transition(&mut self, transition: StateTransition) {
        push_bounded(&mut self.transitions, transition, MAX_TRANSITIONS);
    }

    fn recent_calls(&self, window: Duration) -> impl Iterator<Item = &CallRecord> {
        let now = Instant::now();
        self.calls
            .iter()
            .filter(move |c| now.saturating_duration_since(c.at) <= window)
    }

    pub(super) fn call_count(&self, window: Duration) -> usize {
        self.recent_calls(window).count()
    }

    pub(super) fn failure_rate(&self, window: Duration) -> f64 {
        let (total, failed) = self
            .recent_calls(window)
            .fold((0usize, 0usize), |(t, f), c| (t + 1, f + usize::from(!c.success)));
        if total == 0 {
            0.0
        } else {
            failed as f64 / total as f64
        }
    }

    pub(super) fn slow_call_rate(&self, window: Duration, threshold: Duration) -> f64 {
        let (total, slow) = self.recent_calls(window).fold((0usize, 0usize), |(t, s), c| {
            (t + 1, s + usize::from(c.response_time > threshold))
        });
        if total == 0 {
            0.0
        } else {
            slow as f64 / total as f64
        }
    }

    pub(super) fn avg_response_time(&self, window: Duration) -> Duration {
        let (total, sum) = self
            .recent_calls(window)
            .fold((0u32, Duration::ZERO), |(t, s), c| (t + 1, s + c.response_time));
        if total == 0 {
            Duration::ZERO
        } else {
            sum / total
        }
    }

    pub(super) fn recent_failure_count(&self, window: Duration) -> usize {
        let now = Instant::now();
        self.failures
            .iter()
            .filter(|(at, _)| now.saturating_duration_since(*at) <= window)
            .count()
    }

    /// Newest failures first
    pub(super) fn failures(&self, limit: usize) -> Vec<FailureRecord> {
        self.failures
            .iter()
            .rev()
            .take(limit)
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Newest transitions first
    pub(super) fn transitions(&self, limit: usize) -> Vec<StateTransition> {
        self.transitions.iter().rev().take(limit).cloned().collect()
    }

    pub(super) fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub(super) fn clear(&mut self) {
        self.calls.clear();
        self.failures.clear();
        self.transitions.clear();
    }
}
