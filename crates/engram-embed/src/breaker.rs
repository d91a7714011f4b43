// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Circuit breaker for the embedding service.
//!
//! The state machine is plain data transitioned by pure functions taking an
//! explicit `now`, so it is unit-testable without real clocks or network
//! calls. [`CircuitBreaker`] adds the mutex and metrics around it.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

/// Breaker tuning.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Failures within the rolling window that open the circuit.
    pub failure_threshold: u32,
    /// Rolling window over which failures are counted.
    pub window: Duration,
    /// How long the circuit stays open before a single probe is allowed.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window: Duration::from_secs(60),
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Breaker states. `HalfOpen` admits exactly one probe call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

/// Whether a call may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Reject,
}

/// The breaker's mutable state: timestamps and counters as plain data.
#[derive(Debug)]
pub struct BreakerData {
    state: BreakerState,
    /// Instants of recent failures, pruned to the rolling window.
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    /// When the outstanding half-open probe was admitted.
    probe_issued_at: Option<Instant>,
}

impl BreakerData {
    pub fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            failures: VecDeque::new(),
            opened_at: None,
            probe_issued_at: None,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }
}

impl Default for BreakerData {
    fn default() -> Self {
        Self::new()
    }
}

/// Decide whether a call may pass, transitioning `Open -> HalfOpen` once
/// the cooldown has elapsed. In `HalfOpen`, only the single probe passes;
/// the probe holds its lease for one cooldown, so a probe whose caller
/// never reports back frees the slot instead of wedging the breaker.
pub fn decide(data: &mut BreakerData, config: &BreakerConfig, now: Instant) -> Decision {
    match data.state {
        BreakerState::Closed => Decision::Allow,
        BreakerState::Open => {
            let elapsed = data
                .opened_at
                .map(|at| now.duration_since(at))
                .unwrap_or(Duration::ZERO);
            if elapsed >= config.cooldown {
                data.state = BreakerState::HalfOpen;
                data.probe_issued_at = Some(now);
                Decision::Allow
            } else {
                Decision::Reject
            }
        }
        BreakerState::HalfOpen => match data.probe_issued_at {
            Some(issued) if now.duration_since(issued) < config.cooldown => Decision::Reject,
            _ => {
                data.probe_issued_at = Some(now);
                Decision::Allow
            }
        },
    }
}

/// Record a successful call. A successful probe closes the circuit; in
/// `Closed`, the failure window resets.
pub fn record_success(data: &mut BreakerData) {
    match data.state {
        BreakerState::HalfOpen => {
            data.state = BreakerState::Closed;
            data.failures.clear();
            data.opened_at = None;
            data.probe_issued_at = None;
        }
        BreakerState::Closed => {
            data.failures.clear();
        }
        BreakerState::Open => {}
    }
}

/// Record a failed call. A failed probe reopens the circuit; in `Closed`,
/// the failure is added to the rolling window and the circuit opens once
/// the threshold is reached.
pub fn record_failure(data: &mut BreakerData, config: &BreakerConfig, now: Instant) {
    match data.state {
        BreakerState::HalfOpen => {
            data.state = BreakerState::Open;
            data.opened_at = Some(now);
            data.probe_issued_at = None;
        }
        BreakerState::Closed => {
            data.failures.push_back(now);
            while let Some(front) = data.failures.front() {
                if now.duration_since(*front) > config.window {
                    data.failures.pop_front();
                } else {
                    break;
                }
            }
            if data.failures.len() >= config.failure_threshold as usize {
                data.state = BreakerState::Open;
                data.opened_at = Some(now);
                data.failures.clear();
            }
        }
        BreakerState::Open => {}
    }
}

/// Thread-safe circuit breaker wrapping the pure state machine.
pub struct CircuitBreaker {
    config: BreakerConfig,
    data: Mutex<BreakerData>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            data: Mutex::new(BreakerData::new()),
        }
    }

    /// Current state, for observability.
    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// Whether a call may proceed right now.
    pub fn check(&self) -> Decision {
        let mut data = self.lock();
        let before = data.state;
        let decision = decide(&mut data, &self.config, Instant::now());
        self.note_transition(before, data.state);
        decision
    }

    /// Report a successful call.
    pub fn on_success(&self) {
        let mut data = self.lock();
        let before = data.state;
        record_success(&mut data);
        self.note_transition(before, data.state);
    }

    /// Report a failed call.
    pub fn on_failure(&self) {
        let mut data = self.lock();
        let before = data.state;
        record_failure(&mut data, &self.config, Instant::now());
        self.note_transition(before, data.state);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerData> {
        // A poisoned lock means a panic mid-transition; the plain-data state
        // is still coherent, so recover the guard.
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn note_transition(&self, before: BreakerState, after: BreakerState) {
        if before != after {
            warn!(from = before.as_str(), to = after.as_str(), "circuit breaker transition");
            metrics::counter!(
                "engram_breaker_transitions_total",
                "from" => before.as_str(),
                "to" => after.as_str()
            )
            .increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 3,
            window: Duration::from_secs(10),
            cooldown: Duration::from_secs(5),
        }
    }

    #[test]
    fn closed_allows_calls() {
        let mut data = BreakerData::new();
        assert_eq!(decide(&mut data, &config(), Instant::now()), Decision::Allow);
        assert_eq!(data.state(), BreakerState::Closed);
    }

    #[test]
    fn opens_at_failure_threshold() {
        let config = config();
        let mut data = BreakerData::new();
        let now = Instant::now();
        record_failure(&mut data, &config, now);
        record_failure(&mut data, &config, now);
        assert_eq!(data.state(), BreakerState::Closed);
        record_failure(&mut data, &config, now);
        assert_eq!(data.state(), BreakerState::Open);
        assert_eq!(decide(&mut data, &config, now), Decision::Reject);
    }

    #[test]
    fn failures_outside_window_do_not_count() {
        let config = config();
        let mut data = BreakerData::new();
        let start = Instant::now();
        record_failure(&mut data, &config, start);
        record_failure(&mut data, &config, start);
        // Third failure lands after the first two have aged out.
        record_failure(&mut data, &config, start + Duration::from_secs(11));
        assert_eq!(data.state(), BreakerState::Closed);
    }

    #[test]
    fn success_resets_the_failure_window() {
        let config = config();
        let mut data = BreakerData::new();
        let now = Instant::now();
        record_failure(&mut data, &config, now);
        record_failure(&mut data, &config, now);
        record_success(&mut data);
        record_failure(&mut data, &config, now);
        assert_eq!(data.state(), BreakerState::Closed);
    }

    #[test]
    fn cooldown_admits_a_single_probe() {
        let config = config();
        let mut data = BreakerData::new();
        let start = Instant::now();
        for _ in 0..3 {
            record_failure(&mut data, &config, start);
        }
        assert_eq!(data.state(), BreakerState::Open);

        // Before cooldown: rejected.
        assert_eq!(
            decide(&mut data, &config, start + Duration::from_secs(1)),
            Decision::Reject
        );

        // After cooldown: exactly one probe passes.
        let after = start + Duration::from_secs(6);
        assert_eq!(decide(&mut data, &config, after), Decision::Allow);
        assert_eq!(data.state(), BreakerState::HalfOpen);
        assert_eq!(decide(&mut data, &config, after), Decision::Reject);
    }

    #[test]
    fn abandoned_probe_lease_expires() {
        let config = config();
        let mut data = BreakerData::new();
        let start = Instant::now();
        for _ in 0..3 {
            record_failure(&mut data, &config, start);
        }

        // Probe admitted after cooldown, but its caller never reports back.
        let probe_at = start + Duration::from_secs(6);
        assert_eq!(decide(&mut data, &config, probe_at), Decision::Allow);

        // While the lease holds, everything is rejected.
        assert_eq!(
            decide(&mut data, &config, probe_at + Duration::from_secs(4)),
            Decision::Reject
        );

        // One cooldown later the lease expires and a new probe passes.
        let retry_at = probe_at + Duration::from_secs(5);
        assert_eq!(decide(&mut data, &config, retry_at), Decision::Allow);
        assert_eq!(data.state(), BreakerState::HalfOpen);
        record_success(&mut data);
        assert_eq!(data.state(), BreakerState::Closed);
    }

    #[test]
    fn successful_probe_closes() {
        let config = config();
        let mut data = BreakerData::new();
        let start = Instant::now();
        for _ in 0..3 {
            record_failure(&mut data, &config, start);
        }
        decide(&mut data, &config, start + Duration::from_secs(6));
        record_success(&mut data);
        assert_eq!(data.state(), BreakerState::Closed);
        assert_eq!(decide(&mut data, &config, start), Decision::Allow);
    }

    #[test]
    fn failed_probe_reopens() {
        let config = config();
        let mut data = BreakerData::new();
        let start = Instant::now();
        for _ in 0..3 {
            record_failure(&mut data, &config, start);
        }
        let probe_at = start + Duration::from_secs(6);
        decide(&mut data, &config, probe_at);
        record_failure(&mut data, &config, probe_at);
        assert_eq!(data.state(), BreakerState::Open);

        // Cooldown restarts from the failed probe.
        assert_eq!(
            decide(&mut data, &config, probe_at + Duration::from_secs(1)),
            Decision::Reject
        );
        assert_eq!(
            decide(&mut data, &config, probe_at + Duration::from_secs(6)),
            Decision::Allow
        );
    }
}
