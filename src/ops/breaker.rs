use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        })
    }
}

/// Failure-tracking guard for one remote dependency.
///
/// Pure state machine: no clocks, no timers, no I/O. The owner passes
/// `now_ms` into every call and reports call outcomes back; transitions
/// to half-open happen lazily when the state is next observed.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    open_ms: i64,
    failure_count: u32,
    state: BreakerState,
    open_until_ms: i64,
    half_open_probe_consumed: bool,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_ms: i64) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            open_ms: open_ms.max(1),
            failure_count: 0,
            state: BreakerState::Closed,
            open_until_ms: 0,
            half_open_probe_consumed: false,
        }
    }

    fn move_to_half_open(&mut self, now_ms: i64) {
        if self.state == BreakerState::Open && now_ms >= self.open_until_ms {
            self.state = BreakerState::HalfOpen;
            self.half_open_probe_consumed = false;
        }
    }

    pub fn is_open(&mut self, now_ms: i64) -> bool {
        self.move_to_half_open(now_ms);
        self.state == BreakerState::Open
    }

    /// In half-open, permits exactly one trial call: the first caller
    /// gets `true` and consumes the probe, everyone else gets `false`
    /// until the probe outcome is reported.
    pub fn can_probe(&mut self, now_ms: i64) -> bool {
        self.move_to_half_open(now_ms);
        if self.state != BreakerState::HalfOpen {
            return false;
        }
        if self.half_open_probe_consumed {
            return false;
        }
        self.half_open_probe_consumed = true;
        true
    }

    pub fn record_success(&mut self) {
        self.failure_count = 0;
        self.state = BreakerState::Closed;
        self.open_until_ms = 0;
        self.half_open_probe_consumed = false;
    }

    pub fn record_failure(&mut self, now_ms: i64) {
        // Any failure while open or half-open reopens immediately; the
        // threshold only applies to the closed state.
        if self.state == BreakerState::HalfOpen || self.state == BreakerState::Open {
            self.state = BreakerState::Open;
            self.open_until_ms = now_ms + self.open_ms;
            self.half_open_probe_consumed = false;
            return;
        }

        self.failure_count += 1;
        if self.failure_count >= self.failure_threshold {
            self.state = BreakerState::Open;
            self.open_until_ms = now_ms + self.open_ms;
            self.half_open_probe_consumed = false;
        }
    }

    pub fn open_until(&self) -> i64 {
        self.open_until_ms
    }

    pub fn state(&mut self, now_ms: i64) -> BreakerState {
        self.move_to_half_open(now_ms);
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let mut breaker = CircuitBreaker::new(3, 60_000);
        breaker.record_failure(0);
        breaker.record_failure(0);
        assert_eq!(breaker.state(0), BreakerState::Closed);
        breaker.record_failure(0);
        assert_eq!(breaker.state(0), BreakerState::Open);
        assert!(breaker.is_open(0));
        assert_eq!(breaker.open_until(), 60_000);
    }

    #[test]
    fn success_resets_the_failure_count() {
        let mut breaker = CircuitBreaker::new(3, 60_000);
        breaker.record_failure(0);
        breaker.record_failure(0);
        breaker.record_success();
        breaker.record_failure(0);
        breaker.record_failure(0);
        assert_eq!(breaker.state(0), BreakerState::Closed);
    }

    #[test]
    fn half_open_allows_exactly_one_probe() {
        let mut breaker = CircuitBreaker::new(1, 60_000);
        breaker.record_failure(0);
        assert!(breaker.is_open(59_999));

        // Deadline passed: lazily half-open, one probe only.
        assert!(!breaker.is_open(60_000));
        assert_eq!(breaker.state(60_000), BreakerState::HalfOpen);
        assert!(breaker.can_probe(60_000));
        assert!(!breaker.can_probe(60_000));
    }

    #[test]
    fn failed_probe_reopens_immediately() {
        let mut breaker = CircuitBreaker::new(5, 60_000);
        for _ in 0..5 {
            breaker.record_failure(0);
        }
        assert!(breaker.can_probe(60_000));
        // One failure is enough here even though the threshold is 5.
        breaker.record_failure(60_000);
        assert_eq!(breaker.state(60_000), BreakerState::Open);
        assert_eq!(breaker.open_until(), 120_000);
    }

    #[test]
    fn successful_probe_closes_and_zeroes_counters() {
        let mut breaker = CircuitBreaker::new(1, 60_000);
        breaker.record_failure(0);
        assert!(breaker.can_probe(60_000));
        breaker.record_success();
        assert_eq!(breaker.state(60_000), BreakerState::Closed);
        assert!(!breaker.is_open(60_000));
        // Needs a full threshold run again to reopen.
        breaker.record_failure(60_001);
        assert_eq!(breaker.state(60_001), BreakerState::Open);
    }
}
