//! Per-circuit elapsed-time tracking driven by the sequencer tick.

use core::time::Duration;

/// Elapsed time of the transition a circuit is currently running.
///
/// The timer only advances when the sequencer feeds it a tick period, so its
/// resolution is whatever period the host runtime uses.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TransitionTimer {
    elapsed: Option<Duration>,
}

impl TransitionTimer {
    /// Timer with no transition in progress.
    pub const fn idle() -> Self {
        Self { elapsed: None }
    }

    /// Restarts the timer at zero.
    pub fn start(&mut self) {
        self.elapsed = Some(Duration::ZERO);
    }

    /// Stops the timer and forgets the elapsed time.
    pub fn stop(&mut self) {
        self.elapsed = None;
    }

    /// Returns `true` while a transition is being timed.
    pub const fn is_running(&self) -> bool {
        self.elapsed.is_some()
    }

    /// Time spent in the current transition, if one is running.
    pub const fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    /// Time left until `limit` is reached, if one is running.
    pub fn remaining(&self, limit: Duration) -> Option<Duration> {
        self.elapsed.map(|elapsed| limit.saturating_sub(elapsed))
    }

    /// Adds `period` to a running timer and reports whether `limit` has been reached.
    ///
    /// An idle timer never completes.
    pub fn advance(&mut self, period: Duration, limit: Duration) -> bool {
        match self.elapsed.as_mut() {
            Some(elapsed) => {
                *elapsed = elapsed.saturating_add(period);
                *elapsed >= limit
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_timer_never_completes() {
        let mut timer = TransitionTimer::idle();
        assert!(!timer.advance(Duration::from_secs(10), Duration::from_millis(1)));
        assert_eq!(timer.elapsed(), None);
    }

    #[test]
    fn completes_once_limit_is_reached() {
        let mut timer = TransitionTimer::idle();
        timer.start();

        let period = Duration::from_millis(100);
        let limit = Duration::from_millis(300);
        assert!(!timer.advance(period, limit));
        assert!(!timer.advance(period, limit));
        assert_eq!(timer.remaining(limit), Some(Duration::from_millis(100)));
        assert!(timer.advance(period, limit));
        assert_eq!(timer.elapsed(), Some(limit));
    }

    #[test]
    fn restart_resets_elapsed() {
        let mut timer = TransitionTimer::idle();
        timer.start();
        timer.advance(Duration::from_millis(250), Duration::from_secs(1));
        timer.start();
        assert_eq!(timer.elapsed(), Some(Duration::ZERO));
        timer.stop();
        assert!(!timer.is_running());
    }
}
