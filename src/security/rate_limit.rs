//! Per-IP connection spacing over a rolling window.
//!
//! Every attempt is recorded. An attempt arriving sooner than the minimum
//! spacing after the previous one inside the window is a violation; the
//! caller decides what to do about it (the listener bans).

use std::collections::VecDeque;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Window length and minimum spacing in effect for a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub window: Duration,
    pub min_spacing: Duration,
}

/// Outcome of recording one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateVerdict {
    Allowed,
    Violation,
}

/// Recent attempt timestamps keyed by IP.
///
/// Checks for the same IP serialize on the map entry, so two racing attempts
/// always see each other's timestamp.
#[derive(Debug, Default)]
pub struct RateWindow {
    attempts: DashMap<IpAddr, VecDeque<Instant>>,
}

impl RateWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, ip: IpAddr, policy: RatePolicy) -> RateVerdict {
        self.check_at(ip, policy, Instant::now())
    }

    pub fn check_at(&self, ip: IpAddr, policy: RatePolicy, now: Instant) -> RateVerdict {
        let mut entry = self.attempts.entry(ip).or_default();
        let times = entry.value_mut();

        while let Some(&oldest) = times.front() {
            if now.saturating_duration_since(oldest) > policy.window {
                times.pop_front();
            } else {
                break;
            }
        }

        let verdict = match times.back() {
            Some(&last) if now.saturating_duration_since(last) < policy.min_spacing => {
                RateVerdict::Violation
            }
            _ => RateVerdict::Allowed,
        };
        times.push_back(now);

        if verdict == RateVerdict::Violation {
            tracing::warn!(ip = %ip, attempts = times.len(), "Connection spacing violated");
        }
        verdict
    }

    /// Attempts currently remembered for `ip`.
    pub fn attempts(&self, ip: IpAddr) -> usize {
        self.attempts.get(&ip).map_or(0, |times| times.len())
    }

    /// Drop IPs whose newest attempt has left the window.
    pub fn sweep(&self, now: Instant, window: Duration) -> usize {
        let before = self.attempts.len();
        self.attempts.retain(|_, times| {
            times
                .back()
                .is_some_and(|&last| now.saturating_duration_since(last) <= window)
        });
        before - self.attempts.len()
    }

    pub fn forget(&self, ip: IpAddr) {
        self.attempts.remove(&ip);
    }

    pub fn tracked_ips(&self) -> usize {
        self.attempts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: RatePolicy = RatePolicy {
        window: Duration::from_secs(5),
        min_spacing: Duration::from_millis(200),
    };

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn first_attempt_always_allowed() {
        let window = RateWindow::new();
        assert_eq!(
            window.check_at(ip("1.2.3.4"), POLICY, Instant::now()),
            RateVerdict::Allowed
        );
    }

    #[test]
    fn rapid_attempts_violate() {
        let window = RateWindow::new();
        let start = Instant::now();
        let target = ip("1.2.3.4");

        let verdicts: Vec<_> = (0..3)
            .map(|i| window.check_at(target, POLICY, start + Duration::from_millis(50 * i)))
            .collect();

        assert_eq!(
            verdicts,
            vec![RateVerdict::Allowed, RateVerdict::Violation, RateVerdict::Violation]
        );
        assert_eq!(window.attempts(target), 3);
    }

    #[test]
    fn spaced_attempts_allowed() {
        let window = RateWindow::new();
        let start = Instant::now();
        let target = ip("1.2.3.4");

        for i in 0..5 {
            assert_eq!(
                window.check_at(target, POLICY, start + Duration::from_millis(250 * i)),
                RateVerdict::Allowed
            );
        }
    }

    #[test]
    fn spacing_exactly_at_minimum_is_allowed() {
        let window = RateWindow::new();
        let start = Instant::now();
        let target = ip("1.2.3.4");

        window.check_at(target, POLICY, start);
        assert_eq!(
            window.check_at(target, POLICY, start + POLICY.min_spacing),
            RateVerdict::Allowed
        );
    }

    #[test]
    fn old_attempts_are_pruned() {
        let window = RateWindow::new();
        let start = Instant::now();
        let target = ip("1.2.3.4");

        window.check_at(target, POLICY, start);
        window.check_at(target, POLICY, start + Duration::from_secs(1));
        window.check_at(target, POLICY, start + Duration::from_secs(7));

        assert_eq!(window.attempts(target), 1);
    }

    #[test]
    fn distinct_ips_do_not_interfere() {
        let window = RateWindow::new();
        let now = Instant::now();

        assert_eq!(window.check_at(ip("1.1.1.1"), POLICY, now), RateVerdict::Allowed);
        assert_eq!(window.check_at(ip("2.2.2.2"), POLICY, now), RateVerdict::Allowed);
    }

    #[test]
    fn sweep_drops_idle_ips() {
        let window = RateWindow::new();
        let start = Instant::now();

        window.check_at(ip("1.1.1.1"), POLICY, start);
        window.check_at(ip("2.2.2.2"), POLICY, start + Duration::from_secs(4));

        assert_eq!(window.sweep(start + Duration::from_secs(6), POLICY.window), 1);
        assert_eq!(window.tracked_ips(), 1);

        window.forget(ip("2.2.2.2"));
        assert_eq!(window.tracked_ips(), 0);
    }
}
