//! Banned IP registry.
//!
//! Entries carry an optional expiry; lookups treat anything past its expiry
//! as absent and drop it on the spot.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

/// A banned IP and when the ban ends. `None` means permanent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BannedIp {
    pub ip: IpAddr,
    pub expires_at: Option<Instant>,
}

impl BannedIp {
    /// Banned at or before the expiry instant, free strictly after it.
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }
}

/// Serializable view of a ban for the admin API.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BanInfo {
    pub ip: String,
    pub permanent: bool,
    pub remaining_secs: Option<u64>,
}

/// Shared registry of banned IPs.
#[derive(Debug, Default)]
pub struct BanRegistry {
    entries: Mutex<HashMap<IpAddr, BannedIp>>,
}

impl BanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_banned(&self, ip: IpAddr) -> bool {
        self.is_banned_at(ip, Instant::now())
    }

    pub fn is_banned_at(&self, ip: IpAddr, now: Instant) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(&ip) {
            Some(ban) if ban.is_expired(now) => {
                entries.remove(&ip);
                tracing::debug!(ip = %ip, "Ban expired");
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Ban `ip` for `duration`, or permanently when `None`. Replaces any
    /// existing entry for the same IP.
    pub fn ban(&self, ip: IpAddr, duration: Option<Duration>) {
        self.ban_at(ip, duration, Instant::now());
    }

    /// A duration too long for the clock to represent becomes permanent.
    pub fn ban_at(&self, ip: IpAddr, duration: Option<Duration>, now: Instant) {
        let expires_at = duration.and_then(|d| now.checked_add(d));
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(ip, BannedIp { ip, expires_at });
        tracing::info!(ip = %ip, duration = ?duration, "IP banned");
    }

    /// Remove the ban for `ip`. Returns whether an entry existed.
    pub fn unban(&self, ip: IpAddr) -> bool {
        let removed = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&ip)
            .is_some();
        if removed {
            tracing::info!(ip = %ip, "IP unbanned");
        }
        removed
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, ban| !ban.is_expired(now));
        before - entries.len()
    }

    /// Snapshot of the bans still in force.
    pub fn list(&self) -> Vec<BanInfo> {
        let now = Instant::now();
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut bans: Vec<BanInfo> = entries
            .values()
            .filter(|ban| !ban.is_expired(now))
            .map(|ban| BanInfo {
                ip: ban.ip.to_string(),
                permanent: ban.expires_at.is_none(),
                remaining_secs: ban
                    .expires_at
                    .map(|at| at.saturating_duration_since(now).as_secs()),
            })
            .collect();
        bans.sort_by(|a, b| a.ip.cmp(&b.ip));
        bans
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn ban_expires_strictly_after_deadline() {
        let registry = BanRegistry::new();
        let start = Instant::now();
        let target = ip("10.0.0.1");

        registry.ban_at(target, Some(Duration::from_secs(60)), start);

        assert!(registry.is_banned_at(target, start));
        assert!(registry.is_banned_at(target, start + Duration::from_secs(60)));
        assert!(!registry.is_banned_at(
            target,
            start + Duration::from_secs(60) + Duration::from_nanos(1)
        ));
        // The expired lookup removed the entry.
        assert!(registry.is_empty());
    }

    #[test]
    fn permanent_ban_never_expires() {
        let registry = BanRegistry::new();
        let start = Instant::now();
        let target = ip("10.0.0.2");

        registry.ban_at(target, None, start);
        assert!(registry.is_banned_at(target, start + Duration::from_secs(365 * 24 * 3600)));
        assert_eq!(registry.purge_expired(start + Duration::from_secs(10_000)), 0);
    }

    #[test]
    fn unrepresentable_duration_is_permanent() {
        let registry = BanRegistry::new();
        let start = Instant::now();
        let target = ip("10.0.0.9");

        registry.ban_at(target, Some(Duration::from_secs(u64::MAX / 2)), start);
        registry.ban_at(ip("10.0.0.10"), Some(Duration::MAX), start);

        assert!(registry.is_banned_at(target, start + Duration::from_secs(365 * 24 * 3600)));
        assert!(registry.list().iter().all(|ban| ban.permanent));
    }

    #[test]
    fn reban_replaces_entry() {
        let registry = BanRegistry::new();
        let start = Instant::now();
        let target = ip("10.0.0.3");

        registry.ban_at(target, None, start);
        registry.ban_at(target, Some(Duration::from_secs(1)), start);

        assert_eq!(registry.len(), 1);
        assert!(!registry.is_banned_at(target, start + Duration::from_secs(2)));
    }

    #[test]
    fn unban_is_unconditional() {
        let registry = BanRegistry::new();
        let target = ip("::1");

        assert!(!registry.unban(target));
        registry.ban(target, None);
        assert!(registry.is_banned(target));
        assert!(registry.unban(target));
        assert!(!registry.is_banned(target));
    }

    #[test]
    fn purge_removes_only_expired() {
        let registry = BanRegistry::new();
        let start = Instant::now();

        registry.ban_at(ip("10.0.0.4"), Some(Duration::from_secs(1)), start);
        registry.ban_at(ip("10.0.0.5"), Some(Duration::from_secs(100)), start);
        registry.ban_at(ip("10.0.0.6"), None, start);

        assert_eq!(registry.purge_expired(start + Duration::from_secs(5)), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn list_reports_permanence() {
        let registry = BanRegistry::new();
        registry.ban(ip("10.0.0.7"), None);
        registry.ban(ip("10.0.0.8"), Some(Duration::from_secs(600)));

        let bans = registry.list();
        assert_eq!(bans.len(), 2);
        assert!(bans[0].permanent);
        assert_eq!(bans[0].remaining_secs, None);
        assert!(!bans[1].permanent);
        assert!(bans[1].remaining_secs.unwrap() <= 600);
    }
}
