//! Per-client failure tracking.
//!
//! ```text
//! Clean ──failure──▶ Tracking(1) ──failure──▶ ... ──failure──▶ Blocked
//!   ▲                                                              │
//!   └──────────── expiration elapsed with no new failure ──────────┘
//! ```
//!
//! Every failure re-anchors the expiry, so a client that keeps failing stays
//! blocked. A successful login does not clear the state.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::config::schema::BruteForceConfig;

#[derive(Debug, Clone, Copy)]
struct BruteForceState {
    failure_count: u32,
    expires_at: Instant,
}

/// Tracks authentication failures per client IP.
#[derive(Debug)]
pub struct BruteForceTracker {
    enabled: bool,
    max_failures: u32,
    expiration: Duration,
    clients: DashMap<String, BruteForceState>,
    clock: Arc<dyn Clock>,
}

impl BruteForceTracker {
    pub fn new(enabled: bool, max_failures: u32, expiration: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            enabled,
            max_failures,
            expiration,
            clients: DashMap::new(),
            clock,
        }
    }

    pub fn from_config(config: &BruteForceConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            config.enabled,
            config.max_failure_count,
            Duration::from_secs(config.expiration_secs),
            clock,
        )
    }

    /// A tracker that never blocks anyone.
    pub fn disabled(clock: Arc<dyn Clock>) -> Self {
        Self::new(false, u32::MAX, Duration::ZERO, clock)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record a failed attempt; returns true only on the failure that blocks the client.
    pub fn add_failure(&self, ip: &str) -> bool {
        if !self.enabled {
            return false;
        }

        let now = self.clock.now();
        let expires_at = now + self.expiration;

        let count = match self.clients.entry(ip.to_string()) {
            Entry::Occupied(mut occupied) => {
                let state = occupied.get_mut();
                if state.expires_at <= now {
                    state.failure_count = 0;
                }
                state.failure_count = state.failure_count.saturating_add(1);
                state.expires_at = expires_at;
                state.failure_count
            }
            Entry::Vacant(vacant) => {
                vacant.insert(BruteForceState {
                    failure_count: 1,
                    expires_at,
                });
                1
            }
        };

        tracing::debug!(ip = %ip, failures = count, "Recorded authentication failure");
        count == self.max_failures
    }

    /// Whether the client is currently blocked. Never mutates state.
    pub fn is_blocked(&self, ip: &str) -> bool {
        if !self.enabled {
            return false;
        }

        let now = self.clock.now();
        self.clients
            .get(ip)
            .map(|state| state.expires_at > now && state.failure_count >= self.max_failures)
            .unwrap_or(false)
    }

    /// Failures recorded for the client within the current window.
    pub fn failure_count(&self, ip: &str) -> u32 {
        let now = self.clock.now();
        self.clients
            .get(ip)
            .filter(|state| state.expires_at > now)
            .map(|state| state.failure_count)
            .unwrap_or(0)
    }

    /// Drop expired entries, returning how many were removed.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.clients.len();
        self.clients.retain(|_, state| state.expires_at > now);
        before.saturating_sub(self.clients.len())
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }
}
