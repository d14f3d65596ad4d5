//! Per-client request throttling for the generation endpoints.
//!
//! A sliding window of request timestamps is kept per client address. The
//! number of tracked clients is capped; when the cap is reached, expired
//! entries are swept and a new client is refused if there is still no room.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Sweep expired entries every this many checks.
const CLEANUP_INTERVAL: u64 = 100;

/// Default cap on distinct client addresses held in memory.
pub const DEFAULT_MAX_TRACKED_CLIENTS: usize = 10_000;

/// Limits for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed per client within `window`.
    pub max_requests: u32,
    pub window: Duration,
    pub max_tracked_clients: usize,
}

impl RateLimitConfig {
    pub fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(60),
            max_tracked_clients: DEFAULT_MAX_TRACKED_CLIENTS,
        }
    }
}

/// A request refused by a [`RateLimiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Too many requests, retry in {} seconds", .retry_after.as_secs().max(1))]
pub struct RateLimited {
    pub retry_after: Duration,
}

/// In-memory sliding-window limiter keyed by client address.
pub struct RateLimiter {
    config: RateLimitConfig,
    clients: Mutex<HashMap<String, Vec<Instant>>>,
    checks: AtomicU64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
            checks: AtomicU64::new(0),
        }
    }

    /// Record a request from `client`, or refuse it when the client has
    /// used up its window.
    pub fn check(&self, client: &str) -> Result<(), RateLimited> {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: &str, now: Instant) -> Result<(), RateLimited> {
        let window = self.config.window;
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);

        let n = self.checks.fetch_add(1, Ordering::Relaxed);
        if n > 0 && n % CLEANUP_INTERVAL == 0 {
            sweep(&mut clients, now, window);
        }

        if !clients.contains_key(client) && clients.len() >= self.config.max_tracked_clients {
            sweep(&mut clients, now, window);
            if clients.len() >= self.config.max_tracked_clients {
                tracing::warn!(
                    client,
                    tracked = clients.len(),
                    "Rate limiter full, refusing new client",
                );
                return Err(RateLimited {
                    retry_after: self.config.window,
                });
            }
        }

        let stamps = clients.entry(client.to_string()).or_default();
        stamps.retain(|&t| now.saturating_duration_since(t) < window);

        if stamps.len() >= self.config.max_requests as usize {
            let oldest = stamps[0];
            let retry_after = (oldest + window).saturating_duration_since(now);
            tracing::warn!(
                client,
                requests = stamps.len(),
                max = self.config.max_requests,
                "Rate limit exceeded",
            );
            return Err(RateLimited { retry_after });
        }

        stamps.push(now);
        Ok(())
    }

    /// Number of client addresses currently held.
    pub fn tracked_clients(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn sweep(clients: &mut HashMap<String, Vec<Instant>>, now: Instant, window: Duration) {
    clients.retain(|_, stamps| {
        stamps.retain(|&t| now.saturating_duration_since(t) < window);
        !stamps.is_empty()
    });
}
