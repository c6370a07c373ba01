//! Failed-login throttling.
//!
//! Failures are counted per login key (normalized username or email) inside a
//! rolling window. Reaching `max_attempts` locks the key for
//! `lockout_seconds`; a successful login clears it.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::AuthThrottleConfig;

/// Entries are swept once the map grows past this many keys.
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Attempts {
    failures: u32,
    window_start: Instant,
    locked_until: Option<Instant>,
}

pub struct LoginThrottle {
    config: AuthThrottleConfig,
    attempts: Mutex<HashMap<String, Attempts>>,
}

fn normalize(key: &str) -> String {
    key.trim().to_lowercase()
}

impl LoginThrottle {
    #[must_use]
    pub fn new(config: AuthThrottleConfig) -> Self {
        Self {
            config,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.config.window_seconds)
    }

    /// `Err(retry_after)` while `key` is locked out.
    pub async fn check(&self, key: &str) -> Result<(), Duration> {
        self.check_at(key, Instant::now()).await
    }

    pub async fn record_failure(&self, key: &str) {
        self.record_failure_at(key, Instant::now()).await;
    }

    pub async fn record_success(&self, key: &str) {
        if !self.config.enabled {
            return;
        }
        self.attempts.lock().await.remove(&normalize(key));
    }

    async fn check_at(&self, key: &str, now: Instant) -> Result<(), Duration> {
        if !self.config.enabled {
            return Ok(());
        }

        let attempts = self.attempts.lock().await;
        match attempts.get(&normalize(key)).and_then(|a| a.locked_until) {
            Some(until) if until > now => Err(until - now),
            _ => Ok(()),
        }
    }

    async fn record_failure_at(&self, key: &str, now: Instant) {
        if !self.config.enabled {
            return;
        }

        let window = self.window();
        let mut attempts = self.attempts.lock().await;

        if attempts.len() > SWEEP_THRESHOLD {
            attempts.retain(|_, a| {
                a.locked_until.is_some_and(|until| until > now)
                    || now.duration_since(a.window_start) < window
            });
        }

        let entry = attempts.entry(normalize(key)).or_insert(Attempts {
            failures: 0,
            window_start: now,
            locked_until: None,
        });

        if now.duration_since(entry.window_start) >= window {
            entry.failures = 0;
            entry.window_start = now;
        }

        entry.failures += 1;
        if entry.failures >= self.config.max_attempts {
            entry.locked_until = Some(now + Duration::from_secs(self.config.lockout_seconds));
            entry.failures = 0;
            entry.window_start = now;
            tracing::warn!(
                lockout_seconds = self.config.lockout_seconds,
                "Too many failed logins; key locked"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttle(max_attempts: u32) -> LoginThrottle {
        LoginThrottle::new(AuthThrottleConfig {
            enabled: true,
            max_attempts,
            window_seconds: 300,
            lockout_seconds: 120,
        })
    }

    #[tokio::test]
    async fn locks_after_max_failures() {
        let throttle = throttle(3);
        let now = Instant::now();

        for _ in 0..2 {
            throttle.record_failure_at("alice", now).await;
        }
        assert!(throttle.check_at("alice", now).await.is_ok());

        throttle.record_failure_at("alice", now).await;
        let retry_after = throttle.check_at("alice", now).await.unwrap_err();
        assert_eq!(retry_after, Duration::from_secs(120));

        assert!(
            throttle
                .check_at("alice", now + Duration::from_secs(121))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn keys_are_normalized() {
        let throttle = throttle(1);
        let now = Instant::now();

        throttle.record_failure_at("  Alice@Academy.test ", now).await;
        assert!(throttle.check_at("alice@academy.test", now).await.is_err());
        assert!(throttle.check_at("bob@academy.test", now).await.is_ok());
    }

    #[tokio::test]
    async fn failures_outside_window_do_not_accumulate() {
        let throttle = throttle(2);
        let now = Instant::now();

        throttle.record_failure_at("alice", now).await;
        let later = now + Duration::from_secs(301);
        throttle.record_failure_at("alice", later).await;
        assert!(throttle.check_at("alice", later).await.is_ok());
    }

    #[tokio::test]
    async fn success_clears_failures() {
        let throttle = throttle(2);

        throttle.record_failure("alice").await;
        throttle.record_success("alice").await;
        throttle.record_failure("alice").await;
        assert!(throttle.check("alice").await.is_ok());
    }

    #[tokio::test]
    async fn disabled_throttle_never_locks() {
        let throttle = LoginThrottle::new(AuthThrottleConfig {
            enabled: false,
            max_attempts: 1,
            ..AuthThrottleConfig::default()
        });

        throttle.record_failure("alice").await;
        throttle.record_failure("alice").await;
        assert!(throttle.check("alice").await.is_ok());
    }
}
