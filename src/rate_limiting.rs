// ABOUTME: Rate limiting engine for API request throttling and quota enforcement
// ABOUTME: Monthly quota calculation per API key tier plus per-peer ingestion buckets
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Unified Rate Limiting System
//!
//! Two independent mechanisms live here. API keys get a monthly request
//! quota derived from their tier, resetting at the start of the next
//! month. Ingestion peers get a token bucket keyed by source address,
//! refilled continuously, so one chatty shipper cannot starve the rest.

use crate::models::{ApiKey, ApiKeyTier, RateLimitStatus};
use chrono::{DateTime, Datelike, Timelike, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::net::IpAddr;
use std::time::Instant;

/// Rate limit information for any authentication method
#[derive(Debug, Clone, Serialize)]
pub struct UnifiedRateLimitInfo {
    /// Whether the request is rate limited
    pub is_rate_limited: bool,
    /// Maximum requests allowed in the current period
    pub limit: Option<u32>,
    /// Remaining requests in the current period
    pub remaining: Option<u32>,
    /// When the current rate limit period resets
    pub reset_at: Option<DateTime<Utc>>,
    /// The tier associated with this rate limit
    pub tier: String,
    /// The authentication method used
    pub auth_method: String,
}

impl UnifiedRateLimitInfo {
    /// Info for an authentication method that carries no quota (JWT sessions)
    #[must_use]
    pub fn unlimited(auth_method: &str) -> Self {
        Self {
            is_rate_limited: false,
            limit: None,
            remaining: None,
            reset_at: None,
            tier: "unlimited".into(),
            auth_method: auth_method.into(),
        }
    }
}

/// Unified rate limit calculator
#[derive(Clone, Default)]
pub struct UnifiedRateLimitCalculator;

impl UnifiedRateLimitCalculator {
    /// Create a new unified rate limit calculator
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Calculate rate limit status for an API key
    #[must_use]
    pub fn calculate_api_key_rate_limit(
        &self,
        api_key: &ApiKey,
        current_usage: u32,
    ) -> UnifiedRateLimitInfo {
        if api_key.tier == ApiKeyTier::Enterprise {
            UnifiedRateLimitInfo {
                is_rate_limited: false,
                limit: None,
                remaining: None,
                reset_at: None,
                tier: "enterprise".into(),
                auth_method: "api_key".into(),
            }
        } else {
            let limit = api_key.rate_limit_requests;
            let remaining = limit.saturating_sub(current_usage);
            let is_rate_limited = current_usage >= limit;

            UnifiedRateLimitInfo {
                is_rate_limited,
                limit: Some(limit),
                remaining: Some(remaining),
                reset_at: Some(Self::calculate_monthly_reset()),
                tier: api_key.tier.as_str().into(),
                auth_method: "api_key".into(),
            }
        }
    }

    /// Calculate when the monthly rate limit resets (beginning of next month)
    fn calculate_monthly_reset() -> DateTime<Utc> {
        let now = Utc::now();
        let next_month = if now.month() == 12 {
            now.with_year(now.year() + 1)
                .and_then(|dt| dt.with_month(1))
                .unwrap_or_else(|| {
                    tracing::warn!("Failed to calculate next year/January, using fallback");
                    now + chrono::Duration::days(31)
                })
        } else {
            now.with_month(now.month() + 1).unwrap_or_else(|| {
                tracing::warn!("Failed to increment month, using fallback");
                now + chrono::Duration::days(31)
            })
        };

        next_month
            .with_day(1)
            .and_then(|dt| dt.with_hour(0))
            .and_then(|dt| dt.with_minute(0))
            .and_then(|dt| dt.with_second(0))
            .unwrap_or_else(|| {
                tracing::warn!("Failed to set reset time components, using next month");
                next_month
            })
    }

    /// Convert to the client-facing `RateLimitStatus`
    #[must_use]
    pub const fn to_rate_limit_status(info: &UnifiedRateLimitInfo) -> RateLimitStatus {
        RateLimitStatus {
            is_rate_limited: info.is_rate_limited,
            limit: info.limit,
            remaining: info.remaining,
            reset_at: info.reset_at,
        }
    }
}

/// Token bucket state for one ingestion peer
#[derive(Debug)]
struct PeerBucket {
    tokens: f64,
    last_refill: Instant,
}

/// Per-source-address token bucket limiter for the ingestion listeners
///
/// Buckets refill continuously at `events_per_sec` up to `burst`. A peer
/// with no bucket yet starts full.
pub struct PeerRateLimiter {
    buckets: DashMap<IpAddr, PeerBucket>,
    events_per_sec: f64,
    burst: f64,
}

impl PeerRateLimiter {
    /// Create a limiter allowing `events_per_sec` sustained with `burst` headroom
    #[must_use]
    pub fn new(events_per_sec: u32, burst: u32) -> Self {
        Self {
            buckets: DashMap::new(),
            events_per_sec: f64::from(events_per_sec),
            burst: f64::from(burst),
        }
    }

    /// Try to take one token for `peer`; false means the event should be dropped
    pub fn check(&self, peer: IpAddr) -> bool {
        let now = Instant::now();
        let mut entry = self.buckets.entry(peer).or_insert_with(|| PeerBucket {
            tokens: self.burst,
            last_refill: now,
        });

        let elapsed = now.duration_since(entry.last_refill).as_secs_f64();
        entry.tokens = (entry.tokens + elapsed * self.events_per_sec).min(self.burst);
        entry.last_refill = now;

        if entry.tokens >= 1.0 {
            entry.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Number of peers with active buckets
    #[must_use]
    pub fn tracked_peers(&self) -> usize {
        self.buckets.len()
    }

    /// Drop buckets that have been idle long enough to refill completely
    pub fn prune_idle(&self) {
        let now = Instant::now();
        let full_refill_secs = if self.events_per_sec > 0.0 {
            self.burst / self.events_per_sec
        } else {
            return;
        };
        self.buckets.retain(|_, bucket| {
            now.duration_since(bucket.last_refill).as_secs_f64() < full_refill_secs * 2.0
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateApiKeyRequest;
    use uuid::Uuid;

    fn make_key(rate_limit: u32) -> ApiKey {
        let manager = crate::api_keys::ApiKeyManager::new();
        let (key, _) = manager
            .create_api_key(
                Uuid::new_v4(),
                CreateApiKeyRequest {
                    name: "test".into(),
                    description: None,
                    rate_limit_requests: rate_limit,
                    expires_in_days: None,
                },
            )
            .unwrap();
        key
    }

    #[test]
    fn test_api_key_under_limit() {
        let calc = UnifiedRateLimitCalculator::new();
        let key = make_key(10_000);

        let info = calc.calculate_api_key_rate_limit(&key, 100);
        assert!(!info.is_rate_limited);
        assert_eq!(info.limit, Some(10_000));
        assert_eq!(info.remaining, Some(9_900));
        assert!(info.reset_at.is_some());
        assert_eq!(info.auth_method, "api_key");
    }

    #[test]
    fn test_api_key_at_limit() {
        let calc = UnifiedRateLimitCalculator::new();
        let key = make_key(10_000);

        let info = calc.calculate_api_key_rate_limit(&key, 10_000);
        assert!(info.is_rate_limited);
        assert_eq!(info.remaining, Some(0));
    }

    #[test]
    fn test_enterprise_unlimited() {
        let calc = UnifiedRateLimitCalculator::new();
        let key = make_key(5_000_000);

        assert_eq!(key.tier, ApiKeyTier::Enterprise);
        let info = calc.calculate_api_key_rate_limit(&key, 99_999_999);
        assert!(!info.is_rate_limited);
        assert_eq!(info.limit, None);
    }

    #[test]
    fn test_monthly_reset_is_future_month_start() {
        let info = UnifiedRateLimitCalculator::new()
            .calculate_api_key_rate_limit(&make_key(1_000), 0);
        let reset = info.reset_at.unwrap();
        assert!(reset > Utc::now());
        assert_eq!(reset.day(), 1);
    }

    #[test]
    fn test_peer_bucket_exhausts_and_refills() {
        let limiter = PeerRateLimiter::new(1_000, 5);
        let peer: IpAddr = "10.0.0.1".parse().unwrap();

        for _ in 0..5 {
            assert!(limiter.check(peer));
        }
        assert!(!limiter.check(peer));

        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(limiter.check(peer));
    }

    #[test]
    fn test_peer_buckets_are_independent() {
        let limiter = PeerRateLimiter::new(1, 1);
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limiter.check(a));
        assert!(!limiter.check(a));
        assert!(limiter.check(b));
        assert_eq!(limiter.tracked_peers(), 2);
    }
}
