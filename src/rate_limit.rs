//! Fixed-window rate limiting held in process memory.
//!
//! Each caller identity gets one record per window length. The record counts
//! every call (accepted or rejected) until its reset time passes, after which
//! the next call opens a fresh window. Quotas are per process: several gateway
//! instances each enforce their own.

use axum::http::HeaderMap;
use dashmap::DashMap;
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::metrics::RATE_LIMIT_RECORDS;

pub const DEFAULT_MESSAGE: &str = "Too many requests, please try again later";

/// How often expired records are swept by default.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

// Rate limit record - one per identifier + window length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub count: u32,
    pub reset_time: i64, // epoch ms
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitOptions {
    pub window_ms: u64,
    pub max_requests: u32,
    pub message: Option<String>,
}

impl RateLimitOptions {
    pub fn new(window_ms: u64, max_requests: u32) -> Self {
        Self {
            window_ms,
            max_requests,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitResult {
    pub success: bool,
    pub remaining: u32,
    pub reset_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RateLimitResult {
    /// Whole seconds until the window resets, rounded up and never negative.
    pub fn retry_after_secs_at(&self, now_ms: i64) -> u64 {
        let diff = self.reset_time.saturating_sub(now_ms);
        if diff <= 0 {
            return 0;
        }
        (diff as u64).div_ceil(1000)
    }
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Owns the record table. Construct one per process (or per test) and share
/// it behind an `Arc`.
#[derive(Debug, Default)]
pub struct RateLimiterService {
    records: DashMap<String, RateLimitRecord>,
}

impl RateLimiterService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, identifier: &str, options: &RateLimitOptions) -> RateLimitResult {
        self.check_at(identifier, options, now_ms())
    }

    pub fn check_at(
        &self,
        identifier: &str,
        options: &RateLimitOptions,
        now_ms: i64,
    ) -> RateLimitResult {
        // Different window lengths for the same caller must not share a count.
        let key = format!("{identifier}:{}", options.window_ms);

        // The entry guard holds the shard lock for the whole read-increment-write.
        let mut record = self.records.entry(key).or_insert(RateLimitRecord {
            count: 0,
            reset_time: now_ms,
        });

        // new record, or window already over
        if record.count == 0 || record.reset_time < now_ms {
            record.count = 1;
            record.reset_time = now_ms.saturating_add_unsigned(options.window_ms);
            return RateLimitResult {
                success: true,
                remaining: options.max_requests.saturating_sub(1),
                reset_time: record.reset_time,
                message: None,
            };
        }

        record.count = record.count.saturating_add(1);

        if record.count > options.max_requests {
            debug!(
                identifier,
                count = record.count,
                max = options.max_requests,
                "rate limit exceeded"
            );
            return RateLimitResult {
                success: false,
                remaining: 0,
                reset_time: record.reset_time,
                message: Some(
                    options
                        .message
                        .clone()
                        .unwrap_or_else(|| DEFAULT_MESSAGE.to_string()),
                ),
            };
        }

        RateLimitResult {
            success: true,
            remaining: options.max_requests - record.count,
            reset_time: record.reset_time,
            message: None,
        }
    }

    /// Removes every record whose window has ended. Returns how many went.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(now_ms())
    }

    pub fn sweep_expired_at(&self, now_ms: i64) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| record.reset_time >= now_ms);
        let after = self.records.len();
        RATE_LIMIT_RECORDS.set(after as f64);
        before.saturating_sub(after)
    }

    pub fn record(&self, identifier: &str, window_ms: u64) -> Option<RateLimitRecord> {
        self.records
            .get(&format!("{identifier}:{window_ms}"))
            .map(|r| *r)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Caller identity for rate limiting: the user id when known, else the
/// forwarded client address.
pub fn get_client_identifier(headers: &HeaderMap, user_id: Option<&str>) -> String {
    client_identifier(headers, user_id, None)
}

/// Like [`get_client_identifier`], with the connection's peer address as the
/// last resort before `unknown`. The gateway is usually the first hop, so
/// direct clients carry no forwarding headers.
pub fn client_identifier(
    headers: &HeaderMap,
    user_id: Option<&str>,
    peer: Option<IpAddr>,
) -> String {
    if let Some(id) = user_id.filter(|id| !id.is_empty()) {
        return format!("user:{id}");
    }

    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let forwarded = header("x-forwarded-for")
        .and_then(|list| list.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header("x-real-ip"));

    match (forwarded, peer) {
        (Some(ip), _) => format!("ip:{ip}"),
        (None, Some(peer)) => format!("ip:{peer}"),
        (None, None) => "ip:unknown".to_string(),
    }
}

// Sweeper - runs until the token is cancelled. A zero period falls back to
// SWEEP_INTERVAL.
pub fn spawn_sweeper(
    limiter: Arc<RateLimiterService>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let every = if every.is_zero() { SWEEP_INTERVAL } else { every };
    tokio::spawn(async move {
        let mut ticker = interval(every);
        // the first tick completes immediately; nothing can be expired yet
        ticker.tick().await;

        info!(interval = ?every, "rate limit sweeper started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("rate limit sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = limiter.sweep_expired();
                    if removed > 0 {
                        debug!(removed, remaining = limiter.len(), "swept expired rate limit records");
                    }
                }
            }
        }
    })
}
