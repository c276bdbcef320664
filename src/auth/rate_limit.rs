use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::AppState;

/// Fixed window applied to the credential endpoints.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window: Duration::from_secs(60),
        }
    }
}

/// In-memory fixed-window limiter keyed by client IP and path. Single
/// instance only.
#[derive(Clone, Default)]
pub struct RateLimitState {
    policy: RateLimitPolicy,
    entries: Arc<Mutex<HashMap<String, Window>>>,
}

struct Window {
    count: u32,
    started: Instant,
}

impl RateLimitState {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// `Ok(remaining)` when allowed, `Err(retry_after)` when the window is spent.
    pub async fn check(&self, key: &str) -> Result<u32, Duration> {
        self.check_at(key, Instant::now()).await
    }

    async fn check_at(&self, key: &str, now: Instant) -> Result<u32, Duration> {
        let mut entries = self.entries.lock().await;
        let policy = self.policy;
        let window = entries.entry(key.to_string()).or_insert(Window {
            count: 0,
            started: now,
        });

        if now.duration_since(window.started) > policy.window {
            window.count = 0;
            window.started = now;
        }

        if window.count >= policy.max_requests {
            return Err(policy
                .window
                .saturating_sub(now.duration_since(window.started)));
        }

        window.count += 1;
        Ok(policy.max_requests - window.count)
    }

    /// Drops windows older than twice the policy window.
    pub async fn cleanup(&self) {
        let horizon = self.policy.window * 2;
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .retain(|_, w| now.duration_since(w.started) < horizon);
    }

    pub fn spawn_cleanup_worker(&self) {
        let limiter = self.clone();
        let period = self.policy.window;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                limiter.cleanup().await;
            }
        });
    }

    #[cfg(test)]
    async fn tracked_keys(&self) -> usize {
        self.entries.lock().await.len()
    }
}

pub async fn rate_limit_auth(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = addr.ip().to_string();
    let path = req.uri().path().to_string();
    // Separate budgets for /login, /register and /refresh.
    let key = format!("{}:{}", ip, path);

    match state.rate_limiter.check(&key).await {
        Ok(remaining) => {
            tracing::debug!(ip = %ip, path = %path, remaining = remaining, "Rate limit check passed");
            Ok(next.run(req).await)
        }
        Err(retry_after) => {
            tracing::warn!(
                ip = %ip,
                path = %path,
                retry_after_secs = retry_after.as_secs(),
                "Rate limit exceeded"
            );
            Err(AppError::RateLimited)
        }
    }
}
