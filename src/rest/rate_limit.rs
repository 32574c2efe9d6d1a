// rest/rate_limit.rs — fixed-window chat rate limiting.
//
// One global window for all callers — not partitioned per user or IP, and no
// eviction beyond pruning expired timestamps on each call.  Good enough for a
// single-instance deployment; a shared store would be needed to scale out.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub struct FixedWindow {
    max_calls: usize,
    window: Duration,
    hits: Mutex<Vec<Instant>>,
}

impl FixedWindow {
    pub fn new(max_calls: u32, window: Duration) -> Self {
        Self {
            max_calls: max_calls as usize,
            window,
            hits: Mutex::new(Vec::new()),
        }
    }

    /// Record a hit if the window has room.  Returns `false` when the caller
    /// should be rejected.
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut hits = self.hits.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        hits.retain(|t| now.duration_since(*t) < self.window);
        if hits.len() >= self.max_calls {
            return false;
        }
        hits.push(now);
        true
    }

    pub fn limit_message(&self) -> String {
        format!(
            "Rate limit exceeded: {} calls per {} seconds",
            self.max_calls,
            self.window.as_secs()
        )
    }
}

pub async fn enforce(
    State(limiter): State<Arc<FixedWindow>>,
    req: Request,
    next: Next,
) -> Response {
    if !limiter.try_acquire() {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": limiter.limit_message() })),
        )
            .into_response();
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_after_limit_within_window() {
        let limiter = FixedWindow::new(3, Duration::from_secs(60));
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn expired_hits_are_pruned() {
        let limiter = FixedWindow::new(2, Duration::from_millis(10));
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        std::thread::sleep(Duration::from_millis(15));
        assert!(limiter.try_acquire());
    }

    #[test]
    fn zero_limit_rejects_everything() {
        let limiter = FixedWindow::new(0, Duration::from_secs(60));
        assert!(!limiter.try_acquire());
    }
}
