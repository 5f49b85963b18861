//! # 鉴权接口限流
//!
//! 以客户端地址为键的固定窗口计数器，挂在 `/api/auth/*` 路由组上。
//! 只有开启 `server.trust_proxy` 时才信任 `X-Forwarded-For`。

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use dashmap::DashMap;

use fintechos_core::config::RateLimitConfig;

use crate::error::ApiError;
use crate::server::AppState;

/// 窗口数超过该值时顺带清理过期窗口
const SWEEP_THRESHOLD: usize = 10_000;

struct Window {
    started: Instant,
    count: u32,
}

/// # Summary
/// 固定窗口限流器。
///
/// # Invariants
/// - 每个键在一个窗口内最多放行 `max_requests` 次，窗口到期后计数归零。
/// - 计数在 `DashMap` 分片锁内完成，并发请求不会多放行。
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            window: Duration::from_secs(config.window_secs),
            max_requests: config.max_requests,
            windows: DashMap::new(),
        }
    }

    /// 记录一次访问
    ///
    /// # Returns
    /// 放行返回 `Ok(())`，超限返回距窗口重置的秒数。
    pub fn check(&self, key: &str) -> Result<(), u64> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<(), u64> {
        if self.windows.len() > SWEEP_THRESHOLD {
            self.windows
                .retain(|_, w| now.duration_since(w.started) < self.window);
        }

        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        let w = entry.value_mut();
        let elapsed = now.duration_since(w.started);
        if elapsed >= self.window {
            w.started = now;
            w.count = 0;
        }
        if w.count >= self.max_requests {
            let retry = self.window.saturating_sub(now.duration_since(w.started));
            return Err(retry.as_secs().max(1));
        }
        w.count += 1;
        Ok(())
    }
}

/// # Summary
/// 取客户端标识。
///
/// # Logic
/// 1. 默认使用对端地址，请求头可被客户端任意伪造。
/// 2. 仅当 `trust_proxy` 开启 (部署在可信反向代理之后) 时采用 `X-Forwarded-For` 的首个地址。
/// 3. 都取不到时归入 `"unknown"`。
fn client_key(req: &Request, trust_proxy: bool) -> String {
    let forwarded = if trust_proxy { forwarded_for(req) } else { None };
    if let Some(forwarded) = forwarded {
        return forwarded;
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn forwarded_for(req: &Request) -> Option<String> {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// 限流中间件，超限返回 429
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = client_key(&req, state.config.server.trust_proxy);
    if let Err(retry_after) = state.rate_limiter.check(&key) {
        tracing::warn!("鉴权接口限流: client={} retry_after={}s", key, retry_after);
        return Err(ApiError::TooManyRequests(
            "Too many requests, please try again later.".into(),
        ));
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u32, secs: u64) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            window_secs: secs,
            max_requests: max,
        })
    }

    #[test]
    fn test_window_blocks_after_max() {
        let rl = limiter(3, 60);
        let t0 = Instant::now();
        for _ in 0..3 {
            assert!(rl.check_at("1.2.3.4", t0).is_ok());
        }
        let retry = rl.check_at("1.2.3.4", t0 + Duration::from_secs(10)).unwrap_err();
        assert_eq!(retry, 50);

        // 其他客户端不受影响
        assert!(rl.check_at("5.6.7.8", t0).is_ok());
    }

    #[test]
    fn test_window_resets() {
        let rl = limiter(1, 60);
        let t0 = Instant::now();
        assert!(rl.check_at("k", t0).is_ok());
        assert!(rl.check_at("k", t0 + Duration::from_secs(59)).is_err());
        assert!(rl.check_at("k", t0 + Duration::from_secs(60)).is_ok());
    }

    fn request_from(peer: &str, forwarded: Option<&str>) -> Request {
        let mut builder = Request::builder();
        if let Some(f) = forwarded {
            builder = builder.header("x-forwarded-for", f);
        }
        let mut req = builder.body(axum::body::Body::empty()).unwrap();
        let addr: SocketAddr = peer.parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        req
    }

    #[test]
    fn test_client_key_ignores_forwarded_header_by_default() {
        let req = request_from("198.51.100.9:52000", Some("203.0.113.7"));
        assert_eq!(client_key(&req, false), "198.51.100.9");

        let req = Request::builder().body(axum::body::Body::empty()).unwrap();
        assert_eq!(client_key(&req, false), "unknown");
    }

    #[test]
    fn test_client_key_uses_forwarded_header_behind_trusted_proxy() {
        let req = request_from("10.0.0.1:52000", Some("203.0.113.7, 10.0.0.1"));
        assert_eq!(client_key(&req, true), "203.0.113.7");

        // 代理未带头时退回对端地址
        let req = request_from("10.0.0.1:52000", None);
        assert_eq!(client_key(&req, true), "10.0.0.1");
    }
}
