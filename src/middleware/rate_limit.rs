//! Rate limiting middleware.
//!
//! Provides IP-based rate limiting using the token bucket algorithm.
//! `/register` and `/login` draw from a separate, stricter bucket so
//! credential guessing cannot use the general allowance.
//!
//! # Example
//!
//! ```rust,ignore
//! let rate_limiter = RateLimiter::new(&config.rate_limit);
//! let app = Router::new()
//!     .route("/login", post(login))
//!     .layer(rate_limiter.layer());
//! ```

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderValue, Request},
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovRateLimiter,
};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use tower::{Layer, Service};
use tracing::warn;

use crate::config::RateLimitConfig;
use crate::error::AppError;

/// Paths counted against the authentication quota
const AUTH_PATHS: &[&str] = &["/register", "/login"];

/// Entries kept before the limiter map is reset
const MAX_TRACKED_CLIENTS: usize = 10_000;

type DirectLimiter = GovRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Which quota a request is counted against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitScope {
    General,
    Auth,
}

impl LimitScope {
    /// Scope for a request path
    pub fn for_path(path: &str) -> Self {
        if AUTH_PATHS.contains(&path.trim_end_matches('/')) {
            Self::Auth
        } else {
            Self::General
        }
    }
}

/// Rate limiter state shared across requests
#[derive(Clone)]
pub struct RateLimiter {
    /// Per-client, per-scope limiters
    limiters: Arc<DashMap<(IpAddr, LimitScope), Arc<DirectLimiter>>>,
    /// `None` leaves the scope unlimited
    general_quota: Option<Quota>,
    auth_quota: Option<Quota>,
    window_seconds: u64,
    enabled: bool,
}

impl RateLimiter {
    /// Create a new rate limiter from configuration
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            limiters: Arc::new(DashMap::new()),
            general_quota: quota(config.requests_per_window, config.window_seconds),
            auth_quota: quota(config.auth_requests_per_window, config.window_seconds),
            window_seconds: config.window_seconds.max(1),
            enabled: config.enabled,
        }
    }

    /// Create a Tower Layer for this rate limiter
    pub fn layer(&self) -> RateLimiterLayer {
        RateLimiterLayer {
            rate_limiter: self.clone(),
        }
    }

    /// Check if a request from the given IP is allowed
    pub fn check(&self, ip: IpAddr, scope: LimitScope) -> bool {
        if !self.enabled {
            return true;
        }

        let quota = match scope {
            LimitScope::General => self.general_quota,
            LimitScope::Auth => self.auth_quota,
        };

        match quota {
            Some(quota) => self.get_or_create_limiter(ip, scope, quota).check().is_ok(),
            None => true,
        }
    }

    fn get_or_create_limiter(
        &self,
        ip: IpAddr,
        scope: LimitScope,
        quota: Quota,
    ) -> Arc<DirectLimiter> {
        if let Some(limiter) = self.limiters.get(&(ip, scope)) {
            return Arc::clone(&limiter);
        }

        if self.limiters.len() > MAX_TRACKED_CLIENTS {
            self.limiters.clear();
        }

        Arc::clone(
            &self
                .limiters
                .entry((ip, scope))
                .or_insert_with(|| Arc::new(GovRateLimiter::direct(quota))),
        )
    }
}

/// Token bucket refilling `requests` every `window_seconds`, or `None` for 0
fn quota(requests: u32, window_seconds: u64) -> Option<Quota> {
    let burst = NonZeroU32::new(requests)?;
    let window = Duration::from_secs(window_seconds.max(1));

    let quota = Quota::with_period(window / burst.get())
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst);
    Some(quota)
}

/// Tower Layer for rate limiting
#[derive(Clone)]
pub struct RateLimiterLayer {
    rate_limiter: RateLimiter,
}

impl<S> Layer<S> for RateLimiterLayer {
    type Service = RateLimiterMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimiterMiddleware {
            inner,
            rate_limiter: self.rate_limiter.clone(),
        }
    }
}

/// Rate limiting middleware service
#[derive(Clone)]
pub struct RateLimiterMiddleware<S> {
    inner: S,
    rate_limiter: RateLimiter,
}

impl<S> Service<Request<Body>> for RateLimiterMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let ip = extract_client_ip(&req);
        let scope = LimitScope::for_path(req.uri().path());

        let rate_limiter = self.rate_limiter.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if !rate_limiter.check(ip, scope) {
                warn!(ip = %ip, scope = ?scope, "Rate limit exceeded");
                return Ok(rate_limit_response(rate_limiter.window_seconds));
            }

            inner.call(req).await
        })
    }
}

/// Extract client IP from request
fn extract_client_ip<B>(req: &Request<B>) -> IpAddr {
    // Reverse proxy headers first
    if let Some(forwarded) = req.headers().get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(first_ip) = forwarded_str.split(',').next() {
                if let Ok(ip) = first_ip.trim().parse::<IpAddr>() {
                    return ip;
                }
            }
        }
    }

    if let Some(real_ip) = req.headers().get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            if let Ok(ip) = ip_str.trim().parse::<IpAddr>() {
                return ip;
            }
        }
    }

    if let Some(connect_info) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return connect_info.0.ip();
    }

    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

/// Create rate limit exceeded response
fn rate_limit_response(retry_after: u64) -> Response {
    let mut response =
        AppError::rate_limit_exceeded("Too many requests. Please try again later.").into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}
