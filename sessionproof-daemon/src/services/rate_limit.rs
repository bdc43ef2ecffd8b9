//! Per-caller rate limiting for gRPC services.
//!
//! Every caller draws from its own token bucket. Logged-in users are counted
//! by user id, everyone else by peer IP, so one busy caller cannot starve the
//! public lookups of others.

use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tonic::{Request, Status};

use crate::auth::AuthenticatedUser;

/// Sustained requests per second used when none is configured.
pub const DEFAULT_PER_SECOND: u32 = 2;

/// Burst size used when none is configured.
pub const DEFAULT_BURST: u32 = 10;

/// How often idle buckets are dropped.
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Who a request is counted against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallerKey {
    /// A user vouched for by the session layer.
    User(String),
    /// An anonymous caller, by address.
    Peer(IpAddr),
    /// Neither a user nor a peer address (in-process transports).
    Unknown,
}

impl CallerKey {
    /// Key for `request`.
    ///
    /// Reads [`AuthenticatedUser`] from the extensions, so caller
    /// authentication must run first.
    pub fn of<T>(request: &Request<T>) -> Self {
        if let Some(user) = request.extensions().get::<AuthenticatedUser>() {
            return Self::User(user.id().to_string());
        }
        request
            .remote_addr()
            .map_or(Self::Unknown, |addr| Self::Peer(addr.ip()))
    }
}

/// Request rate limiter with one bucket per [`CallerKey`].
#[derive(Clone)]
pub struct ServiceRateLimiter {
    limiter: Arc<DefaultKeyedRateLimiter<CallerKey>>,
}

impl ServiceRateLimiter {
    /// Allow each caller `per_second` sustained requests with bursts of up
    /// to `burst_size`. Zero for either selects the default.
    pub fn new(per_second: u32, burst_size: u32) -> Self {
        let quota = Quota::per_second(non_zero_or(per_second, DEFAULT_PER_SECOND))
            .allow_burst(non_zero_or(burst_size, DEFAULT_BURST));

        Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
        }
    }

    /// Take one request from `key`'s budget.
    ///
    /// # Errors
    ///
    /// `RESOURCE_EXHAUSTED` once the caller's bucket is empty.
    pub fn check(&self, key: &CallerKey) -> Result<(), Status> {
        self.limiter.check_key(key).map_err(|_| {
            tracing::warn!(caller = ?key, "Rate limit exceeded");
            Status::resource_exhausted("Rate limit exceeded. Please try again later.")
        })
    }

    /// Drop buckets of callers whose budget has fully refilled.
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
    }

    /// Number of callers currently tracked.
    pub fn tracked_callers(&self) -> usize {
        self.limiter.len()
    }

    /// Prune idle buckets every [`PRUNE_INTERVAL`] until the task is dropped.
    pub async fn prune_forever(self) {
        let mut interval = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            self.retain_recent();
            tracing::debug!(callers = self.tracked_callers(), "Pruned rate limit buckets");
        }
    }
}

impl Default for ServiceRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_PER_SECOND, DEFAULT_BURST)
    }
}

fn non_zero_or(value: u32, default: u32) -> NonZeroU32 {
    NonZeroU32::new(value)
        .or(NonZeroU32::new(default))
        .unwrap_or(NonZeroU32::MIN)
}

/// Interceptor charging each request to its caller's bucket.
#[derive(Clone)]
pub struct RateLimitInterceptor {
    limiter: ServiceRateLimiter,
}

impl RateLimitInterceptor {
    pub fn new(limiter: ServiceRateLimiter) -> Self {
        Self { limiter }
    }
}

impl tonic::service::Interceptor for RateLimitInterceptor {
    fn call(&mut self, request: Request<()>) -> Result<Request<()>, Status> {
        self.limiter.check(&CallerKey::of(&request))?;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{CallerAuthInterceptor, FrontendTrust, TOKEN_HEADER, USER_HEADER};
    use std::net::SocketAddr;
    use tonic::service::Interceptor;
    use tonic::transport::server::TcpConnectInfo;

    fn user(id: &str) -> CallerKey {
        CallerKey::User(id.to_string())
    }

    fn from_peer(addr: &str) -> Request<()> {
        let remote_addr: SocketAddr = addr.parse().unwrap();
        let mut request = Request::new(());
        request.extensions_mut().insert(TcpConnectInfo {
            local_addr: None,
            remote_addr: Some(remote_addr),
        });
        request
    }

    fn as_user(id: &str) -> Request<()> {
        let mut request = Request::new(());
        request.metadata_mut().insert(USER_HEADER, id.parse().unwrap());
        request.metadata_mut().insert(TOKEN_HEADER, "secret".parse().unwrap());
        CallerAuthInterceptor::new(Arc::new(FrontendTrust::new("secret")))
            .call(request)
            .unwrap()
    }

    #[test]
    fn test_burst_then_limited() {
        let limiter = ServiceRateLimiter::new(1, 5);

        for i in 0..5 {
            assert!(limiter.check(&user("u1")).is_ok(), "request {i} within burst");
        }
        assert!(limiter.check(&user("u1")).is_err());
    }

    #[test]
    fn test_exhausted_caller_does_not_block_others() {
        let limiter = ServiceRateLimiter::new(1, 3);

        for _ in 0..3 {
            limiter.check(&user("u1")).unwrap();
        }
        assert!(limiter.check(&user("u1")).is_err());

        // Other users and anonymous peers keep their own budget
        assert!(limiter.check(&user("u2")).is_ok());
        let peer = CallerKey::Peer("203.0.113.7".parse().unwrap());
        assert!(limiter.check(&peer).is_ok());
        assert_eq!(limiter.tracked_callers(), 3);
    }

    #[tokio::test]
    async fn test_bucket_refills() {
        let limiter = ServiceRateLimiter::new(10, 1);

        assert!(limiter.check(&user("u1")).is_ok());
        assert!(limiter.check(&user("u1")).is_err());

        // 10 per second = 100ms per token
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(limiter.check(&user("u1")).is_ok());
    }

    #[test]
    fn test_zero_falls_back_to_default() {
        let limiter = ServiceRateLimiter::new(0, 0);
        for _ in 0..DEFAULT_BURST {
            assert!(limiter.check(&CallerKey::Unknown).is_ok());
        }
        assert!(limiter.check(&CallerKey::Unknown).is_err());
    }

    #[test]
    fn test_caller_key_prefers_authenticated_user() {
        assert_eq!(CallerKey::of(&as_user("u1")), user("u1"));

        let peer = from_peer("198.51.100.4:4242");
        assert_eq!(
            CallerKey::of(&peer),
            CallerKey::Peer("198.51.100.4".parse().unwrap())
        );

        assert_eq!(CallerKey::of(&Request::new(())), CallerKey::Unknown);
    }

    #[test]
    fn test_peer_key_ignores_port() {
        let first = CallerKey::of(&from_peer("198.51.100.4:1000"));
        let second = CallerKey::of(&from_peer("198.51.100.4:2000"));
        assert_eq!(first, second);
    }

    #[test]
    fn test_interceptor_limits_per_caller() {
        let mut interceptor = RateLimitInterceptor::new(ServiceRateLimiter::new(1, 1));

        assert!(interceptor.call(as_user("u1")).is_ok());
        let status = interceptor.call(as_user("u1")).unwrap_err();
        assert_eq!(status.code(), tonic::Code::ResourceExhausted);

        // A busy user leaves anonymous lookups from other peers alone
        assert!(interceptor.call(from_peer("192.0.2.1:5000")).is_ok());
        assert!(interceptor.call(from_peer("192.0.2.2:5000")).is_ok());
        assert!(interceptor.call(from_peer("192.0.2.1:5001")).is_err());
    }

    #[tokio::test]
    async fn test_retain_recent_drops_refilled_buckets() {
        let limiter = ServiceRateLimiter::new(100, 1);
        limiter.check(&user("u1")).unwrap();
        limiter.check(&user("u2")).unwrap();
        assert_eq!(limiter.tracked_callers(), 2);

        tokio::time::sleep(Duration::from_millis(50)).await;
        limiter.retain_recent();
        assert_eq!(limiter.tracked_callers(), 0);
    }
}
