//! Caller authentication for requests forwarded by the session layer.
//!
//! The session layer in front of the daemon logs users in. On their behalf
//! it sends the user id in `x-authenticated-user` together with a shared
//! secret in `x-frontend-token`. Requests without a user header pass through
//! unauthenticated; handlers that act for a user require
//! [`AuthenticatedUser`] in the request extensions.
//!
//! # Security
//!
//! - Only the SHA-256 of the shared secret is kept in memory
//! - Secret comparison is constant-time

use std::sync::Arc;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tonic::metadata::MetadataMap;
use tonic::{Request, Status};

pub use sessionproof_proto::{TOKEN_HEADER, USER_HEADER};

/// The user a request acts for, as vouched for by the session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(String);

impl AuthenticatedUser {
    /// The authenticated user id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Decides who a request acts for.
pub trait CallerAuthenticator: Send + Sync {
    /// Returns `Ok(None)` for anonymous requests, `Ok(Some(_))` for a
    /// vouched-for user, and `Err` for credentials that are present but
    /// invalid.
    fn authenticate(&self, metadata: &MetadataMap) -> Result<Option<AuthenticatedUser>, Status>;
}

/// Trusts the session layer by a shared secret.
pub struct FrontendTrust {
    token_hash: [u8; 32],
}

impl FrontendTrust {
    /// Trust requests carrying `token`.
    pub fn new(token: &str) -> Self {
        Self {
            token_hash: Sha256::digest(token.as_bytes()).into(),
        }
    }

    fn token_matches(&self, presented: &str) -> bool {
        let presented: [u8; 32] = Sha256::digest(presented.as_bytes()).into();
        self.token_hash.ct_eq(&presented).into()
    }
}

impl CallerAuthenticator for FrontendTrust {
    fn authenticate(&self, metadata: &MetadataMap) -> Result<Option<AuthenticatedUser>, Status> {
        let Some(user) = metadata.get(USER_HEADER) else {
            return Ok(None);
        };

        let token = metadata
            .get(TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| Status::unauthenticated("Valid authentication required"))?;
        if !self.token_matches(token) {
            tracing::warn!("Rejected request with invalid frontend token");
            return Err(Status::unauthenticated("Valid authentication required"));
        }

        let user = user
            .to_str()
            .ok()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Status::unauthenticated("Valid authentication required"))?;

        Ok(Some(AuthenticatedUser(user.to_string())))
    }
}

/// Interceptor that places [`AuthenticatedUser`] into request extensions.
#[derive(Clone)]
pub struct CallerAuthInterceptor {
    authenticator: Arc<dyn CallerAuthenticator>,
}

impl CallerAuthInterceptor {
    /// Create an interceptor backed by `authenticator`.
    pub fn new(authenticator: Arc<dyn CallerAuthenticator>) -> Self {
        Self { authenticator }
    }
}

impl tonic::service::Interceptor for CallerAuthInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        if let Some(user) = self.authenticator.authenticate(request.metadata())? {
            request.extensions_mut().insert(user);
        }
        Ok(request)
    }
}

/// Require an authenticated caller on a request.
pub fn require_caller<T>(request: &Request<T>) -> Result<AuthenticatedUser, Status> {
    request
        .extensions()
        .get::<AuthenticatedUser>()
        .cloned()
        .ok_or_else(|| Status::unauthenticated("Valid authentication required"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::service::Interceptor;

    fn request(user: Option<&str>, token: Option<&str>) -> Request<()> {
        let mut request = Request::new(());
        if let Some(user) = user {
            request.metadata_mut().insert(USER_HEADER, user.parse().unwrap());
        }
        if let Some(token) = token {
            request.metadata_mut().insert(TOKEN_HEADER, token.parse().unwrap());
        }
        request
    }

    fn interceptor() -> CallerAuthInterceptor {
        CallerAuthInterceptor::new(Arc::new(FrontendTrust::new("secret")))
    }

    #[test]
    fn test_valid_caller() {
        let request = interceptor().call(request(Some("u1"), Some("secret"))).unwrap();
        assert_eq!(require_caller(&request).unwrap().id(), "u1");
    }

    #[test]
    fn test_anonymous_passes_without_caller() {
        let request = interceptor().call(request(None, None)).unwrap();
        assert_eq!(
            require_caller(&request).unwrap_err().code(),
            tonic::Code::Unauthenticated
        );
    }

    #[test]
    fn test_wrong_token_rejected() {
        let status = interceptor()
            .call(request(Some("u1"), Some("wrong")))
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
    }

    #[test]
    fn test_missing_token_rejected() {
        let status = interceptor().call(request(Some("u1"), None)).unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
    }

    #[test]
    fn test_empty_user_rejected() {
        let status = interceptor()
            .call(request(Some(""), Some("secret")))
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
    }
}
