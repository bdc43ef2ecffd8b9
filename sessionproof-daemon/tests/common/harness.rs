//! Test harness for session proof E2E tests.
//!
//! Uses tonic's pattern of passing server directly to client (no network).

use std::sync::Arc;

use sessionproof_auth::identity::PooledProvider;
use sessionproof_auth::{KeyPair, KeyPairManager, ProofToken, ProofVerifier, ServerAttestor};
use sessionproof_daemon::auth::{CallerAuthInterceptor, FrontendTrust, TOKEN_HEADER, USER_HEADER};
use sessionproof_daemon::services::SessionProofServiceImpl;
use sessionproof_daemon::store::SignatureStore;
use sessionproof_proto::session_proof_service_client::SessionProofServiceClient;
use sessionproof_proto::session_proof_service_server::SessionProofServiceServer;
use sqlx::SqlitePool;
use tonic::service::interceptor::InterceptedService;

/// Shared secret between the test session layer and the daemon.
pub const FRONTEND_TOKEN: &str = "test-frontend-token";

/// Client connected straight to the service and its caller interceptor.
pub type TestServiceClient = SessionProofServiceClient<
    InterceptedService<SessionProofServiceServer<SessionProofServiceImpl>, CallerAuthInterceptor>,
>;

/// Test daemon that uses direct service-to-client communication (no network).
pub struct TestDaemon {
    pub manager: KeyPairManager,
    pub attestor: Arc<ServerAttestor>,
    pub store: Arc<SignatureStore>,
}

impl TestDaemon {
    /// Create a new test daemon with in-memory SQLite.
    pub async fn new() -> Self {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        let store = SignatureStore::new(pool)
            .await
            .expect("Failed to initialize signature store");

        let manager = KeyPairManager::with_provider(PooledProvider);
        let server_key = manager.generate().expect("Failed to generate server key");
        let attestor = ServerAttestor::new(manager.clone(), Arc::new(server_key))
            .expect("Failed to build attestor");

        Self {
            manager,
            attestor: Arc::new(attestor),
            store: Arc::new(store),
        }
    }

    /// Create a client that talks directly to this daemon (no network).
    pub fn client(&self) -> TestServiceClient {
        let service = SessionProofServiceImpl::new(
            ProofVerifier::new(self.manager.clone()),
            self.attestor.clone(),
            self.store.clone(),
        );
        let interceptor =
            CallerAuthInterceptor::new(Arc::new(FrontendTrust::new(FRONTEND_TOKEN)));
        SessionProofServiceClient::new(SessionProofServiceServer::with_interceptor(
            service,
            interceptor,
        ))
    }

    /// A browser-side user holding a key distinct from the server's.
    pub fn user(&self, id: &str) -> TestUser {
        let key = PooledProvider
            .generate_other(self.attestor.public_key())
            .expect("Failed to generate client key");
        TestUser {
            id: id.to_string(),
            key,
            manager: self.manager.clone(),
        }
    }
}

/// A user with an ephemeral client key.
pub struct TestUser {
    pub id: String,
    pub key: KeyPair,
    manager: KeyPairManager,
}

impl TestUser {
    /// Mint a proof for `session_id` claiming this user.
    pub fn mint(&self, session_id: &str) -> String {
        ProofToken::mint(&self.manager, &self.key, &self.id, session_id)
            .expect("Failed to mint proof")
    }
}

/// Wrap `message` as the session layer would for a logged-in `user_id`.
pub fn as_user<T>(user_id: &str, message: T) -> tonic::Request<T> {
    with_credentials(user_id, FRONTEND_TOKEN, message)
}

/// Wrap `message` with explicit caller credentials.
pub fn with_credentials<T>(user_id: &str, token: &str, message: T) -> tonic::Request<T> {
    let mut request = tonic::Request::new(message);
    request
        .metadata_mut()
        .insert(USER_HEADER, user_id.parse().expect("ascii user id"));
    request
        .metadata_mut()
        .insert(TOKEN_HEADER, token.parse().expect("ascii token"));
    request
}
