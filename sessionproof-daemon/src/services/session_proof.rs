//! Session proof gRPC service implementation.

use std::sync::Arc;

use sessionproof_auth::{
    ProofError, ProofVerifier, ServerAttestor, VerifiedSession, MAX_PROOF_LEN,
};
use sessionproof_proto::session_proof_service_server::SessionProofService;
use sessionproof_proto::{
    CheckProofRequest, CheckProofResponse, GetServerJwkRequest, GetServerJwkResponse,
    GetServerKeyRequest, GetServerKeyResponse, GetSignatureRequest, GetSignatureResponse,
    HealthRequest, HealthResponse, SignProofRequest, SignProofResponse, SignatureRecord as ProtoSignatureRecord,
};
use tonic::{Request, Response, Status};

use crate::auth::require_caller;
use crate::store::{SignatureStore, StoreError, StoredSignature};

/// Implementation of the SessionProofService gRPC service.
#[derive(Clone)]
pub struct SessionProofServiceImpl {
    verifier: ProofVerifier,
    attestor: Arc<ServerAttestor>,
    store: Arc<SignatureStore>,
}

impl SessionProofServiceImpl {
    /// Create a new session proof service.
    pub fn new(
        verifier: ProofVerifier,
        attestor: Arc<ServerAttestor>,
        store: Arc<SignatureStore>,
    ) -> Self {
        Self {
            verifier,
            attestor,
            store,
        }
    }

    /// Verify `proof` for `user_id` off the async runtime.
    async fn verify(&self, proof: String, user_id: String) -> Result<VerifiedSession, Status> {
        // base58 decoding is quadratic in length
        if proof.len() > MAX_PROOF_LEN {
            tracing::warn!(
                user_id = %user_id,
                len = proof.len(),
                reason = "oversized",
                "Proof rejected"
            );
            return Err(Status::invalid_argument(ProofError::MalformedProof.to_string()));
        }

        let verifier = self.verifier.clone();
        let caller = user_id.clone();
        let result = tokio::task::spawn_blocking(move || verifier.verify(&proof, &caller))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Verification task failed");
                Status::internal("internal error")
            })?;

        result.map_err(|e: ProofError| {
            tracing::warn!(user_id = %user_id, reason = e.reason(), "Proof rejected");
            Status::invalid_argument(e.to_string())
        })
    }
}

fn stored_to_proto(stored: StoredSignature) -> ProtoSignatureRecord {
    ProtoSignatureRecord {
        session_id: stored.record.session_id,
        user_id: stored.record.user_id,
        proof: stored.record.proof,
        signature: stored.record.signature,
        created_at: stored.created_at.to_rfc3339(),
    }
}

#[tonic::async_trait]
impl SessionProofService for SessionProofServiceImpl {
    async fn get_server_key(
        &self,
        _request: Request<GetServerKeyRequest>,
    ) -> Result<Response<GetServerKeyResponse>, Status> {
        Ok(Response::new(GetServerKeyResponse {
            public_key: self.attestor.compact_public_key().to_string(),
        }))
    }

    async fn get_server_jwk(
        &self,
        _request: Request<GetServerJwkRequest>,
    ) -> Result<Response<GetServerJwkResponse>, Status> {
        Ok(Response::new(GetServerJwkResponse {
            jwk: self.attestor.public_jwk().to_string(),
        }))
    }

    async fn check_proof(
        &self,
        request: Request<CheckProofRequest>,
    ) -> Result<Response<CheckProofResponse>, Status> {
        let caller = require_caller(&request)?;
        let req = request.into_inner();

        let session = self.verify(req.proof, caller.id().to_string()).await?;
        tracing::info!(
            user_id = %session.user_id(),
            session_id = %session.session_id(),
            "Proof checked"
        );

        Ok(Response::new(CheckProofResponse {
            session_id: session.session_id().to_string(),
        }))
    }

    async fn sign_proof(
        &self,
        request: Request<SignProofRequest>,
    ) -> Result<Response<SignProofResponse>, Status> {
        let caller = require_caller(&request)?;
        let req = request.into_inner();

        let session = self.verify(req.proof, caller.id().to_string()).await?;

        let attestor = self.attestor.clone();
        let record = tokio::task::spawn_blocking(move || attestor.attest(&session))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Signing task failed");
                Status::internal("internal error")
            })?
            .map_err(|e| {
                tracing::error!(error = %e, "Server signing failed");
                Status::internal("internal error")
            })?;

        let stored = match self.store.insert(&record).await {
            Ok(stored) => stored,
            Err(StoreError::Constraint) => {
                tracing::warn!(
                    user_id = %record.user_id,
                    session_id = %record.session_id,
                    "Signature record rejected by store constraint"
                );
                return Err(Status::already_exists("signature record already exists"));
            }
            Err(e) => {
                tracing::error!(error = %e, "Signature store error");
                return Err(Status::internal("internal error"));
            }
        };

        tracing::info!(
            user_id = %stored.record.user_id,
            session_id = %stored.record.session_id,
            id = %stored.id,
            "Proof signed"
        );

        Ok(Response::new(SignProofResponse {
            record: Some(stored_to_proto(stored)),
        }))
    }

    async fn get_signature(
        &self,
        request: Request<GetSignatureRequest>,
    ) -> Result<Response<GetSignatureResponse>, Status> {
        let req = request.into_inner();
        if req.session_id.is_empty() {
            return Err(Status::invalid_argument("session_id is required"));
        }

        let found = match req.user_id.as_deref() {
            Some(user_id) => self.store.find_by_user_session(user_id, &req.session_id).await,
            None => self.store.find_by_session(&req.session_id).await,
        }
        .map_err(|e| {
            tracing::error!(error = %e, "Signature store error");
            Status::internal("internal error")
        })?;

        match found {
            Some(stored) => Ok(Response::new(GetSignatureResponse {
                record: Some(stored_to_proto(stored)),
            })),
            None => Err(Status::not_found("no signature for session")),
        }
    }

    async fn health(
        &self,
        _request: Request<HealthRequest>,
    ) -> Result<Response<HealthResponse>, Status> {
        self.store.ping().await.map_err(|e| {
            tracing::error!(error = %e, "Health check failed");
            Status::unavailable("signature store unavailable")
        })?;

        Ok(Response::new(HealthResponse {
            status: "ok".to_string(),
        }))
    }
}
