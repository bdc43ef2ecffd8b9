//! Session proofs: the token format and its verification.

mod error;
mod token;
mod verify;

pub use error::ProofError;
pub use token::{ProofToken, MAX_PROOF_LEN, SEPARATOR};
pub use verify::{ProofVerifier, VerifiedSession};
