//! Session-proof identity daemon.
//!
//! Loads the server key, verifies client proofs for callers vouched for by
//! the session layer, counter-signs them and stores the records.

pub mod auth;
pub mod config;
pub mod keyfile;
pub mod services;
pub mod store;
