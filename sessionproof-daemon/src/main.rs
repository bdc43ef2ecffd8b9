//! Session-proof Daemon - identity server
//!
//! Exposes the gRPC API used by the session layer and by third parties
//! checking counter-signed proofs.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sessionproof_auth::{KeyPairManager, ProofVerifier, ServerAttestor};
use sessionproof_daemon::auth::{CallerAuthInterceptor, FrontendTrust};
use sessionproof_daemon::config::{KeygenArgs, ServeArgs};
use sessionproof_daemon::keyfile;
use sessionproof_daemon::services::{
    RateLimitInterceptor, ServiceRateLimiter, SessionProofServiceImpl,
};
use sessionproof_daemon::store::SignatureStore;
use sessionproof_proto::session_proof_service_server::SessionProofServiceServer;
use sessionproof_proto::FILE_DESCRIPTOR_SET;
use tokio::signal;
use tonic::service::Interceptor;
use tonic::transport::Server;
use tracing_subscriber::EnvFilter;

/// Session-proof Daemon - verifies and counter-signs session proofs
#[derive(Parser)]
#[command(name = "sessionproof-daemon", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gRPC server
    Serve(ServeArgs),

    /// Generate the server key file (refuses to overwrite)
    Keygen(KeygenArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => cmd_serve(args).await,
        Commands::Keygen(args) => cmd_keygen(args).await,
    }
}

/// Generate and persist a new server key pair.
async fn cmd_keygen(args: KeygenArgs) -> anyhow::Result<()> {
    let path = args.out_path();
    let manager = KeyPairManager::new();

    let key_pair = tokio::task::spawn_blocking({
        let path = path.clone();
        move || keyfile::create(&manager, &path)
    })
    .await??;

    tracing::info!(
        path = %path.display(),
        bits = key_pair.public_key().modulus_bits(),
        "Server key pair generated"
    );
    println!("Key pair written to {}", path.display());
    Ok(())
}

/// Start the daemon server.
async fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    anyhow::ensure!(
        !args.frontend_token.is_empty(),
        "frontend token must not be empty"
    );

    let manager = KeyPairManager::new();

    let key_path = args.key_file_path();
    tracing::info!(path = %key_path.display(), "Loading server key");
    let key_pair = keyfile::load(&manager, &key_path)
        .with_context(|| format!("failed to load server key from {}", key_path.display()))?;
    let attestor = Arc::new(
        ServerAttestor::new(manager.clone(), Arc::new(key_pair))
            .context("failed to export server public key")?,
    );
    tracing::info!(public_key = %attestor.compact_public_key(), "Server identity initialized");

    let db_path = args.database_path();
    tracing::info!(path = %db_path.display(), "Opening database");
    let store = Arc::new(
        SignatureStore::open(&db_path)
            .await
            .with_context(|| format!("failed to open database {}", db_path.display()))?,
    );

    let service =
        SessionProofServiceImpl::new(ProofVerifier::new(manager), attestor, store);

    let limiter = ServiceRateLimiter::new(args.rate_per_second, args.rate_burst);
    tokio::spawn(limiter.clone().prune_forever());

    // Authenticate first so logged-in users are limited by user id
    let mut caller_auth =
        CallerAuthInterceptor::new(Arc::new(FrontendTrust::new(&args.frontend_token)));
    let mut rate_limit = RateLimitInterceptor::new(limiter);
    let interceptor = move |request: tonic::Request<()>| {
        let request = caller_auth.call(request)?;
        rate_limit.call(request)
    };

    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    tracing::info!(addr = %args.listen, "Session-proof daemon starting");

    Server::builder()
        .add_service(reflection)
        .add_service(SessionProofServiceServer::with_interceptor(
            service,
            interceptor,
        ))
        .serve_with_shutdown(args.listen, shutdown_signal())
        .await?;

    tracing::info!("Daemon stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
