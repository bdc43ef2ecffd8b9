//! Session-proof CLI - client for the identity server

mod utils;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sessionproof_auth::{verify_attestation, KeyPairManager, ProofToken, SignatureRecord};
use sessionproof_proto::{
    session_proof_service_client::SessionProofServiceClient, CheckProofRequest,
    GetServerJwkRequest, GetServerKeyRequest, GetSignatureRequest, HealthRequest,
    SignProofRequest, TOKEN_HEADER, USER_HEADER,
};
use tonic::transport::Channel;

use crate::utils::{format_timestamp, record_to_json, truncate};

/// Session-proof - mint, sign and verify session proofs
#[derive(Parser)]
#[command(name = "sessionproof", version, about)]
struct Cli {
    /// Server address
    #[arg(
        long,
        env = "SESSIONPROOF_SERVER",
        default_value = "http://127.0.0.1:50061",
        global = true
    )]
    server: String,

    /// Secret shared with the server, needed to act for a user
    #[arg(
        long,
        env = "SESSIONPROOF_FRONTEND_TOKEN",
        hide_env_values = true,
        global = true
    )]
    frontend_token: Option<String>,

    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the server and its signature store are up
    Health,

    /// Print the server public key
    ServerKey {
        /// Print the JWK JSON instead of the compact form
        #[arg(long)]
        jwk: bool,
    },

    /// Mint a proof with a fresh client key (offline)
    Mint {
        /// User id to claim
        #[arg(long)]
        user: String,

        /// Session id to claim
        #[arg(long)]
        session: String,
    },

    /// Verify a proof for a user without signing it
    Check {
        /// Logged-in user id
        #[arg(long)]
        user: String,

        /// Proof text
        #[arg(long)]
        proof: String,
    },

    /// Have the server verify and counter-sign a proof
    Sign {
        /// Logged-in user id
        #[arg(long)]
        user: String,

        /// Proof text
        #[arg(long)]
        proof: String,
    },

    /// Fetch the signature record for a session
    Lookup {
        /// Session id
        #[arg(long)]
        session: String,

        /// Restrict to this user's record
        #[arg(long)]
        user: Option<String>,

        /// Check the counter-signature against the server public key
        #[arg(long)]
        verify: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let result = run(cli).await;

    if let Err(e) = &result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Mint { user, session } => cmd_mint(&cli, user, session),

        Commands::Health => {
            let mut client = connect(&cli.server).await?;
            cmd_health(&mut client, &cli).await
        }

        Commands::ServerKey { jwk } => {
            let mut client = connect(&cli.server).await?;
            cmd_server_key(&mut client, &cli, *jwk).await
        }

        Commands::Check { user, proof } => {
            let mut client = connect(&cli.server).await?;
            cmd_check(&mut client, &cli, user, proof).await
        }

        Commands::Sign { user, proof } => {
            let mut client = connect(&cli.server).await?;
            cmd_sign(&mut client, &cli, user, proof).await
        }

        Commands::Lookup {
            session,
            user,
            verify,
        } => {
            let mut client = connect(&cli.server).await?;
            cmd_lookup(&mut client, &cli, session, user.as_deref(), *verify).await
        }
    }
}

async fn connect(addr: &str) -> Result<SessionProofServiceClient<Channel>> {
    SessionProofServiceClient::connect(addr.to_string())
        .await
        .context("Failed to connect to server")
}

/// Wrap `message` with the session-layer credentials for `user`.
fn as_user<T>(cli: &Cli, user: &str, message: T) -> Result<tonic::Request<T>> {
    let token = cli
        .frontend_token
        .as_deref()
        .context("--frontend-token (or SESSIONPROOF_FRONTEND_TOKEN) is required")?;

    let mut request = tonic::Request::new(message);
    request.metadata_mut().insert(
        USER_HEADER,
        user.parse().context("user id must be printable ASCII")?,
    );
    request.metadata_mut().insert(
        TOKEN_HEADER,
        token.parse().context("frontend token must be printable ASCII")?,
    );
    Ok(request)
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_mint(cli: &Cli, user: &str, session: &str) -> Result<()> {
    let manager = KeyPairManager::new();
    let client_key = manager.generate().context("Failed to generate client key")?;
    let proof = ProofToken::mint(&manager, &client_key, user, session)
        .context("Failed to mint proof")?;

    if cli.json {
        let public_key = manager.export_public_only(&client_key)?;
        println!(
            "{}",
            serde_json::to_string(&serde_json::json!({
                "proof": proof,
                "public_key": public_key.as_str(),
            }))?
        );
    } else {
        println!("{}", proof);
    }
    Ok(())
}

async fn cmd_health(client: &mut SessionProofServiceClient<Channel>, cli: &Cli) -> Result<()> {
    let status = client
        .health(HealthRequest {})
        .await
        .context("Health check failed")?
        .into_inner()
        .status;

    if cli.json {
        println!("{}", serde_json::json!({ "status": status }));
    } else {
        println!("Server status: {}", status);
    }
    Ok(())
}

async fn cmd_server_key(
    client: &mut SessionProofServiceClient<Channel>,
    cli: &Cli,
    jwk: bool,
) -> Result<()> {
    let key = if jwk {
        client
            .get_server_jwk(GetServerJwkRequest {})
            .await
            .context("GetServerJwk failed")?
            .into_inner()
            .jwk
    } else {
        client
            .get_server_key(GetServerKeyRequest {})
            .await
            .context("GetServerKey failed")?
            .into_inner()
            .public_key
    };

    if cli.json {
        let field = if jwk { "jwk" } else { "public_key" };
        println!("{}", serde_json::json!({ field: key }));
    } else {
        println!("{}", key);
    }
    Ok(())
}

async fn cmd_check(
    client: &mut SessionProofServiceClient<Channel>,
    cli: &Cli,
    user: &str,
    proof: &str,
) -> Result<()> {
    let request = as_user(
        cli,
        user,
        CheckProofRequest {
            proof: proof.to_string(),
        },
    )?;
    let response = client
        .check_proof(request)
        .await
        .context("CheckProof failed")?
        .into_inner();

    if cli.json {
        println!("{}", serde_json::json!({ "session_id": response.session_id }));
    } else {
        println!("Proof valid for session {}", response.session_id);
    }
    Ok(())
}

async fn cmd_sign(
    client: &mut SessionProofServiceClient<Channel>,
    cli: &Cli,
    user: &str,
    proof: &str,
) -> Result<()> {
    let request = as_user(
        cli,
        user,
        SignProofRequest {
            proof: proof.to_string(),
        },
    )?;
    let record = client
        .sign_proof(request)
        .await
        .context("SignProof failed")?
        .into_inner()
        .record
        .context("server returned no record")?;

    if cli.json {
        println!("{}", serde_json::to_string(&record_to_json(&record))?);
    } else {
        println!("Signed session {} for {}", record.session_id, record.user_id);
        println!("Signature: {}", record.signature);
    }
    Ok(())
}

async fn cmd_lookup(
    client: &mut SessionProofServiceClient<Channel>,
    cli: &Cli,
    session: &str,
    user: Option<&str>,
    verify: bool,
) -> Result<()> {
    let record = client
        .get_signature(GetSignatureRequest {
            session_id: session.to_string(),
            user_id: user.map(str::to_string),
        })
        .await
        .context("GetSignature failed")?
        .into_inner()
        .record
        .context("server returned no record")?;

    let verified = if verify {
        let compact = client
            .get_server_key(GetServerKeyRequest {})
            .await
            .context("GetServerKey failed")?
            .into_inner()
            .public_key;
        let manager = KeyPairManager::new();
        let server_key = manager
            .import_public_only(&compact)
            .context("server returned an unusable public key")?;
        let attested = SignatureRecord {
            session_id: record.session_id.clone(),
            user_id: record.user_id.clone(),
            proof: record.proof.clone(),
            signature: record.signature.clone(),
        };
        Some(verify_attestation(&manager, &attested, &server_key))
    } else {
        None
    };

    if cli.json {
        let mut json = record_to_json(&record);
        if let Some(valid) = verified {
            json["verified"] = serde_json::Value::Bool(valid);
        }
        println!("{}", serde_json::to_string(&json)?);
    } else {
        println!("Session:   {}", record.session_id);
        println!("User:      {}", record.user_id);
        println!("Signed at: {}", format_timestamp(&record.created_at));
        println!("Proof:     {}", truncate(&record.proof, 60));
        println!("Signature: {}", truncate(&record.signature, 60));
        if let Some(valid) = verified {
            println!("Verified:  {}", if valid { "yes" } else { "NO" });
        }
    }

    if verified == Some(false) {
        bail!("counter-signature does not verify against the server key");
    }
    Ok(())
}
