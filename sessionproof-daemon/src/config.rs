//! Daemon configuration from flags and environment.
//!
//! Every flag falls back to a `SESSIONPROOF_*` environment variable; a `.env`
//! file in the working directory is loaded first.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Args;

/// Default gRPC listen address.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:50061";

const KEY_FILE_NAME: &str = "key_pair.json";
const DATABASE_NAME: &str = "signatures.db";

/// Per-user data directory for the daemon.
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sessionproof")
}

/// Options for `serve`.
#[derive(Clone, Args)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "SESSIONPROOF_LISTEN", default_value = DEFAULT_LISTEN)]
    pub listen: SocketAddr,

    /// Server key file [default: <data dir>/sessionproof/key_pair.json]
    #[arg(long, env = "SESSIONPROOF_KEY_FILE")]
    pub key_file: Option<PathBuf>,

    /// Signature database [default: <data dir>/sessionproof/signatures.db]
    #[arg(long, env = "SESSIONPROOF_DATABASE")]
    pub database: Option<PathBuf>,

    /// Secret shared with the session layer that forwards logged-in users
    #[arg(long, env = "SESSIONPROOF_FRONTEND_TOKEN", hide_env_values = true)]
    pub frontend_token: String,

    /// Sustained request rate per caller
    #[arg(long, env = "SESSIONPROOF_RATE_PER_SECOND", default_value_t = 2)]
    pub rate_per_second: u32,

    /// Request burst size per caller
    #[arg(long, env = "SESSIONPROOF_RATE_BURST", default_value_t = 10)]
    pub rate_burst: u32,
}

impl ServeArgs {
    /// Key file path with the default applied.
    pub fn key_file_path(&self) -> PathBuf {
        resolve_key_file(self.key_file.as_ref())
    }

    /// Database path with the default applied.
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| data_dir().join(DATABASE_NAME))
    }
}

/// Options for `keygen`.
#[derive(Debug, Clone, Args)]
pub struct KeygenArgs {
    /// Where to write the key file [default: <data dir>/sessionproof/key_pair.json]
    #[arg(long, env = "SESSIONPROOF_KEY_FILE")]
    pub out: Option<PathBuf>,
}

impl KeygenArgs {
    /// Output path with the default applied.
    pub fn out_path(&self) -> PathBuf {
        resolve_key_file(self.out.as_ref())
    }
}

fn resolve_key_file(path: Option<&PathBuf>) -> PathBuf {
    path.cloned()
        .unwrap_or_else(|| data_dir().join(KEY_FILE_NAME))
}
