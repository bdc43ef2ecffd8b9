//! Server key file bootstrap and loading.
//!
//! # Security
//!
//! - The file holds the private key; it is created with mode 0600
//! - Creation never overwrites an existing file

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use sessionproof_auth::{KeyError, KeyPair, KeyPairManager};

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

/// Errors from key file operations.
#[derive(Debug, thiserror::Error)]
pub enum KeyFileError {
    #[error("key file already exists: {0}")]
    AlreadyExists(PathBuf),
    #[error("key file not found: {0} (run `sessionproof-daemon keygen` first)")]
    NotFound(PathBuf),
    #[error("key file error: {0}")]
    Key(#[from] KeyError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Generate a new server key pair and write it to `path`.
///
/// Parent directories are created as needed. Fails if `path` exists.
pub fn create(manager: &KeyPairManager, path: &Path) -> Result<KeyPair, KeyFileError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let key_pair = manager.generate()?;
    let text = manager.export_pair(&key_pair)?;

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::AlreadyExists => KeyFileError::AlreadyExists(path.to_path_buf()),
        _ => KeyFileError::Io(e),
    })?;
    file.write_all(text.as_bytes())?;
    file.sync_all()?;

    Ok(key_pair)
}

/// Load the server key pair from `path`.
pub fn load(manager: &KeyPairManager, path: &Path) -> Result<KeyPair, KeyFileError> {
    let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => KeyFileError::NotFound(path.to_path_buf()),
        _ => KeyFileError::Io(e),
    })?;
    Ok(manager.import_pair(&text)?)
}
