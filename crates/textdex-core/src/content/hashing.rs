//! Streaming SHA-256 over raw file bytes.
//!
//! The hash is the secondary staleness check: it only runs once size or
//! modification time disagree with the cached entry, to tell a touched file
//! from a modified one.

use crate::config::IndexConfig;
use crate::error::{Result, TextdexError};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// SHA-256 of the file's bytes as lowercase hex.
pub fn compute_content_hash(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let mut file = std::fs::File::open(path).map_err(|e| TextdexError::io_with_path(e, path))?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; IndexConfig::HASH_CHUNK_SIZE];
    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| TextdexError::HashComputationFailure {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// [`compute_content_hash`] on a blocking worker.
pub async fn compute_content_hash_async(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref().to_path_buf();
    let task_path = path.clone();
    tokio::task::spawn_blocking(move || compute_content_hash(&task_path))
        .await
        .map_err(|e| TextdexError::HashComputationFailure {
            path,
            message: format!("hash task failed: {}", e),
        })?
}
