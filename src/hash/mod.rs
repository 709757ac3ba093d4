// Hashing module using SHA-256
//
// Content hashes are bare lowercase hex digests. They name blobs on disk, so
// every hash coming from outside is checked with `validate_hash` first.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use sha2::{Digest, Sha256};

use crate::constants::{HASH_BUFFER_SIZE, HASH_HEX_LEN};
use crate::error::{GalleryError, Result};

/// Compute the SHA-256 of an in-memory byte slice
pub fn compute_hash_from_bytes(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Copy `reader` into a new file at `dest`, hashing the bytes on the way.
/// Returns (bytes written, hex digest).
pub fn write_file_with_hash<R: Read>(dest: &Path, reader: &mut R) -> Result<(u64, String)> {
    let mut file = File::create(dest)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    let mut total: u64 = 0;

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
        file.write_all(&buffer[..bytes_read])?;
        total += bytes_read as u64;
    }
    file.sync_all()?;

    Ok((total, format!("{:x}", hasher.finalize())))
}

/// Check that `hash` is a 64 character lowercase hex digest
pub fn validate_hash(hash: &str) -> Result<()> {
    let well_formed = hash.len() == HASH_HEX_LEN
        && hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
    if well_formed {
        Ok(())
    } else {
        Err(GalleryError::InvalidHash(hash.to_string()))
    }
}

/// Short form for log lines
pub fn short_hash(hash: &str) -> &str {
    &hash[..hash.len().min(7)]
}
