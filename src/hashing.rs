//! Content hashing.
//!
//! A file's identity is the SHA-256 of its bytes, hex-encoded. The digest
//! is computed with a fixed-size streaming buffer so memory use does not
//! grow with file size.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

/// Read buffer size used by [`compute_file_hash`].
pub const HASH_BUFFER_SIZE: usize = 8192;

/// Hex SHA-256 of everything `reader` yields, read `buf_size` bytes at a time.
pub fn hash_reader<R: Read>(mut reader: R, buf_size: usize) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; buf_size.max(1)];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hex SHA-256 of the file at `path`.
pub fn compute_file_hash(path: &Path) -> io::Result<String> {
    hash_reader(File::open(path)?, HASH_BUFFER_SIZE)
}
