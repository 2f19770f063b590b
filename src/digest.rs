//! Content hashing for change detection.
//!
//! Every cataloged file carries the SHA-256 of its full byte content. The
//! hash never identifies a record (the path does); it only answers "did this
//! file change since the catalog last saw it?". Content-based rather than
//! mtime-based so it survives copies and checkouts that reset timestamps.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

const CHUNK: usize = 64 * 1024;

/// SHA-256 of a file's contents, returned as a lowercase hex string.
///
/// Streams the file in 64 KiB chunks; comic archives routinely run to
/// hundreds of megabytes.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(CHUNK, file);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// SHA-256 of an in-memory buffer.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
