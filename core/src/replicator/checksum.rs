//! Payload checksums
//!
//! SHA-256 over the raw payload bytes, lowercase hex. The same algorithm runs
//! on the primary and every secondary, so digests compare directly regardless
//! of how each side stores the bytes.

use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::{
	fs::File,
	io::{self, AsyncReadExt},
};

const READ_BUF_SIZE: usize = 64 * 1024;

/// Checksum of an in-memory payload
pub fn checksum_bytes(bytes: &[u8]) -> String {
	let mut hasher = Sha256::new();
	hasher.update(bytes);

	hex::encode(hasher.finalize())
}

/// Checksum of a file's full contents, streamed
pub async fn checksum_file(path: &Path) -> Result<String, io::Error> {
	let mut file = File::open(path).await?;
	let mut hasher = Sha256::new();
	let mut buf = vec![0u8; READ_BUF_SIZE];

	loop {
		let count = file.read(&mut buf).await?;
		if count == 0 {
			break;
		}
		hasher.update(&buf[..count]);
	}

	Ok(hex::encode(hasher.finalize()))
}
