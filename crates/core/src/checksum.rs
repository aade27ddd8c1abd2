//! Content hashing for upload integrity checks
//!
//! S3 reports a plain MD5 hex digest as the ETag of a single-part upload
//! and a digest-of-digests with a `-N` suffix for an N-part multipart
//! upload. [`multipart_etag`] reproduces that algorithm for the chunk size
//! the transfer layer uploads with, so a verified upload can be compared
//! byte for byte against what the store reports.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const READ_BUFFER_SIZE: usize = 256 * 1024;

/// Lowercase hex MD5 of the whole file
pub async fn md5_file(path: &Path) -> Result<String> {
    let path = path.to_path_buf();
    spawn_hash(move || md5_file_sync(&path)).await
}

/// Quoted S3-compatible ETag of `path` when uploaded in `chunk_size` parts
pub async fn multipart_etag(path: &Path, chunk_size: u64) -> Result<String> {
    let path: PathBuf = path.to_path_buf();
    spawn_hash(move || multipart_etag_sync(&path, chunk_size)).await
}

async fn spawn_hash<F>(f: F) -> Result<String>
where
    F: FnOnce() -> Result<String> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::General(format!("hashing task failed: {e}")))?
}

/// Synchronous whole-file MD5 (runs in a blocking thread)
pub fn md5_file_sync(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        context.consume(&buffer[..n]);
    }
    Ok(format!("{:x}", context.compute()))
}

/// Synchronous multipart ETag computation
///
/// The file is split into `chunk_size` parts and each part hashed. A single
/// part (including an empty file) yields `"<hex>"`; more parts yield the MD5
/// of the concatenated raw part digests formatted as `"<hex>-<N>"`.
pub fn multipart_etag_sync(path: &Path, chunk_size: u64) -> Result<String> {
    if chunk_size == 0 {
        return Err(Error::InvalidInput(
            "multipart chunk size must be positive".to_string(),
        ));
    }

    let mut file = File::open(path)?;
    let mut part_digests: Vec<[u8; 16]> = Vec::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let mut context = md5::Context::new();
        let mut part_len: u64 = 0;

        while part_len < chunk_size {
            let want = (chunk_size - part_len).min(buffer.len() as u64) as usize;
            let n = file.read(&mut buffer[..want])?;
            if n == 0 {
                break;
            }
            context.consume(&buffer[..n]);
            part_len += n as u64;
        }

        // An empty trailing read ends the file unless it is the only part
        if part_len == 0 && !part_digests.is_empty() {
            break;
        }
        part_digests.push(context.compute().0);
        if part_len < chunk_size {
            break;
        }
    }

    if part_digests.len() == 1 {
        return Ok(format!("\"{}\"", hex_digest(&part_digests[0])));
    }

    let mut final_context = md5::Context::new();
    for digest in &part_digests {
        final_context.consume(digest);
    }
    Ok(format!(
        "\"{:x}-{}\"",
        final_context.compute(),
        part_digests.len()
    ))
}

/// Compare two ETags ignoring surrounding quotes
pub fn etags_match(a: &str, b: &str) -> bool {
    a.trim_matches('"') == b.trim_matches('"')
}

fn hex_digest(digest: &[u8; 16]) -> String {
    format!("{:x}", md5::Digest(*digest))
}
