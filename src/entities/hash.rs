//! Content hash of an asset.
//!
//! File-backed assets hash their bytes; files above [`SAMPLE_THRESHOLD`]
//! only hash the first and last [`SAMPLE_SIZE`] bytes. Generated content
//! hashes the payload that defines it.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use log::{debug, warn};
use sha2::{Digest, Sha256};

use super::attrs::Attrs;
use super::clip_type::ClipType;
use super::keys::*;

/// Files larger than this are sampled instead of fully read
pub const SAMPLE_THRESHOLD: u64 = 2_000_000;
/// Bytes read from each end of a sampled file
pub const SAMPLE_SIZE: u64 = 1_000_000;

/// Hash result: hex digest plus the file size when one was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHash {
    pub hex: String,
    pub file_size: Option<u64>,
}

/// SHA-256 of a byte slice as lowercase hex
pub fn digest_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Hash a file, sampling head and tail of large files.
pub fn hash_file(path: &Path) -> io::Result<ContentHash> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    let mut hasher = Sha256::new();

    if size > SAMPLE_THRESHOLD {
        let mut buf = vec![0u8; SAMPLE_SIZE as usize];
        file.read_exact(&mut buf)?;
        hasher.update(&buf);
        file.seek(SeekFrom::End(-(SAMPLE_SIZE as i64)))?;
        file.read_exact(&mut buf)?;
        hasher.update(&buf);
    } else {
        let mut buf = Vec::with_capacity(size as usize);
        file.read_to_end(&mut buf)?;
        hasher.update(&buf);
    }

    Ok(ContentHash {
        hex: format!("{:x}", hasher.finalize()),
        file_size: Some(size),
    })
}

/// Compute the hash of an asset from its descriptor.
///
/// Returns `None` when there is nothing to hash or the file cannot be read;
/// callers keep their previous value in that case.
pub fn compute(clip_type: ClipType, descriptor: &Attrs) -> Option<ContentHash> {
    let payload = match clip_type {
        ClipType::SlideShow => descriptor.get_nonempty_str(A_RESOURCE),
        ClipType::Text | ClipType::TextTemplate => descriptor.get_nonempty_str(A_XMLDATA),
        ClipType::QText => descriptor.get_nonempty_str(A_TEXT),
        ClipType::Color => descriptor.get_nonempty_str(A_RESOURCE),
        _ => None,
    };
    if let Some(payload) = payload {
        return Some(ContentHash {
            hex: digest_hex(payload.as_bytes()),
            file_size: None,
        });
    }
    if !clip_type.is_file_backed() {
        return None;
    }

    // Hash the original even while a proxy is substituted
    let path = descriptor
        .get_nonempty_str(A_ORIGINAL_URL)
        .or_else(|| descriptor.get_nonempty_str(A_RESOURCE))?;
    match hash_file(Path::new(path)) {
        Ok(h) => {
            debug!("hashed {} ({} bytes): {}", path, h.file_size.unwrap_or(0), h.hex);
            Some(h)
        }
        Err(e) => {
            warn!("cannot hash {}: {}", path, e);
            None
        }
    }
}
