use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::CAS_PREFIX;

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Blob location for a digest: `<root>/sha256/<aa>/<bb>/<hex>`.
pub fn cas_path(root: &Path, hex: &str) -> Option<PathBuf> {
    if hex.len() < 4 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Some(root.join("sha256").join(&hex[0..2]).join(&hex[2..4]).join(hex))
}

/// Store `bytes` under their SHA-256 and return `cas:sha256:<hex>`.
/// Existing blobs are left as they are.
pub fn write_cas(root: &Path, bytes: &[u8]) -> anyhow::Result<String> {
    let hex = sha256_hex(bytes);
    let path = cas_path(root, &hex).ok_or_else(|| anyhow::anyhow!("bad digest {}", hex))?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    if !path.exists() {
        // Write then rename so a crash never leaves a truncated blob at the final path
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
    }
    Ok(format!("{}{}", CAS_PREFIX, hex))
}

/// Read a blob by `cas:sha256:<hex>` reference, verifying its digest.
pub fn read_cas(root: &Path, payload_ref: &str) -> anyhow::Result<Vec<u8>> {
    let hex = payload_ref
        .strip_prefix(CAS_PREFIX)
        .ok_or_else(|| anyhow::anyhow!("bad payload ref '{}'", payload_ref))?;
    let path = cas_path(root, hex).ok_or_else(|| anyhow::anyhow!("bad payload ref '{}'", payload_ref))?;
    let bytes = fs::read(&path)?;
    let actual = sha256_hex(&bytes);
    if actual != hex {
        anyhow::bail!("payload {} is corrupt (digest {})", payload_ref, actual);
    }
    Ok(bytes)
}
