use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::warn;

use crate::artifact::ArtifactManifest;

/// Append one manifest as a single NDJSON line.
pub fn append(path: &Path, manifest: &ArtifactManifest) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut line = serde_json::to_string(manifest)?;
    line.push('\n');
    // A torn previous append leaves no trailing newline; start a fresh line
    if !ends_with_newline(path)? {
        line.insert(0, '\n');
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    // One write call per line so a reader never sees half a manifest
    file.write_all(line.as_bytes())?;
    file.sync_data()?;
    Ok(())
}

/// True for a missing or empty file too.
fn ends_with_newline(path: &Path) -> std::io::Result<bool> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e),
    };
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Read every manifest in append order. A missing file means no versions.
/// Lines that do not parse (a torn append) are skipped.
pub fn read_all(path: &Path) -> anyhow::Result<Vec<ArtifactManifest>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(File::open(path)?);
    let mut out = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(manifest) => out.push(manifest),
            Err(e) => warn!(path = %path.display(), line = n + 1, "skipping malformed manifest line: {}", e),
        }
    }
    Ok(out)
}
