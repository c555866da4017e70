//! Sealed State Store — durable host-side storage
//!
//! Persists the artifacts that outlive a session: the sealed blob, the
//! exported public key, quotes, and signatures. Sealed state is written
//! with atomic whole-file replace (temp file + rename) and read as a
//! whole file; there are no partial-file semantics. Oversized inputs are
//! rejected, never truncated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::custodian::{SignatureScheme, SEALED_STATE_MAX};
use crate::error::{Result, SigboxError};
use crate::gateway::HostCallbacks;

pub const DEFAULT_SEALED_STATE_FILE: &str = "sigbox.sealed";
pub const DEFAULT_PUBLIC_KEY_FILE: &str = "sigbox.pub";
pub const DEFAULT_QUOTE_FILE: &str = "sigbox.quote";
pub const DEFAULT_SIGNATURE_FILE: &str = "sigbox.sig";

/// Sidecar metadata written next to the sealed state, `<file>.meta.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateMeta {
    pub scheme: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
}

/// Whole-file store for one sealed blob.
pub struct SealedStateStore {
    path: PathBuf,
}

impl SealedStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Atomic whole-file replace of the sealed state.
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > SEALED_STATE_MAX {
            return Err(SigboxError::Configuration(format!(
                "sealed state of {} bytes exceeds the {} byte limit",
                bytes.len(),
                SEALED_STATE_MAX
            )));
        }
        write_atomic(&self.path, bytes)?;
        log::info!(
            "sealed state written to {} ({} bytes)",
            self.path.display(),
            bytes.len()
        );
        Ok(())
    }

    /// Whole-file read of the sealed state.
    pub fn read(&self) -> Result<Vec<u8>> {
        let bytes = fs::read(&self.path)?;
        if bytes.len() > SEALED_STATE_MAX {
            return Err(SigboxError::Unseal(format!(
                "sealed state file of {} bytes exceeds the {} byte limit",
                bytes.len(),
                SEALED_STATE_MAX
            )));
        }
        Ok(bytes)
    }

    pub fn write_meta(&self, meta: &StateMeta) -> Result<()> {
        let json = serde_json::to_string_pretty(meta)
            .map_err(|e| SigboxError::Configuration(format!("metadata encoding failed: {e}")))?;
        write_atomic(&self.meta_path(), json.as_bytes())
    }

    pub fn read_meta(&self) -> Result<StateMeta> {
        let json = fs::read_to_string(self.meta_path())?;
        serde_json::from_str(&json)
            .map_err(|e| SigboxError::Configuration(format!("metadata decoding failed: {e}")))
    }

    fn meta_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_SEALED_STATE_FILE.to_string());
        name.push_str(".meta.json");
        self.path.with_file_name(name)
    }
}

/// Write a whole file atomically: temp file in the same directory, then
/// rename over the destination.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Export a public key in armored form, hex body between BEGIN/END lines
/// naming the scheme.
pub fn write_public_key(path: &Path, scheme: SignatureScheme, public_key: &[u8]) -> Result<()> {
    let label = scheme.name().to_uppercase();
    let mut out = format!("-----BEGIN {label} PUBLIC KEY-----\n");
    for chunk in hex::encode(public_key).as_bytes().chunks(64) {
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push('\n');
    }
    out.push_str(&format!("-----END {label} PUBLIC KEY-----\n"));
    write_atomic(path, out.as_bytes())
}

/// Read back an armored public key export.
pub fn read_public_key(path: &Path) -> Result<(SignatureScheme, Vec<u8>)> {
    let text = fs::read_to_string(path)?;
    let mut lines = text.lines();
    let header = lines.next().unwrap_or_default();
    let scheme = [SignatureScheme::Ed25519, SignatureScheme::EcdsaP256]
        .into_iter()
        .find(|s| header.contains(&s.name().to_uppercase()))
        .ok_or_else(|| {
            SigboxError::Configuration(format!("unrecognized public key header {header:?}"))
        })?;

    let body: String = lines.take_while(|l| !l.starts_with("-----END")).collect();
    let bytes = hex::decode(body.trim())
        .map_err(|e| SigboxError::Configuration(format!("bad public key body: {e}")))?;
    if bytes.len() != scheme.public_key_size() {
        return Err(SigboxError::Configuration(format!(
            "public key has {} bytes, {} expects {}",
            bytes.len(),
            scheme.name(),
            scheme.public_key_size()
        )));
    }
    Ok((scheme, bytes))
}

/// Host callbacks backed by the filesystem: sealed blobs land in the
/// store, trusted-side diagnostics go to the log.
pub struct FileCallbacks {
    store: SealedStateStore,
    scheme: SignatureScheme,
}

impl FileCallbacks {
    pub fn new(store: SealedStateStore, scheme: SignatureScheme) -> Self {
        Self { store, scheme }
    }

    pub fn store(&self) -> &SealedStateStore {
        &self.store
    }
}

impl HostCallbacks for FileCallbacks {
    fn store_sealed_state(&mut self, bytes: &[u8]) -> Result<()> {
        self.store.write(bytes)?;
        self.store.write_meta(&StateMeta {
            scheme: self.scheme.name().to_string(),
            created_at: Utc::now(),
            size_bytes: bytes.len() as u64,
        })
    }

    fn emit(&mut self, message: &str) {
        log::info!("[trusted] {message}");
    }
}
