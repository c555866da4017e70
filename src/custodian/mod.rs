//! Trusted Key Custodian — key-custody lifecycle inside the boundary
//!
//! Owns keypair generation, sealing, unsealing, and signing. The private
//! key exists in plaintext only inside this module; every exit path wipes
//! it. At most one signing identity exists at a time.

pub mod identity;
pub mod sealing;

pub use identity::{SignatureScheme, SigningIdentity};
pub use sealing::{seal_key, unseal_key, BindingPolicy, SealedBlob, SEALED_STATE_MAX};

use crate::error::{Result, SigboxError};
use crate::platform::Measurement;

/// Outcome of a successful `initialize`
pub struct InitOutcome {
    pub public_key: Vec<u8>,
    /// Present only when a fresh keypair was generated: the blob the host
    /// must persist so the key survives restarts.
    pub exported_blob: Option<SealedBlob>,
}

/// The key custodian. Lives on the trusted side of the gateway; hosts
/// never hold one directly.
pub struct KeyCustodian {
    measurement: Measurement,
    scheme: SignatureScheme,
    identity: Option<SigningIdentity>,
}

impl KeyCustodian {
    pub fn new(measurement: Measurement, scheme: SignatureScheme) -> Self {
        Self {
            measurement,
            scheme,
            identity: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.identity.is_some()
    }

    pub fn measurement(&self) -> &Measurement {
        &self.measurement
    }

    /// Generate-or-restore. No blob: generate a fresh keypair and seal it,
    /// returning the blob for persistence. Blob present: unseal it into
    /// private state. Any sub-step failure leaves the custodian fully
    /// uninitialized.
    pub fn initialize(&mut self, sealed: Option<&SealedBlob>) -> Result<InitOutcome> {
        if self.identity.is_some() {
            return Err(SigboxError::Initialization(
                "custodian is already initialized".into(),
            ));
        }

        match sealed {
            None => {
                let identity = SigningIdentity::generate(self.scheme);
                let blob = match seal_key(&self.measurement, self.scheme, &identity.private_bytes())
                {
                    Ok(blob) => blob,
                    Err(e) => {
                        // identity dropped here; key material zeroizes
                        return Err(SigboxError::Initialization(format!(
                            "failed to seal fresh keypair: {e}"
                        )));
                    }
                };
                let public_key = identity.public_key();
                self.identity = Some(identity);
                Ok(InitOutcome {
                    public_key,
                    exported_blob: Some(blob),
                })
            }
            Some(blob) => {
                self.unseal(blob)
                    .map_err(|e| SigboxError::Initialization(format!("restore failed: {e}")))?;
                let public_key = self
                    .identity
                    .as_ref()
                    .map(|id| id.public_key())
                    .unwrap_or_default();
                Ok(InitOutcome {
                    public_key,
                    exported_blob: None,
                })
            }
        }
    }

    /// Sign a payload. `out_capacity` must equal the scheme's fixed
    /// signature size; the signature bytes are the only side effect.
    pub fn sign(&self, payload: &[u8], out_capacity: usize) -> Result<Vec<u8>> {
        let identity = self.identity.as_ref().ok_or(SigboxError::NotInitialized)?;
        if out_capacity != identity.signature_size() {
            return Err(SigboxError::SizeMismatch);
        }
        Ok(identity.sign(payload))
    }

    /// Size a subsequent `sign` will produce. Fixed per scheme.
    pub fn signature_size(&self) -> Result<usize> {
        let identity = self.identity.as_ref().ok_or(SigboxError::NotInitialized)?;
        Ok(identity.signature_size())
    }

    /// Public key of the custodied identity.
    pub fn public_key(&self) -> Result<Vec<u8>> {
        let identity = self.identity.as_ref().ok_or(SigboxError::NotInitialized)?;
        Ok(identity.public_key())
    }

    /// Seal the current private key under the exact code identity.
    pub fn seal(&self) -> Result<SealedBlob> {
        let identity = self.identity.as_ref().ok_or(SigboxError::NotInitialized)?;
        seal_key(&self.measurement, identity.scheme(), &identity.private_bytes())
    }

    /// Authenticate and decrypt a blob into private state. Rejected when an
    /// identity already exists; failure mutates nothing.
    pub fn unseal(&mut self, blob: &SealedBlob) -> Result<()> {
        if self.identity.is_some() {
            return Err(SigboxError::Unseal(
                "custodian already holds an identity".into(),
            ));
        }
        let secret = unseal_key(&self.measurement, blob)?;
        let identity = SigningIdentity::from_private_bytes(blob.scheme, &secret)?;
        self.identity = Some(identity);
        Ok(())
    }

    /// Report custom-data for attestation: the raw public key bytes when
    /// they fit the 64-byte field, otherwise their SHA-256.
    pub fn report_data(&self) -> Result<[u8; 64]> {
        use sha2::{Digest, Sha256};

        let public_key = self.public_key()?;
        let mut data = [0u8; 64];
        if public_key.len() <= 64 {
            data[..public_key.len()].copy_from_slice(&public_key);
        } else {
            let digest = Sha256::digest(&public_key);
            data[..32].copy_from_slice(&digest);
        }
        Ok(data)
    }

    /// Drop the identity. Private key material zeroizes as it drops; used
    /// on unload and when a host callback aborts an initialize.
    pub fn wipe(&mut self) {
        self.identity = None;
    }
}
