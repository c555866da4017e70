//! Sealing — authenticated encryption of key material bound to the
//! environment's measured identity
//!
//! A sealed blob is opaque and immutable once produced. It is portable
//! across restarts but unseals only inside an instance satisfying its
//! binding policy. Sealing here is AES-256-GCM under a key derived (HKDF)
//! from the measurement, so a blob sealed by one code identity is
//! undecryptable by any other.
//!
//! `seal_key` always binds to the exact code identity: an explicit
//! secrecy-over-portability tradeoff — a blob does not survive a software
//! upgrade. The signer-based derivation path exists only so that a blob's
//! recorded policy is honored on unseal.

use chrono::{DateTime, TimeZone, Utc};
use ring::aead::{Aad, LessSafeKey, Nonce as AeadNonce, UnboundKey, AES_256_GCM};
use ring::hkdf;
use zeroize::{Zeroize, Zeroizing};

use crate::custodian::identity::SignatureScheme;
use crate::error::{Result, SigboxError};
use crate::platform::Measurement;

/// Upper bound on a serialized sealed blob. Oversized input is rejected,
/// never truncated.
pub const SEALED_STATE_MAX: usize = 4096;

const SEAL_VERSION: u8 = 1;
const SEAL_NONCE_LEN: usize = 12;
// version + policy + scheme + nonce + timestamp + ciphertext length
const SEAL_HEADER_LEN: usize = 3 + SEAL_NONCE_LEN + 8 + 4;

/// Identity-binding policy recorded in a sealed blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingPolicy {
    /// Unseals only inside a byte-identical instance (exact measurement).
    CodeIdentity,
    /// Unseals inside any instance signed by the same key. Not emitted by
    /// `seal_key`; accepted on unseal for blobs that record it.
    SignerIdentity,
}

impl BindingPolicy {
    pub const fn tag(&self) -> u8 {
        match self {
            BindingPolicy::CodeIdentity => 1,
            BindingPolicy::SignerIdentity => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(BindingPolicy::CodeIdentity),
            2 => Some(BindingPolicy::SignerIdentity),
            _ => None,
        }
    }
}

/// An opaque sealed blob: AEAD ciphertext plus the plaintext header the
/// ciphertext is authenticated against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBlob {
    pub policy: BindingPolicy,
    pub scheme: SignatureScheme,
    nonce: [u8; SEAL_NONCE_LEN],
    ciphertext: Vec<u8>,
    pub sealed_at: DateTime<Utc>,
}

impl SealedBlob {
    /// Serialize to the flat binary form the sealed-state store persists.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SEAL_HEADER_LEN + self.ciphertext.len());
        out.push(SEAL_VERSION);
        out.push(self.policy.tag());
        out.push(self.scheme.tag());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.sealed_at.timestamp().to_le_bytes());
        out.extend_from_slice(&(self.ciphertext.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse a sealed blob, rejecting undersized, oversized, and malformed
    /// input before any cryptography runs.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SEAL_HEADER_LEN {
            return Err(SigboxError::Unseal("sealed blob is undersized".into()));
        }
        if bytes.len() > SEALED_STATE_MAX {
            return Err(SigboxError::Unseal(format!(
                "sealed blob of {} bytes exceeds the {} byte limit",
                bytes.len(),
                SEALED_STATE_MAX
            )));
        }
        if bytes[0] != SEAL_VERSION {
            return Err(SigboxError::Unseal(format!(
                "unknown sealed blob version {}",
                bytes[0]
            )));
        }
        let policy = BindingPolicy::from_tag(bytes[1])
            .ok_or_else(|| SigboxError::Unseal("unknown binding policy".into()))?;
        let scheme = SignatureScheme::from_tag(bytes[2])
            .ok_or_else(|| SigboxError::Unseal("unknown signature scheme".into()))?;

        let mut nonce = [0u8; SEAL_NONCE_LEN];
        nonce.copy_from_slice(&bytes[3..3 + SEAL_NONCE_LEN]);

        let ts_start = 3 + SEAL_NONCE_LEN;
        let mut ts_bytes = [0u8; 8];
        ts_bytes.copy_from_slice(&bytes[ts_start..ts_start + 8]);
        let sealed_at = Utc
            .timestamp_opt(i64::from_le_bytes(ts_bytes), 0)
            .single()
            .ok_or_else(|| SigboxError::Unseal("invalid seal timestamp".into()))?;

        let len_start = ts_start + 8;
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&bytes[len_start..len_start + 4]);
        let ct_len = u32::from_le_bytes(len_bytes) as usize;
        let ciphertext = &bytes[SEAL_HEADER_LEN..];
        if ciphertext.len() != ct_len {
            return Err(SigboxError::Unseal(
                "sealed blob length field does not match contents".into(),
            ));
        }

        Ok(Self {
            policy,
            scheme,
            nonce,
            ciphertext: ciphertext.to_vec(),
            sealed_at,
        })
    }

    /// Plaintext header bytes authenticated as AEAD associated data. Any
    /// tampering with version, policy, or scheme fails the open.
    fn aad(&self) -> [u8; 3] {
        [SEAL_VERSION, self.policy.tag(), self.scheme.tag()]
    }
}

/// Seal raw private key bytes under the exact code identity.
pub fn seal_key(
    measurement: &Measurement,
    scheme: SignatureScheme,
    secret: &[u8],
) -> Result<SealedBlob> {
    let policy = BindingPolicy::CodeIdentity;
    let key = derive_sealing_key(measurement, policy)?;

    let nonce: [u8; SEAL_NONCE_LEN] = rand::random();
    let mut blob = SealedBlob {
        policy,
        scheme,
        nonce,
        ciphertext: Vec::new(),
        sealed_at: Utc::now(),
    };

    let sealing_key = aead_key(&key)?;
    let mut in_out = secret.to_vec();
    let aad = blob.aad();
    let sealed = sealing_key.seal_in_place_append_tag(
        AeadNonce::assume_unique_for_key(nonce),
        Aad::from(&aad),
        &mut in_out,
    );
    if sealed.is_err() {
        in_out.zeroize();
        return Err(SigboxError::Initialization("sealing AEAD failed".into()));
    }
    blob.ciphertext = in_out;

    if blob.to_bytes().len() > SEALED_STATE_MAX {
        return Err(SigboxError::Initialization(
            "sealed blob exceeds the sealed-state size limit".into(),
        ));
    }
    Ok(blob)
}

/// Authenticate and decrypt a sealed blob. Fails on corruption, wrong
/// binding, or malformed input, with no partial state left behind; the
/// recovered plaintext is wiped when the returned guard drops.
pub fn unseal_key(measurement: &Measurement, blob: &SealedBlob) -> Result<Zeroizing<Vec<u8>>> {
    let key = derive_sealing_key(measurement, blob.policy)?;
    let opening_key = aead_key(&key)?;

    let mut in_out = blob.ciphertext.clone();
    let aad = blob.aad();
    let plain_len = match opening_key.open_in_place(
        AeadNonce::assume_unique_for_key(blob.nonce),
        Aad::from(&aad),
        &mut in_out,
    ) {
        Ok(plain) => plain.len(),
        Err(_) => {
            in_out.zeroize();
            return Err(SigboxError::Unseal(
                "authentication failed: blob is corrupt or bound to a different identity".into(),
            ));
        }
    };

    let secret = Zeroizing::new(in_out[..plain_len].to_vec());
    in_out.zeroize();
    Ok(secret)
}

fn aead_key(key: &Zeroizing<[u8; 32]>) -> Result<LessSafeKey> {
    let unbound = UnboundKey::new(&AES_256_GCM, key.as_ref())
        .map_err(|_| SigboxError::Initialization("sealing key rejected by AEAD".into()))?;
    Ok(LessSafeKey::new(unbound))
}

/// Derive the 32-byte sealing key from the measurement via HKDF-SHA256.
/// The policy selects which identity feeds the derivation.
fn derive_sealing_key(
    measurement: &Measurement,
    policy: BindingPolicy,
) -> Result<Zeroizing<[u8; 32]>> {
    let mut ikm = Zeroizing::new(Vec::with_capacity(35));
    match policy {
        BindingPolicy::CodeIdentity => ikm.extend_from_slice(&measurement.code_identity),
        BindingPolicy::SignerIdentity => ikm.extend_from_slice(&measurement.signer_identity),
    }
    ikm.extend_from_slice(&measurement.svn.to_le_bytes());
    ikm.push(policy.tag());

    let salt = hkdf::Salt::new(hkdf::HKDF_SHA256, b"sigbox-sealing-v1");
    let prk = salt.extract(&ikm);
    let okm = prk
        .expand(&[b"sealing-key"], hkdf::HKDF_SHA256)
        .map_err(|_| SigboxError::Initialization("sealing key derivation failed".into()))?;

    let mut key = Zeroizing::new([0u8; 32]);
    okm.fill(key.as_mut())
        .map_err(|_| SigboxError::Initialization("sealing key derivation failed".into()))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measurement() -> Measurement {
        Measurement::compute("seal-test-build", "seal-test-signer", 1)
    }

    #[test]
    fn test_seal_unseal_round_trip() {
        let m = measurement();
        let secret = [7u8; 32];
        let blob = seal_key(&m, SignatureScheme::Ed25519, &secret).unwrap();
        assert_eq!(blob.policy, BindingPolicy::CodeIdentity);

        let recovered = unseal_key(&m, &blob).unwrap();
        assert_eq!(recovered.as_slice(), &secret);
    }

    #[test]
    fn test_unseal_rejects_foreign_identity() {
        let m = measurement();
        let blob = seal_key(&m, SignatureScheme::Ed25519, &[7u8; 32]).unwrap();

        let other = Measurement::compute("different-build", "seal-test-signer", 1);
        let err = unseal_key(&other, &blob).unwrap_err();
        assert!(matches!(err, SigboxError::Unseal(_)));
    }

    #[test]
    fn test_unseal_rejects_corruption() {
        let m = measurement();
        let blob = seal_key(&m, SignatureScheme::Ed25519, &[7u8; 32]).unwrap();

        let mut bytes = blob.to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let tampered = SealedBlob::from_bytes(&bytes).unwrap();
        assert!(matches!(
            unseal_key(&m, &tampered),
            Err(SigboxError::Unseal(_))
        ));
    }

    #[test]
    fn test_aad_covers_policy_and_scheme() {
        let m = measurement();
        let blob = seal_key(&m, SignatureScheme::Ed25519, &[7u8; 32]).unwrap();

        let mut bytes = blob.to_bytes();
        bytes[2] = SignatureScheme::EcdsaP256.tag(); // rewrite the scheme field
        let tampered = SealedBlob::from_bytes(&bytes).unwrap();
        assert!(matches!(
            unseal_key(&m, &tampered),
            Err(SigboxError::Unseal(_))
        ));
    }

    #[test]
    fn test_from_bytes_rejects_truncated_input() {
        let m = measurement();
        let blob = seal_key(&m, SignatureScheme::Ed25519, &[7u8; 32]).unwrap();
        let bytes = blob.to_bytes();

        assert!(SealedBlob::from_bytes(&bytes[..10]).is_err());
        assert!(SealedBlob::from_bytes(&bytes[..bytes.len() - 4]).is_err());
        assert!(SealedBlob::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_from_bytes_rejects_oversized_input() {
        let mut huge = vec![0u8; SEALED_STATE_MAX + 1];
        huge[0] = SEAL_VERSION;
        assert!(SealedBlob::from_bytes(&huge).is_err());
    }

    #[test]
    fn test_blob_serialization_round_trip() {
        let m = measurement();
        let blob = seal_key(&m, SignatureScheme::EcdsaP256, &[9u8; 32]).unwrap();
        let parsed = SealedBlob::from_bytes(&blob.to_bytes()).unwrap();
        assert_eq!(parsed.scheme, SignatureScheme::EcdsaP256);
        assert_eq!(unseal_key(&m, &parsed).unwrap().as_slice(), &[9u8; 32]);
    }
}
