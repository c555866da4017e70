//! Signing identity — one signing capability, interchangeable variants
//!
//! The custodied keypair exists in plaintext only inside the trust
//! boundary. Two schemes are supported, selected by configuration:
//! - **Ed25519**: 32-byte raw public key, 64-byte signature
//! - **ECDSA P-256**: 33-byte SEC1-compressed public key, 64-byte
//!   signature (RFC 6979 deterministic)
//!
//! Both produce a fixed signature size per key, which the trust-boundary
//! call protocol relies on.

use ed25519_dalek::Signer as _;
use ed25519_dalek::Verifier as _;
use p256::ecdsa::signature::Signer as _;
use p256::ecdsa::signature::Verifier as _;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{Result, SigboxError};

/// Signature scheme of a custodied keypair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureScheme {
    Ed25519,
    EcdsaP256,
}

impl SignatureScheme {
    pub fn name(&self) -> &str {
        match self {
            SignatureScheme::Ed25519 => "Ed25519",
            SignatureScheme::EcdsaP256 => "ECDSA P-256",
        }
    }

    /// Fixed signature size in bytes, independent of the payload.
    pub const fn signature_size(&self) -> usize {
        match self {
            SignatureScheme::Ed25519 => 64,
            SignatureScheme::EcdsaP256 => 64,
        }
    }

    /// Fixed public key encoding size in bytes.
    pub const fn public_key_size(&self) -> usize {
        match self {
            SignatureScheme::Ed25519 => 32,
            SignatureScheme::EcdsaP256 => 33,
        }
    }

    pub const fn tag(&self) -> u8 {
        match self {
            SignatureScheme::Ed25519 => 1,
            SignatureScheme::EcdsaP256 => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(SignatureScheme::Ed25519),
            2 => Some(SignatureScheme::EcdsaP256),
            _ => None,
        }
    }

    /// Verify a signature against a public key produced by this scheme.
    /// Host-side helper: needs only public material.
    pub fn verify(&self, public_key: &[u8], payload: &[u8], signature: &[u8]) -> bool {
        match self {
            SignatureScheme::Ed25519 => {
                let Ok(key_bytes) = <&[u8; 32]>::try_from(public_key) else {
                    return false;
                };
                let Ok(key) = ed25519_dalek::VerifyingKey::from_bytes(key_bytes) else {
                    return false;
                };
                let Ok(sig) = ed25519_dalek::Signature::from_slice(signature) else {
                    return false;
                };
                key.verify(payload, &sig).is_ok()
            }
            SignatureScheme::EcdsaP256 => {
                let Ok(key) = p256::ecdsa::VerifyingKey::from_sec1_bytes(public_key) else {
                    return false;
                };
                let Ok(sig) = p256::ecdsa::Signature::from_slice(signature) else {
                    return false;
                };
                key.verify(payload, &sig).is_ok()
            }
        }
    }
}

/// Private key material. Both inner types zeroize their secret on drop.
enum KeyMaterial {
    Ed25519(ed25519_dalek::SigningKey),
    EcdsaP256(p256::ecdsa::SigningKey),
}

/// A custodied signing keypair. Never observable outside the boundary;
/// only public key bytes and signatures cross it.
pub struct SigningIdentity {
    scheme: SignatureScheme,
    key: KeyMaterial,
}

impl SigningIdentity {
    /// Generate a fresh keypair for the given scheme.
    pub fn generate(scheme: SignatureScheme) -> Self {
        let key = match scheme {
            SignatureScheme::Ed25519 => {
                KeyMaterial::Ed25519(ed25519_dalek::SigningKey::generate(&mut OsRng))
            }
            SignatureScheme::EcdsaP256 => {
                KeyMaterial::EcdsaP256(p256::ecdsa::SigningKey::random(&mut OsRng))
            }
        };
        Self { scheme, key }
    }

    /// Recreate an identity from raw private key bytes (the unsealed form).
    pub fn from_private_bytes(scheme: SignatureScheme, bytes: &[u8]) -> Result<Self> {
        let key = match scheme {
            SignatureScheme::Ed25519 => {
                let arr = <&[u8; 32]>::try_from(bytes).map_err(|_| {
                    SigboxError::Unseal("private key has wrong length for Ed25519".into())
                })?;
                KeyMaterial::Ed25519(ed25519_dalek::SigningKey::from_bytes(arr))
            }
            SignatureScheme::EcdsaP256 => {
                let key = p256::ecdsa::SigningKey::from_slice(bytes).map_err(|_| {
                    SigboxError::Unseal("private key is not a valid P-256 scalar".into())
                })?;
                KeyMaterial::EcdsaP256(key)
            }
        };
        Ok(Self { scheme, key })
    }

    pub fn scheme(&self) -> SignatureScheme {
        self.scheme
    }

    /// Raw private key bytes, for sealing only. Wiped when dropped.
    pub fn private_bytes(&self) -> Zeroizing<Vec<u8>> {
        match &self.key {
            KeyMaterial::Ed25519(key) => Zeroizing::new(key.to_bytes().to_vec()),
            KeyMaterial::EcdsaP256(key) => Zeroizing::new(key.to_bytes().to_vec()),
        }
    }

    /// Public key in the scheme's fixed encoding.
    pub fn public_key(&self) -> Vec<u8> {
        match &self.key {
            KeyMaterial::Ed25519(key) => key.verifying_key().to_bytes().to_vec(),
            KeyMaterial::EcdsaP256(key) => key
                .verifying_key()
                .to_encoded_point(true)
                .as_bytes()
                .to_vec(),
        }
    }

    pub fn signature_size(&self) -> usize {
        self.scheme.signature_size()
    }

    /// Sign a payload. Deterministic for both schemes: the same key and
    /// payload always yield the same signature bytes.
    pub fn sign(&self, payload: &[u8]) -> Vec<u8> {
        match &self.key {
            KeyMaterial::Ed25519(key) => {
                let sig: ed25519_dalek::Signature = key.sign(payload);
                sig.to_bytes().to_vec()
            }
            KeyMaterial::EcdsaP256(key) => {
                let sig: p256::ecdsa::Signature = key.sign(payload);
                sig.to_bytes().to_vec()
            }
        }
    }
}
