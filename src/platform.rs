//! Platform — isolation backend and environment identity
//!
//! Models the capabilities the rest of the crate assumes from the
//! underlying isolation primitive:
//! - **Backend**: which primitive is in use (Intel SGX, ARM TrustZone, or
//!   a software stand-in)
//! - **Measurement**: the environment's code and signer identity, the
//!   anchor for sealing-key derivation and attestation reports
//!
//! The simulated backend keeps the protocol and tests meaningful on any
//! machine but does NOT provide the hardware secrecy guarantee.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Supported isolation backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backend {
    /// Intel SGX enclave
    IntelSgx,
    /// ARM TrustZone
    ArmTrustZone,
    /// Software stand-in (always available, NOT hardware-secured)
    Simulated,
}

impl Backend {
    pub fn name(&self) -> &str {
        match self {
            Backend::IntelSgx => "Intel SGX",
            Backend::ArmTrustZone => "ARM TrustZone",
            Backend::Simulated => "Simulated (software)",
        }
    }

    pub fn is_hardware(&self) -> bool {
        !matches!(self, Backend::Simulated)
    }

    fn probe(&self) -> bool {
        match self {
            Backend::IntelSgx => Self::probe_sgx(),
            Backend::ArmTrustZone => Self::probe_trustzone(),
            Backend::Simulated => true,
        }
    }

    fn probe_sgx() -> bool {
        #[cfg(target_arch = "x86_64")]
        {
            std::path::Path::new("/dev/sgx_enclave").exists()
                || std::path::Path::new("/dev/isgx").exists()
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            false
        }
    }

    fn probe_trustzone() -> bool {
        #[cfg(target_arch = "aarch64")]
        {
            std::path::Path::new("/dev/tee0").exists()
                || std::path::Path::new("/dev/opteearmtz00").exists()
        }
        #[cfg(not(target_arch = "aarch64"))]
        {
            false
        }
    }
}

/// Effective security level of a running environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityLevel {
    /// Hardware-backed isolation available and in use
    Hardware,
    /// Software stand-in (development only, no secrecy guarantee)
    Software,
}

/// Measured identity of the isolated environment.
///
/// `code_identity` covers the exact binary contents; `signer_identity`
/// covers only the key that signed it. Sealing keys derive from one or the
/// other depending on the binding policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    pub code_identity: [u8; 32],
    pub signer_identity: [u8; 32],
    /// Security version number
    pub svn: u16,
}

impl Measurement {
    /// Compute the measurement for this build. Deterministic per binary:
    /// the same code always measures to the same identity, so sealed blobs
    /// survive restarts of the byte-identical instance.
    pub fn compute(code_tag: &str, signer_tag: &str, svn: u16) -> Self {
        let code_identity = {
            let mut h = Sha256::new();
            h.update(code_tag.as_bytes());
            h.update(b"sigbox-code-identity-v1");
            h.finalize().into()
        };
        let signer_identity = {
            let mut h = Sha256::new();
            h.update(signer_tag.as_bytes());
            h.update(b"sigbox-signer-identity-v1");
            h.finalize().into()
        };
        Self {
            code_identity,
            signer_identity,
            svn,
        }
    }

    /// Measurement of the current build.
    pub fn current() -> Self {
        Self::compute(
            concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION")),
            "sigbox-signer-key-v1",
            1,
        )
    }
}

/// A running isolated environment instance
#[derive(Debug, Clone)]
pub struct Platform {
    /// Instance id, for diagnostics only
    pub id: String,
    pub backend: Backend,
    pub security_level: SecurityLevel,
    pub measurement: Measurement,
}

impl Platform {
    pub fn new(backend: Backend) -> Self {
        let security_level = if backend.is_hardware() {
            if backend.probe() {
                SecurityLevel::Hardware
            } else {
                log::warn!(
                    "{} not available, falling back to software stand-in",
                    backend.name()
                );
                SecurityLevel::Software
            }
        } else {
            SecurityLevel::Software
        };

        let id = uuid::Uuid::new_v4().to_string();
        let measurement = Measurement::current();

        log::info!(
            "Isolated environment ready: backend={}, security={:?}, id={}",
            backend.name(),
            security_level,
            &id[..8]
        );

        Self {
            id,
            backend,
            security_level,
            measurement,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measurement_is_stable_across_instances() {
        let a = Platform::new(Backend::Simulated);
        let b = Platform::new(Backend::Simulated);
        assert_eq!(a.measurement, b.measurement);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_code_and_signer_identity_differ() {
        let m = Measurement::current();
        assert_ne!(m.code_identity, m.signer_identity);
    }

    #[test]
    fn test_different_code_different_measurement() {
        let m1 = Measurement::compute("build-a", "signer", 1);
        let m2 = Measurement::compute("build-b", "signer", 1);
        assert_ne!(m1.code_identity, m2.code_identity);
        assert_eq!(m1.signer_identity, m2.signer_identity);
    }

    #[test]
    fn test_simulated_backend_is_software_level() {
        let p = Platform::new(Backend::Simulated);
        assert_eq!(p.security_level, SecurityLevel::Software);
        assert!(!p.backend.is_hardware());
    }
}
