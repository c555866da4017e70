//! Sigbox — attested, hardware-custodied signing identity
//!
//! Generates a keypair inside an isolated environment, persists the
//! private key only as a sealed blob bound to that environment's
//! identity, proves via remote attestation that the key lives inside a
//! genuine instance, and signs payloads without the key ever leaving
//! the trust boundary.

pub mod attestation;
pub mod custodian;
pub mod error;
pub mod gateway;
pub mod platform;
pub mod session;
pub mod store;

pub use attestation::{AttestationCoordinator, Nonce, QuoteType, SoftwareAuthority, Spid};
pub use custodian::{BindingPolicy, SealedBlob, SignatureScheme};
pub use error::{Result, SigboxError};
pub use platform::{Backend, Measurement, Platform};
pub use session::{Session, SessionConfig};
pub use store::{FileCallbacks, SealedStateStore};

use attestation::QuotingAuthority;
use gateway::MemoryCallbacks;

/// One-call host binding: spin up a session with a fresh key and return
/// verified quote bytes for it. `identity_label` names the quoting
/// authority instance to attest against.
pub fn attested_quote(spid: &str, identity_label: &str) -> Result<Vec<u8>> {
    let mut session = Session::new(SessionConfig::default(), MemoryCallbacks::default());
    session.load()?;
    session.initialize(None)?;

    let coordinator = AttestationCoordinator::new(SoftwareAuthority::new(identity_label));
    let mut quote = vec![0u8; coordinator.authority().quote_size()];
    let written = coordinator.obtain_quote(&mut session, spid, "unlinkable", &mut quote)?;
    quote.truncate(written);
    session.unload()?;
    Ok(quote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use attestation::parse_quote;

    #[test]
    fn test_attested_quote_binding() {
        let quote = attested_quote("0123456789abcdef0123456789abcdef", "binding-sp").unwrap();
        let authority = SoftwareAuthority::new("binding-sp");
        let (report, quote_type, _) = parse_quote(&quote, &authority).unwrap();
        assert_eq!(quote_type, QuoteType::Unlinkable);
        assert_eq!(report.target, authority.target_info());
    }

    #[test]
    fn test_attested_quote_rejects_bad_spid() {
        assert!(matches!(
            attested_quote("short", "sp"),
            Err(SigboxError::InvalidSpid(_))
        ));
    }

    // the full init scenario: fresh custodian, file-backed host, quote
    // whose report custom-data is the exported public key
    #[test]
    fn test_init_scenario_produces_bound_artifacts() {
        use store::{
            write_atomic, write_public_key, read_public_key, DEFAULT_PUBLIC_KEY_FILE,
            DEFAULT_QUOTE_FILE, DEFAULT_SEALED_STATE_FILE,
        };

        let dir = std::env::temp_dir().join(format!("sigbox-init-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        let scheme = SignatureScheme::Ed25519;
        let store = SealedStateStore::new(dir.join(DEFAULT_SEALED_STATE_FILE));
        let mut session = Session::new(
            SessionConfig::default(),
            FileCallbacks::new(store, scheme),
        );
        session.load().unwrap();
        let public_key = session.initialize(None).unwrap();

        let key_path = dir.join(DEFAULT_PUBLIC_KEY_FILE);
        write_public_key(&key_path, scheme, &public_key).unwrap();

        let coordinator = AttestationCoordinator::new(SoftwareAuthority::new("scenario-sp"));
        let mut quote = vec![0u8; coordinator.authority().quote_size()];
        let written = coordinator
            .obtain_quote(
                &mut session,
                "0123456789abcdef0123456789abcdef",
                "unlinkable",
                &mut quote,
            )
            .unwrap();
        quote.truncate(written);
        write_atomic(&dir.join(DEFAULT_QUOTE_FILE), &quote).unwrap();
        session.unload().unwrap();

        // all three artifacts exist
        assert!(dir.join(DEFAULT_SEALED_STATE_FILE).exists());
        assert!(key_path.exists());
        assert!(dir.join(DEFAULT_QUOTE_FILE).exists());

        // the quote's report custom-data carries the exported public key
        let quote_bytes = std::fs::read(dir.join(DEFAULT_QUOTE_FILE)).unwrap();
        let authority = SoftwareAuthority::new("scenario-sp");
        let (report, _, _) = parse_quote(&quote_bytes, &authority).unwrap();
        let (parsed_scheme, parsed_key) = read_public_key(&key_path).unwrap();
        assert_eq!(parsed_scheme, scheme);
        assert_eq!(&report.report_data[..parsed_key.len()], parsed_key.as_slice());

        // the sealed state restores the same key in a fresh session
        let sealed = std::fs::read(dir.join(DEFAULT_SEALED_STATE_FILE)).unwrap();
        let mut second = Session::new(
            SessionConfig::default(),
            gateway::MemoryCallbacks::default(),
        );
        assert_eq!(second.load_with_state(&sealed).unwrap(), parsed_key);

        std::fs::remove_dir_all(dir).unwrap();
    }
}
