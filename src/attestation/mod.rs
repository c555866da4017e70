//! Attestation Coordinator — freshness-bound, replay-resistant quotes
//!
//! Protocol:
//! 1. The report is built inside the boundary (custom-data = public key)
//!    and targeted at a specific quoting-authority instance.
//! 2. The host supplies a strictly parsed SPID and linkability mode, plus
//!    a freshly drawn single-use nonce.
//! 3. The authority's own report data must equal SHA-256(nonce ‖ quote),
//!    compared in constant time. A mismatch discards the quote — this is
//!    what defeats substitution of a stale or foreign quote.
//! 4. Quote bytes are released to the caller only after step 3 succeeds.

pub mod authority;
pub mod report;

pub use authority::{
    parse_quote, AuthorityInfo, QuoteResponse, QuotingAuthority, SoftwareAuthority, QUOTE_SIZE,
};
pub use report::{Report, REPORT_SIZE};

use std::str::FromStr;

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, SigboxError};
use crate::gateway::HostCallbacks;
use crate::session::Session;

/// Upper bound on a quote blob. Oversized quotes are rejected, never
/// truncated.
pub const QUOTE_MAX: usize = 2048;

/// Service-provider id: exactly 32 hexadecimal characters, parsed
/// strictly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spid([u8; 16]);

impl Spid {
    pub fn from_raw(raw: [u8; 16]) -> Self {
        Self(raw)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl FromStr for Spid {
    type Err = SigboxError;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 32 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(SigboxError::InvalidSpid(s.to_string()));
        }
        let mut raw = [0u8; 16];
        for (i, byte) in raw.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| SigboxError::InvalidSpid(s.to_string()))?;
        }
        Ok(Self(raw))
    }
}

/// Linkability mode of a quote, parsed from one case-insensitive
/// character: 'l' or 'u'.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteType {
    Linkable,
    Unlinkable,
}

impl QuoteType {
    pub const fn tag(&self) -> u8 {
        match self {
            QuoteType::Linkable => 1,
            QuoteType::Unlinkable => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(QuoteType::Linkable),
            2 => Some(QuoteType::Unlinkable),
            _ => None,
        }
    }
}

impl FromStr for QuoteType {
    type Err = SigboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.chars().next().map(|c| c.to_ascii_lowercase()) {
            Some('l') => Ok(QuoteType::Linkable),
            Some('u') => Ok(QuoteType::Unlinkable),
            _ => Err(SigboxError::InvalidQuoteType(s.to_string())),
        }
    }
}

/// Single-use random freshness value. Wiped when dropped; each quote
/// request draws its own, so reuse is structurally impossible.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Nonce([u8; 16]);

impl Nonce {
    pub fn fresh() -> Self {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Drives the report → quote → verify protocol against one authority.
pub struct AttestationCoordinator<A: QuotingAuthority> {
    authority: A,
}

impl<A: QuotingAuthority> AttestationCoordinator<A> {
    pub fn new(authority: A) -> Self {
        Self { authority }
    }

    pub fn authority(&self) -> &A {
        &self.authority
    }

    /// Obtain a verified quote for the session's custodied key into `out`,
    /// returning the number of bytes written.
    ///
    /// Argument and capacity violations fail before any boundary crossing
    /// is attempted. A quote failing the freshness check is discarded,
    /// never returned.
    pub fn obtain_quote<C: HostCallbacks>(
        &self,
        session: &mut Session<C>,
        spid: &str,
        quote_type: &str,
        out: &mut [u8],
    ) -> Result<usize> {
        let spid: Spid = spid.parse()?;
        let quote_type: QuoteType = quote_type.parse()?;

        let need = self.authority.quote_size();
        if out.len() < need {
            return Err(SigboxError::BufferTooSmall {
                need,
                got: out.len(),
            });
        }

        let report = session.get_report(&self.authority.target_info())?;
        let nonce = Nonce::fresh();
        let response = self
            .authority
            .issue_quote(&report, quote_type, &spid, &nonce)?;

        if response.quote.len() > QUOTE_MAX {
            return Err(SigboxError::AttestationVerificationFailed(format!(
                "quote of {} bytes exceeds the {} byte limit",
                response.quote.len(),
                QUOTE_MAX
            )));
        }

        verify_freshness(&nonce, &response)?;
        // nonce is consumed (zeroized on drop) past this point

        out[..response.quote.len()].copy_from_slice(&response.quote);
        log::info!(
            "verified {:?} quote ({} bytes)",
            quote_type,
            response.quote.len()
        );
        Ok(response.quote.len())
    }
}

/// Recompute SHA-256(nonce ‖ quote) and compare it, in constant time,
/// against the authority's own report data.
pub fn verify_freshness(nonce: &Nonce, response: &QuoteResponse) -> Result<()> {
    let mut h = Sha256::new();
    h.update(nonce.as_bytes());
    h.update(&response.quote);
    let expected = h.finalize();

    let matches: bool = expected
        .as_slice()
        .ct_eq(&response.authority_report_data[..32])
        .into();
    if !matches {
        return Err(SigboxError::AttestationVerificationFailed(
            "authority report data does not attest this nonce and quote".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryCallbacks;
    use crate::session::{Session, SessionConfig};

    const SPID: &str = "0123456789abcdef0123456789abcdef";

    fn loaded_session() -> Session<MemoryCallbacks> {
        let mut session = Session::new(SessionConfig::default(), MemoryCallbacks::default());
        session.load().unwrap();
        session.initialize(None).unwrap();
        session
    }

    #[test]
    fn test_spid_parses_exactly_32_hex() {
        assert!(SPID.parse::<Spid>().is_ok());
        assert!("0123456789ABCDEF0123456789ABCDEF".parse::<Spid>().is_ok());

        for bad in [
            "",
            "0123",
            "0123456789abcdef0123456789abcde",   // 31 chars
            "0123456789abcdef0123456789abcdef0", // 33 chars
            "0123456789abcdef0123456789abcdeg",  // non-hex
            "0123456789abcdef 123456789abcdef",  // whitespace
        ] {
            assert!(
                matches!(bad.parse::<Spid>(), Err(SigboxError::InvalidSpid(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_quote_type_parses_single_letter() {
        assert_eq!("l".parse::<QuoteType>().unwrap(), QuoteType::Linkable);
        assert_eq!("U".parse::<QuoteType>().unwrap(), QuoteType::Unlinkable);
        assert_eq!(
            "unlinkable".parse::<QuoteType>().unwrap(),
            QuoteType::Unlinkable
        );
        assert_eq!(
            "Linkable".parse::<QuoteType>().unwrap(),
            QuoteType::Linkable
        );
        assert!(matches!(
            "x".parse::<QuoteType>(),
            Err(SigboxError::InvalidQuoteType(_))
        ));
        assert!(matches!(
            "".parse::<QuoteType>(),
            Err(SigboxError::InvalidQuoteType(_))
        ));
    }

    #[test]
    fn test_obtain_quote_happy_path() {
        let mut session = loaded_session();
        let coordinator = AttestationCoordinator::new(SoftwareAuthority::new("test-sp"));

        let mut buf = vec![0u8; QUOTE_MAX];
        let n = coordinator
            .obtain_quote(&mut session, SPID, "unlinkable", &mut buf)
            .unwrap();
        assert_eq!(n, QUOTE_SIZE);

        // the quote's report carries the custodied public key
        let (report, quote_type, _) =
            parse_quote(&buf[..n], coordinator.authority()).unwrap();
        assert_eq!(quote_type, QuoteType::Unlinkable);
        let pubkey = session.public_key().unwrap();
        assert_eq!(&report.report_data[..pubkey.len()], pubkey.as_slice());
    }

    #[test]
    fn test_buffer_too_small_before_any_crossing() {
        // session never loaded: a crossing attempt would fail NotLoaded,
        // so getting BufferTooSmall proves the capacity check runs first
        let mut session = Session::new(SessionConfig::default(), MemoryCallbacks::default());
        let coordinator = AttestationCoordinator::new(SoftwareAuthority::new("test-sp"));

        let mut small = vec![0u8; QUOTE_SIZE - 1];
        let err = coordinator
            .obtain_quote(&mut session, SPID, "l", &mut small)
            .unwrap_err();
        assert!(matches!(err, SigboxError::BufferTooSmall { .. }));
    }

    #[test]
    fn test_bad_arguments_rejected_before_crossing() {
        let mut session = Session::new(SessionConfig::default(), MemoryCallbacks::default());
        let coordinator = AttestationCoordinator::new(SoftwareAuthority::new("test-sp"));
        let mut buf = vec![0u8; QUOTE_MAX];

        assert!(matches!(
            coordinator.obtain_quote(&mut session, "nothex", "l", &mut buf),
            Err(SigboxError::InvalidSpid(_))
        ));
        assert!(matches!(
            coordinator.obtain_quote(&mut session, SPID, "q", &mut buf),
            Err(SigboxError::InvalidQuoteType(_))
        ));
    }

    #[test]
    fn test_replayed_quote_fails_fresh_nonce() {
        let mut session = loaded_session();
        let authority = SoftwareAuthority::new("replay-sp");

        let report = session.get_report(&authority.target_info()).unwrap();
        let spid: Spid = SPID.parse().unwrap();
        let stale = authority
            .issue_quote(&report, QuoteType::Linkable, &spid, &Nonce::fresh())
            .unwrap();

        // replaying the old quote bytes against a newly drawn nonce must
        // fail: the authority report data attests the original nonce only
        let fresh = Nonce::fresh();
        assert!(matches!(
            verify_freshness(&fresh, &stale),
            Err(SigboxError::AttestationVerificationFailed(_))
        ));
    }

    #[test]
    fn test_tampered_authority_report_data_rejected() {
        let mut session = loaded_session();
        let authority = SoftwareAuthority::new("tamper-sp");
        let report = session.get_report(&authority.target_info()).unwrap();
        let spid: Spid = SPID.parse().unwrap();

        let nonce = Nonce::fresh();
        let mut response = authority
            .issue_quote(&report, QuoteType::Unlinkable, &spid, &nonce)
            .unwrap();
        assert!(verify_freshness(&nonce, &response).is_ok());

        response.authority_report_data[0] ^= 0x01;
        assert!(verify_freshness(&nonce, &response).is_err());
    }
}
