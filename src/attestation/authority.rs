//! Quoting authority — the external party that turns a report into a
//! verifiable quote
//!
//! `QuotingAuthority` abstracts the quoting-enclave/IAS round trip. The
//! shipped `SoftwareAuthority` is a documented stand-in: it produces
//! structurally real quotes and the freshness binding the coordinator
//! verifies, but carries no hardware root of trust.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::attestation::report::{Report, REPORT_SIZE};
use crate::attestation::{Nonce, QuoteType, Spid};
use crate::error::{Result, SigboxError};

/// Fixed serialized quote size of the software authority:
/// report + quote type + SPID + authority seal.
pub const QUOTE_SIZE: usize = REPORT_SIZE + 1 + 16 + 32;

/// What a quoting authority hands back: the quote itself plus the
/// authority's own report data, which must equal SHA-256(nonce ‖ quote).
pub struct QuoteResponse {
    pub quote: Vec<u8>,
    pub authority_report_data: [u8; 64],
}

/// External quoting authority a report can be targeted at.
pub trait QuotingAuthority {
    /// Identity of this authority instance; reports must bind to it.
    fn target_info(&self) -> [u8; 32];

    /// Fixed size of the quotes this authority issues.
    fn quote_size(&self) -> usize;

    /// Issue a quote over `report`, attesting the freshness nonce in the
    /// authority's own report data.
    fn issue_quote(
        &self,
        report: &Report,
        quote_type: QuoteType,
        spid: &Spid,
        nonce: &Nonce,
    ) -> Result<QuoteResponse>;
}

/// Public description of a software authority instance, exportable for
/// verifiers that want to pin it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityInfo {
    pub label: String,
    pub target: String,
    pub quote_size: usize,
}

/// In-process quoting authority. NOT a hardware authority: it documents
/// the protocol shape so the coordinator and its tests stay meaningful
/// without false security claims.
pub struct SoftwareAuthority {
    label: String,
    id: [u8; 32],
}

impl SoftwareAuthority {
    pub fn new(label: &str) -> Self {
        let id = {
            let mut h = Sha256::new();
            h.update(b"sigbox-authority:");
            h.update(label.as_bytes());
            h.finalize().into()
        };
        Self {
            label: label.to_string(),
            id,
        }
    }

    pub fn info(&self) -> AuthorityInfo {
        AuthorityInfo {
            label: self.label.clone(),
            target: hex::encode(self.id),
            quote_size: QUOTE_SIZE,
        }
    }

    fn seal_over(&self, body: &[u8]) -> [u8; 32] {
        let mut h = Sha256::new();
        h.update(b"sigbox-quote-seal-v1");
        h.update(self.id);
        h.update(body);
        h.finalize().into()
    }
}

impl QuotingAuthority for SoftwareAuthority {
    fn target_info(&self) -> [u8; 32] {
        self.id
    }

    fn quote_size(&self) -> usize {
        QUOTE_SIZE
    }

    fn issue_quote(
        &self,
        report: &Report,
        quote_type: QuoteType,
        spid: &Spid,
        nonce: &Nonce,
    ) -> Result<QuoteResponse> {
        if report.target != self.id {
            return Err(SigboxError::AttestationVerificationFailed(
                "report is not targeted at this authority".into(),
            ));
        }

        let mut quote = Vec::with_capacity(QUOTE_SIZE);
        quote.extend_from_slice(&report.to_bytes());
        quote.push(quote_type.tag());
        quote.extend_from_slice(spid.as_bytes());
        let seal = self.seal_over(&quote);
        quote.extend_from_slice(&seal);

        // The authority attests the freshness binding in its own report.
        let mut authority_report_data = [0u8; 64];
        let mut h = Sha256::new();
        h.update(nonce.as_bytes());
        h.update(&quote);
        authority_report_data[..32].copy_from_slice(&h.finalize());

        log::debug!(
            "authority '{}' issued {} byte {:?} quote",
            self.label,
            quote.len(),
            quote_type
        );
        Ok(QuoteResponse {
            quote,
            authority_report_data,
        })
    }
}

/// Parse a software-authority quote back into its parts. Verifier-side
/// helper: checks the authority seal before returning anything.
pub fn parse_quote(bytes: &[u8], authority: &SoftwareAuthority) -> Result<(Report, QuoteType, Spid)> {
    if bytes.len() != QUOTE_SIZE {
        return Err(SigboxError::AttestationVerificationFailed(format!(
            "quote has {} bytes, expected {}",
            bytes.len(),
            QUOTE_SIZE
        )));
    }
    let body = &bytes[..QUOTE_SIZE - 32];
    let seal = &bytes[QUOTE_SIZE - 32..];
    if seal != authority.seal_over(body) {
        return Err(SigboxError::AttestationVerificationFailed(
            "authority seal does not verify".into(),
        ));
    }

    let report = Report::from_bytes(&body[..REPORT_SIZE])?;
    let quote_type = QuoteType::from_tag(body[REPORT_SIZE]).ok_or_else(|| {
        SigboxError::AttestationVerificationFailed("unknown quote type tag".into())
    })?;
    let mut spid = [0u8; 16];
    spid.copy_from_slice(&body[REPORT_SIZE + 1..REPORT_SIZE + 17]);
    Ok((report, quote_type, Spid::from_raw(spid)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Measurement;

    fn report_for(authority: &SoftwareAuthority) -> Report {
        Report {
            measurement: Measurement::compute("authority-test", "authority-signer", 1),
            report_data: [0x42; 64],
            target: authority.target_info(),
        }
    }

    #[test]
    fn test_issue_and_parse_quote() {
        let authority = SoftwareAuthority::new("test-sp");
        let report = report_for(&authority);
        let spid: Spid = "0123456789abcdef0123456789abcdef".parse().unwrap();
        let nonce = Nonce::fresh();

        let resp = authority
            .issue_quote(&report, QuoteType::Unlinkable, &spid, &nonce)
            .unwrap();
        assert_eq!(resp.quote.len(), QUOTE_SIZE);

        let (parsed, quote_type, parsed_spid) = parse_quote(&resp.quote, &authority).unwrap();
        assert_eq!(parsed, report);
        assert_eq!(quote_type, QuoteType::Unlinkable);
        assert_eq!(parsed_spid.as_bytes(), spid.as_bytes());
    }

    #[test]
    fn test_report_for_wrong_authority_rejected() {
        let authority = SoftwareAuthority::new("real-sp");
        let other = SoftwareAuthority::new("other-sp");
        let mut report = report_for(&authority);
        report.target = other.target_info();

        let spid: Spid = "0123456789abcdef0123456789abcdef".parse().unwrap();
        assert!(authority
            .issue_quote(&report, QuoteType::Linkable, &spid, &Nonce::fresh())
            .is_err());
    }

    #[test]
    fn test_tampered_quote_fails_seal_check() {
        let authority = SoftwareAuthority::new("seal-sp");
        let report = report_for(&authority);
        let spid: Spid = "0123456789abcdef0123456789abcdef".parse().unwrap();
        let mut resp = authority
            .issue_quote(&report, QuoteType::Linkable, &spid, &Nonce::fresh())
            .unwrap();

        resp.quote[0] ^= 0x01;
        assert!(parse_quote(&resp.quote, &authority).is_err());
    }
}
