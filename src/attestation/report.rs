//! Attestation report — signed statement of executing-code identity
//!
//! Built inside the trust boundary and marshaled out as a flat,
//! fixed-size buffer. The custom-data field carries the custodied public
//! key (or its hash), which is what links the key to the environment.

use crate::error::{Result, SigboxError};
use crate::platform::Measurement;

/// Flat serialized size: measurement (32 + 32 + 2) + report data + target.
pub const REPORT_SIZE: usize = 66 + 64 + 32;

/// A report binds the environment's measurement and 64 bytes of custom
/// data to a specific quoting-authority instance (`target`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub measurement: Measurement,
    pub report_data: [u8; 64],
    pub target: [u8; 32],
}

impl Report {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(REPORT_SIZE);
        out.extend_from_slice(&self.measurement.code_identity);
        out.extend_from_slice(&self.measurement.signer_identity);
        out.extend_from_slice(&self.measurement.svn.to_le_bytes());
        out.extend_from_slice(&self.report_data);
        out.extend_from_slice(&self.target);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != REPORT_SIZE {
            return Err(SigboxError::Transport(format!(
                "report has {} bytes, expected {}",
                bytes.len(),
                REPORT_SIZE
            )));
        }
        let mut code_identity = [0u8; 32];
        code_identity.copy_from_slice(&bytes[0..32]);
        let mut signer_identity = [0u8; 32];
        signer_identity.copy_from_slice(&bytes[32..64]);
        let svn = u16::from_le_bytes([bytes[64], bytes[65]]);
        let mut report_data = [0u8; 64];
        report_data.copy_from_slice(&bytes[66..130]);
        let mut target = [0u8; 32];
        target.copy_from_slice(&bytes[130..162]);

        Ok(Self {
            measurement: Measurement {
                code_identity,
                signer_identity,
                svn,
            },
            report_data,
            target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_round_trip() {
        let report = Report {
            measurement: Measurement::compute("report-test", "report-signer", 3),
            report_data: [0xab; 64],
            target: [0xcd; 32],
        };
        let bytes = report.to_bytes();
        assert_eq!(bytes.len(), REPORT_SIZE);
        assert_eq!(Report::from_bytes(&bytes).unwrap(), report);
    }

    #[test]
    fn test_report_rejects_wrong_size() {
        assert!(Report::from_bytes(&[0u8; REPORT_SIZE - 1]).is_err());
        assert!(Report::from_bytes(&[0u8; REPORT_SIZE + 1]).is_err());
    }
}
