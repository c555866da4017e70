//! Flat-buffer framing for boundary crossings
//!
//! Every entry call marshals through byte buffers with explicit lengths,
//! never pointer graphs, because the boundary must tolerate being
//! implemented as a hard copy. The frame layouts here are deliberately
//! dumb: a tag byte, little-endian lengths, raw payload.

use crate::error::{Result, SigboxError};

/// Largest payload a single entry call will carry across the boundary.
pub const MAX_ENTRY_PAYLOAD: usize = 8192;

/// Payload status codes carried in an `EntryResponse`. Distinct from the
/// transport status: a crossing can succeed while the operation fails.
pub const STATUS_OK: u8 = 0;
pub const STATUS_NOT_INITIALIZED: u8 = 1;
pub const STATUS_INITIALIZATION: u8 = 2;
pub const STATUS_SIZE_MISMATCH: u8 = 3;
pub const STATUS_UNSEAL: u8 = 4;
pub const STATUS_MALFORMED: u8 = 5;
pub const STATUS_CALLBACK_FAILED: u8 = 6;

/// Operations the trusted side exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOp {
    Initialize,
    Sign,
    SignatureSize,
    GetReport,
}

impl EntryOp {
    pub const fn tag(&self) -> u8 {
        match self {
            EntryOp::Initialize => 1,
            EntryOp::Sign => 2,
            EntryOp::SignatureSize => 3,
            EntryOp::GetReport => 4,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(EntryOp::Initialize),
            2 => Some(EntryOp::Sign),
            3 => Some(EntryOp::SignatureSize),
            4 => Some(EntryOp::GetReport),
            _ => None,
        }
    }
}

/// Host→trusted frame: `[op][out_capacity u32][input_len u32][input]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRequest {
    pub op: EntryOp,
    pub input: Vec<u8>,
    pub out_capacity: u32,
}

impl EntryRequest {
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.input.len() > MAX_ENTRY_PAYLOAD {
            return Err(SigboxError::Transport(format!(
                "entry payload of {} bytes exceeds the {} byte limit",
                self.input.len(),
                MAX_ENTRY_PAYLOAD
            )));
        }
        let mut out = Vec::with_capacity(9 + self.input.len());
        out.push(self.op.tag());
        out.extend_from_slice(&self.out_capacity.to_le_bytes());
        out.extend_from_slice(&(self.input.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.input);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 9 {
            return Err(SigboxError::Transport(
                "entry request frame is truncated".into(),
            ));
        }
        let op = EntryOp::from_tag(bytes[0]).ok_or_else(|| {
            SigboxError::Transport(format!("unknown entry operation tag {}", bytes[0]))
        })?;
        let out_capacity = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        let input_len = u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]) as usize;
        if input_len > MAX_ENTRY_PAYLOAD {
            return Err(SigboxError::Transport(format!(
                "entry payload of {input_len} bytes exceeds the {MAX_ENTRY_PAYLOAD} byte limit"
            )));
        }
        if bytes.len() != 9 + input_len {
            return Err(SigboxError::Transport(format!(
                "entry request frame has {} bytes, header promises {}",
                bytes.len(),
                9 + input_len
            )));
        }
        Ok(Self {
            op,
            input: bytes[9..].to_vec(),
            out_capacity,
        })
    }
}

/// Trusted→host frame: `[status][output_len u32][output]`. On a non-Ok
/// status the output carries a UTF-8 diagnostic instead of result bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryResponse {
    pub status: u8,
    pub output: Vec<u8>,
}

impl EntryResponse {
    pub fn ok(output: Vec<u8>) -> Self {
        Self {
            status: STATUS_OK,
            output,
        }
    }

    pub fn failure(err: &SigboxError) -> Self {
        Self {
            status: status_for(err),
            output: err.to_string().into_bytes(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(5 + self.output.len());
        out.push(self.status);
        out.extend_from_slice(&(self.output.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.output);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 5 {
            return Err(SigboxError::Transport(
                "entry response frame is truncated".into(),
            ));
        }
        let output_len = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
        if bytes.len() != 5 + output_len {
            return Err(SigboxError::Transport(format!(
                "entry response frame has {} bytes, header promises {}",
                bytes.len(),
                5 + output_len
            )));
        }
        Ok(Self {
            status: bytes[0],
            output: bytes[5..].to_vec(),
        })
    }

    /// Payload status as a result. Callers check this after the transport
    /// status; both must pass.
    pub fn into_result(self) -> Result<Vec<u8>> {
        if self.status == STATUS_OK {
            return Ok(self.output);
        }
        let detail = String::from_utf8_lossy(&self.output).into_owned();
        Err(error_for(self.status, detail))
    }
}

fn status_for(err: &SigboxError) -> u8 {
    match err {
        SigboxError::NotInitialized => STATUS_NOT_INITIALIZED,
        SigboxError::Initialization(_) => STATUS_INITIALIZATION,
        SigboxError::SizeMismatch => STATUS_SIZE_MISMATCH,
        SigboxError::Unseal(_) => STATUS_UNSEAL,
        SigboxError::Io(_) => STATUS_CALLBACK_FAILED,
        _ => STATUS_MALFORMED,
    }
}

fn error_for(status: u8, detail: String) -> SigboxError {
    match status {
        STATUS_NOT_INITIALIZED => SigboxError::NotInitialized,
        STATUS_INITIALIZATION => SigboxError::Initialization(detail),
        STATUS_SIZE_MISMATCH => SigboxError::SizeMismatch,
        STATUS_UNSEAL => SigboxError::Unseal(detail),
        STATUS_CALLBACK_FAILED => {
            SigboxError::Io(std::io::Error::new(std::io::ErrorKind::Other, detail))
        }
        _ => SigboxError::Transport(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_round_trip() {
        let req = EntryRequest {
            op: EntryOp::Sign,
            input: b"payload".to_vec(),
            out_capacity: 64,
        };
        let bytes = req.encode().unwrap();
        assert_eq!(EntryRequest::decode(&bytes).unwrap(), req);
    }

    #[test]
    fn test_request_rejects_oversized_payload() {
        let req = EntryRequest {
            op: EntryOp::Sign,
            input: vec![0u8; MAX_ENTRY_PAYLOAD + 1],
            out_capacity: 64,
        };
        assert!(req.encode().is_err());
    }

    #[test]
    fn test_request_rejects_truncated_and_unknown_op() {
        assert!(EntryRequest::decode(&[]).is_err());
        assert!(EntryRequest::decode(&[1, 0, 0, 0]).is_err());

        let mut bytes = EntryRequest {
            op: EntryOp::Initialize,
            input: vec![],
            out_capacity: 0,
        }
        .encode()
        .unwrap();
        bytes[0] = 0xff;
        assert!(EntryRequest::decode(&bytes).is_err());
    }

    #[test]
    fn test_request_rejects_length_mismatch() {
        let mut bytes = EntryRequest {
            op: EntryOp::Sign,
            input: b"abc".to_vec(),
            out_capacity: 64,
        }
        .encode()
        .unwrap();
        bytes.pop();
        assert!(EntryRequest::decode(&bytes).is_err());
    }

    #[test]
    fn test_response_round_trip_and_result() {
        let resp = EntryResponse::ok(b"result".to_vec());
        let decoded = EntryResponse::decode(&resp.encode()).unwrap();
        assert_eq!(decoded.into_result().unwrap(), b"result");

        let failure = EntryResponse::failure(&SigboxError::NotInitialized);
        let decoded = EntryResponse::decode(&failure.encode()).unwrap();
        assert!(matches!(
            decoded.into_result(),
            Err(SigboxError::NotInitialized)
        ));
    }

    #[test]
    fn test_response_preserves_error_detail() {
        let failure = EntryResponse::failure(&SigboxError::Unseal("tag check failed".into()));
        let decoded = EntryResponse::decode(&failure.encode()).unwrap();
        match decoded.into_result() {
            Err(SigboxError::Unseal(detail)) => assert!(detail.contains("tag check failed")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
