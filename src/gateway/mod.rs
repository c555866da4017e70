//! Trust Boundary Gateway — the sole channel between host and isolated
//! code
//!
//! Entry calls (host→trusted) cross as flat, explicitly sized buffers;
//! callbacks (trusted→host) handle what the trusted side cannot do
//! itself, persisting sealed blobs and emitting diagnostics. A callback
//! failure aborts the originating call with the failure propagated.
//!
//! The in-process `Gateway` does NOT provide the secrecy guarantee of a
//! hardware boundary; it enforces the same call protocol so everything
//! layered on it stays meaningful.

pub mod wire;

pub use wire::{EntryOp, EntryRequest, EntryResponse, MAX_ENTRY_PAYLOAD};

use crate::attestation::report::Report;
use crate::custodian::{KeyCustodian, SealedBlob, SignatureScheme};
use crate::error::{Result, SigboxError};
use crate::platform::Measurement;

/// Host-side services the trusted side calls back into.
pub trait HostCallbacks {
    /// Persist a freshly sealed blob. Failure aborts the entry call that
    /// produced the blob.
    fn store_sealed_state(&mut self, bytes: &[u8]) -> Result<()>;

    /// Emit a diagnostic line originating inside the boundary.
    fn emit(&mut self, message: &str);
}

/// Callbacks that keep the sealed blob in memory. The default host for
/// tests and for callers that persist state themselves.
#[derive(Debug, Default)]
pub struct MemoryCallbacks {
    pub sealed_state: Option<Vec<u8>>,
}

impl HostCallbacks for MemoryCallbacks {
    fn store_sealed_state(&mut self, bytes: &[u8]) -> Result<()> {
        self.sealed_state = Some(bytes.to_vec());
        Ok(())
    }

    fn emit(&mut self, message: &str) {
        log::info!("[trusted] {message}");
    }
}

/// The boundary itself: owns the trusted side and the host callbacks,
/// and copies every frame across.
pub struct Gateway<C: HostCallbacks> {
    custodian: KeyCustodian,
    callbacks: C,
}

impl<C: HostCallbacks> Gateway<C> {
    pub fn new(measurement: Measurement, scheme: SignatureScheme, callbacks: C) -> Self {
        Self {
            custodian: KeyCustodian::new(measurement, scheme),
            callbacks,
        }
    }

    pub fn callbacks(&self) -> &C {
        &self.callbacks
    }

    pub fn callbacks_mut(&mut self) -> &mut C {
        &mut self.callbacks
    }

    /// Tear the boundary down, handing the callbacks back to the host.
    /// The custodian and its key material drop here.
    pub fn into_callbacks(self) -> C {
        self.callbacks
    }

    /// Raw crossing: decode a request frame, dispatch, encode the
    /// response frame. The returned `Result` is the transport status
    /// only; the operation's own status rides inside the response.
    pub fn entry_call(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
        let request = EntryRequest::decode(frame)?;
        let response = match self.dispatch(&request) {
            Ok(output) => EntryResponse::ok(output),
            Err(err) => EntryResponse::failure(&err),
        };
        Ok(response.encode())
    }

    /// Typed crossing: frame the request, cross, then check transport and
    /// payload status in order.
    pub fn call(&mut self, op: EntryOp, input: &[u8], out_capacity: u32) -> Result<Vec<u8>> {
        let frame = EntryRequest {
            op,
            input: input.to_vec(),
            out_capacity,
        }
        .encode()?;
        let response_frame = self.entry_call(&frame)?;
        EntryResponse::decode(&response_frame)?.into_result()
    }

    fn dispatch(&mut self, request: &EntryRequest) -> Result<Vec<u8>> {
        match request.op {
            EntryOp::Initialize => self.handle_initialize(&request.input),
            EntryOp::Sign => self
                .custodian
                .sign(&request.input, request.out_capacity as usize),
            EntryOp::SignatureSize => {
                let size = self.custodian.signature_size()? as u32;
                Ok(size.to_le_bytes().to_vec())
            }
            EntryOp::GetReport => self.handle_get_report(&request.input),
        }
    }

    /// Generate-or-restore. Empty input generates a fresh keypair and
    /// hands the sealed blob to the host for persistence; non-empty input
    /// is a sealed blob to restore from. Returns the public key.
    fn handle_initialize(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let sealed = if input.is_empty() {
            None
        } else {
            Some(
                SealedBlob::from_bytes(input)
                    .map_err(|e| SigboxError::Initialization(e.to_string()))?,
            )
        };

        let outcome = self.custodian.initialize(sealed.as_ref())?;
        if let Some(blob) = outcome.exported_blob {
            if let Err(e) = self.callbacks.store_sealed_state(&blob.to_bytes()) {
                // host could not persist the blob, so the fresh key would
                // be unrecoverable after unload: abort and wipe
                self.custodian.wipe();
                return Err(SigboxError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("sealed state persistence failed: {e}"),
                )));
            }
        }
        self.callbacks.emit(&format!(
            "custodian initialized, public key {}",
            hex::encode(&outcome.public_key)
        ));
        Ok(outcome.public_key)
    }

    fn handle_get_report(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        if input.len() != 32 {
            return Err(SigboxError::Transport(format!(
                "report target must be 32 bytes, got {}",
                input.len()
            )));
        }
        let mut target = [0u8; 32];
        target.copy_from_slice(input);

        let report = Report {
            measurement: self.custodian.measurement().clone(),
            report_data: self.custodian.report_data()?,
            target,
        };
        Ok(report.to_bytes())
    }
}
