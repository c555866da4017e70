//! Crate-wide error taxonomy.
//!
//! Every core operation returns a discriminated `Result` — nothing panics
//! across the trust boundary. State-machine and argument errors are fatal
//! only to the current call.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SigboxError>;

#[derive(Debug, Error)]
pub enum SigboxError {
    /// Bad external input, caught before the core runs.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Key generation, sealing, or restore failed during `initialize`.
    /// The custodian is left fully uninitialized.
    #[error("initialization failed: {0}")]
    Initialization(String),

    #[error("custodian is not initialized")]
    NotInitialized,

    #[error("session is not loaded")]
    NotLoaded,

    #[error("session is already loaded")]
    AlreadyLoaded,

    /// Caller-supplied output capacity does not equal the fixed signature
    /// size of the active scheme.
    #[error("output capacity does not match the fixed signature size")]
    SizeMismatch,

    #[error("buffer of {got} bytes is too small, {need} bytes required")]
    BufferTooSmall { need: usize, got: usize },

    #[error("invalid SPID: {0:?}")]
    InvalidSpid(String),

    #[error("invalid quote type: {0:?}")]
    InvalidQuoteType(String),

    /// Freshness or integrity check on a quote failed. Never downgraded to
    /// a warning; the quote is discarded.
    #[error("attestation verification failed: {0}")]
    AttestationVerificationFailed(String),

    /// Corrupt, foreign, undersized, or oversized sealed input. No partial
    /// state mutation has occurred.
    #[error("unseal failed: {0}")]
    Unseal(String),

    /// The boundary-crossing mechanism itself failed, independent of the
    /// payload outcome.
    #[error("boundary transport failure: {0}")]
    Transport(String),

    #[error("storage I/O failure: {0}")]
    Io(#[from] std::io::Error),
}
