//! Session Manager — host-side lifecycle of the isolated environment
//!
//! State machine: `Unloaded --load--> Loaded --unload--> Unloaded`.
//! - `load()` while Loaded fails `AlreadyLoaded`
//! - `unload()` while Unloaded is a no-op success
//! - any entry call while Unloaded fails `NotLoaded`
//!
//! Each `Session` is an explicit object owned by the caller, so tests and
//! hosts can run independent sessions without shared globals. Within one
//! session the custodied key lives exactly as long as the Loaded state;
//! unload drops the trusted side and the key material wipes with it.

use crate::attestation::report::Report;
use crate::custodian::SignatureScheme;
use crate::error::{Result, SigboxError};
use crate::gateway::{EntryOp, Gateway, HostCallbacks};
use crate::platform::{Backend, Platform};

/// How a session's trusted side is set up.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub backend: Backend,
    pub scheme: SignatureScheme,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Simulated,
            scheme: SignatureScheme::Ed25519,
        }
    }
}

/// One host session over one isolated environment.
pub struct Session<C: HostCallbacks> {
    config: SessionConfig,
    // exactly one of these is Some: callbacks while Unloaded, gateway
    // while Loaded
    callbacks: Option<C>,
    gateway: Option<Gateway<C>>,
    public_key: Option<Vec<u8>>,
}

impl<C: HostCallbacks> Session<C> {
    pub fn new(config: SessionConfig, callbacks: C) -> Self {
        Self {
            config,
            callbacks: Some(callbacks),
            gateway: None,
            public_key: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.gateway.is_some()
    }

    /// Bring up the isolated environment.
    pub fn load(&mut self) -> Result<()> {
        if self.gateway.is_some() {
            return Err(SigboxError::AlreadyLoaded);
        }
        let callbacks = self
            .callbacks
            .take()
            .ok_or_else(|| SigboxError::Transport("session callbacks are gone".into()))?;
        let platform = Platform::new(self.config.backend);
        self.gateway = Some(Gateway::new(
            platform.measurement,
            self.config.scheme,
            callbacks,
        ));
        log::debug!("session loaded on {}", self.config.backend.name());
        Ok(())
    }

    /// Tear down the environment. The custodied key is wiped with it.
    /// Unloading an unloaded session is a no-op success.
    pub fn unload(&mut self) -> Result<()> {
        if let Some(gateway) = self.gateway.take() {
            self.callbacks = Some(gateway.into_callbacks());
            self.public_key = None;
            log::debug!("session unloaded");
        }
        Ok(())
    }

    /// Generate-or-restore the custodied key. With no sealed state a fresh
    /// keypair is generated and its blob handed to the host callbacks;
    /// with sealed state the key is restored from it. Returns the public
    /// key.
    pub fn initialize(&mut self, sealed_state: Option<&[u8]>) -> Result<Vec<u8>> {
        let gateway = self.gateway_mut()?;
        let public_key = gateway.call(EntryOp::Initialize, sealed_state.unwrap_or(&[]), 0)?;
        self.public_key = Some(public_key.clone());
        Ok(public_key)
    }

    /// Public key of the custodied identity, known after `initialize`.
    pub fn public_key(&self) -> Result<Vec<u8>> {
        self.public_key.clone().ok_or(SigboxError::NotInitialized)
    }

    /// Size the next `sign` will produce.
    pub fn signature_size(&mut self) -> Result<usize> {
        let gateway = self.gateway_mut()?;
        let bytes = gateway.call(EntryOp::SignatureSize, &[], 0)?;
        if bytes.len() != 4 {
            return Err(SigboxError::Transport(
                "signature size response is malformed".into(),
            ));
        }
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize)
    }

    /// Sign a payload with the custodied key.
    pub fn sign(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        let size = self.signature_size()? as u32;
        let gateway = self.gateway_mut()?;
        gateway.call(EntryOp::Sign, payload, size)
    }

    /// Build an attestation report bound to `target` inside the boundary.
    pub fn get_report(&mut self, target: &[u8; 32]) -> Result<Report> {
        let gateway = self.gateway_mut()?;
        let bytes = gateway.call(EntryOp::GetReport, target, 0)?;
        Report::from_bytes(&bytes)
    }

    /// Load and restore from existing sealed state in one step. On
    /// restore failure the session is unloaded again.
    pub fn load_with_state(&mut self, sealed_state: &[u8]) -> Result<Vec<u8>> {
        self.load()?;
        match self.initialize(Some(sealed_state)) {
            Ok(public_key) => Ok(public_key),
            Err(e) => {
                self.unload()?;
                Err(e)
            }
        }
    }

    /// Host callbacks, reachable in either state.
    pub fn callbacks(&self) -> &C {
        match (&self.gateway, &self.callbacks) {
            (Some(gateway), _) => gateway.callbacks(),
            (None, Some(callbacks)) => callbacks,
            // one of the two always holds them
            (None, None) => unreachable!(),
        }
    }

    fn gateway_mut(&mut self) -> Result<&mut Gateway<C>> {
        self.gateway.as_mut().ok_or(SigboxError::NotLoaded)
    }
}
