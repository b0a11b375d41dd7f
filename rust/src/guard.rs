//! Duplicate-execution guard.
//!
//! A check writes the guard's identity under a key, waits for the grace
//! period, then re-reads the key. Any other value means a concurrent claimant
//! overwrote it. The store only needs last-writer-wins semantics per key.

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::config::{ClaimMode, GuardConfig};
use crate::identity::Seed;
use crate::store::{Store, StoreError};

/// Errors and the duplication outcome of a guard.
#[derive(Error, Debug)]
pub enum GuardError {
    #[error("No seed provided")]
    MissingSeed,
    #[error("No store provided")]
    MissingStore,
    #[error("No identity could be generated from the seed")]
    EmptyIdentity,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Duplication detected for key {key}")]
    DuplicationDetected { key: String },
}

impl GuardError {
    /// True when a concurrent claimant holds the key.
    pub fn is_duplication(&self) -> bool {
        matches!(self, Self::DuplicationDetected { .. })
    }
}

/// One claimant: an identity plus the store it arbitrates through.
#[derive(Clone)]
pub struct DuplicateGuard {
    identity: String,
    created_at: DateTime<Utc>,
    grace_period: Duration,
    store: Arc<dyn Store>,
    mode: ClaimMode,
    cleanup_on_read_error: bool,
}

impl DuplicateGuard {
    /// Validate `config` and generate this guard's identity. No store I/O.
    pub fn new(config: GuardConfig) -> Result<Self, GuardError> {
        config.validate()?;

        let created_at = Utc::now();
        let seed = match (config.is_default, config.seed) {
            (true, _) => Seed::Instant(created_at),
            (false, Some(seed)) => seed,
            (false, None) => return Err(GuardError::MissingSeed),
        };
        let store = config.store.ok_or(GuardError::MissingStore)?;

        let identity = config.generator.generate(&seed);
        if identity.is_empty() {
            return Err(GuardError::EmptyIdentity);
        }

        Ok(Self {
            identity,
            created_at,
            grace_period: config.grace_period,
            store,
            mode: config.mode,
            cleanup_on_read_error: config.cleanup_on_read_error,
        })
    }

    /// Guard built from [`GuardConfig::default_params`].
    pub fn with_defaults() -> Result<Self, GuardError> {
        Self::new(GuardConfig::default_params())
    }

    /// Claim `key` for `ttl_seconds` unless another identity races for it.
    ///
    /// Blocks the calling thread for the grace period. Returns
    /// `GuardError::DuplicationDetected` when the re-read value is not this
    /// guard's identity, including when the entry vanished.
    pub fn check_and_claim(&self, key: &str, ttl_seconds: u64) -> Result<(), GuardError> {
        let span = tracing::debug_span!(
            "check_and_claim",
            key,
            identity = %self.identity,
            mode = self.mode.as_str()
        );
        let _entered = span.enter();

        self.write_claim(key, ttl_seconds)?;
        thread::sleep(self.grace_period);
        self.verify_claim(key)
    }

    /// Peek (when enabled) and write. Nothing is written on a peek hit.
    pub(crate) fn write_claim(&self, key: &str, ttl_seconds: u64) -> Result<(), GuardError> {
        if self.mode == ClaimMode::PeekFirst {
            self.peek(key)?;
        }

        self.store.set(key, &self.identity, ttl_seconds)?;
        trace!(ttl_seconds, "claim written");
        Ok(())
    }

    /// A failed peek is not fatal; the write and verify still arbitrate.
    fn peek(&self, key: &str) -> Result<(), GuardError> {
        match self.store.get(key) {
            Ok(current) if !current.is_empty() && current != self.identity => {
                debug!(holder = %current, "live claim found before write");
                Err(GuardError::DuplicationDetected {
                    key: key.to_string(),
                })
            }
            Ok(_) => Ok(()),
            Err(err) => {
                debug!(error = %err, "peek failed, continuing with write");
                Ok(())
            }
        }
    }

    pub(crate) fn verify_claim(&self, key: &str) -> Result<(), GuardError> {
        let current = match self.store.get(key) {
            Ok(current) => current,
            Err(err) => {
                if self.cleanup_on_read_error {
                    self.cleanup(key);
                }
                return Err(err.into());
            }
        };

        if current != self.identity {
            debug!(holder = %current, "claim overwritten during grace period");
            return Err(GuardError::DuplicationDetected {
                key: key.to_string(),
            });
        }

        trace!("claim held");
        Ok(())
    }

    fn cleanup(&self, key: &str) {
        if let Err(err) = self.store.delete(key) {
            warn!(error = %err, "best-effort delete after failed read also failed");
        }
    }

    /// This guard's identity.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Instant this guard was constructed.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    pub fn mode(&self) -> ClaimMode {
        self.mode
    }
}

impl fmt::Debug for DuplicateGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuplicateGuard")
            .field("identity", &self.identity)
            .field("created_at", &self.created_at)
            .field("grace_period", &self.grace_period)
            .field("mode", &self.mode)
            .field("cleanup_on_read_error", &self.cleanup_on_read_error)
            .finish_non_exhaustive()
    }
}
