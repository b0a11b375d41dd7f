//! Guard configuration, validation and tunable settings.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::guard::GuardError;
use crate::identity::{IdentityGenerator, Seed, UlidGenerator};
use crate::registry;
use crate::store::Store;

/// Grace period used by the default configuration.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(20);

/// Order of store operations in a duplication check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimMode {
    /// Write, wait, re-read and compare.
    #[default]
    WriteThenVerify,
    /// Read first and fail fast on a live claim held by another identity,
    /// then continue as `WriteThenVerify`. Costs one extra round trip.
    ///
    /// A live claim holding this guard's own identity passes the peek, so a
    /// reused guard can re-claim its key. Stricter variants that reject any
    /// non-empty value would fail that case.
    PeekFirst,
}

impl ClaimMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WriteThenVerify => "write_then_verify",
            Self::PeekFirst => "peek_first",
        }
    }
}

/// Parameters used to construct a [`DuplicateGuard`](crate::DuplicateGuard).
#[derive(Clone)]
pub struct GuardConfig {
    pub(crate) generator: Arc<dyn IdentityGenerator>,
    pub(crate) seed: Option<Seed>,
    pub(crate) grace_period: Duration,
    pub(crate) store: Option<Arc<dyn Store>>,
    pub(crate) mode: ClaimMode,
    pub(crate) cleanup_on_read_error: bool,
    pub(crate) is_default: bool,
}

impl GuardConfig {
    /// Explicit configuration; a seed and a store must be supplied.
    pub fn new(generator: impl IdentityGenerator + 'static) -> Self {
        Self {
            generator: Arc::new(generator),
            seed: None,
            grace_period: DEFAULT_GRACE_PERIOD,
            store: None,
            mode: ClaimMode::default(),
            cleanup_on_read_error: false,
            is_default: false,
        }
    }

    /// Default configuration: time-ordered identities seeded on the
    /// construction instant, the default grace period, and whichever store
    /// is registered process-wide right now.
    pub fn default_params() -> Self {
        Self {
            store: registry::default_store(),
            is_default: true,
            ..Self::new(UlidGenerator)
        }
    }

    /// Seed for the generator. Ignored by default configurations.
    pub fn with_seed(mut self, seed: impl Into<Seed>) -> Self {
        self.seed = Some(seed.into());
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_mode(mut self, mode: ClaimMode) -> Self {
        self.mode = mode;
        self
    }

    /// Delete the key when the verifying read fails.
    pub fn with_cleanup_on_read_error(mut self, enabled: bool) -> Self {
        self.cleanup_on_read_error = enabled;
        self
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    pub fn mode(&self) -> ClaimMode {
        self.mode
    }

    /// Check the configuration without touching the store.
    pub fn validate(&self) -> Result<(), GuardError> {
        if !self.is_default && self.seed.is_none() {
            return Err(GuardError::MissingSeed);
        }

        if self.store.is_none() {
            return Err(GuardError::MissingStore);
        }

        Ok(())
    }
}

impl fmt::Debug for GuardConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardConfig")
            .field("seed", &self.seed)
            .field("grace_period", &self.grace_period)
            .field("has_store", &self.store.is_some())
            .field("mode", &self.mode)
            .field("cleanup_on_read_error", &self.cleanup_on_read_error)
            .field("is_default", &self.is_default)
            .finish_non_exhaustive()
    }
}

/// Errors raised while reading guard settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tunables an application can keep in its own configuration documents.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GuardSettings {
    pub grace_period_ms: u64,
    pub mode: ClaimMode,
    pub cleanup_on_read_error: bool,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            grace_period_ms: DEFAULT_GRACE_PERIOD.as_millis() as u64,
            mode: ClaimMode::default(),
            cleanup_on_read_error: false,
        }
    }
}

impl GuardSettings {
    pub fn from_json(data: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Copy these settings onto `config`.
    pub fn apply(&self, config: GuardConfig) -> GuardConfig {
        config
            .with_grace_period(self.grace_period())
            .with_mode(self.mode)
            .with_cleanup_on_read_error(self.cleanup_on_read_error)
    }
}
