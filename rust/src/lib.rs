//! justonce: a best-effort, time-boxed duplicate-execution guard.
//!
//! A guard writes its identity under a key in a shared expiring store, waits
//! a short grace period, then re-reads the key. If another claimant overwrote
//! it in the meantime, the check reports a duplication. This is a heuristic,
//! not a lock: there are no fencing tokens and no compare-and-swap, and a
//! grace period shorter than the racing callers' skew yields false negatives.
//!
//! # Identity format
//!
//! ```text
//! IDENTITY ::= TIMESTAMP ENTROPY      (Crockford base32, 26 chars)
//! TIMESTAMP ::= 10 chars, 48-bit Unix milliseconds
//! ENTROPY   ::= 16 chars, 80 random bits
//! ```
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use justonce::{DuplicateGuard, GuardConfig, MemoryStore, Seed, UlidGenerator};
//!
//! let config = GuardConfig::new(UlidGenerator)
//!     .with_seed(Seed::now())
//!     .with_store(MemoryStore::shared())
//!     .with_grace_period(Duration::from_millis(5));
//! let guard = DuplicateGuard::new(config).expect("valid guard config");
//!
//! match guard.check_and_claim("send-invoice:42", 60) {
//!     Ok(()) => println!("claimed by {}", guard.identity()),
//!     Err(e) if e.is_duplication() => println!("already running elsewhere"),
//!     Err(e) => println!("guard could not be evaluated: {e}"),
//! }
//! ```

mod async_api;
mod config;
mod guard;
mod identity;
pub mod registry;
mod store;

pub use async_api::async_check_and_claim;
pub use config::{ClaimMode, DEFAULT_GRACE_PERIOD, GuardConfig, GuardSettings, SettingsError};
pub use guard::{DuplicateGuard, GuardError};
pub use identity::{
    IdentityError, IdentityGenerator, ParsedIdentity, Seed, UlidGenerator, generate_identity,
    parse_identity, validate_identity,
};
pub use store::{MemoryStore, Store, StoreError};
