//! Guard identity generation and validation.
//!
//! Format: 26 characters of Crockford base32, `<ts:10><entropy:16>`.
//!
//! The first 10 characters carry a 48-bit Unix millisecond timestamp and the
//! remaining 16 carry 80 bits of entropy, so identities sort by generation
//! time and tie-break on entropy within a millisecond.

use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";
const IDENTITY_LEN: usize = 26;
const MAX_TIMESTAMP_MS: i64 = (1 << 48) - 1;
const ENTROPY_BITS: u32 = 80;

/// Errors that can occur while parsing an identity.
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Invalid identity format: {0}")]
    InvalidFormat(String),
}

/// Value an identity is derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seed {
    Instant(DateTime<Utc>),
    Text(String),
    Integer(u64),
}

impl Seed {
    /// Seed on the current instant.
    pub fn now() -> Self {
        Self::Instant(Utc::now())
    }
}

impl From<DateTime<Utc>> for Seed {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Instant(value)
    }
}

impl From<String> for Seed {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Seed {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<u64> for Seed {
    fn from(value: u64) -> Self {
        Self::Integer(value)
    }
}

/// Maps a seed to an identity string.
///
/// An empty string means no identity can be produced from the seed.
pub trait IdentityGenerator: Send + Sync {
    fn generate(&self, seed: &Seed) -> String;
}

impl<F> IdentityGenerator for F
where
    F: Fn(&Seed) -> String + Send + Sync,
{
    fn generate(&self, seed: &Seed) -> String {
        self(seed)
    }
}

/// Time-ordered generator. Only `Seed::Instant` is supported.
#[derive(Debug, Clone, Copy, Default)]
pub struct UlidGenerator;

impl IdentityGenerator for UlidGenerator {
    fn generate(&self, seed: &Seed) -> String {
        generate_identity(seed)
    }
}

/// Generate an identity with fresh entropy from the thread-local CSPRNG.
pub fn generate_identity(seed: &Seed) -> String {
    match seed {
        Seed::Instant(at) => identity_at(at),
        Seed::Text(_) | Seed::Integer(_) => String::new(),
    }
}

fn identity_at(at: &DateTime<Utc>) -> String {
    let ms = at.timestamp_millis();
    if !(0..=MAX_TIMESTAMP_MS).contains(&ms) {
        return String::new();
    }

    let hi = u128::from(rand::random::<u16>());
    let lo = u128::from(rand::random::<u64>());
    let entropy = (hi << 64) | lo;

    encode(((ms as u128) << ENTROPY_BITS) | entropy)
}

fn encode(mut value: u128) -> String {
    let mut out = [0u8; IDENTITY_LEN];
    for slot in out.iter_mut().rev() {
        *slot = ALPHABET[(value & 0x1f) as usize];
        value >>= 5;
    }
    out.iter().map(|&b| b as char).collect()
}

fn decode_char(c: u8) -> Option<u128> {
    ALPHABET.iter().position(|&a| a == c).map(|i| i as u128)
}

/// Parsed identity components.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedIdentity {
    pub raw: String,
    pub timestamp: DateTime<Utc>,
    pub entropy: u128,
}

impl ParsedIdentity {
    /// Unix timestamp in milliseconds.
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

static IDENTITY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-7][0-9A-HJKMNP-TV-Z]{25}$").unwrap());

/// Parse an identity into its components.
pub fn parse_identity(identity: &str) -> Result<ParsedIdentity, IdentityError> {
    if !IDENTITY_PATTERN.is_match(identity) {
        return Err(IdentityError::InvalidFormat(identity.to_string()));
    }

    let mut value: u128 = 0;
    for c in identity.bytes() {
        let digit =
            decode_char(c).ok_or_else(|| IdentityError::InvalidFormat(identity.to_string()))?;
        value = (value << 5) | digit;
    }

    let ms = (value >> ENTROPY_BITS) as i64;
    let entropy = value & ((1u128 << ENTROPY_BITS) - 1);
    let timestamp = Utc
        .timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| IdentityError::InvalidFormat(identity.to_string()))?;

    Ok(ParsedIdentity {
        raw: identity.to_string(),
        timestamp,
        entropy,
    })
}

/// Validate an identity string.
pub fn validate_identity(identity: &str) -> bool {
    parse_identity(identity).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at_ms(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn test_increasing_instants_sort() {
        let base = at_ms(1_770_000_000_000);
        let mut previous = generate_identity(&Seed::Instant(base));
        for step in 1..200 {
            let next = generate_identity(&Seed::Instant(base + Duration::milliseconds(step)));
            assert!(previous <= next, "{previous} should sort before {next}");
            previous = next;
        }
    }

    #[test]
    fn test_same_instant_differs_by_entropy() {
        let now = Utc::now();
        let a = generate_identity(&Seed::Instant(now));
        let b = generate_identity(&Seed::Instant(now));
        assert_ne!(a, b);
        assert_eq!(a[..10], b[..10]);
    }

    #[test]
    fn test_unsupported_seeds_yield_empty() {
        assert!(generate_identity(&Seed::from("order-42")).is_empty());
        assert!(generate_identity(&Seed::from(42u64)).is_empty());
        assert!(UlidGenerator.generate(&Seed::Text(String::new())).is_empty());
    }

    #[test]
    fn test_out_of_range_instants_yield_empty() {
        assert!(generate_identity(&Seed::Instant(at_ms(-1))).is_empty());
        let beyond = Utc.with_ymd_and_hms(10_999, 1, 1, 0, 0, 0).unwrap();
        assert!(generate_identity(&Seed::Instant(beyond)).is_empty());
    }

    #[test]
    fn test_parse_recovers_timestamp() {
        let at = at_ms(1_770_888_930_123);
        let id = generate_identity(&Seed::Instant(at));
        assert_eq!(id.len(), IDENTITY_LEN);

        let parsed = parse_identity(&id).unwrap();
        assert_eq!(parsed.timestamp, at);
        assert_eq!(parsed.timestamp_ms(), 1_770_888_930_123);
        assert_eq!(parsed.raw, id);
    }

    #[test]
    fn test_ulid_crate_agrees() {
        let at = at_ms(1_770_888_930_123);
        let id = generate_identity(&Seed::Instant(at));
        let parsed = parse_identity(&id).unwrap();

        let ulid = ulid::Ulid::from_string(&id).unwrap();
        assert_eq!(ulid.timestamp_ms(), 1_770_888_930_123);
        assert_eq!(ulid.random(), parsed.entropy);
        assert_eq!(ulid.to_string(), id);
    }

    #[test]
    fn test_parse_invalid_cases() {
        assert!(matches!(
            parse_identity("justonce"),
            Err(IdentityError::InvalidFormat(_))
        ));
        // I, L, O and U are outside the alphabet.
        assert!(!validate_identity("01HZZZZZZZZZZZZZZZZZZZZZZI"));
        assert!(!validate_identity("01hzzzzzzzzzzzzzzzzzzzzzzz"));
        // Leading digit above 7 overflows 128 bits.
        assert!(!validate_identity("80000000000000000000000000"));
        assert!(validate_identity("7ZZZZZZZZZZZZZZZZZZZZZZZZZ"));
    }

    #[test]
    fn test_largest_identity_parses() {
        let parsed = parse_identity("7ZZZZZZZZZZZZZZZZZZZZZZZZZ").unwrap();
        assert_eq!(parsed.timestamp_ms(), MAX_TIMESTAMP_MS);
        assert_eq!(parsed.entropy, (1u128 << ENTROPY_BITS) - 1);
    }

    #[test]
    fn test_closure_generator() {
        let generator = |seed: &Seed| match seed {
            Seed::Text(s) => format!("job-{s}"),
            _ => String::new(),
        };
        assert_eq!(generator.generate(&Seed::from("7")), "job-7");
        assert!(generator.generate(&Seed::now()).is_empty());
    }
}
