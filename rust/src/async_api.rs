//! Async convenience API built on top of the blocking guard.
//!
//! The grace period is a `tokio` timer, so only the calling task is
//! suspended. Dropping the future abandons the check; a claim already written
//! stays in the store until it expires.

use tracing::Instrument;

use crate::{DuplicateGuard, GuardConfig, GuardError};

impl DuplicateGuard {
    /// Async form of [`DuplicateGuard::check_and_claim`].
    pub async fn check_and_claim_async(
        &self,
        key: &str,
        ttl_seconds: u64,
    ) -> Result<(), GuardError> {
        let span = tracing::debug_span!(
            "check_and_claim",
            key,
            identity = %self.identity(),
            mode = self.mode().as_str()
        );

        async {
            self.write_claim(key, ttl_seconds)?;
            tokio::time::sleep(self.grace_period()).await;
            self.verify_claim(key)
        }
        .instrument(span)
        .await
    }
}

/// Build a guard from `config` and run one check in async contexts.
pub async fn async_check_and_claim(
    config: GuardConfig,
    key: &str,
    ttl_seconds: u64,
) -> Result<DuplicateGuard, GuardError> {
    let guard = DuplicateGuard::new(config)?;
    guard.check_and_claim_async(key, ttl_seconds).await?;
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::tests::{FlakyStore, guard_on};
    use crate::{MemoryStore, Seed, Store, UlidGenerator};
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    #[tokio::test]
    async fn async_single_caller_claims() {
        let store = MemoryStore::shared();
        let guard = guard_on(store.clone(), Duration::from_millis(5));
        guard.check_and_claim_async("k", 60).await.unwrap();
        assert_eq!(store.get("k").unwrap(), guard.identity());
    }

    #[tokio::test]
    async fn async_concurrent_callers_detect_duplication() {
        let store: Arc<dyn Store> = MemoryStore::shared();
        let a = guard_on(Arc::clone(&store), Duration::from_millis(20));
        let b = guard_on(store, Duration::from_millis(20));

        let (ra, rb) = futures::join!(
            a.check_and_claim_async("same-key", 60),
            b.check_and_claim_async("same-key", 60)
        );
        let duplicates = [ra, rb]
            .iter()
            .filter(|r| matches!(r, Err(e) if e.is_duplication()))
            .count();
        assert!(duplicates >= 1);
    }

    #[tokio::test]
    async fn async_cancellation_leaves_written_claim() {
        let store = MemoryStore::shared();
        let guard = guard_on(store.clone(), Duration::from_secs(5));

        let outcome = tokio::time::timeout(
            Duration::from_millis(20),
            guard.check_and_claim_async("k", 60),
        )
        .await;
        assert!(outcome.is_err());
        assert_eq!(store.get("k").unwrap(), guard.identity());
    }

    #[tokio::test]
    async fn async_set_failure_returns_store_error() {
        let store = Arc::new(FlakyStore::default());
        store.fail_set.store(true, Ordering::SeqCst);
        let guard = guard_on(store.clone(), Duration::from_secs(5));

        let outcome = tokio::time::timeout(
            Duration::from_secs(1),
            guard.check_and_claim_async("k", 60),
        )
        .await
        .expect("set failure must not wait for the grace period");
        assert!(matches!(outcome, Err(GuardError::Store(_))));
    }

    #[tokio::test]
    async fn async_check_and_claim_builds_guard() {
        let store = MemoryStore::shared();
        let config = GuardConfig::new(UlidGenerator)
            .with_seed(Seed::now())
            .with_store(store.clone())
            .with_grace_period(Duration::from_millis(1));

        let guard = async_check_and_claim(config, "once", 60).await.unwrap();
        assert_eq!(store.get("once").unwrap(), guard.identity());

        let missing = GuardConfig::new(UlidGenerator).with_store(store);
        assert!(matches!(
            async_check_and_claim(missing, "once", 60).await,
            Err(GuardError::MissingSeed)
        ));
    }
}
