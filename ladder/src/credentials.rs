use crate::{bot::UserId, clock::Clock};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use fnv::FnvHashMap;
use ladder_execution::client::ApiCredentials;
use parking_lot::Mutex;
use std::{fmt::Debug, sync::Arc};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("no credentials stored for user {0}")]
    Missing(String),

    #[error("secret store unavailable: {0}")]
    Unavailable(String),
}

impl CredentialError {
    /// Store outages are worth retrying; a missing user record is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CredentialError::Unavailable(_))
    }
}

/// Read access to per-user venue credentials. The secret store itself is an
/// external collaborator; implementations only fetch.
#[async_trait]
pub trait CredentialProvider: Send + Sync + std::fmt::Debug {
    async fn credentials(&self, user: &UserId) -> Result<ApiCredentials, CredentialError>;
}

/// Fixed in-process credential set, for tests and single-user deployments.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    by_user: FnvHashMap<UserId, ApiCredentials>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: UserId, credentials: ApiCredentials) -> Self {
        self.by_user.insert(user, credentials);
        self
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn credentials(&self, user: &UserId) -> Result<ApiCredentials, CredentialError> {
        self.by_user
            .get(user)
            .cloned()
            .ok_or_else(|| CredentialError::Missing(user.to_string()))
    }
}

/// Read-through TTL cache over another [`CredentialProvider`].
///
/// Credentials are immutable once issued; the TTL only bounds how long a
/// revocation can go unnoticed.
#[derive(Debug)]
pub struct CachedCredentials<P> {
    inner: P,
    ttl: ChronoDuration,
    clock: Arc<dyn Clock>,
    cache: Mutex<FnvHashMap<UserId, (ApiCredentials, DateTime<Utc>)>>,
}

impl<P> CachedCredentials<P> {
    pub fn new(inner: P, ttl: ChronoDuration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            ttl,
            clock,
            cache: Mutex::new(FnvHashMap::default()),
        }
    }
}

#[async_trait]
impl<P> CredentialProvider for CachedCredentials<P>
where
    P: CredentialProvider,
{
    async fn credentials(&self, user: &UserId) -> Result<ApiCredentials, CredentialError> {
        let now = self.clock.now();

        if let Some((credentials, fetched_at)) = self.cache.lock().get(user) {
            if now - *fetched_at < self.ttl {
                return Ok(credentials.clone());
            }
        }

        let credentials = self.inner.credentials(user).await?;
        self.cache
            .lock()
            .insert(user.clone(), (credentials.clone(), now));
        Ok(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CredentialProvider for CountingProvider {
        async fn credentials(&self, _user: &UserId) -> Result<ApiCredentials, CredentialError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ApiCredentials {
                key: "key".to_string(),
                secret: "secret".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_cache_hits_within_ttl_and_refetches_after() {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let provider = CachedCredentials::new(
            CountingProvider::default(),
            ChronoDuration::minutes(10),
            clock.clone(),
        );
        let user = UserId::new("u1");

        provider.credentials(&user).await.unwrap();
        provider.credentials(&user).await.unwrap();
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 1);

        clock.advance(ChronoDuration::minutes(11));
        provider.credentials(&user).await.unwrap();
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_static_credentials_missing_user() {
        let provider = StaticCredentials::new();
        let result = provider.credentials(&UserId::new("nobody")).await;
        assert_eq!(
            result,
            Err(CredentialError::Missing("nobody".to_string()))
        );
    }
}
