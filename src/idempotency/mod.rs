use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

pub mod store_redis;

const IN_FLIGHT_SENTINEL: &str = "__in_flight__";

/// Eventually-consistent external cache. `put_if_absent` is the atomic
/// primitive the guard builds its claim on.
#[async_trait::async_trait]
pub trait IdempotencyCache: Send + Sync {
    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

#[derive(Debug, Clone)]
pub enum IdempotencyCheck {
    /// This request holds the claim and must run the real operation.
    Claimed(String),
    /// A finished response exists; return it verbatim, original status
    /// included.
    Replay(CachedResponse),
    /// A concurrent duplicate holds the claim; do not re-execute.
    InFlight,
}

#[derive(Clone)]
pub struct IdempotencyGuard {
    cache: Arc<dyn IdempotencyCache>,
    response_ttl: Duration,
    claim_ttl: Duration,
}

impl IdempotencyGuard {
    pub fn new(cache: Arc<dyn IdempotencyCache>) -> Self {
        Self {
            cache,
            response_ttl: Duration::from_secs(24 * 60 * 60),
            claim_ttl: Duration::from_secs(60),
        }
    }

    pub fn with_ttls(cache: Arc<dyn IdempotencyCache>, response_ttl: Duration, claim_ttl: Duration) -> Self {
        Self {
            cache,
            response_ttl,
            claim_ttl,
        }
    }

    /// An explicit client key always wins; without one, requests are the
    /// same logical operation only if their bodies are byte-identical.
    pub fn resolve_key(explicit: Option<&str>, body: &[u8]) -> String {
        match explicit {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => hex::encode(Sha256::digest(body)),
        }
    }

    pub async fn check(&self, explicit_key: Option<&str>, body: &[u8]) -> Result<IdempotencyCheck> {
        let key = Self::resolve_key(explicit_key, body);
        let cache_key = cache_key(&key);

        // Claim the key atomically before looking at anything else; a bare
        // miss-check would let two concurrent duplicates both execute.
        if self
            .cache
            .put_if_absent(&cache_key, IN_FLIGHT_SENTINEL, self.claim_ttl)
            .await?
        {
            return Ok(IdempotencyCheck::Claimed(key));
        }

        match self.cache.get(&cache_key).await? {
            Some(value) if value == IN_FLIGHT_SENTINEL => Ok(IdempotencyCheck::InFlight),
            Some(value) => {
                let cached: CachedResponse = serde_json::from_str(&value)?;
                Ok(IdempotencyCheck::Replay(cached))
            }
            // The entry expired between the claim attempt and the read;
            // claim again rather than guessing.
            None => {
                if self
                    .cache
                    .put_if_absent(&cache_key, IN_FLIGHT_SENTINEL, self.claim_ttl)
                    .await?
                {
                    Ok(IdempotencyCheck::Claimed(key))
                } else {
                    Ok(IdempotencyCheck::InFlight)
                }
            }
        }
    }

    /// Caches the response only when the status indicates successful
    /// creation; anything else releases the claim so a retry can run.
    pub async fn record(&self, key: &str, response: &CachedResponse) -> Result<()> {
        let cache_key = cache_key(key);
        if (200..300).contains(&response.status) {
            let value = serde_json::to_string(response)?;
            self.cache.put(&cache_key, &value, self.response_ttl).await
        } else {
            self.cache.delete(&cache_key).await
        }
    }

    pub async fn release(&self, key: &str) -> Result<()> {
        self.cache.delete(&cache_key(key)).await
    }
}

fn cache_key(key: &str) -> String {
    format!("idempotency:{key}")
}
