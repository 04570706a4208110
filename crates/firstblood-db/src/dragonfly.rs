//! `Dragonfly` (Redis-compatible) per-challenge locks.
//!
//! Used by [`crate::LockedAwardStore`]. A lock is a key set with
//! `SET key token NX PX ttl`; only the holder of `token` may delete it, which
//! is enforced by a compare-and-delete script.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `lock:award:{category}:{name}` | String | Lock token of the current holder |

use std::time::Duration;

use firstblood_types::AwardKey;
use fred::prelude::*;

use crate::error::DbError;

/// Deletes the lock only if it still carries the caller's token.
const UNLOCK_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Connection handle to a `Dragonfly` (Redis-compatible) instance.
#[derive(Clone)]
pub struct DragonflyPool {
    client: Client,
}

impl DragonflyPool {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    /// Returns [`DbError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let config = Config::from_url(url)
            .map_err(|e| DbError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to Dragonfly");
        Ok(Self { client })
    }

    /// Try once to take the lock at `key` for `ttl`.
    ///
    /// Returns `true` if this call now holds the lock.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the command fails.
    pub async fn try_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, DbError> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let reply: Option<String> = self
            .client
            .set(key, token, Some(Expiration::PX(ttl_ms)), Some(SetOptions::NX), false)
            .await?;
        Ok(reply.is_some())
    }

    /// Release the lock at `key` if it is still held with `token`.
    ///
    /// Returns `false` if the lock had already expired or changed hands.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the script fails.
    pub async fn unlock(&self, key: &str, token: &str) -> Result<bool, DbError> {
        let deleted: i64 = self.client.eval(UNLOCK_SCRIPT, key, token).await?;
        Ok(deleted > 0)
    }

    /// Close the connection.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the quit command fails.
    pub async fn close(&self) -> Result<(), DbError> {
        self.client.quit().await?;
        tracing::info!("Dragonfly connection closed");
        Ok(())
    }
}

/// The lock key guarding one award key.
pub fn lock_key(key: &AwardKey) -> String {
    format!("lock:award:{}:{}", key.category, key.name)
}

#[cfg(test)]
mod tests {
    use firstblood_types::ChallengeRef;

    use super::*;

    #[test]
    fn lock_key_embeds_award_key() {
        let key = AwardKey::for_challenge(&ChallengeRef::new("pwn", "baby-rop"));
        assert_eq!(
            lock_key(&key),
            "lock:award:FirstBlood:First Blood for pwn/baby-rop"
        );
    }
}
