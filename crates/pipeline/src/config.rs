//! Shared provider configuration state
//!
//! One flag decides routing: whether the primary provider was seen quota
//! exhausted, and when. The flag expires after a cooldown so the primary is
//! retried once the vendor window is likely to have reset. State is held
//! in-process behind an async `RwLock`; concurrent analyses may race on the
//! flag, which at worst costs one extra call against an exhausted provider.

use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::info;

/// How long the primary stays flagged before it is retried.
pub const QUOTA_COOLDOWN: Duration = Duration::from_secs(60 * 60);

/// Routing state for the primary provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderConfig {
    pub primary_quota_exceeded: bool,
    /// When the flag was last raised. `None` when never flagged.
    pub last_quota_check: Option<Instant>,
}

/// Concurrent store for `ProviderConfig`.
#[derive(Debug, Default)]
pub struct ProviderConfigStore {
    inner: RwLock<ProviderConfig>,
}

impl ProviderConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current state.
    pub async fn get(&self) -> ProviderConfig {
        *self.inner.read().await
    }

    /// Replace the state wholesale.
    pub async fn set(&self, config: ProviderConfig) {
        *self.inner.write().await = config;
    }

    /// Raise the quota flag and stamp the cooldown start.
    pub async fn mark_primary_exhausted(&self) {
        let mut config = self.inner.write().await;
        config.primary_quota_exceeded = true;
        config.last_quota_check = Some(Instant::now());
        info!("primary provider flagged as quota exhausted");
    }

    /// Whether the primary may be called right now.
    ///
    /// An expired flag is cleared on observation, so the first caller after
    /// the cooldown retries the primary and later callers see a clean flag.
    pub async fn primary_available(&self, cooldown: Duration) -> bool {
        {
            let config = self.inner.read().await;
            if !config.primary_quota_exceeded {
                return true;
            }
            match config.last_quota_check {
                Some(flagged_at) if flagged_at.elapsed() < cooldown => return false,
                _ => {}
            }
        }

        let mut config = self.inner.write().await;
        // Re-check under the write lock; another caller may have re-flagged.
        if config.primary_quota_exceeded
            && config
                .last_quota_check
                .is_none_or(|flagged_at| flagged_at.elapsed() >= cooldown)
        {
            config.primary_quota_exceeded = false;
            info!("quota cooldown elapsed, primary provider re-enabled");
        }
        !config.primary_quota_exceeded
    }

    /// Remaining cooldown, for health reporting. `None` when not flagged or
    /// already expired.
    pub async fn cooldown_remaining(&self, cooldown: Duration) -> Option<Duration> {
        let config = self.inner.read().await;
        if !config.primary_quota_exceeded {
            return None;
        }
        let flagged_at = config.last_quota_check?;
        cooldown.checked_sub(flagged_at.elapsed())
    }
}
