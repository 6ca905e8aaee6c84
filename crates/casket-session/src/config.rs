//! Settings for a session store.

use std::time::Duration;

use casket_codec::CompressionType;

use crate::keys::KeyPrefixes;

/// Default number of attempts a CAS retry loop makes before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 256;

/// Default delay before the first retry.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(1);

/// Default ceiling for the exponential backoff.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_millis(50);

/// Bounded exponential backoff for CAS conflicts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts (the first try included) before reporting contention.
    pub max_attempts: u32,

    /// Delay after the first conflict. Doubles per conflict.
    pub initial_backoff: Duration,

    /// Upper bound on a single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Set the attempt bound. Zero is treated as one.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the initial and maximum backoff.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    /// Delay to wait after the `conflicts`-th conflict (1-based).
    pub fn backoff_for(&self, conflicts: u32) -> Duration {
        let shift = conflicts.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }
}

/// Immutable, process-wide settings for a [`SessionStore`](crate::SessionStore).
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Hand out real lock tokens and write with CAS.
    pub exclusive_access: bool,

    /// Pass session bodies through the selected codec.
    pub compress: bool,

    /// Codec used when `compress` is set.
    pub compression_type: CompressionType,

    /// Cache key namespace for this deployment.
    pub keys: KeyPrefixes,

    /// Retry behaviour on CAS conflicts.
    pub retry: RetryPolicy,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            exclusive_access: true,
            compress: false,
            compression_type: CompressionType::default(),
            keys: KeyPrefixes::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ProviderSettings {
    /// Create settings with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable exclusive access.
    pub fn with_exclusive_access(mut self, enabled: bool) -> Self {
        self.exclusive_access = enabled;
        self
    }

    /// Enable compression with the given codec.
    pub fn with_compression(mut self, kind: CompressionType) -> Self {
        self.compress = kind != CompressionType::None;
        self.compression_type = kind;
        self
    }

    /// Disable compression.
    pub fn without_compression(mut self) -> Self {
        self.compress = false;
        self
    }

    /// Set the cache key namespace.
    pub fn with_keys(mut self, keys: KeyPrefixes) -> Self {
        self.keys = keys;
        self
    }

    /// Set the CAS retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The codec to apply, if any.
    pub fn effective_compression(&self) -> CompressionType {
        if self.compress {
            self.compression_type
        } else {
            CompressionType::None
        }
    }
}
