use std::time::Duration;

use serde::Deserialize;

/// Configuration for the distributed lock
///
/// # Example
/// ```ron
/// lock: Some((
///     key: "courier:dispatch:lock",
///     ttl_secs: 90,
/// )),
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct LockConfig {
    /// Key every instance contends for
    #[serde(default = "default_key")]
    pub key: String,

    /// Lifetime of an unextended lock entry (seconds)
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            key: default_key(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl LockConfig {
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn default_key() -> String {
    "courier:dispatch:lock".to_string()
}

/// Above half the default 120s interval, the extension period
const fn default_ttl_secs() -> u64 {
    90
}
