//! Engine configuration.

use std::time::Duration;

const DEFAULT_MAX_LOGINS: usize = 5;
const DEFAULT_STALE_INTERVAL_SECONDS: u64 = 30;

#[derive(Clone, Debug)]
pub struct SaslConfig {
    hide_server_names: bool,
    max_logins: usize,
    use_puid: bool,
    stale_interval: Duration,
}

impl SaslConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            hide_server_names: false,
            max_logins: DEFAULT_MAX_LOGINS,
            use_puid: false,
            stale_interval: Duration::from_secs(DEFAULT_STALE_INTERVAL_SECONDS),
        }
    }

    /// Keep server names out of generated display identities.
    #[must_use]
    pub fn with_hide_server_names(mut self, hide: bool) -> Self {
        self.hide_server_names = hide;
        self
    }

    #[must_use]
    pub fn with_max_logins(mut self, max_logins: usize) -> Self {
        self.max_logins = max_logins;
        self
    }

    /// The uplink has no persistent per-connection ids, so logins arrive
    /// through the burst instead.
    #[must_use]
    pub fn with_use_puid(mut self, use_puid: bool) -> Self {
        self.use_puid = use_puid;
        self
    }

    #[must_use]
    pub fn with_stale_interval_seconds(mut self, seconds: u64) -> Self {
        self.stale_interval = Duration::from_secs(seconds.max(1));
        self
    }

    #[must_use]
    pub fn hide_server_names(&self) -> bool {
        self.hide_server_names
    }

    #[must_use]
    pub fn max_logins(&self) -> usize {
        self.max_logins
    }

    #[must_use]
    pub fn use_puid(&self) -> bool {
        self.use_puid
    }

    /// Reaper tick; idle sessions live between one and two ticks.
    #[must_use]
    pub fn stale_interval(&self) -> Duration {
        self.stale_interval
    }
}

impl Default for SaslConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_overrides() {
        let config = SaslConfig::new();
        assert!(!config.hide_server_names());
        assert_eq!(config.max_logins(), DEFAULT_MAX_LOGINS);
        assert!(!config.use_puid());
        assert_eq!(config.stale_interval(), Duration::from_secs(30));

        let config = config
            .with_hide_server_names(true)
            .with_max_logins(2)
            .with_use_puid(true)
            .with_stale_interval_seconds(10);
        assert!(config.hide_server_names());
        assert_eq!(config.max_logins(), 2);
        assert!(config.use_puid());
        assert_eq!(config.stale_interval(), Duration::from_secs(10));
    }

    #[test]
    fn stale_interval_is_never_zero() {
        let config = SaslConfig::new().with_stale_interval_seconds(0);
        assert_eq!(config.stale_interval(), Duration::from_secs(1));
    }
}
