//! Process-wide configuration (§6.5), loaded from a TOML file with a handful
//! of environment-variable overrides for secrets.

use serde::Deserialize;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub worker_count: usize,
    pub queue_high_water: usize,
    pub auction_slack_ms: u64,
    pub post_max_attempts: u32,
    pub post_backoff: Vec<u64>,
    pub eligibility_cache_ttl_sec: u64,
    pub daily_counter_timezone: String,
    pub worker_deadletter_cap: usize,
    pub database_url: String,
    pub http_host: Ipv4Addr,
    pub http_port: u16,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            worker_count: 8,
            queue_high_water: 80,
            auction_slack_ms: 500,
            post_max_attempts: 3,
            post_backoff: vec![500, 2000],
            eligibility_cache_ttl_sec: 60,
            daily_counter_timezone: "America/New_York".to_string(),
            worker_deadletter_cap: 1000,
            database_url: "postgres://localhost/lead_broker".to_string(),
            http_host: Ipv4Addr::UNSPECIFIED,
            http_port: 8080,
            log_filter: "info".to_string(),
        }
    }
}

impl Settings {
    /// Applies the environment-variable overrides named in SPEC_FULL §6.5.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database_url = url;
        }
        if let Ok(filter) = std::env::var("RUST_LOG") {
            self.log_filter = filter;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let s = Settings::default();
        assert_eq!(s.worker_count, 8);
        assert_eq!(s.post_backoff, vec![500, 2000]);
        assert_eq!(s.post_max_attempts, 3);
        assert_eq!(s.eligibility_cache_ttl_sec, 60);
        assert_eq!(s.daily_counter_timezone, "America/New_York");
    }
}
