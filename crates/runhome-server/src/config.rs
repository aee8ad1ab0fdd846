//! Server configuration from environment.

use std::env;
use std::time::Duration;

use runhome_core::{ElevationConfig, EditorConfig, SearchConfig};
use runhome_services::ServiceConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    /// Idle sessions are dropped after this long.
    pub session_ttl_s: u64,
    pub session_sweep_interval_s: u64,
    pub max_sessions: usize,
    pub routes_target: usize,
    pub max_candidates_per_pass: usize,
    pub inter_call_delay_ms: u64,
    pub profile_cache_max_entries: usize,
    pub services: ServiceConfig,
}

impl Default for Config {
    fn default() -> Self {
        let search = SearchConfig::default();
        Self {
            server_port: 3000,
            session_ttl_s: 3600,
            session_sweep_interval_s: 60,
            max_sessions: 500,
            routes_target: search.routes_target,
            max_candidates_per_pass: search.max_candidates_per_pass,
            inter_call_delay_ms: search.inter_call_delay.as_millis() as u64,
            profile_cache_max_entries: 200,
            services: ServiceConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: env::var("RUNHOME_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.server_port),
            session_ttl_s: env::var("RUNHOME_SESSION_TTL_S")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.session_ttl_s),
            session_sweep_interval_s: env::var("RUNHOME_SESSION_SWEEP_INTERVAL_S")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.session_sweep_interval_s),
            max_sessions: env::var("RUNHOME_MAX_SESSIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_sessions),
            routes_target: env::var("RUNHOME_ROUTES_TARGET")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.routes_target),
            max_candidates_per_pass: env::var("RUNHOME_MAX_CANDIDATES_PER_PASS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_candidates_per_pass),
            inter_call_delay_ms: env::var("RUNHOME_INTER_CALL_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.inter_call_delay_ms),
            profile_cache_max_entries: env::var("RUNHOME_PROFILE_CACHE_MAX_ENTRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.profile_cache_max_entries),
            services: ServiceConfig::from_env(),
        }
    }

    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            routes_target: self.routes_target,
            max_candidates_per_pass: self.max_candidates_per_pass,
            inter_call_delay: Duration::from_millis(self.inter_call_delay_ms),
            ..SearchConfig::default()
        }
    }

    pub fn editor_config(&self) -> EditorConfig {
        EditorConfig::default()
    }

    pub fn elevation_config(&self) -> ElevationConfig {
        ElevationConfig::default()
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_s.max(1))
    }
}
