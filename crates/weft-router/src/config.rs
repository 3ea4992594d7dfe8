//! Router configuration.

use serde::{Deserialize, Serialize};

use crate::{
    Result, RouterError, DEFAULT_GLOBAL_MAINTENANCE_PERIOD_SECS,
    DEFAULT_LOCAL_MAINTENANCE_PERIOD_SECS, DEFAULT_MAX_TIMEOUTS,
    DEFAULT_REACH_DECREASE_PER_SECOND, DEFAULT_SEARCH_TIMEOUT_MS, GMRT_INITIAL_MILLIS,
    GMRT_WINDOW_SECONDS, NODE_STORE_SIZE, RETURN_SIZE,
};

/// Tunables for the router core and its maintenance loops.
///
/// Every field has a default, so an empty config section deserializes to
/// a fully usable configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Maximum peers kept in the node store.
    #[serde(default = "default_node_store_size")]
    pub node_store_size: usize,
    /// Peers per reply and seeds per search (K).
    #[serde(default = "default_return_size")]
    pub return_size: usize,
    /// GMRT averaging window in one-second buckets.
    #[serde(default = "default_gmrt_window_seconds")]
    pub gmrt_window_seconds: usize,
    /// Synthetic sample seeding the GMRT roller, in milliseconds.
    #[serde(default = "default_gmrt_initial_millis")]
    pub gmrt_initial_millis: u32,
    /// Upper bound on the 2 x GMRT probe deadline, in milliseconds.
    #[serde(default = "default_search_timeout_ms")]
    pub search_timeout_ms: u64,
    /// Consecutive timeouts before a peer is dropped from the store.
    #[serde(default = "default_max_timeouts")]
    pub max_timeouts: u32,
    /// Linear reach decay per second.
    #[serde(default = "default_reach_decrease_per_second")]
    pub reach_decrease_per_second: u32,
    /// Period of the local (random-target) maintenance search, seconds.
    #[serde(default = "default_local_maintenance_period_secs")]
    pub local_maintenance_period_secs: u64,
    /// Period of the global (served-target) maintenance search, seconds.
    #[serde(default = "default_global_maintenance_period_secs")]
    pub global_maintenance_period_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            node_store_size: default_node_store_size(),
            return_size: default_return_size(),
            gmrt_window_seconds: default_gmrt_window_seconds(),
            gmrt_initial_millis: default_gmrt_initial_millis(),
            search_timeout_ms: default_search_timeout_ms(),
            max_timeouts: default_max_timeouts(),
            reach_decrease_per_second: default_reach_decrease_per_second(),
            local_maintenance_period_secs: default_local_maintenance_period_secs(),
            global_maintenance_period_secs: default_global_maintenance_period_secs(),
        }
    }
}

impl RouterConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidConfig`] when a field is zero or the
    /// store could not hold a full reply.
    pub fn validate(&self) -> Result<()> {
        if self.return_size == 0 {
            return Err(RouterError::InvalidConfig(
                "return_size must be at least 1".to_string(),
            ));
        }
        if self.node_store_size < self.return_size {
            return Err(RouterError::InvalidConfig(format!(
                "node_store_size ({}) is smaller than return_size ({})",
                self.node_store_size, self.return_size,
            )));
        }
        if self.gmrt_window_seconds == 0 {
            return Err(RouterError::InvalidConfig(
                "gmrt_window_seconds must be at least 1".to_string(),
            ));
        }
        if self.gmrt_initial_millis == 0 {
            return Err(RouterError::InvalidConfig(
                "gmrt_initial_millis must be at least 1".to_string(),
            ));
        }
        if self.search_timeout_ms == 0 {
            return Err(RouterError::InvalidConfig(
                "search_timeout_ms must be at least 1".to_string(),
            ));
        }
        if self.max_timeouts == 0 {
            return Err(RouterError::InvalidConfig(
                "max_timeouts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// Default value functions

fn default_node_store_size() -> usize {
    NODE_STORE_SIZE
}

fn default_return_size() -> usize {
    RETURN_SIZE
}

fn default_gmrt_window_seconds() -> usize {
    GMRT_WINDOW_SECONDS
}

fn default_gmrt_initial_millis() -> u32 {
    GMRT_INITIAL_MILLIS
}

fn default_search_timeout_ms() -> u64 {
    DEFAULT_SEARCH_TIMEOUT_MS
}

fn default_max_timeouts() -> u32 {
    DEFAULT_MAX_TIMEOUTS
}

fn default_reach_decrease_per_second() -> u32 {
    DEFAULT_REACH_DECREASE_PER_SECOND
}

fn default_local_maintenance_period_secs() -> u64 {
    DEFAULT_LOCAL_MAINTENANCE_PERIOD_SECS
}

fn default_global_maintenance_period_secs() -> u64 {
    DEFAULT_GLOBAL_MAINTENANCE_PERIOD_SECS
}
