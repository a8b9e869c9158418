//! Configuration for tether
//!
//! Centralized configuration with sensible defaults.

/// Configuration for an overlay instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Listener Configuration
    // -------------------------------------------------------------------------
    /// Backlog hint passed to listen (max simultaneous pending
    /// connections; the slot table grows past this if more peers are
    /// accepted)
    pub max_simultaneous: u32,

    // -------------------------------------------------------------------------
    // Connection Configuration
    // -------------------------------------------------------------------------
    /// Disable Nagle's algorithm on established connections
    pub nodelay: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_simultaneous: 10,
            nodelay: true,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the listen backlog
    pub fn max_simultaneous(mut self, count: u32) -> Self {
        self.config.max_simultaneous = count;
        self
    }

    /// Enable or disable TCP_NODELAY on established connections
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.config.nodelay = nodelay;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
