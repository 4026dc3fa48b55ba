//! Configuration shared by the binary and the database crate

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_CONNECTIONS: u32 = 20;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 2;

/// Database connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_min_connections() -> u32 {
    DEFAULT_MIN_CONNECTIONS
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
        }
    }

    /// Override pool sizes; `None` keeps the current value.
    ///
    /// The minimum is clamped so it never exceeds the maximum.
    pub fn with_pool(mut self, max: Option<u32>, min: Option<u32>) -> Self {
        if let Some(max) = max {
            self.max_connections = max.max(1);
        }
        if let Some(min) = min {
            self.min_connections = min;
        }
        self.min_connections = self.min_connections.min(self.max_connections);
        self
    }
}
