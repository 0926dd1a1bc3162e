//! Runtime configuration: command-line flags, falling back to `TESORO_*`
//! environment variables, falling back to defaults.

use std::time::Duration;

use clap::Args;

use crate::context::Context;
use crate::storage::StoreOptions;

#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Database file path
    #[arg(short, long, global = true, env = "TESORO_DATABASE", default_value = "tesoro.db")]
    pub database: String,

    /// Maximum number of pooled database connections
    #[arg(long, global = true, env = "TESORO_MAX_CONNECTIONS", default_value_t = 8)]
    pub max_connections: u32,

    /// How long to wait for a locked account before failing, in milliseconds
    #[arg(long, global = true, env = "TESORO_BUSY_TIMEOUT_MS", default_value_t = 5000)]
    pub busy_timeout_ms: u64,

    /// Overall deadline for a command, in milliseconds (no deadline if omitted)
    #[arg(long, global = true, env = "TESORO_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: "tesoro.db".to_string(),
            max_connections: 8,
            busy_timeout_ms: 5000,
            timeout_ms: None,
        }
    }
}

impl Config {
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            max_connections: self.max_connections.max(1),
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            create_if_missing: false,
        }
    }

    /// Root context for one command, honouring the configured deadline.
    pub fn context(&self) -> Context {
        match self.timeout_ms {
            Some(ms) => Context::background().with_timeout(Duration::from_millis(ms)),
            None => Context::background(),
        }
    }
}
