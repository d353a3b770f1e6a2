//! `[on_demand]` section configuration.
//!
//! ```toml
//! [on_demand]
//! max_inactive_age_ms = 60000   # Dispose built pages idle longer than this
//! pages_buffer_length = 2       # Recently pinged pages never disposed
//! dispose_interval_ms = 5000    # Disposal tick
//! ping_interval_ms = 5000       # Keep-alive tick on the liveness channel
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OnDemandConfig {
    pub max_inactive_age_ms: u64,
    pub pages_buffer_length: usize,
    pub dispose_interval_ms: u64,
    pub ping_interval_ms: u64,
}

impl Default for OnDemandConfig {
    fn default() -> Self {
        Self {
            max_inactive_age_ms: 60_000,
            pages_buffer_length: 2,
            dispose_interval_ms: 5_000,
            ping_interval_ms: 5_000,
        }
    }
}

impl OnDemandConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.pages_buffer_length == 0 {
            diag.error(
                FieldPath::new("on_demand.pages_buffer_length"),
                "must be at least 1",
            );
        }

        let intervals = [
            ("on_demand.max_inactive_age_ms", self.max_inactive_age_ms),
            ("on_demand.dispose_interval_ms", self.dispose_interval_ms),
            ("on_demand.ping_interval_ms", self.ping_interval_ms),
        ];
        for (field, value) in intervals {
            if value == 0 {
                diag.error(FieldPath::new(field), "must be greater than zero");
            }
        }
    }
}
