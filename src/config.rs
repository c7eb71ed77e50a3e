//! Engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Compose engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeConfig {
    /// Quiet period after the last triggering event before a draft save fires
    pub save_debounce_ms: u64,

    /// Domain suffix for content ids derived from upload ids
    pub cid_domain: String,

    /// Base path of the attachment download service
    pub download_service_path: String,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            save_debounce_ms: 2_000,
            cid_domain: "compose".to_string(),
            download_service_path: "/service/home/~/".to_string(),
        }
    }
}

impl ComposeConfig {
    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }
}
