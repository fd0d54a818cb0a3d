//! Container runtime daemon configuration (`daemon.json`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Inter-container communication on the default bridge.
    pub icc: bool,
    #[serde(rename = "userns-remap")]
    pub userns_remap: String,
    #[serde(rename = "no-new-privileges")]
    pub no_new_privileges: bool,
    #[serde(rename = "live-restore")]
    pub live_restore: bool,
}

impl DaemonConfig {
    /// The hardened runtime defaults.
    pub fn hardened() -> Self {
        Self {
            icc: false,
            userns_remap: "default".to_string(),
            no_new_privileges: true,
            live_restore: true,
        }
    }
}
