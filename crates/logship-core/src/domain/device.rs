//! Device context
//!
//! Non-identifying description of the device and SDK, attached to outgoing
//! logs right before they are sent. Never persisted with the record and never
//! includes hostname or username.

use serde::{Deserialize, Serialize};

/// Name reported as `sdk_name`
pub const SDK_NAME: &str = "logship.rust";

/// Device and SDK information attached lazily to outgoing logs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceContext {
    pub sdk_name: String,
    pub sdk_version: String,
    pub os_name: String,
    pub os_version: String,
    pub arch: String,
    pub locale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
}

impl DeviceContext {
    /// Collect the context of the current process.
    pub fn collect() -> Self {
        Self {
            sdk_name: SDK_NAME.to_string(),
            sdk_version: env!("CARGO_PKG_VERSION").to_string(),
            os_name: std::env::consts::OS.to_string(),
            os_version: read_kernel_version(),
            arch: std::env::consts::ARCH.to_string(),
            locale: read_locale(),
            app_version: None,
        }
    }

    /// Sets the host application version
    pub fn with_app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = Some(version.into());
        self
    }
}

fn read_kernel_version() -> String {
    std::fs::read_to_string("/proc/version")
        .ok()
        .and_then(|v| v.split_whitespace().nth(2).map(String::from))
        .unwrap_or_default()
}

fn read_locale() -> String {
    std::env::var("LC_ALL")
        .or_else(|_| std::env::var("LANG"))
        .ok()
        .and_then(|l| l.split('.').next().map(String::from))
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| "C".to_string())
}
