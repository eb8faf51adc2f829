//! Sidecar configuration.
//!
//! Read from an optional JSON file; command-line flags and their `RESULTSD_*`
//! environment fallbacks override the file. Every field has a default so the
//! daemon starts without any file at all.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::api::HttpApiConfig;
use crate::grading::GradeScale;
use crate::view::DEFAULT_PAGE_SIZE;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub grading: GradingSettings,
    #[serde(default)]
    pub view: ViewSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingSettings {
    /// Preset name (`standard`, `plus`) or an explicit band table.
    #[serde(default)]
    pub scale: GradeScale,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSettings {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.to_string_lossy()))?;
        let cfg: AppConfig = serde_json::from_str(&text)
            .with_context(|| format!("invalid config {}", path.to_string_lossy()))?;
        if cfg.api.timeout_secs == 0 {
            anyhow::bail!("api.timeoutSecs must be greater than 0");
        }
        Ok(cfg)
    }

    pub fn apply_overrides(&mut self, api_url: Option<String>, api_token: Option<String>) {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.api.base_url = url;
        }
        if let Some(token) = api_token.filter(|t| !t.trim().is_empty()) {
            self.api.token = Some(token);
        }
    }

    pub fn http(&self) -> HttpApiConfig {
        HttpApiConfig {
            base_url: self.api.base_url.clone(),
            token: self.api.token.clone(),
            timeout: Duration::from_secs(self.api.timeout_secs),
        }
    }
}
