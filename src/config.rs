//! Site configuration and recognised environment variables (spec §6).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// `waitUntil` options for `TaskExecutor` navigation (spec §4.10/§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WaitUntil {
    Load,
    DomContentLoaded,
    NetworkIdle,
}

/// Per-site navigation/wait tuning (spec §6 `SiteCfg`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteCfg {
    pub high_activity: bool,
    pub navigation_timeout_ms: u64,
    pub wait_until: WaitUntil,
    pub post_load_wait_ms: u64,
    pub custom_wait_selectors: Vec<String>,
    pub custom_wait_timeout_ms: u64,
    pub custom_wait_fallback_selectors: Vec<String>,
    pub custom_wait_fallback_timeout_ms: u64,
    pub additional_wait_after_load_ms: u64,
    pub fallback_wait_ms: u64,
}

impl Default for SiteCfg {
    fn default() -> Self {
        Self {
            high_activity: false,
            navigation_timeout_ms: 30_000,
            wait_until: WaitUntil::NetworkIdle,
            post_load_wait_ms: 0,
            custom_wait_selectors: Vec::new(),
            custom_wait_timeout_ms: 10_000,
            custom_wait_fallback_selectors: Vec::new(),
            custom_wait_fallback_timeout_ms: 5_000,
            additional_wait_after_load_ms: 0,
            fallback_wait_ms: 2_000,
        }
    }
}

/// Defaults applied when a domain has no specific entry.
pub type DefaultCfg = SiteCfg;

/// `{ sites: {<domain>: SiteCfg}, defaults: DefaultCfg }` (spec §6).
///
/// Replaces the teacher's implicit global `SiteConfigManager` singleton
/// (Design Notes §9) with an explicit, constructor-injected value owned by
/// whoever wires up the `Pipeline`/`TaskExecutor`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SiteConfigManager {
    pub sites: HashMap<String, SiteCfg>,
    pub defaults: DefaultCfg,
}

impl SiteConfigManager {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Domain keys match by substring against the current URL (spec §6).
    pub fn config_for_url(&self, url: &str) -> SiteCfg {
        for (domain, cfg) in &self.sites {
            if url.contains(domain.as_str()) {
                return cfg.clone();
            }
        }
        self.defaults.clone()
    }
}

/// Recognised storage backend selection (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    File,
    Relational,
}

/// Supported browser engines for the driver capability (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserEngine {
    Chromium,
    Firefox,
    Webkit,
}

/// Environment-derived runtime settings (spec §6 "Environment variables").
#[derive(Debug, Clone)]
pub struct EnvSettings {
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub headless: bool,
    pub user_data_dir: Option<String>,
    pub browser: BrowserEngine,
    pub proxy_server: Option<String>,
    pub proxy_username: Option<String>,
    pub proxy_password: Option<String>,
    pub proxy_pool: Vec<String>,
    pub openai_api_key: Option<String>,
    pub llm_provider: Option<String>,
}

impl EnvSettings {
    /// Reads the process environment per the table in spec §6. Layering:
    /// env vars override the site-config file, which overrides built-in
    /// defaults (spec §9 replaces the implicit global with this explicit,
    /// constructor-injected type).
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL").ok();
        let knowledge_storage = std::env::var("KNOWLEDGE_STORAGE").ok();
        let storage_backend = if database_url.is_some()
            || knowledge_storage.as_deref() == Some("postgresql")
        {
            StorageBackend::Relational
        } else {
            StorageBackend::File
        };

        let browser = match std::env::var("PLAYWRIGHT_BROWSER").ok().as_deref() {
            Some("firefox") => BrowserEngine::Firefox,
            Some("webkit") => BrowserEngine::Webkit,
            _ => BrowserEngine::Chromium,
        };

        let headless = std::env::var("PLAYWRIGHT_HEADLESS")
            .map(|v| v != "0" && v.to_lowercase() != "false")
            .unwrap_or(true);

        let proxy_pool = std::env::var("PROXY_POOL")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default();

        Self {
            storage_backend,
            database_url,
            headless,
            user_data_dir: std::env::var("PLAYWRIGHT_USER_DATA_DIR").ok(),
            browser,
            proxy_server: std::env::var("PROXY_SERVER").ok(),
            proxy_username: std::env::var("PROXY_USERNAME").ok(),
            proxy_password: std::env::var("PROXY_PASSWORD").ok(),
            proxy_pool,
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            llm_provider: std::env::var("LLM_PROVIDER").ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_for_url_matches_by_substring() {
        let mut mgr = SiteConfigManager::default();
        mgr.sites.insert(
            "example.com".to_string(),
            SiteCfg {
                high_activity: true,
                ..Default::default()
            },
        );
        let cfg = mgr.config_for_url("https://shop.example.com/cart");
        assert!(cfg.high_activity);
    }

    #[test]
    fn config_for_url_falls_back_to_defaults() {
        let mgr = SiteConfigManager::default();
        let cfg = mgr.config_for_url("https://unknown.test/");
        assert_eq!(cfg.wait_until, WaitUntil::NetworkIdle);
    }
}
