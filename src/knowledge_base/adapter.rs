//! Storage adapter contract (spec §6): exactly save/get by key for each of
//! the three persisted aggregates, plus bulk get-all for cold start.
//! URLPattern is intentionally absent — the contract does not persist it.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{SelectorHistory, SitePattern, SkillTemplate};

#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn initialize(&self) -> Result<()>;
    async fn close(&self) -> Result<()>;

    async fn save_selector_history(&self, site: &str, list: Vec<SelectorHistory>) -> Result<()>;
    async fn get_selector_history(&self, site: &str) -> Result<Vec<SelectorHistory>>;
    async fn get_all_selector_histories(&self) -> Result<Vec<SelectorHistory>>;

    async fn save_skill_template(&self, intent: &str, template: SkillTemplate) -> Result<()>;
    async fn get_skill_template(&self, intent: &str) -> Result<Option<SkillTemplate>>;
    async fn get_all_skill_templates(&self) -> Result<Vec<SkillTemplate>>;

    async fn save_site_pattern(&self, site: &str, pattern: SitePattern) -> Result<()>;
    async fn get_site_pattern(&self, site: &str) -> Result<Option<SitePattern>>;
    async fn get_all_site_patterns(&self) -> Result<Vec<SitePattern>>;
}
