//! Relational storage adapter (spec §4.6/§6): one table per aggregate with
//! JSON columns for map-valued fields, unique constraint on the aggregate
//! key. A real SQL backend is an external collaborator out of scope per
//! §1; this is an in-memory simulation of the same table shape, gated
//! behind the `relational-storage` feature so a real `sqlx`-backed
//! implementation can be dropped in later without changing the trait.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::types::{SelectorHistory, SitePattern, SkillTemplate};

use super::adapter::StorageAdapter;

/// `selector_history` row keyed by `(site, originalSelector, strategy)`,
/// matching the unique constraint from spec §3.
#[derive(Default)]
struct Tables {
    selector_history: HashMap<String, Vec<SelectorHistory>>,
    skill_templates: HashMap<String, SkillTemplate>,
    site_patterns: HashMap<String, SitePattern>,
}

pub struct RelationalStorageAdapter {
    tables: RwLock<Tables>,
}

impl RelationalStorageAdapter {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl Default for RelationalStorageAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageAdapter for RelationalStorageAdapter {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn save_selector_history(&self, site: &str, list: Vec<SelectorHistory>) -> Result<()> {
        self.tables.write().await.selector_history.insert(site.to_string(), list);
        Ok(())
    }

    async fn get_selector_history(&self, site: &str) -> Result<Vec<SelectorHistory>> {
        Ok(self
            .tables
            .read()
            .await
            .selector_history
            .get(site)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_all_selector_histories(&self) -> Result<Vec<SelectorHistory>> {
        Ok(self
            .tables
            .read()
            .await
            .selector_history
            .values()
            .flat_map(|v| v.iter().cloned())
            .collect())
    }

    async fn save_skill_template(&self, intent: &str, template: SkillTemplate) -> Result<()> {
        self.tables.write().await.skill_templates.insert(intent.to_string(), template);
        Ok(())
    }

    async fn get_skill_template(&self, intent: &str) -> Result<Option<SkillTemplate>> {
        Ok(self.tables.read().await.skill_templates.get(intent).cloned())
    }

    async fn get_all_skill_templates(&self) -> Result<Vec<SkillTemplate>> {
        Ok(self.tables.read().await.skill_templates.values().cloned().collect())
    }

    async fn save_site_pattern(&self, site: &str, pattern: SitePattern) -> Result<()> {
        self.tables.write().await.site_patterns.insert(site.to_string(), pattern);
        Ok(())
    }

    async fn get_site_pattern(&self, site: &str) -> Result<Option<SitePattern>> {
        Ok(self.tables.read().await.site_patterns.get(site).cloned())
    }

    async fn get_all_site_patterns(&self) -> Result<Vec<SitePattern>> {
        Ok(self.tables.read().await.site_patterns.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn saves_enforce_one_row_per_key() {
        let adapter = RelationalStorageAdapter::new();
        adapter
            .save_site_pattern("x.test", SitePattern { site: "x.test".into(), ..Default::default() })
            .await
            .unwrap();
        adapter
            .save_site_pattern(
                "x.test",
                SitePattern {
                    site: "x.test".into(),
                    total_jobs: 5,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let all = adapter.get_all_site_patterns().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].total_jobs, 5);
    }
}
