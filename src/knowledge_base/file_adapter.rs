//! File-based storage adapter (spec §6 "On-disk layout"): a single JSON
//! document under a configured data directory with three top-level maps.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{CoreError, Result};
use crate::types::{SelectorHistory, SitePattern, SkillTemplate};

use super::adapter::StorageAdapter;

#[derive(Debug, Default, Serialize, Deserialize)]
struct FileDocument {
    #[serde(default)]
    selector_history: HashMap<String, Vec<SelectorHistory>>,
    #[serde(default)]
    skill_templates: HashMap<String, SkillTemplate>,
    #[serde(default)]
    site_patterns: HashMap<String, SitePattern>,
}

pub struct FileStorageAdapter {
    path: PathBuf,
    doc: Mutex<FileDocument>,
}

impl FileStorageAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            doc: Mutex::new(FileDocument::default()),
        }
    }

    async fn persist(&self, doc: &FileDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::Storage(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(doc)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))
    }
}

#[async_trait]
impl StorageAdapter for FileStorageAdapter {
    async fn initialize(&self) -> Result<()> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => {
                let parsed: FileDocument = serde_json::from_str(&raw)?;
                *self.doc.lock().await = parsed;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::Storage(e.to_string())),
        }
    }

    async fn close(&self) -> Result<()> {
        let doc = self.doc.lock().await;
        self.persist(&doc).await
    }

    async fn save_selector_history(&self, site: &str, list: Vec<SelectorHistory>) -> Result<()> {
        let mut doc = self.doc.lock().await;
        doc.selector_history.insert(site.to_string(), list);
        self.persist(&doc).await
    }

    async fn get_selector_history(&self, site: &str) -> Result<Vec<SelectorHistory>> {
        Ok(self.doc.lock().await.selector_history.get(site).cloned().unwrap_or_default())
    }

    async fn get_all_selector_histories(&self) -> Result<Vec<SelectorHistory>> {
        Ok(self
            .doc
            .lock()
            .await
            .selector_history
            .values()
            .flat_map(|v| v.iter().cloned())
            .collect())
    }

    async fn save_skill_template(&self, intent: &str, template: SkillTemplate) -> Result<()> {
        let mut doc = self.doc.lock().await;
        doc.skill_templates.insert(intent.to_string(), template);
        self.persist(&doc).await
    }

    async fn get_skill_template(&self, intent: &str) -> Result<Option<SkillTemplate>> {
        Ok(self.doc.lock().await.skill_templates.get(intent).cloned())
    }

    async fn get_all_skill_templates(&self) -> Result<Vec<SkillTemplate>> {
        Ok(self.doc.lock().await.skill_templates.values().cloned().collect())
    }

    async fn save_site_pattern(&self, site: &str, pattern: SitePattern) -> Result<()> {
        let mut doc = self.doc.lock().await;
        doc.site_patterns.insert(site.to_string(), pattern);
        self.persist(&doc).await
    }

    async fn get_site_pattern(&self, site: &str) -> Result<Option<SitePattern>> {
        Ok(self.doc.lock().await.site_patterns.get(site).cloned())
    }

    async fn get_all_site_patterns(&self) -> Result<Vec<SitePattern>> {
        Ok(self.doc.lock().await.site_patterns.values().cloned().collect())
    }
}
