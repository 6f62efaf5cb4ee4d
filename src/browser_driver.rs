//! `BrowserDriver` capability (spec §6).
//!
//! The real driver (CDP/WebDriver) is an external collaborator per §1; this
//! module defines the trait contract the rest of the core is written
//! against, plus a deterministic, scriptable mock used by tests — the
//! direct generalisation of the teacher's `BrowserController` "simulated
//! implementation" (`base/browser/mod.rs` in the source tree) into a trait
//! object the Executor can be driven against without a real browser.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchOptions {
    pub headless: bool,
    pub user_data_dir: Option<String>,
    pub proxy: Option<String>,
    pub storage_state: Option<String>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            user_data_dir: None,
            proxy: None,
            storage_state: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A single page/tab. Implementations own a real CDP/WebDriver session;
/// the mock owns a tiny in-memory model sufficient for unit tests.
#[async_trait]
pub trait Page: Send + Sync {
    async fn goto(&self, url: &str, timeout_ms: u64) -> Result<()>;
    async fn fill(&self, selector: &str, value: &str, timeout_ms: u64) -> Result<()>;
    async fn click(&self, selector: &str, timeout_ms: u64) -> Result<()>;
    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<()>;
    async fn wait_for_load_state(&self, state: &str, timeout_ms: u64) -> Result<()>;
    async fn press(&self, selector: &str, key: &str) -> Result<()>;
    async fn hover(&self, selector: &str) -> Result<()>;
    async fn select_option(&self, selector: &str, value: &str) -> Result<()>;
    async fn screenshot(&self) -> Result<Vec<u8>>;
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;
    async fn url(&self) -> Result<String>;
    async fn title(&self) -> Result<String>;
    async fn text_content(&self, selector: &str) -> Result<Option<String>>;
    async fn inner_html(&self, selector: &str) -> Result<Option<String>>;
    async fn get_attribute(&self, selector: &str, name: &str) -> Result<Option<String>>;
    async fn input_value(&self, selector: &str) -> Result<Option<String>>;
    async fn is_visible(&self, selector: &str) -> Result<bool>;
    async fn count(&self, selector: &str) -> Result<usize>;
    async fn bounding_box(&self, selector: &str) -> Result<Option<BoundingBox>>;
    async fn is_closed(&self) -> bool;
    /// Switch the page's viewport, e.g. to a mobile size for a login
    /// hand-off and back to desktop afterwards (spec §4.10 step 3).
    async fn set_viewport(&self, width: u32, height: u32) -> Result<()>;
}

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn launch(&self, opts: LaunchOptions) -> Result<()>;
    async fn new_page(&self) -> Result<Arc<dyn Page>>;
    async fn close(&self) -> Result<()>;
}

/// Scripted response for one selector in the mock driver.
#[derive(Debug, Clone, Default)]
pub struct MockElement {
    pub text: Option<String>,
    pub inner_html: Option<String>,
    pub attributes: HashMap<String, String>,
    pub value: Option<String>,
    pub visible: bool,
    pub bounding_box: Option<BoundingBox>,
    /// When set, the operation targeting this selector fails with this message.
    pub fails_with: Option<String>,
}

#[derive(Debug, Default)]
struct MockPageState {
    url: String,
    title: String,
    elements: HashMap<String, MockElement>,
    closed: bool,
    viewport: (u32, u32),
}

/// A deterministic in-memory `Page` used by unit tests. Elements are
/// pre-registered by the test via [`MockPage::set_element`]; any selector
/// not registered is treated as "not found".
pub struct MockPage {
    state: RwLock<MockPageState>,
}

impl MockPage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(MockPageState::default()),
        })
    }

    pub async fn set_element(&self, selector: &str, element: MockElement) {
        self.state
            .write()
            .await
            .elements
            .insert(selector.to_string(), element);
    }

    pub async fn viewport(&self) -> (u32, u32) {
        self.state.read().await.viewport
    }

    async fn element_or_not_found(&self, selector: &str) -> Result<MockElement> {
        let state = self.state.read().await;
        match state.elements.get(selector) {
            Some(el) if el.fails_with.is_none() => Ok(el.clone()),
            Some(el) => Err(CoreError::Selector(el.fails_with.clone().unwrap())),
            None => Err(CoreError::Selector(format!("element not found: {selector}"))),
        }
    }
}

#[async_trait]
impl Page for MockPage {
    async fn goto(&self, url: &str, _timeout_ms: u64) -> Result<()> {
        let mut state = self.state.write().await;
        state.url = url.to_string();
        state.title = format!("title:{url}");
        Ok(())
    }

    async fn fill(&self, selector: &str, _value: &str, _timeout_ms: u64) -> Result<()> {
        self.element_or_not_found(selector).await.map(|_| ())
    }

    async fn click(&self, selector: &str, _timeout_ms: u64) -> Result<()> {
        self.element_or_not_found(selector).await.map(|_| ())
    }

    async fn wait_for_selector(&self, selector: &str, _timeout_ms: u64) -> Result<()> {
        self.element_or_not_found(selector).await.map(|_| ())
    }

    async fn wait_for_load_state(&self, _state: &str, _timeout_ms: u64) -> Result<()> {
        Ok(())
    }

    async fn press(&self, _selector: &str, _key: &str) -> Result<()> {
        Ok(())
    }

    async fn hover(&self, selector: &str) -> Result<()> {
        self.element_or_not_found(selector).await.map(|_| ())
    }

    async fn select_option(&self, selector: &str, _value: &str) -> Result<()> {
        self.element_or_not_found(selector).await.map(|_| ())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(vec![0u8; 4096])
    }

    async fn evaluate(&self, _script: &str) -> Result<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    async fn url(&self) -> Result<String> {
        Ok(self.state.read().await.url.clone())
    }

    async fn title(&self) -> Result<String> {
        Ok(self.state.read().await.title.clone())
    }

    async fn text_content(&self, selector: &str) -> Result<Option<String>> {
        Ok(self.element_or_not_found(selector).await.ok().and_then(|e| e.text))
    }

    async fn inner_html(&self, selector: &str) -> Result<Option<String>> {
        Ok(self
            .element_or_not_found(selector)
            .await
            .ok()
            .and_then(|e| e.inner_html))
    }

    async fn get_attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
        Ok(self
            .element_or_not_found(selector)
            .await
            .ok()
            .and_then(|e| e.attributes.get(name).cloned()))
    }

    async fn input_value(&self, selector: &str) -> Result<Option<String>> {
        Ok(self.element_or_not_found(selector).await.ok().and_then(|e| e.value))
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        Ok(self
            .element_or_not_found(selector)
            .await
            .map(|e| e.visible)
            .unwrap_or(false))
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        Ok(if self.state.read().await.elements.contains_key(selector) {
            1
        } else {
            0
        })
    }

    async fn bounding_box(&self, selector: &str) -> Result<Option<BoundingBox>> {
        Ok(self
            .element_or_not_found(selector)
            .await
            .ok()
            .and_then(|e| e.bounding_box))
    }

    async fn is_closed(&self) -> bool {
        self.state.read().await.closed
    }

    async fn set_viewport(&self, width: u32, height: u32) -> Result<()> {
        self.state.write().await.viewport = (width, height);
        Ok(())
    }
}

pub struct MockBrowserDriver {
    page: Arc<MockPage>,
}

impl MockBrowserDriver {
    pub fn new() -> Self {
        Self {
            page: MockPage::new(),
        }
    }

    pub fn page(&self) -> Arc<MockPage> {
        self.page.clone()
    }
}

impl Default for MockBrowserDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserDriver for MockBrowserDriver {
    async fn launch(&self, _opts: LaunchOptions) -> Result<()> {
        Ok(())
    }

    async fn new_page(&self) -> Result<Arc<dyn Page>> {
        Ok(self.page.clone())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
