//! PageAnalyzer (spec §4.8): classifies a live page into one of six
//! states with a strict precedence order, plus a relevance score against
//! an expected URL/element/text set.

use chrono::{DateTime, Utc};

use crate::browser_driver::Page;
use crate::domain::extract_host;
use crate::error::Result;
use crate::types::now_utc;

const CLOUDFLARE_LEXICON: [&str; 2] = ["checking your browser", "cloudflare"];
const CLOUDFLARE_SELECTORS: [&str; 4] = ["#cf-wrapper", ".cf-browser-verification", "#challenge-form", "[data-ray]"];
const CAPTCHA_LEXICON: [&str; 2] = ["captcha", "verify you are human"];
const CAPTCHA_SELECTORS: [&str; 2] = ["iframe[src*='recaptcha']", "iframe[src*='hcaptcha']"];
const LOADING_SELECTORS: [&str; 3] = [".spinner", ".loading", "[aria-busy='true']"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Ready,
    Loading,
    CloudflareChallenge,
    CaptchaRequired,
    ErrorPage,
    WrongPage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPageKind {
    NotFound404,
    ServerError500,
    Forbidden403,
    Timeout,
    Other,
}

#[derive(Debug, Clone, Default)]
pub struct ExpectedPage {
    pub host: Option<String>,
    pub path_prefix: Option<String>,
    pub elements: Vec<String>,
    pub text: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Relevance {
    pub score: f64,
    pub is_relevant: bool,
}

#[derive(Debug, Clone)]
pub struct PageAnalysis {
    pub url: String,
    pub title: String,
    pub state: PageState,
    pub cloudflare: bool,
    pub captcha: bool,
    pub error_page: Option<ErrorPageKind>,
    pub loading: bool,
    pub page_relevance: Relevance,
    pub timestamp: DateTime<Utc>,
}

pub struct PageAnalyzer;

impl PageAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub async fn analyze(&self, page: &dyn Page, expected: &ExpectedPage) -> Result<PageAnalysis> {
        let url = page.url().await?;
        let title = page.title().await?;
        let body = page.text_content("body").await?.unwrap_or_default();
        let body_lower = body.to_lowercase();

        let cloudflare = CLOUDFLARE_LEXICON.iter().any(|w| body_lower.contains(w))
            || has_any_selector(page, &CLOUDFLARE_SELECTORS).await;
        let captcha = CAPTCHA_LEXICON.iter().any(|w| body_lower.contains(w))
            || has_any_selector(page, &CAPTCHA_SELECTORS).await;
        let error_page = classify_error_page(&body_lower);
        let loading = has_any_selector(page, &LOADING_SELECTORS).await
            || matches!(page.evaluate("document.readyState").await, Ok(v) if v.is_string() && v.as_str() != Some("complete"));

        let relevance = relevance_of(&url, &body, page, expected).await;

        let state = if cloudflare {
            PageState::CloudflareChallenge
        } else if captcha {
            PageState::CaptchaRequired
        } else if error_page.is_some() {
            PageState::ErrorPage
        } else if loading {
            PageState::Loading
        } else if !relevance.is_relevant {
            PageState::WrongPage
        } else {
            PageState::Ready
        };

        Ok(PageAnalysis {
            url,
            title,
            state,
            cloudflare,
            captcha,
            error_page,
            loading,
            page_relevance: relevance,
            timestamp: now_utc(),
        })
    }
}

impl Default for PageAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

async fn has_any_selector(page: &dyn Page, selectors: &[&str]) -> bool {
    for selector in selectors {
        if page.count(selector).await.unwrap_or(0) > 0 {
            return true;
        }
    }
    false
}

fn classify_error_page(body_lower: &str) -> Option<ErrorPageKind> {
    if body_lower.contains("404") || body_lower.contains("page not found") {
        Some(ErrorPageKind::NotFound404)
    } else if body_lower.contains("500") || body_lower.contains("internal server error") {
        Some(ErrorPageKind::ServerError500)
    } else if body_lower.contains("403") || body_lower.contains("access denied") {
        Some(ErrorPageKind::Forbidden403)
    } else if body_lower.contains("timed out") || body_lower.contains("gateway timeout") {
        Some(ErrorPageKind::Timeout)
    } else if body_lower.contains("something went wrong") || body_lower.contains("unexpected error") {
        Some(ErrorPageKind::Other)
    } else {
        None
    }
}

async fn relevance_of(url: &str, body: &str, page: &dyn Page, expected: &ExpectedPage) -> Relevance {
    let Some(expected_host) = &expected.host else {
        return Relevance { score: 1.0, is_relevant: true };
    };

    let current_host = extract_host(url).unwrap_or_default();
    if &current_host != expected_host {
        return Relevance { score: 0.0, is_relevant: false };
    }

    if let Some(prefix) = &expected.path_prefix {
        if prefix != "/" && !prefix.is_empty() {
            let current_path = url::Url::parse(url).map(|u| u.path().to_string()).unwrap_or_default();
            if !current_path.starts_with(prefix.as_str()) {
                return Relevance { score: 0.0, is_relevant: false };
            }
        }
    }

    let element_score = if expected.elements.is_empty() {
        1.0
    } else {
        let mut found = 0usize;
        for selector in &expected.elements {
            if page.count(selector).await.unwrap_or(0) > 0 {
                found += 1;
            }
        }
        found as f64 / expected.elements.len() as f64
    };

    let text_score = if expected.text.is_empty() {
        1.0
    } else {
        let body_lower = body.to_lowercase();
        let found = expected
            .text
            .iter()
            .filter(|t| body_lower.contains(&t.to_lowercase()))
            .count();
        found as f64 / expected.text.len() as f64
    };

    let score = element_score * text_score;
    Relevance { score, is_relevant: score >= 0.5 }
}
