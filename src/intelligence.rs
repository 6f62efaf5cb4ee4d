//! IntelligenceEngine (spec §4.8): maps a [`PageAnalysis`] plus known-URL
//! context into a navigation/retry decision the Executor acts on.

use crate::page_analyzer::{ErrorPageKind, PageAnalysis, PageState};
use crate::types::UrlPattern;

const CLOUDFLARE_WAIT_MS: u64 = 5_000;
const CLOUDFLARE_MAX_RETRIES: u32 = 3;
const ERROR_RETRY_WAIT_MS: u64 = 3_000;
const ERROR_MAX_RETRIES: u32 = 2;
const LOADING_WAIT_MS: u64 = 2_000;
const LOADING_MAX_RETRIES: u32 = 5;
const WRONG_PAGE_SUCCESS_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Continue,
    Wait { wait_ms: u64, retry: bool, max_retries: u32 },
    Retry { wait_ms: u64, max_retries: u32 },
    Navigate { url: String },
    NavigateBack,
    Pause { requires_human: bool },
    Abort,
}

pub struct IntelligenceEngine;

impl IntelligenceEngine {
    pub fn new() -> Self {
        Self
    }

    /// `known_url` is the learned [`UrlPattern`] for the page's current URL,
    /// if any; `expected_url` is the URL the plan intended to land on.
    pub fn decide(
        &self,
        analysis: &PageAnalysis,
        known_url: Option<&UrlPattern>,
        expected_url: Option<&str>,
    ) -> Decision {
        match analysis.state {
            PageState::CloudflareChallenge => Decision::Wait {
                wait_ms: CLOUDFLARE_WAIT_MS,
                retry: true,
                max_retries: CLOUDFLARE_MAX_RETRIES,
            },
            PageState::CaptchaRequired => Decision::Pause { requires_human: true },
            PageState::ErrorPage => match analysis.error_page {
                Some(ErrorPageKind::NotFound404) => Decision::NavigateBack,
                Some(ErrorPageKind::ServerError500) | Some(ErrorPageKind::Timeout) => Decision::Retry {
                    wait_ms: ERROR_RETRY_WAIT_MS,
                    max_retries: ERROR_MAX_RETRIES,
                },
                Some(ErrorPageKind::Forbidden403) => Decision::Pause { requires_human: false },
                Some(ErrorPageKind::Other) | None => Decision::NavigateBack,
            },
            PageState::Loading => Decision::Wait {
                wait_ms: LOADING_WAIT_MS,
                retry: true,
                max_retries: LOADING_MAX_RETRIES,
            },
            PageState::WrongPage => {
                if let Some(pattern) = known_url {
                    if pattern.success_rate > WRONG_PAGE_SUCCESS_THRESHOLD {
                        return Decision::Continue;
                    }
                }
                match expected_url {
                    Some(url) => Decision::Navigate { url: url.to_string() },
                    None => Decision::NavigateBack,
                }
            }
            PageState::Ready => Decision::Continue,
        }
    }
}

impl Default for IntelligenceEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_analyzer::Relevance;
    use crate::types::now_utc;
    use std::collections::HashMap;

    fn analysis(state: PageState, error_page: Option<ErrorPageKind>) -> PageAnalysis {
        PageAnalysis {
            url: "https://x.test/".to_string(),
            title: "x".to_string(),
            state,
            cloudflare: state == PageState::CloudflareChallenge,
            captcha: state == PageState::CaptchaRequired,
            error_page,
            loading: state == PageState::Loading,
            page_relevance: Relevance { score: 1.0, is_relevant: state != PageState::WrongPage },
            timestamp: now_utc(),
        }
    }

    #[test]
    fn cloudflare_yields_wait_five_seconds_three_retries() {
        let engine = IntelligenceEngine::new();
        let decision = engine.decide(&analysis(PageState::CloudflareChallenge, None), None, None);
        assert_eq!(
            decision,
            Decision::Wait { wait_ms: 5000, retry: true, max_retries: 3 }
        );
    }

    #[test]
    fn captcha_requires_human_pause() {
        let engine = IntelligenceEngine::new();
        let decision = engine.decide(&analysis(PageState::CaptchaRequired, None), None, None);
        assert_eq!(decision, Decision::Pause { requires_human: true });
    }

    #[test]
    fn not_found_navigates_back() {
        let engine = IntelligenceEngine::new();
        let decision = engine.decide(
            &analysis(PageState::ErrorPage, Some(ErrorPageKind::NotFound404)),
            None,
            None,
        );
        assert_eq!(decision, Decision::NavigateBack);
    }

    #[test]
    fn server_error_retries_with_wait() {
        let engine = IntelligenceEngine::new();
        let decision = engine.decide(
            &analysis(PageState::ErrorPage, Some(ErrorPageKind::ServerError500)),
            None,
            None,
        );
        assert_eq!(decision, Decision::Retry { wait_ms: 3000, max_retries: 2 });
    }

    #[test]
    fn wrong_page_continues_when_known_url_succeeds() {
        let engine = IntelligenceEngine::new();
        let pattern = UrlPattern {
            url: "https://x.test/".to_string(),
            intents: Vec::new(),
            selectors: HashMap::new(),
            success_rate: 0.9,
            usage_count: 10,
            last_used: Some(now_utc()),
        };
        let decision = engine.decide(&analysis(PageState::WrongPage, None), Some(&pattern), Some("https://x.test/other"));
        assert_eq!(decision, Decision::Continue);
    }

    #[test]
    fn wrong_page_navigates_to_expected_when_no_good_history() {
        let engine = IntelligenceEngine::new();
        let decision = engine.decide(&analysis(PageState::WrongPage, None), None, Some("https://x.test/expected"));
        assert_eq!(decision, Decision::Navigate { url: "https://x.test/expected".to_string() });
    }

    #[test]
    fn ready_continues() {
        let engine = IntelligenceEngine::new();
        let decision = engine.decide(&analysis(PageState::Ready, None), None, None);
        assert_eq!(decision, Decision::Continue);
    }
}
