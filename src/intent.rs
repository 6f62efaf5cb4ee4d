//! IntentExtractor (spec §4.2): chunks normalised steps at
//! navigation/assertion/submit boundaries and labels each chunk with a
//! pattern-classified intent tag.

use crate::types::{
    ActionMetadata, CanonicalAction, CanonicalActionKind, CanonicalStep, RecordingTranscript,
    RefStrategy, Step, StepKind, Target,
};

const SUBMIT_LEXICON: [&str; 3] = ["submit", "sign in", "login"];

/// Optional LLM-assisted refinement of a pattern-classified intent. Not
/// implemented here — the LLM client is an external collaborator per
/// spec §1 — but the seam exists so a caller can plug one in.
pub trait IntentRefiner: Send + Sync {
    fn refine(&self, chunk: &[Step], pattern_intent: &str) -> Option<String>;
}

pub struct IntentExtractor {
    refiner: Option<Box<dyn IntentRefiner>>,
}

impl IntentExtractor {
    pub fn new() -> Self {
        Self { refiner: None }
    }

    pub fn with_refiner(refiner: Box<dyn IntentRefiner>) -> Self {
        Self {
            refiner: Some(refiner),
        }
    }

    pub fn extract(&self, transcript: &RecordingTranscript, site: Option<&str>) -> Vec<CanonicalAction> {
        let chunks = chunk_steps(&transcript.steps);
        chunks
            .into_iter()
            .map(|chunk| self.classify_and_translate(chunk, site))
            .collect()
    }

    fn classify_and_translate(&self, chunk: Vec<&Step>, site: Option<&str>) -> CanonicalAction {
        let pattern_intent = classify_chunk(&chunk);
        let (intent, confidence, source) = match &self.refiner {
            Some(refiner) => {
                let owned: Vec<Step> = chunk.iter().map(|s| (*s).clone()).collect();
                match refiner.refine(&owned, &pattern_intent) {
                    Some(refined) => (refined, 0.9, "llm"),
                    None => (pattern_intent, 0.7, "pattern"),
                }
            }
            None => (pattern_intent, 0.7, "pattern"),
        };

        let steps = chunk.iter().filter_map(|s| translate_step(s)).collect();

        CanonicalAction {
            intent,
            steps,
            metadata: ActionMetadata {
                source: source.to_string(),
                site: site.map(str::to_string),
                confidence,
            },
        }
    }
}

impl Default for IntentExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Chunk steps at navigation/assertion/submit boundaries (spec §4.2).
///
/// An assert or submit click marks the chunk as *pending closure* rather
/// than flushing it immediately: a trailing wait/assert step (e.g. the
/// `waitForSelector` that confirms a login redirect landed) is a
/// continuation of the same logical action and stays attached. The chunk
/// only actually flushes once a navigate (handled by the rule above) or a
/// genuinely new action step (click/input/...) follows.
fn chunk_steps(steps: &[Step]) -> Vec<Vec<&Step>> {
    let mut chunks = Vec::new();
    let mut current: Vec<&Step> = Vec::new();
    let mut pending_close = false;

    for (i, step) in steps.iter().enumerate() {
        if step.kind == StepKind::Navigate && i != 0 && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            pending_close = false;
        }

        if pending_close && !is_trailing_tail(step) {
            chunks.push(std::mem::take(&mut current));
            pending_close = false;
        }

        current.push(step);

        if step.kind == StepKind::Assert || is_submit_click(step) {
            pending_close = true;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// A step kind that confirms/observes the outcome of the action that just
/// closed the chunk, rather than starting a new one.
fn is_trailing_tail(step: &Step) -> bool {
    matches!(
        step.kind,
        StepKind::WaitForSelector | StepKind::WaitForTimeout | StepKind::Wait | StepKind::Pause | StepKind::Assert
    )
}

fn is_submit_click(step: &Step) -> bool {
    if step.kind != StepKind::Click {
        return false;
    }
    let text_matches = step
        .text
        .as_deref()
        .map(|t| {
            let lower = t.to_lowercase();
            SUBMIT_LEXICON.iter().any(|needle| lower.contains(needle))
        })
        .unwrap_or(false);
    let selector_matches = step
        .preferred_reference()
        .map(|r| r.value.to_lowercase().contains("submit"))
        .unwrap_or(false);
    text_matches || selector_matches
}

/// Pattern classifier (spec §4.2).
fn classify_chunk(chunk: &[&Step]) -> String {
    let has_password_input = chunk.iter().any(|s| {
        s.kind == StepKind::Input
            && s.preferred_reference()
                .map(|r| {
                    let lower = r.value.to_lowercase();
                    lower.contains("password") || lower.contains("pwd")
                })
                .unwrap_or(false)
    });
    if has_password_input {
        return "submit-login".to_string();
    }

    let has_input = chunk.iter().any(|s| s.kind == StepKind::Input);
    let has_submit_click = chunk.iter().any(|s| is_submit_click(s));
    if has_input && has_submit_click {
        return "submit-form".to_string();
    }

    let mentions_search = chunk.iter().any(|s| {
        s.preferred_reference()
            .map(|r| {
                let lower = r.value.to_lowercase();
                lower.contains("search") || lower.contains("query")
            })
            .unwrap_or(false)
    });
    if mentions_search {
        return "search".to_string();
    }

    if chunk.len() == 1 && chunk[0].kind == StepKind::Navigate {
        return "navigate".to_string();
    }

    let has_assert = chunk.iter().any(|s| s.kind == StepKind::Assert);
    if has_assert && !has_input {
        return "scrape-list".to_string();
    }

    let textarea_input = chunk.iter().any(|s| {
        s.kind == StepKind::Input
            && s.preferred_reference()
                .map(|r| r.value.to_lowercase().contains("textarea"))
                .unwrap_or(false)
    });
    if textarea_input {
        return "post-message".to_string();
    }

    "generic-action".to_string()
}

/// Translate one recorder step into a canonical step (spec §4.4 mapping).
/// `scrape` steps carry no canonical-step equivalent — they are executed
/// directly from the original transcript by the TaskExecutor (spec §4.10).
/// `pub(crate)` so the TaskExecutor can reuse it to build commands
/// straight from a raw transcript (spec §4.10 step 3/5's "execute the
/// transcript directly" paths), without re-deriving the same mapping.
pub(crate) fn translate_step(step: &Step) -> Option<CanonicalStep> {
    let target = step.preferred_reference().map(|r| Target {
        strategy: r.strategy,
        selector: Some(r.value.clone()),
        value: None,
        fallbacks: Vec::new(),
    });

    let action = match step.kind {
        StepKind::Navigate => CanonicalActionKind::Navigate,
        StepKind::Click => CanonicalActionKind::Click,
        StepKind::Input => CanonicalActionKind::Fill,
        StepKind::WaitForSelector | StepKind::WaitForTimeout | StepKind::Wait | StepKind::Pause => {
            CanonicalActionKind::WaitFor
        }
        StepKind::Assert => CanonicalActionKind::Assert,
        StepKind::Scroll => CanonicalActionKind::Scroll,
        StepKind::KeyDown | StepKind::KeyUp => CanonicalActionKind::Press,
        StepKind::Scrape => return None,
    };

    let value = match step.kind {
        StepKind::Navigate => step.url.clone(),
        StepKind::Input => step.value.clone().or_else(|| step.text.clone()),
        StepKind::KeyDown | StepKind::KeyUp => step.key.clone(),
        _ => step.value.clone(),
    };

    // Navigate steps carry the URL as their Target value rather than a selector.
    let target = if step.kind == StepKind::Navigate {
        Some(Target {
            strategy: RefStrategy::Css,
            selector: None,
            value: step.url.clone(),
            fallbacks: Vec::new(),
        })
    } else {
        target
    };

    Some(CanonicalStep {
        action,
        target,
        value,
        timeout_ms: None,
        options: Default::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessor::Preprocessor;
    use serde_json::json;

    fn transcript(steps: serde_json::Value) -> RecordingTranscript {
        Preprocessor::new()
            .normalize(&json!({"steps": steps}))
            .unwrap()
    }

    #[test]
    fn login_chunking_scenario() {
        // End-to-end scenario 1 (spec §8).
        let t = transcript(json!([
            {"type": "navigate", "url": "https://x.test/login"},
            {"type": "input", "selectors": [["input[name='email']"]], "value": "a@b"},
            {"type": "input", "selectors": [["input[type='password']"]], "value": "p"},
            {"type": "click", "selectors": [["button[type='submit']"]]},
            {"type": "waitForSelector", "selectors": [["#dashboard"]]}
        ]));

        let extractor = IntentExtractor::new();
        let actions = extractor.extract(&t, Some("x.test"));

        assert_eq!(actions.len(), 1);
        let action = &actions[0];
        assert_eq!(action.intent, "submit-login");
        assert_eq!(action.steps.len(), 5);
        assert_eq!(action.steps[0].action, CanonicalActionKind::Navigate);
        assert_eq!(action.steps[1].action, CanonicalActionKind::Fill);
        assert_eq!(action.steps[2].action, CanonicalActionKind::Fill);
        assert_eq!(action.steps[3].action, CanonicalActionKind::Click);
        assert_eq!(action.steps[4].action, CanonicalActionKind::WaitFor);
        assert_eq!(action.metadata.site.as_deref(), Some("x.test"));
    }

    #[test]
    fn single_navigate_is_navigate_intent() {
        let t = transcript(json!([{"type": "navigate", "url": "https://x.test"}]));
        let actions = IntentExtractor::new().extract(&t, None);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].intent, "navigate");
    }

    #[test]
    fn search_intent_from_selector_text() {
        let t = transcript(json!([
            {"type": "input", "selectors": [["input#search-box"]], "value": "shoes"}
        ]));
        let actions = IntentExtractor::new().extract(&t, None);
        assert_eq!(actions[0].intent, "search");
    }

    #[test]
    fn scrape_list_from_assert_without_input() {
        let t = transcript(json!([
            {"type": "assert", "selectors": [[".price"]]}
        ]));
        let actions = IntentExtractor::new().extract(&t, None);
        assert_eq!(actions[0].intent, "scrape-list");
    }

    #[test]
    fn navigate_after_first_step_starts_new_chunk() {
        let t = transcript(json!([
            {"type": "click", "selectors": [["a.link"]]},
            {"type": "navigate", "url": "https://x.test/2"},
            {"type": "click", "selectors": [["a.other"]]}
        ]));
        let actions = IntentExtractor::new().extract(&t, None);
        assert_eq!(actions.len(), 2);
    }

    #[test]
    fn empty_transcript_has_no_actions() {
        let t = transcript(json!([]));
        let actions = IntentExtractor::new().extract(&t, None);
        assert!(actions.is_empty());
    }
}
