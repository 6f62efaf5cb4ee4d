//! Preprocessor (spec §4.1): validates and normalises a raw recorder
//! transcript, canonicalises per-step reference lists, and extracts
//! site/URL metadata.

use serde_json::Value;

use crate::domain::extract_host;
use crate::error::{CoreError, Result};
use crate::types::{RecordingTranscript, Reference, ScrapeField, Step, StepKind, TranscriptMetadata};

pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    /// Validate and normalise an arbitrary JSON value into a
    /// [`RecordingTranscript`]. Fails with [`CoreError::InvalidRecording`]
    /// if it is not a mapping or lacks an ordered steps list.
    pub fn normalize(&self, input: &Value) -> Result<RecordingTranscript> {
        let obj = input
            .as_object()
            .ok_or_else(|| CoreError::InvalidRecording("recording must be a JSON object".into()))?;

        let raw_steps = obj
            .get("steps")
            .and_then(Value::as_array)
            .ok_or_else(|| CoreError::InvalidRecording("recording must have an ordered steps list".into()))?;

        let title = obj.get("title").and_then(Value::as_str).map(str::to_string);
        let url = obj.get("url").and_then(Value::as_str).map(str::to_string);

        let mut steps = Vec::with_capacity(raw_steps.len());
        for (i, raw) in raw_steps.iter().enumerate() {
            steps.push(normalize_step(raw, i as u64));
        }

        Ok(RecordingTranscript {
            title,
            url,
            steps,
            metadata: Default::default(),
        })
    }

    /// Metadata extraction (spec §4.1).
    pub fn extract_metadata(&self, transcript: &RecordingTranscript) -> TranscriptMetadata {
        let first_url = transcript.url.clone().or_else(|| {
            transcript
                .steps
                .iter()
                .find_map(|s| s.url.clone())
        });

        let last_navigate_url = transcript
            .steps
            .iter()
            .rev()
            .find(|s| s.kind == StepKind::Navigate)
            .and_then(|s| s.url.clone())
            .or_else(|| first_url.clone());

        let has_navigation = transcript.steps.iter().any(|s| s.kind == StepKind::Navigate);
        let has_input = transcript.steps.iter().any(|s| s.kind == StepKind::Input);
        let has_assertion = transcript.steps.iter().any(|s| s.kind == StepKind::Assert);

        TranscriptMetadata {
            site: first_url.as_deref().and_then(extract_host),
            url: first_url,
            target_url: last_navigate_url.as_deref().and_then(extract_host),
            step_count: transcript.steps.len(),
            has_navigation,
            has_input,
            has_assertion,
        }
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_step(raw: &Value, index: u64) -> Step {
    let obj = raw.as_object();

    let url = obj
        .and_then(|o| o.get("url"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let value = obj
        .and_then(|o| o.get("value"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let text = obj
        .and_then(|o| o.get("text"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let type_str = obj.and_then(|o| o.get("type")).and_then(Value::as_str);
    let kind = coerce_kind(type_str, url.is_some(), value.is_some() || text.is_some());

    let selectors = parse_selectors(obj);

    let structure = obj.and_then(|o| o.get("structure")).and_then(Value::as_array).map(|arr| {
        arr.iter()
            .filter_map(|f| {
                let f = f.as_object()?;
                Some(ScrapeField {
                    key: f.get("key")?.as_str()?.to_string(),
                    selector: f.get("selector")?.as_str()?.to_string(),
                    attribute: f
                        .get("attribute")
                        .and_then(Value::as_str)
                        .unwrap_or("text")
                        .to_string(),
                    required: f.get("required").and_then(Value::as_bool).unwrap_or(false),
                    transform: f.get("transform").and_then(Value::as_str).map(str::to_string),
                })
            })
            .collect()
    });

    Step {
        kind,
        selectors,
        text,
        value,
        url,
        frame: obj
            .and_then(|o| o.get("frame"))
            .and_then(Value::as_str)
            .map(str::to_string),
        key: obj
            .and_then(|o| o.get("key"))
            .and_then(Value::as_str)
            .map(str::to_string),
        offset_x: obj.and_then(|o| o.get("offsetX")).and_then(Value::as_f64),
        offset_y: obj.and_then(|o| o.get("offsetY")).and_then(Value::as_f64),
        data_key: obj
            .and_then(|o| o.get("dataKey"))
            .and_then(Value::as_str)
            .map(str::to_string),
        attribute: obj
            .and_then(|o| o.get("attribute"))
            .and_then(Value::as_str)
            .map(str::to_string),
        multiple: obj
            .and_then(|o| o.get("multiple"))
            .and_then(Value::as_bool)
            .unwrap_or(false),
        structure,
        container_selector: obj
            .and_then(|o| o.get("containerSelector"))
            .and_then(Value::as_str)
            .map(str::to_string),
        timestamp: obj
            .and_then(|o| o.get("timestamp"))
            .and_then(Value::as_u64)
            .unwrap_or(index * 1000),
    }
}

fn coerce_kind(type_str: Option<&str>, has_url: bool, has_value_or_text: bool) -> StepKind {
    if let Some(raw) = type_str {
        match raw.to_lowercase().as_str() {
            "click" => return StepKind::Click,
            "input" | "change" => return StepKind::Input,
            "navigate" => return StepKind::Navigate,
            "waitforselector" => return StepKind::WaitForSelector,
            "waitfortimeout" => return StepKind::WaitForTimeout,
            "wait" => return StepKind::Wait,
            "pause" => return StepKind::Pause,
            "assert" => return StepKind::Assert,
            "scroll" => return StepKind::Scroll,
            "keydown" => return StepKind::KeyDown,
            "keyup" => return StepKind::KeyUp,
            "scrape" => return StepKind::Scrape,
            _ => {}
        }
    }
    // Absent or unrecognised type string: infer from shape.
    if has_url {
        StepKind::Navigate
    } else if has_value_or_text {
        StepKind::Input
    } else {
        StepKind::Click
    }
}

fn parse_selectors(obj: Option<&serde_json::Map<String, Value>>) -> Vec<Vec<Reference>> {
    if let Some(groups) = obj.and_then(|o| o.get("selectors")).and_then(Value::as_array) {
        return groups
            .iter()
            .map(|group| {
                group
                    .as_array()
                    .map(|refs| {
                        refs.iter()
                            .filter_map(Value::as_str)
                            .map(Reference::parse)
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .collect();
    }
    if let Some(single) = obj.and_then(|o| o.get("selector")).and_then(Value::as_str) {
        return vec![vec![Reference::parse(single)]];
    }
    Vec::new()
}

impl Step {
    /// Pick the preferred reference for this step per spec §4.1: the first
    /// reference (scanning groups then entries in order) with no
    /// `aria/`/`xpath/`/piercing prefix; otherwise the first group's first
    /// entry.
    pub fn preferred_reference(&self) -> Option<&Reference> {
        use crate::types::RefStrategy;
        for group in &self.selectors {
            for reference in group {
                if !matches!(
                    reference.strategy,
                    RefStrategy::Accessibility | RefStrategy::Xpath | RefStrategy::Piercing
                ) {
                    return Some(reference);
                }
            }
        }
        self.selectors.first().and_then(|g| g.first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_non_object() {
        let pre = Preprocessor::new();
        assert!(pre.normalize(&json!([1, 2, 3])).is_err());
    }

    #[test]
    fn rejects_missing_steps() {
        let pre = Preprocessor::new();
        assert!(pre.normalize(&json!({"title": "x"})).is_err());
    }

    #[test]
    fn empty_steps_is_valid() {
        let pre = Preprocessor::new();
        let t = pre.normalize(&json!({"steps": []})).unwrap();
        assert!(t.steps.is_empty());
    }

    #[test]
    fn infers_kind_from_shape() {
        let pre = Preprocessor::new();
        let t = pre
            .normalize(&json!({"steps": [
                {"url": "https://x.test"},
                {"value": "hello"},
                {}
            ]}))
            .unwrap();
        assert_eq!(t.steps[0].kind, StepKind::Navigate);
        assert_eq!(t.steps[1].kind, StepKind::Input);
        assert_eq!(t.steps[2].kind, StepKind::Click);
    }

    #[test]
    fn coerces_change_to_input() {
        let pre = Preprocessor::new();
        let t = pre
            .normalize(&json!({"steps": [{"type": "change", "value": "a"}]}))
            .unwrap();
        assert_eq!(t.steps[0].kind, StepKind::Input);
    }

    #[test]
    fn preferred_reference_skips_aria_and_xpath() {
        let pre = Preprocessor::new();
        let t = pre
            .normalize(&json!({"steps": [
                {"type": "click", "selectors": [["aria/Submit", "xpath//button", "button.submit"]]}
            ]}))
            .unwrap();
        let pref = t.steps[0].preferred_reference().unwrap();
        assert_eq!(pref.value, "button.submit");
    }

    #[test]
    fn preferred_reference_falls_back_to_aria_only() {
        let pre = Preprocessor::new();
        let t = pre
            .normalize(&json!({"steps": [
                {"type": "click", "selectors": [["aria/Submit"]]}
            ]}))
            .unwrap();
        let pref = t.steps[0].preferred_reference().unwrap();
        assert_eq!(pref.value, "Submit");
    }

    #[test]
    fn metadata_extracts_site_and_target() {
        let pre = Preprocessor::new();
        let t = pre
            .normalize(&json!({
                "url": "https://x.test/login",
                "steps": [
                    {"type": "navigate", "url": "https://x.test/login"},
                    {"type": "navigate", "url": "https://x.test/dashboard"}
                ]
            }))
            .unwrap();
        let meta = pre.extract_metadata(&t);
        assert_eq!(meta.site.as_deref(), Some("x.test"));
        assert_eq!(meta.target_url.as_deref(), Some("x.test"));
        assert!(meta.has_navigation);
        assert!(!meta.has_input);
    }
}
