//! Multi-dimensional candidate scoring (spec §4.5): combines text match,
//! attribute match, DOM-depth penalty, role match, and a rule-based
//! uniqueness score; deduplicates by selector string keeping the highest
//! score; sorts non-increasingly and caps at 10.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::ElementContext;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub selector: String,
    pub score: f64,
    pub source: String,
}

pub fn score_and_rank(candidates: Vec<Candidate>, ctx: &ElementContext, max: usize) -> Vec<Candidate> {
    let mut best: HashMap<String, Candidate> = HashMap::new();

    for mut candidate in candidates {
        candidate.score = final_score(&candidate, ctx);
        best.entry(candidate.selector.clone())
            .and_modify(|existing| {
                if candidate.score > existing.score {
                    *existing = candidate.clone();
                }
            })
            .or_insert(candidate);
    }

    let mut ranked: Vec<Candidate> = best.into_values().collect();
    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
    ranked.truncate(max);
    ranked
}

fn final_score(candidate: &Candidate, ctx: &ElementContext) -> f64 {
    if candidate.source == "learned" {
        return candidate.score.clamp(0.0, 1.0);
    }

    let uniqueness = uniqueness_score(&candidate.selector);
    let mut score = candidate.score * 0.6 + uniqueness * 0.4;

    if let Some(text) = &ctx.element_text {
        if candidate.selector.to_lowercase().contains(&text.to_lowercase()) {
            score += 0.05;
        }
    }

    for value in ctx.element_attributes.values() {
        if candidate.selector.contains(value.as_str()) {
            score += 0.05;
            break;
        }
    }

    if candidate.selector.contains("role=") && ctx.element_attributes.contains_key("role") {
        score += 0.05;
    }

    score -= dom_depth_penalty(&candidate.selector);

    score.clamp(0.0, 1.0)
}

/// Rule-based uniqueness indicator (spec §4.5).
fn uniqueness_score(selector: &str) -> f64 {
    if selector.starts_with('#') {
        0.95
    } else if selector.contains("data-testid") {
        0.9
    } else if selector.contains("[name=") {
        0.7
    } else if selector.starts_with("text=") {
        0.65
    } else if selector.split_whitespace().count() <= 1 && !selector.contains('[') && !selector.contains('#') {
        0.1
    } else {
        0.4
    }
}

/// Penalty for deep descendant combinators.
fn dom_depth_penalty(selector: &str) -> f64 {
    let depth = selector.split([' ', '>']).filter(|s| !s.is_empty()).count();
    if depth <= 1 {
        0.0
    } else {
        0.02 * (depth as f64 - 1.0)
    }
}

/// Stability prediction: rule-based model used by [`super::SelectorHealer`]
/// (spec §4.5): id/data-attr boost; pseudo-class and depth penalty.
pub fn stability_score(selector: &str) -> f64 {
    let mut score = 0.5;
    if selector.starts_with('#') || selector.contains("id=") {
        score += 0.3;
    }
    if selector.contains("data-") {
        score += 0.2;
    }
    if selector.contains(':') {
        score -= 0.15;
    }
    let depth = selector.split([' ', '>']).filter(|s| !s.is_empty()).count();
    if depth > 1 {
        score -= 0.05 * (depth as f64 - 1.0);
    }
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_keeps_highest_score() {
        let candidates = vec![
            Candidate {
                selector: "#email".to_string(),
                score: 0.5,
                source: "stable-attribute".to_string(),
            },
            Candidate {
                selector: "#email".to_string(),
                score: 0.9,
                source: "stable-attribute".to_string(),
            },
        ];
        let ctx = ElementContext::default();
        let ranked = score_and_rank(candidates, &ctx, 10);
        assert_eq!(ranked.len(), 1);
        assert!(ranked[0].score > 0.5);
    }

    #[test]
    fn stability_boosts_id_and_penalizes_pseudo_class() {
        assert!(stability_score("#main") > stability_score("div:nth-child(2)"));
    }

    #[test]
    fn caps_at_max() {
        let candidates: Vec<Candidate> = (0..20)
            .map(|i| Candidate {
                selector: format!("sel-{i}"),
                score: 0.5,
                source: "heuristic".to_string(),
            })
            .collect();
        let ranked = score_and_rank(candidates, &ElementContext::default(), 10);
        assert_eq!(ranked.len(), 10);
    }
}
