//! SkillGenerator (spec §4.3): turns a [`CanonicalAction`] into a
//! reusable [`SkillSpec`], reusing a learned template when it has proven
//! itself, otherwise inferring inputs/outputs/retry policy/rate limit
//! from the action's intent and steps.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{
    BackoffFamily, CanonicalAction, RateLimit, RetryPolicy, SkillSpec, SkillTemplate,
};

const TEMPLATE_REUSE_THRESHOLD: f64 = 0.7;

static TEMPLATE_VAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{\s*(\w+)\s*\}\}").unwrap());

pub struct SkillGenerator;

impl SkillGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Generate a skill for `action`. If `template` is a learned template
    /// for the same intent with a success rate above the reuse threshold,
    /// its retry policy and safety checks are reused with the current
    /// steps substituted (spec §4.3).
    pub fn generate(&self, action: &CanonicalAction, template: Option<&SkillTemplate>) -> SkillSpec {
        if let Some(t) = template {
            if t.intent == action.intent && t.success_rate > TEMPLATE_REUSE_THRESHOLD {
                return SkillSpec {
                    steps: action.steps.clone(),
                    ..t.skill_spec.clone()
                };
            }
        }

        let inputs = infer_inputs(action);
        let outputs = infer_outputs(&action.intent);
        let retry_policy = default_retry_policy(&action.intent);
        let rate_limit = default_rate_limit(&action.intent);
        let safety_checks = safety_checks_for(&action.intent);

        SkillSpec {
            name: skill_name(action),
            description: format!("Generated skill for intent `{}`", action.intent),
            inputs,
            outputs,
            steps: action.steps.clone(),
            retry_policy,
            safety_checks,
            rate_limit,
        }
    }
}

impl Default for SkillGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn skill_name(action: &CanonicalAction) -> String {
    match &action.metadata.site {
        Some(site) => format!("{site}:{}", action.intent),
        None => action.intent.clone(),
    }
}

/// Inputs: `{{name}}` template variables found in step values, plus the
/// known-intent default for login (email + password).
fn infer_inputs(action: &CanonicalAction) -> Vec<String> {
    let mut names = Vec::new();

    for step in &action.steps {
        let Some(value) = &step.value else { continue };
        for cap in TEMPLATE_VAR.captures_iter(value) {
            let name = cap[1].to_string();
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }

    if action.intent == "submit-login" {
        for name in ["email", "password"] {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }

    names
}

/// Outputs from intent (spec §4.3).
fn infer_outputs(intent: &str) -> Vec<String> {
    match intent {
        "submit-login" => vec!["success".to_string(), "session".to_string()],
        "search" => vec!["results".to_string()],
        "scrape-list" => vec!["items".to_string()],
        _ => Vec::new(),
    }
}

/// Default retry policies (spec §4.3): navigation/login get a more
/// patient exponential backoff, everything else a short linear one.
fn default_retry_policy(intent: &str) -> RetryPolicy {
    match intent {
        "navigate" | "submit-login" => RetryPolicy {
            max_retries: 3,
            backoff: BackoffFamily::Exponential,
            base_ms: 1000,
        },
        _ => RetryPolicy {
            max_retries: 2,
            backoff: BackoffFamily::Linear,
            base_ms: 500,
        },
    }
}

/// Rate limits default per intent category (spec §4.3).
fn default_rate_limit(intent: &str) -> Option<RateLimit> {
    match intent {
        "submit-login" | "post-message" => Some(RateLimit {
            per_host: 5,
            per_global: 10,
            window_secs: 60,
        }),
        "search" | "scrape-list" => Some(RateLimit {
            per_host: 10,
            per_global: 20,
            window_secs: 60,
        }),
        _ => None,
    }
}

fn safety_checks_for(intent: &str) -> Vec<String> {
    match intent {
        "submit-login" => vec!["require_https".to_string(), "no_credential_logging".to_string()],
        "submit-form" => vec!["confirm_destructive_action".to_string()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionMetadata, CanonicalActionKind, CanonicalStep, Target};

    fn action(intent: &str, steps: Vec<CanonicalStep>) -> CanonicalAction {
        CanonicalAction {
            intent: intent.to_string(),
            steps,
            metadata: ActionMetadata {
                source: "pattern".to_string(),
                site: Some("x.test".to_string()),
                confidence: 0.7,
            },
        }
    }

    fn fill_step(value: &str) -> CanonicalStep {
        CanonicalStep {
            action: CanonicalActionKind::Fill,
            target: Some(Target::css("input")),
            value: Some(value.to_string()),
            timeout_ms: None,
            options: Default::default(),
        }
    }

    #[test]
    fn login_defaults_to_email_and_password_inputs() {
        let a = action("submit-login", vec![fill_step("secret")]);
        let skill = SkillGenerator::new().generate(&a, None);
        assert!(skill.inputs.contains(&"email".to_string()));
        assert!(skill.inputs.contains(&"password".to_string()));
        assert_eq!(skill.outputs, vec!["success".to_string(), "session".to_string()]);
        assert_eq!(skill.retry_policy.max_retries, 3);
        assert_eq!(skill.retry_policy.backoff, BackoffFamily::Exponential);
        assert!(skill.rate_limit.is_some());
    }

    #[test]
    fn extracts_template_variables_from_values() {
        let a = action("generic-action", vec![fill_step("{{ city }}")]);
        let skill = SkillGenerator::new().generate(&a, None);
        assert_eq!(skill.inputs, vec!["city".to_string()]);
    }

    #[test]
    fn reuses_learned_template_above_threshold() {
        let a = action("submit-login", vec![fill_step("secret")]);
        let gen = SkillGenerator::new();
        let fresh = gen.generate(&a, None);
        let template = SkillTemplate {
            intent: "submit-login".to_string(),
            skill_spec: SkillSpec {
                name: "reused".to_string(),
                ..fresh.clone()
            },
            success_rate: 0.95,
            usage_count: 10,
            last_updated: crate::types::now_utc(),
        };
        let reused = gen.generate(&a, Some(&template));
        assert_eq!(reused.name, "reused");
    }

    #[test]
    fn does_not_reuse_template_below_threshold() {
        let a = action("submit-login", vec![fill_step("secret")]);
        let gen = SkillGenerator::new();
        let fresh = gen.generate(&a, None);
        let template = SkillTemplate {
            intent: "submit-login".to_string(),
            skill_spec: SkillSpec {
                name: "reused".to_string(),
                ..fresh.clone()
            },
            success_rate: 0.4,
            usage_count: 10,
            last_updated: crate::types::now_utc(),
        };
        let result = gen.generate(&a, Some(&template));
        assert_ne!(result.name, "reused");
    }

    #[test]
    fn search_and_scrape_outputs() {
        let search = action("search", vec![]);
        let scrape = action("scrape-list", vec![]);
        let gen = SkillGenerator::new();
        assert_eq!(gen.generate(&search, None).outputs, vec!["results".to_string()]);
        assert_eq!(gen.generate(&scrape, None).outputs, vec!["items".to_string()]);
    }
}
