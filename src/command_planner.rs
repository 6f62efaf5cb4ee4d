//! PlaywrightGenerator / command planner (spec §4.4): maps CanonicalSteps
//! to a driver-agnostic command sequence, and encodes/decodes Target
//! selectors.

use crate::types::{CanonicalAction, CanonicalActionKind, CanonicalStep, RefStrategy, Target};

const DEFAULT_NAV_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_ACTION_TIMEOUT_MS: u64 = 10_000;

/// A driver-agnostic command the Executor knows how to run. Each variant
/// carries exactly the parameters `BrowserDriver`/`Page` need.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Goto { url: String, timeout_ms: u64 },
    Fill { selector: String, value: String, timeout_ms: u64 },
    Click { selector: String, timeout_ms: u64 },
    WaitForSelector { selector: String, timeout_ms: u64 },
    Sleep { timeout_ms: u64 },
    SelectOption { selector: String, value: String },
    Press { selector: Option<String>, key: String },
    Hover { selector: String },
    Scroll { x: f64, y: f64 },
}

impl Command {
    /// The logical kind name used for retry/critical-command classification.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Goto { .. } => "goto",
            Command::Fill { .. } => "fill",
            Command::Click { .. } => "click",
            Command::WaitForSelector { .. } => "waitFor",
            Command::Sleep { .. } => "waitFor",
            Command::SelectOption { .. } => "select",
            Command::Press { .. } => "press",
            Command::Hover { .. } => "hover",
            Command::Scroll { .. } => "scroll",
        }
    }

    /// A command is critical iff its kind is one of goto/click/fill
    /// (spec §4.9, glossary "Critical command").
    pub fn is_critical(&self) -> bool {
        matches!(self, Command::Goto { .. } | Command::Click { .. } | Command::Fill { .. })
    }
}

pub struct CommandPlanner;

impl CommandPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Plan the full command sequence for a canonical action. `assert`
    /// steps are dropped at this layer; verification happens in the
    /// Executor/TaskExecutor (spec §4.4).
    pub fn plan(&self, action: &CanonicalAction) -> Vec<Command> {
        action.steps.iter().filter_map(plan_step).collect()
    }
}

impl Default for CommandPlanner {
    fn default() -> Self {
        Self::new()
    }
}

/// `pub(crate)` so the TaskExecutor can plan a single step (e.g. from a raw
/// transcript via `intent::translate_step`) without going through a whole
/// `CanonicalAction`.
pub(crate) fn plan_step(step: &CanonicalStep) -> Option<Command> {
    match step.action {
        CanonicalActionKind::Navigate => {
            let url = step
                .target
                .as_ref()
                .and_then(|t| t.value.clone())
                .or_else(|| step.value.clone())?;
            Some(Command::Goto {
                url,
                timeout_ms: step.timeout_ms.unwrap_or(DEFAULT_NAV_TIMEOUT_MS),
            })
        }
        CanonicalActionKind::Fill => {
            let selector = selector_of(step.target.as_ref())?;
            Some(Command::Fill {
                selector,
                value: step.value.clone().unwrap_or_default(),
                timeout_ms: step.timeout_ms.unwrap_or(DEFAULT_ACTION_TIMEOUT_MS),
            })
        }
        CanonicalActionKind::Click => {
            // Target omitted => command dropped; executor falls back to
            // the original transcript (spec §4.4).
            let selector = selector_of(step.target.as_ref())?;
            Some(Command::Click {
                selector,
                timeout_ms: step.timeout_ms.unwrap_or(DEFAULT_ACTION_TIMEOUT_MS),
            })
        }
        CanonicalActionKind::WaitFor => match selector_of(step.target.as_ref()) {
            Some(selector) => Some(Command::WaitForSelector {
                selector,
                timeout_ms: step.timeout_ms.unwrap_or(DEFAULT_ACTION_TIMEOUT_MS),
            }),
            None => Some(Command::Sleep {
                timeout_ms: step.timeout_ms.unwrap_or(DEFAULT_ACTION_TIMEOUT_MS),
            }),
        },
        CanonicalActionKind::Select => {
            let selector = selector_of(step.target.as_ref())?;
            Some(Command::SelectOption {
                selector,
                value: step.value.clone().unwrap_or_default(),
            })
        }
        CanonicalActionKind::Press => {
            let selector = selector_of(step.target.as_ref());
            Some(Command::Press {
                selector,
                key: step.value.clone().unwrap_or_default(),
            })
        }
        CanonicalActionKind::Hover => {
            let selector = selector_of(step.target.as_ref())?;
            Some(Command::Hover { selector })
        }
        CanonicalActionKind::Scroll => {
            let (x, y) = step
                .value
                .as_deref()
                .and_then(parse_xy)
                .unwrap_or((0.0, 0.0));
            Some(Command::Scroll { x, y })
        }
        // Dropped at this layer; verification is done in the Executor/TaskExecutor.
        CanonicalActionKind::Assert => None,
    }
}

fn parse_xy(raw: &str) -> Option<(f64, f64)> {
    let (x, y) = raw.split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

fn selector_of(target: Option<&Target>) -> Option<String> {
    target.map(target_to_selector)
}

/// Encode a Target into the driver's selector syntax (spec §4.4).
pub fn target_to_selector(target: &Target) -> String {
    if let Some(raw) = &target.selector {
        return match target.strategy {
            RefStrategy::Css | RefStrategy::Piercing | RefStrategy::Accessibility | RefStrategy::Visual => {
                raw.clone()
            }
            RefStrategy::Xpath => format!("xpath={raw}"),
            RefStrategy::Text => format!("text={raw}"),
            RefStrategy::Role => format!("role={raw}"),
            RefStrategy::TestId => format!("[data-testid=\"{raw}\"]"),
            RefStrategy::Label => format!("label={raw}"),
        };
    }
    String::new()
}

/// Decode an encoded selector back into a Target (inverse of
/// [`target_to_selector`], spec §8 round-trip law).
pub fn selector_to_target(selector: &str) -> Target {
    if let Some(rest) = selector.strip_prefix("xpath=") {
        return Target {
            strategy: RefStrategy::Xpath,
            selector: Some(rest.to_string()),
            value: None,
            fallbacks: Vec::new(),
        };
    }
    if let Some(rest) = selector.strip_prefix("text=") {
        return Target {
            strategy: RefStrategy::Text,
            selector: Some(rest.to_string()),
            value: None,
            fallbacks: Vec::new(),
        };
    }
    if let Some(rest) = selector.strip_prefix("role=") {
        return Target {
            strategy: RefStrategy::Role,
            selector: Some(rest.to_string()),
            value: None,
            fallbacks: Vec::new(),
        };
    }
    if let Some(rest) = selector.strip_prefix("label=") {
        return Target {
            strategy: RefStrategy::Label,
            selector: Some(rest.to_string()),
            value: None,
            fallbacks: Vec::new(),
        };
    }
    if let Some(rest) = selector
        .strip_prefix("[data-testid=\"")
        .and_then(|s| s.strip_suffix("\"]"))
    {
        return Target {
            strategy: RefStrategy::TestId,
            selector: Some(rest.to_string()),
            value: None,
            fallbacks: Vec::new(),
        };
    }
    Target {
        strategy: RefStrategy::Css,
        selector: Some(selector.to_string()),
        value: None,
        fallbacks: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionMetadata;

    fn nav_action() -> CanonicalAction {
        CanonicalAction {
            intent: "navigate".to_string(),
            steps: vec![CanonicalStep {
                action: CanonicalActionKind::Navigate,
                target: Some(Target {
                    strategy: RefStrategy::Css,
                    selector: None,
                    value: Some("https://x.test".to_string()),
                    fallbacks: Vec::new(),
                }),
                value: None,
                timeout_ms: None,
                options: Default::default(),
            }],
            metadata: ActionMetadata {
                source: "pattern".to_string(),
                site: None,
                confidence: 0.7,
            },
        }
    }

    #[test]
    fn navigate_maps_to_goto_with_default_timeout() {
        let planner = CommandPlanner::new();
        let commands = planner.plan(&nav_action());
        assert_eq!(
            commands[0],
            Command::Goto {
                url: "https://x.test".to_string(),
                timeout_ms: DEFAULT_NAV_TIMEOUT_MS,
            }
        );
    }

    #[test]
    fn click_with_no_target_is_dropped() {
        let action = CanonicalAction {
            intent: "generic-action".to_string(),
            steps: vec![CanonicalStep {
                action: CanonicalActionKind::Click,
                target: None,
                value: None,
                timeout_ms: None,
                options: Default::default(),
            }],
            metadata: ActionMetadata {
                source: "pattern".to_string(),
                site: None,
                confidence: 0.7,
            },
        };
        let commands = CommandPlanner::new().plan(&action);
        assert!(commands.is_empty());
    }

    #[test]
    fn waitfor_without_selector_becomes_sleep() {
        let action = CanonicalAction {
            intent: "generic-action".to_string(),
            steps: vec![CanonicalStep {
                action: CanonicalActionKind::WaitFor,
                target: None,
                value: None,
                timeout_ms: Some(1500),
                options: Default::default(),
            }],
            metadata: ActionMetadata {
                source: "pattern".to_string(),
                site: None,
                confidence: 0.7,
            },
        };
        let commands = CommandPlanner::new().plan(&action);
        assert_eq!(commands[0], Command::Sleep { timeout_ms: 1500 });
    }

    #[test]
    fn assert_is_dropped() {
        let action = CanonicalAction {
            intent: "scrape-list".to_string(),
            steps: vec![CanonicalStep {
                action: CanonicalActionKind::Assert,
                target: Some(Target::css(".price")),
                value: None,
                timeout_ms: None,
                options: Default::default(),
            }],
            metadata: ActionMetadata {
                source: "pattern".to_string(),
                site: None,
                confidence: 0.7,
            },
        };
        assert!(CommandPlanner::new().plan(&action).is_empty());
    }

    #[test]
    fn selector_round_trip_for_each_strategy() {
        let strategies = [
            RefStrategy::Css,
            RefStrategy::Xpath,
            RefStrategy::Text,
            RefStrategy::Role,
            RefStrategy::TestId,
            RefStrategy::Label,
        ];
        for strategy in strategies {
            let target = Target {
                strategy,
                selector: Some("widget".to_string()),
                value: None,
                fallbacks: Vec::new(),
            };
            let encoded = target_to_selector(&target);
            let decoded = selector_to_target(&encoded);
            let re_encoded = target_to_selector(&decoded);
            assert_eq!(encoded, re_encoded);
        }
    }

    #[test]
    fn critical_commands_are_goto_click_fill() {
        assert!(Command::Goto {
            url: "x".into(),
            timeout_ms: 1
        }
        .is_critical());
        assert!(Command::Click {
            selector: "x".into(),
            timeout_ms: 1
        }
        .is_critical());
        assert!(Command::Fill {
            selector: "x".into(),
            value: "y".into(),
            timeout_ms: 1
        }
        .is_critical());
        assert!(!Command::Hover { selector: "x".into() }.is_critical());
    }
}
