//! The six healing strategies plus the bare-tag heuristic fallback
//! (spec §4.5). Each returns unscored-but-seeded candidates; final scoring
//! happens in [`super::scoring`].

use super::scoring::Candidate;
use super::ElementContext;

/// Priority-ordered stable attributes with a per-attribute base confidence.
const STABLE_ATTRIBUTES: &[(&str, f64)] = &[
    ("data-testid", 0.9),
    ("data-cy", 0.85),
    ("data-test", 0.85),
    ("name", 0.8),
    ("aria-label", 0.75),
    ("placeholder", 0.7),
    ("role", 0.65),
    ("id", 0.95),
    ("aria-labelledby", 0.6),
];

const STABLE_CONTAINERS: &[&str] = &["form", "nav", "main", "article", "section"];

pub fn stable_attributes(ctx: &ElementContext) -> Vec<Candidate> {
    let mut out = Vec::new();
    for (attr, base_score) in STABLE_ATTRIBUTES {
        let Some(value) = ctx.element_attributes.get(*attr) else {
            continue;
        };
        let selector = if *attr == "id" {
            format!("#{value}")
        } else {
            format!("[{attr}=\"{value}\"]")
        };
        out.push(Candidate {
            selector,
            score: *base_score,
            source: "stable-attribute".to_string(),
        });
    }
    out
}

pub fn text(ctx: &ElementContext) -> Vec<Candidate> {
    let Some(text) = &ctx.element_text else {
        return Vec::new();
    };
    if text.trim().is_empty() {
        return Vec::new();
    }
    vec![
        Candidate {
            selector: format!("text=\"{text}\""),
            score: 0.65,
            source: "text".to_string(),
        },
        Candidate {
            selector: format!("text=/{}/i", regex_escape(text)),
            score: 0.6,
            source: "text".to_string(),
        },
        Candidate {
            selector: format!("text=/.*{}.*/i", regex_escape(text)),
            score: 0.5,
            source: "text".to_string(),
        },
    ]
}

/// Structure strategy: derive selectors anchored on stable siblings and
/// stable containers (`form`, `nav`, `main`, `article`, `section`,
/// `[role=main|navigation]`).
pub fn structure(ctx: &ElementContext) -> Vec<Candidate> {
    let mut out = Vec::new();
    let tag = ctx.element_type.as_deref().unwrap_or("*");

    if ctx.element_type.as_deref() == Some("input") {
        if let Some(name) = ctx.element_attributes.get("name") {
            out.push(Candidate {
                selector: format!("label:has-text(\"{name}\") + input"),
                score: 0.55,
                source: "structure".to_string(),
            });
        }
    }

    for container in &ctx.container_tags {
        if STABLE_CONTAINERS.contains(&container.as_str()) {
            out.push(Candidate {
                selector: format!("{container} {tag}"),
                score: 0.5,
                source: "structure".to_string(),
            });
        }
    }

    for sibling in &ctx.sibling_tags {
        out.push(Candidate {
            selector: format!("{sibling} ~ {tag}"),
            score: 0.45,
            source: "structure".to_string(),
        });
    }

    out.push(Candidate {
        selector: format!("[role=\"main\"] {tag}"),
        score: 0.4,
        source: "structure".to_string(),
    });

    out
}

pub fn semantic(ctx: &ElementContext) -> Vec<Candidate> {
    let tag = ctx.element_type.as_deref().unwrap_or("*");
    let mut out = vec![
        Candidate {
            selector: format!("nav {tag}"),
            score: 0.45,
            source: "semantic".to_string(),
        },
        Candidate {
            selector: format!("main {tag}"),
            score: 0.45,
            source: "semantic".to_string(),
        },
    ];
    if let Some(role) = ctx.element_attributes.get("role") {
        out.push(Candidate {
            selector: format!("role={role}"),
            score: 0.5,
            source: "semantic".to_string(),
        });
    }
    out
}

/// Visual strategy: bounding-box proximity to a reference size, tag-
/// promoted for interactive tags.
pub fn visual(ctx: &ElementContext) -> Vec<Candidate> {
    let (Some(bbox), Some(reference)) = (&ctx.bounding_box, &ctx.reference_bounding_box) else {
        return Vec::new();
    };
    let area = bbox.width * bbox.height;
    let reference_area = reference.width * reference.height;
    if reference_area <= 0.0 {
        return Vec::new();
    }
    let ratio = (area / reference_area).min(reference_area / area.max(1.0));
    let tag = ctx.element_type.as_deref().unwrap_or("*");
    let promoted = matches!(tag, "button" | "a" | "input" | "select");
    vec![Candidate {
        selector: format!("{tag}:visible"),
        score: if promoted { 0.4 + ratio * 0.1 } else { 0.3 + ratio * 0.1 },
        source: "visual".to_string(),
    }]
}

pub fn heuristic_fallback(ctx: &ElementContext) -> Vec<Candidate> {
    let tag = ctx.element_type.as_deref().unwrap_or("div");
    vec![Candidate {
        selector: tag.to_string(),
        score: 0.1,
        source: "heuristic".to_string(),
    }]
}

fn regex_escape(input: &str) -> String {
    regex::escape(input)
}
