//! Output validation for model responses.
//!
//! Preprocessing is permissive (surrounding whitespace and a single Markdown
//! code fence are tolerated); validation after JSON decode is strict against
//! the task schema. Unknown fields are accepted for forward compatibility,
//! declared fields must type-check exactly.

use serde::Deserialize;

use ideaforge_core::models::{DeepeningPayload, IdeaCategory, IdeaDraft};

/// Bounds for idea fields.
const TITLE_MIN: usize = 5;
const TITLE_MAX: usize = 500;
const DESCRIPTION_MIN: usize = 50;
const RATIONALE_MIN: usize = 20;
const TAGS_MAX: usize = 10;
const IDEAS_MAX: usize = 10;
const ANALYSIS_MIN: usize = 100;

/// One structured validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// JSON-path-style location, e.g. `ideas[2].title`.
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Join issues into a single human-readable message.
pub fn issues_to_message(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// PREPROCESSING
// =============================================================================

/// Strip surrounding whitespace and a single wrapping Markdown code fence
/// (with optional `json` language tag).
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the language tag line, if any.
    let body = match body.split_once('\n') {
        Some((first_line, tail)) if first_line.trim().eq_ignore_ascii_case("json") => tail,
        Some((first_line, tail)) if first_line.trim().is_empty() => tail,
        _ => body,
    };
    body.trim()
}

// =============================================================================
// RESEARCH SCHEMA
// =============================================================================

/// Wire-level idea as produced by a model, before constraint checks.
#[derive(Debug, Deserialize)]
struct WireIdea {
    title: String,
    description: String,
    rationale: String,
    category: String,
    confidence_score: f64,
    novelty_score: f64,
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ResearchEnvelope {
    ideas: Vec<WireIdea>,
}

/// Validated research output.
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchOutput {
    pub ideas: Vec<IdeaDraft>,
}

fn check_score(issues: &mut Vec<ValidationIssue>, path: String, value: f64) {
    if !(0.0..=1.0).contains(&value) || value.is_nan() {
        issues.push(ValidationIssue::new(path, "must be within [0, 1]"));
    }
}

fn validate_idea(idx: usize, wire: &WireIdea, issues: &mut Vec<ValidationIssue>) {
    let at = |field: &str| format!("ideas[{idx}].{field}");

    let title_len = wire.title.trim().chars().count();
    if !(TITLE_MIN..=TITLE_MAX).contains(&title_len) {
        issues.push(ValidationIssue::new(
            at("title"),
            format!("length must be {TITLE_MIN}..{TITLE_MAX} characters"),
        ));
    }
    if wire.description.trim().chars().count() < DESCRIPTION_MIN {
        issues.push(ValidationIssue::new(
            at("description"),
            format!("must be at least {DESCRIPTION_MIN} characters"),
        ));
    }
    if wire.rationale.trim().chars().count() < RATIONALE_MIN {
        issues.push(ValidationIssue::new(
            at("rationale"),
            format!("must be at least {RATIONALE_MIN} characters"),
        ));
    }
    if IdeaCategory::parse(&wire.category).is_none() {
        issues.push(ValidationIssue::new(
            at("category"),
            format!("'{}' is not a recognized category", wire.category),
        ));
    }
    check_score(issues, at("confidence_score"), wire.confidence_score);
    check_score(issues, at("novelty_score"), wire.novelty_score);
    if wire.tags.is_empty() || wire.tags.len() > TAGS_MAX {
        issues.push(ValidationIssue::new(
            at("tags"),
            format!("must contain 1..{TAGS_MAX} tags"),
        ));
    }
}

/// Parse and validate a research response.
pub fn parse_research(raw: &str) -> std::result::Result<ResearchOutput, Vec<ValidationIssue>> {
    let body = strip_code_fence(raw);
    let envelope: ResearchEnvelope = serde_json::from_str(body)
        .map_err(|e| vec![ValidationIssue::new("$", e.to_string())])?;

    let mut issues = Vec::new();
    if envelope.ideas.is_empty() || envelope.ideas.len() > IDEAS_MAX {
        issues.push(ValidationIssue::new(
            "ideas",
            format!("must contain 1..{IDEAS_MAX} ideas"),
        ));
    }
    for (idx, idea) in envelope.ideas.iter().enumerate() {
        validate_idea(idx, idea, &mut issues);
    }
    if !issues.is_empty() {
        return Err(issues);
    }

    Ok(ResearchOutput {
        ideas: envelope
            .ideas
            .into_iter()
            .map(|wire| IdeaDraft {
                title: wire.title.trim().to_string(),
                description: wire.description.trim().to_string(),
                rationale: wire.rationale.trim().to_string(),
                category: IdeaCategory::parse(&wire.category)
                    .expect("category validated above"),
                confidence_score: wire.confidence_score,
                novelty_score: wire.novelty_score,
                tags: wire.tags,
            })
            .collect(),
    })
}

// =============================================================================
// DEEPENING SCHEMA
// =============================================================================

#[derive(Debug, Deserialize)]
struct DeepeningEnvelope {
    deepening: DeepeningPayload,
}

/// Parse and validate a deepening response.
pub fn parse_deepening(raw: &str) -> std::result::Result<DeepeningPayload, Vec<ValidationIssue>> {
    let body = strip_code_fence(raw);
    let envelope: DeepeningEnvelope = serde_json::from_str(body)
        .map_err(|e| vec![ValidationIssue::new("$", e.to_string())])?;

    let payload = envelope.deepening;
    let mut issues = Vec::new();

    if !(1..=3).contains(&payload.depth_level) {
        issues.push(ValidationIssue::new(
            "deepening.depth_level",
            "must be 1, 2, or 3",
        ));
    }
    if payload.idea_title.trim().is_empty() {
        issues.push(ValidationIssue::new(
            "deepening.idea_title",
            "must not be empty",
        ));
    }
    if payload.detailed_analysis.trim().chars().count() < ANALYSIS_MIN {
        issues.push(ValidationIssue::new(
            "deepening.detailed_analysis",
            format!("must be at least {ANALYSIS_MIN} characters"),
        ));
    }
    check_score(
        &mut issues,
        "deepening.confidence_score".to_string(),
        payload.confidence_score,
    );
    for (idx, item) in payload.action_items.iter().enumerate() {
        if item.step.trim().is_empty() {
            issues.push(ValidationIssue::new(
                format!("deepening.action_items[{idx}].step"),
                "must not be empty",
            ));
        }
    }

    if issues.is_empty() {
        Ok(payload)
    } else {
        Err(issues)
    }
}
