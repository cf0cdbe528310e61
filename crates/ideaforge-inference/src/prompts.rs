//! Prompt construction for research and deepening calls.

use ideaforge_core::defaults::IDEAS_PER_PROVIDER;
use ideaforge_core::models::Idea;

/// System prompt for the research task.
///
/// Instructs the model to emit JSON only, with exactly the fields the
/// research schema validates.
pub fn research_system_prompt() -> String {
    format!(
        r#"You are a research ideation engine. Respond with JSON only — no prose, no Markdown.

Return an object with a single field "ideas": an array of exactly {IDEAS_PER_PROVIDER} ideas.
Each idea must contain all of these fields:
- "title": concise name, 5-500 characters
- "description": what the idea is and how it works, at least 50 characters
- "rationale": why it addresses the problem, at least 20 characters
- "category": one of "technical", "business", "research", "design", "policy", "other"
- "confidence_score": number between 0 and 1
- "novelty_score": number between 0 and 1
- "tags": 3-6 lowercase keywords

All fields are required. Do not include any field outside this schema."#
    )
}

/// User prompt for the research task.
pub fn research_user_prompt(problem_statement: &str) -> String {
    format!(
        "Generate {IDEAS_PER_PROVIDER} distinct, concrete ideas addressing the following problem:\n\n{problem_statement}"
    )
}

/// System prompt for the deepening task.
pub fn deepening_system_prompt() -> String {
    r#"You are a research analyst elaborating one chosen idea. Respond with JSON only — no prose, no Markdown.

Return an object with a single field "deepening" containing:
- "idea_title": string
- "depth_level": the requested depth (1, 2, or 3)
- "executive_summary": string
- "key_insights": array of strings
- "detailed_analysis": string, at least 100 characters
- "action_items": array of {"step", "description", "priority" ("high"|"medium"|"low"), "estimated_effort"?}
- "risks": array of {"risk", "severity", "mitigation"?}
- "success_metrics": array of strings
- "resources_needed": array of strings
- "estimated_timeline": string
- "confidence_score": number between 0 and 1"#
        .to_string()
}

/// Depth-level instruction substituted into the deepening prompt.
fn depth_instructions(depth_level: i16) -> &'static str {
    match depth_level {
        1 => {
            "Produce a strategic overview: market context, key stakeholders, \
             main challenges, success metrics, a rough timeline, and 3-5 next steps."
        }
        2 => {
            "Produce a detailed implementation plan: architecture, required \
             resources, risks with mitigations, competitive landscape, and a \
             phased roadmap."
        }
        _ => {
            "Produce a full execution blueprint: step-by-step implementation \
             guide, specific tools and vendors, team composition, KPIs, cost \
             breakdown, compliance considerations, and success metrics at 90 \
             days, 6 months, and 1 year."
        }
    }
}

/// User prompt for deepening one idea at the given depth level.
pub fn deepening_user_prompt(idea: &Idea, problem_statement: &str, depth_level: i16) -> String {
    format!(
        r#"Original problem statement:
{problem_statement}

Chosen idea:
Title: {title}
Description: {description}
Rationale: {rationale}
Category: {category}
Tags: {tags}

Depth level: {depth_level}
{instructions}"#,
        title = idea.title,
        description = idea.description,
        rationale = idea.rationale,
        category = idea.category,
        tags = idea.tags.join(", "),
        instructions = depth_instructions(depth_level),
    )
}
