//! Meta-prompt assembly.

use chrono::{Local, TimeZone};
use skillsmith_core::Result;

use crate::context::{SessionSummary, WorkbenchContext};

pub const DEFAULT_META_PROMPT_TEMPLATE: &str = "You are an expert AI Agent architect.
I have a list of recorded HTTP requests from {{context_type}}.

Context: {{context_name}}
Included Sessions:
{{session_info}}

My Goal: {{goal}}

Here is the trace data (JSON):
{{data}}

Please generate the System Prompt or Tool Definitions now.
START OF GENERATED PROMPT:";

/// Used for `{{goal}}` when the user gives none.
pub const DEFAULT_GOAL: &str = "Create a system prompt that lets an AI agent reproduce these \
workflows by calling the same HTTP APIs, including the tool definitions it needs.";

/// System prompt sent with every generation.
pub const META_PROMPT_ROLE: &str = "You are a helpful assistant that writes precise system \
prompts and tool definitions for AI agents from recorded HTTP traffic.";

/// Character budget for the `{{data}}` section.
pub const MAX_DATA_CHARS: usize = 50_000;

const TRUNCATION_MARKER: &str = "\n// Truncated...";

/// Replace only the first occurrence of `placeholder`.
fn replace_first(text: &str, placeholder: &str, value: &str) -> String {
    match text.find(placeholder) {
        Some(pos) => {
            let mut out = String::with_capacity(text.len() + value.len());
            out.push_str(&text[..pos]);
            out.push_str(value);
            out.push_str(&text[pos + placeholder.len()..]);
            out
        }
        None => text.to_string(),
    }
}

fn format_local_time(ms: i64) -> String {
    match Local.timestamp_millis_opt(ms).single() {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ms.to_string(),
    }
}

pub fn session_info(sessions: &[SessionSummary]) -> String {
    sessions
        .iter()
        .map(|s| {
            let description = if s.description.is_empty() {
                "No Description"
            } else {
                s.description.as_str()
            };
            format!(
                "- Session: {} (Time: {})",
                description,
                format_local_time(s.start_time)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn take_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Pretty JSON of the context data, cut to [`MAX_DATA_CHARS`]. The marker is
/// appended when the compact form is over the budget.
pub fn format_data(ctx: &WorkbenchContext) -> Result<String> {
    let data = ctx.data();
    let pretty = serde_json::to_string_pretty(&data)?;
    let compact_len = serde_json::to_string(&data)?.chars().count();

    let mut out = take_chars(&pretty, MAX_DATA_CHARS).to_string();
    if compact_len > MAX_DATA_CHARS {
        out.push_str(TRUNCATION_MARKER);
    }
    Ok(out)
}

/// Fill the template for `ctx`. An empty template falls back to
/// [`DEFAULT_META_PROMPT_TEMPLATE`], an empty goal to [`DEFAULT_GOAL`].
pub fn build_meta_prompt(template: Option<&str>, ctx: &WorkbenchContext, goal: &str) -> Result<String> {
    let template = template
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(DEFAULT_META_PROMPT_TEMPLATE);
    let goal = if goal.trim().is_empty() { DEFAULT_GOAL } else { goal };

    let mut prompt = replace_first(template, "{{context_type}}", ctx.kind.phrase());
    prompt = replace_first(&prompt, "{{context_name}}", &ctx.name);
    prompt = replace_first(&prompt, "{{session_info}}", &session_info(&ctx.sessions));
    prompt = replace_first(&prompt, "{{goal}}", goal);
    prompt = replace_first(&prompt, "{{data}}", &format_data(ctx)?);
    Ok(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextKind;
    use skillsmith_core::{Headers, PersistedRecord};

    fn context(kind: ContextKind, body: Option<String>) -> WorkbenchContext {
        WorkbenchContext {
            kind,
            name: "login".to_string(),
            sessions: vec![SessionSummary {
                id: "s1".to_string(),
                description: String::new(),
                start_time: 0,
            }],
            records: vec![PersistedRecord {
                id: "r1".to_string(),
                session_id: "s1".to_string(),
                url: "https://a.example.com/api".to_string(),
                method: "POST".to_string(),
                request_headers: Headers::new(),
                request_body: Some("{\"user\":\"x\"}".to_string()),
                response_status: Some(200),
                response_headers: None,
                response_body: body,
                timestamp: 0,
            }],
        }
    }

    #[test]
    fn test_replace_first_only() {
        assert_eq!(replace_first("{{a}} {{a}}", "{{a}}", "x"), "x {{a}}");
        assert_eq!(replace_first("none", "{{a}}", "x"), "none");
    }

    #[test]
    fn test_default_template_filled() {
        let ctx = context(ContextKind::Single, Some("ok".to_string()));
        let prompt = build_meta_prompt(None, &ctx, "").unwrap();

        assert!(prompt.contains("from a user session."));
        assert!(prompt.contains("Context: login"));
        assert!(prompt.contains("- Session: No Description (Time: "));
        assert!(prompt.contains(&format!("My Goal: {}", DEFAULT_GOAL)));
        assert!(prompt.contains("\"sessionId\": \"s1\""));
        assert!(prompt.contains("\"reqBody\": \"{\\\"user\\\":\\\"x\\\"}\""));
        assert!(!prompt.contains("{{"));
        assert!(!prompt.contains("Truncated"));
    }

    #[test]
    fn test_custom_template_and_domain_phrase() {
        let ctx = context(ContextKind::Domain, None);
        let prompt = build_meta_prompt(Some("{{context_type}} / {{goal}} / {{goal}}"), &ctx, "map the API")
            .unwrap();
        assert_eq!(prompt, "multiple user sessions / map the API / {{goal}}");
    }

    #[test]
    fn test_data_truncated() {
        let ctx = context(ContextKind::Single, Some("x".repeat(MAX_DATA_CHARS)));
        let data = format_data(&ctx).unwrap();
        assert!(data.ends_with(TRUNCATION_MARKER));
        assert_eq!(
            data.chars().count(),
            MAX_DATA_CHARS + TRUNCATION_MARKER.chars().count()
        );
    }

    #[test]
    fn test_session_info_lines() {
        let sessions = vec![
            SessionSummary {
                id: "a".to_string(),
                description: "login".to_string(),
                start_time: 0,
            },
            SessionSummary {
                id: "b".to_string(),
                description: String::new(),
                start_time: 0,
            },
        ];
        let info = session_info(&sessions);
        let lines: Vec<&str> = info.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("- Session: login (Time: "));
        assert!(lines[1].starts_with("- Session: No Description"));
    }
}
