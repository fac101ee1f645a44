//! System prompt that teaches a model the tag protocol.
//!
//! Used when the provider is driven purely by prompt: the offered tools and
//! the expected wire format are described in text, and the model answers
//! with tagged JSON that the stream transform later picks up.

use serde_json::json;
use toolstream_core::ToolDefinition;

use crate::tag::TagConfig;

/// Built-in template. Placeholders: `{{tools}}`, `{{opening_tag}}`,
/// `{{closing_tag}}`.
pub const DEFAULT_TEMPLATE: &str = "\
You can call the following tools. Each line describes one tool as JSON:

{{tools}}

To call a tool, reply with a JSON object naming the tool and its arguments, \
wrapped in tags exactly like this:

{{opening_tag}}
{\"name\": \"<tool name>\", \"arguments\": {<arguments matching the input_schema>}}
{{closing_tag}}

Use one tag per call. Only call tools from the list above. \
Do not wrap tool calls in code blocks.";

/// Renders `template` (or [`DEFAULT_TEMPLATE`]) for the given tools and tags.
pub fn render_tool_prompt(
    template: Option<&str>,
    tools: &[ToolDefinition],
    tags: &TagConfig,
) -> String {
    let listing = tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.id,
                "description": tool.description,
                "input_schema": tool.input_schema,
            })
            .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n");

    template
        .unwrap_or(DEFAULT_TEMPLATE)
        .replace("{{tools}}", &listing)
        .replace("{{opening_tag}}", &tags.opening_tag)
        .replace("{{closing_tag}}", &tags.closing_tag)
}
