//! Turning extracted tag bodies into validated tool calls.
//!
//! Models are inconsistent about the exact payload they put between tool
//! tags, so the parser accepts a handful of shapes and normalizes them:
//!
//! ````text
//! {"name": "search", "arguments": {"q": "rust"}}
//! [{"name": "a", "arguments": {}}, {"name": "b", "arguments": {}}]
//! {"name": "a", "arguments": {}} {"name": "b", "arguments": {}}
//! {"function": "search", "parameters": "{\"q\": \"rust\"}"}
//! ```json
//! {"name": "search", "input": {"q": "rust"}}
//! ```
//! ````
//!
//! Nothing here returns an error. A payload that cannot be read yields no
//! calls; an entry naming a tool that was not offered is dropped while its
//! siblings survive.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde_json::{Map, Value};
use toolstream_core::{ToolCallDescriptor, ToolDefinition};

/// Parses tag bodies against a fixed set of offered tools.
///
/// Holds the call counter for one response, so `call_id`s stay unique
/// across every tag in that response.
#[derive(Debug, Clone)]
pub struct ToolCallParser {
    tools: Arc<[ToolDefinition]>,
    next_call: usize,
}

impl ToolCallParser {
    /// Creates a parser for the given tools.
    pub fn new(tools: Arc<[ToolDefinition]>) -> Self {
        Self {
            tools,
            next_call: 0,
        }
    }

    /// The tools calls are validated against.
    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    /// Parses one tag body into zero or more calls, in source order.
    pub fn parse(&mut self, content: &str) -> Vec<ToolCallDescriptor> {
        let payload = strip_code_fence(content);
        if payload.is_empty() {
            return Vec::new();
        }

        let (mut values, unread) = read_values(payload);
        if let Some(repaired) = repair_stringified_arguments(unread) {
            values.extend(read_values(&repaired).0);
        }
        if values.is_empty() {
            tracing::debug!(bytes = payload.len(), "unparseable tool call payload");
            return Vec::new();
        }

        values
            .into_iter()
            .flat_map(|value| match value {
                Value::Array(items) => items,
                other => vec![other],
            })
            .filter_map(|value| self.resolve(value))
            .collect()
    }

    fn resolve(&mut self, value: Value) -> Option<ToolCallDescriptor> {
        let raw: RawToolCall = match serde_json::from_value(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed tool call entry");
                return None;
            }
        };

        let name = raw.name.trim();
        let Some(tool) = self.tools.iter().find(|tool| tool.id == name) else {
            tracing::debug!(tool = name, "dropping call to unknown tool");
            return None;
        };

        let call_id = format!("call_{}", self.next_call);
        self.next_call += 1;
        Some(ToolCallDescriptor {
            call_id,
            tool_id: tool.id.clone(),
            arguments: raw.arguments,
            raw_matched_tool: tool.clone(),
        })
    }
}

/// Parses one payload with a fresh parser.
pub fn parse_tool_calls(content: &str, tools: &[ToolDefinition]) -> Vec<ToolCallDescriptor> {
    ToolCallParser::new(tools.into()).parse(content)
}

#[derive(Debug, Deserialize)]
struct RawToolCall {
    #[serde(alias = "function")]
    name: String,
    #[serde(
        default = "empty_arguments",
        alias = "parameters",
        alias = "input",
        deserialize_with = "flexible_arguments"
    )]
    arguments: Value,
}

fn empty_arguments() -> Value {
    Value::Object(Map::new())
}

// An object, a JSON string holding an object, or null.
fn flexible_arguments<'de, D>(deserializer: D) -> Result<Value, D::Error>
where
    D: Deserializer<'de>,
{
    struct ArgumentsVisitor;

    impl<'de> Visitor<'de> for ArgumentsVisitor {
        type Value = Value;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an object or a JSON-encoded string containing an object")
        }

        fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
        where
            M: MapAccess<'de>,
        {
            let mut object = Map::new();
            while let Some((key, value)) = map.next_entry()? {
                object.insert(key, value);
            }
            Ok(Value::Object(object))
        }

        fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if s.trim().is_empty() {
                return Ok(empty_arguments());
            }
            match serde_json::from_str(s) {
                Ok(Value::Object(object)) => Ok(Value::Object(object)),
                Ok(_) => Err(E::custom("arguments string does not hold an object")),
                Err(e) => Err(E::custom(format!("inner JSON error: {e}"))),
            }
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(empty_arguments())
        }
    }

    deserializer.deserialize_any(ArgumentsVisitor)
}

/// Reads consecutive JSON values, keeping whatever parsed before the
/// first syntax error. Also returns the text from that error onward.
fn read_values(payload: &str) -> (Vec<Value>, &str) {
    let mut values = Vec::new();
    let mut stream = serde_json::Deserializer::from_str(payload).into_iter::<Value>();
    loop {
        let offset = stream.byte_offset();
        match stream.next() {
            Some(Ok(value)) => values.push(value),
            Some(Err(e)) => {
                tracing::debug!(error = %e, parsed = values.len(), "tool call payload truncated");
                return (values, &payload[offset..]);
            }
            None => return (values, ""),
        }
    }
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

// `"arguments":"{"q":"x"}"` with the inner quotes left unescaped. Drops the
// quotes around every such object and leaves everything else untouched.
fn repair_stringified_arguments(raw: &str) -> Option<String> {
    const KEY: &str = r#""arguments""#;

    let mut repaired = String::with_capacity(raw.len());
    let mut rest = raw;
    let mut changed = false;
    while let Some(found) = rest.find(KEY) {
        let (head, tail) = rest.split_at(found + KEY.len());
        repaired.push_str(head);
        rest = tail;

        let Some(quote) = quoted_object_start(rest) else {
            continue;
        };
        repaired.push_str(&rest[..quote]);
        let object = &rest[quote + 1..];
        let Some(end) = object_end(object) else {
            rest = object;
            changed = true;
            break;
        };
        repaired.push_str(&object[..end]);
        let after = &object[end..];
        let gap = after.len() - after.trim_start().len();
        rest = match after[gap..].strip_prefix('"') {
            Some(remaining) => {
                repaired.push_str(&after[..gap]);
                remaining
            }
            None => after,
        };
        changed = true;
    }
    repaired.push_str(rest);
    changed.then_some(repaired)
}

/// Offset of the `"` in `: "{`, if `after_key` starts that way.
fn quoted_object_start(after_key: &str) -> Option<usize> {
    let value = after_key.trim_start().strip_prefix(':')?.trim_start();
    value.strip_prefix('"')?.trim_start().starts_with('{').then(|| after_key.len() - value.len())
}

/// Byte offset just past the brace closing the object `text` opens.
fn object_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
