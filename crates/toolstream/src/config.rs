//! Tool-use middleware configuration.

use serde::{Deserialize, Serialize};
use toolstream_core::LlmError;

use crate::tag::TagConfig;

/// Configuration for [`ToolUseInterceptor`](crate::ToolUseInterceptor).
///
/// Use struct update syntax with [`Default`] for ergonomic construction:
///
/// ```rust
/// use toolstream::ToolUseConfig;
///
/// let config = ToolUseConfig {
///     inject_system_prompt: false,
///     ..Default::default()
/// };
/// assert_eq!(config.tags.opening_tag, "<tool_call>");
/// ```
///
/// Every field is optional when loading from JSON:
///
/// ```rust
/// use toolstream::ToolUseConfig;
///
/// let json = r#"{"tags": {"opening_tag": "<call>", "closing_tag": "</call>"}}"#;
/// let config = ToolUseConfig::from_json(json)?;
/// assert!(config.inject_system_prompt);
/// assert_eq!(config.tags.separator, "\n");
/// # Ok::<(), toolstream_core::LlmError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolUseConfig {
    /// Tag pair the model wraps tool calls in.
    pub tags: TagConfig,
    /// Describe the tools in the system prompt and stop forwarding them to
    /// the provider. Turn off when the provider already emits tagged text
    /// on its own.
    pub inject_system_prompt: bool,
    /// Replaces [`DEFAULT_TEMPLATE`](crate::prompt::DEFAULT_TEMPLATE).
    pub prompt_template: Option<String>,
}

impl Default for ToolUseConfig {
    fn default() -> Self {
        Self {
            tags: TagConfig::default(),
            inject_system_prompt: true,
            prompt_template: None,
        }
    }
}

impl ToolUseConfig {
    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// [`LlmError::InvalidRequest`] for malformed JSON or an unusable tag
    /// pair.
    pub fn from_json(json: &str) -> Result<Self, LlmError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| LlmError::InvalidRequest(format!("invalid tool-use config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the tag pair.
    ///
    /// # Errors
    ///
    /// See [`TagConfig::validate`].
    pub fn validate(&self) -> Result<(), LlmError> {
        self.tags.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ToolUseConfig::default();
        assert_eq!(config.tags, TagConfig::default());
        assert_eq!(config.tags.closing_tag, "</tool_call>");
        assert!(config.inject_system_prompt);
        assert!(config.prompt_template.is_none());
    }

    #[test]
    fn test_config_override() {
        let config = ToolUseConfig {
            prompt_template: Some("{{tools}}".into()),
            inject_system_prompt: false,
            ..Default::default()
        };
        assert!(!config.inject_system_prompt);
        assert_eq!(config.prompt_template.as_deref(), Some("{{tools}}"));
    }

    #[test]
    fn test_from_json_partial() {
        let config = ToolUseConfig::from_json(r#"{"inject_system_prompt": false}"#).unwrap();
        assert!(!config.inject_system_prompt);
        assert_eq!(config.tags, TagConfig::default());

        let config = ToolUseConfig::from_json("{}").unwrap();
        assert_eq!(config, ToolUseConfig::default());
    }

    #[test]
    fn test_from_json_round_trip() {
        let config = ToolUseConfig {
            tags: TagConfig::new("<fn>", "</fn>").with_separator(" "),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(ToolUseConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_from_json_rejects_bad_input() {
        assert!(matches!(
            ToolUseConfig::from_json("not json"),
            Err(LlmError::InvalidRequest(_))
        ));
        assert!(matches!(
            ToolUseConfig::from_json(r#"{"tags": {"opening_tag": "<x>", "closing_tag": "<x>"}}"#),
            Err(LlmError::InvalidRequest(_))
        ));
    }
}
