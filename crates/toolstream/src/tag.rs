//! Incremental tag extraction.
//!
//! [`TagExtractor`] recognizes one configured opening/closing tag pair in a
//! flat text stream that arrives in arbitrarily split fragments. Text
//! outside tags is released as soon as it can no longer be the start of a
//! tag; text inside a tag is accumulated and released in one piece when the
//! closing tag is confirmed.
//!
//! # State machine
//!
//! ```text
//!            tail is a prefix of open            open confirmed
//!  Outside ───────────────────────────► MatchingOpen ──────────────► InsideTag
//!     ▲  ◄─────────────────────────────      │                         │  ▲
//!     │        prefix broken: flush as text  └──── open confirmed ─────┘  │
//!     │                                                                    │
//!     │   close confirmed: emit tag body     tail is a prefix of close     │
//!     └──────────────────────────────── MatchingClose ◄────────────────────┘
//!                                             (prefix broken: bytes join the body)
//! ```
//!
//! The only bytes ever held back between calls are a tail that is a proper
//! prefix of the tag being looked for, so the pending buffer stays shorter
//! than the longest tag. Because withheld bytes are re-scanned together with
//! the next fragment, results do not depend on where fragment boundaries
//! fall: the concatenated clean text and the ordered tag bodies are the same
//! for every split of the same input.
//!
//! # Example
//!
//! ```rust
//! use toolstream::tag::{TagConfig, TagExtractor};
//!
//! let mut extractor = TagExtractor::new(TagConfig::default());
//! let mut results = Vec::new();
//! for fragment in ["before<tool_c", "all>{\"a\":1}</to", "ol_call>after"] {
//!     results.extend(extractor.feed(fragment));
//! }
//! results.extend(extractor.finalize());
//!
//! let text: String = results
//!     .iter()
//!     .filter(|r| !r.is_tag_content)
//!     .map(|r| r.content.as_str())
//!     .collect();
//! assert_eq!(text, "beforeafter");
//!
//! let tags: Vec<_> = results
//!     .iter()
//!     .filter_map(|r| r.tag_content_extracted.as_deref())
//!     .collect();
//! assert_eq!(tags, [r#"{"a":1}"#]);
//! ```

use serde::{Deserialize, Serialize};
use toolstream_core::LlmError;

/// The tag pair to recognize, plus the separator used when clean text is
/// rejoined around a removed tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagConfig {
    /// Literal opening tag, e.g. `<tool_call>`.
    pub opening_tag: String,
    /// Literal closing tag, e.g. `</tool_call>`.
    pub closing_tag: String,
    /// Inserted between clean segments by [`TagExtractor::extract_all`].
    pub separator: String,
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            opening_tag: "<tool_call>".into(),
            closing_tag: "</tool_call>".into(),
            separator: "\n".into(),
        }
    }
}

impl TagConfig {
    /// Creates a config for the given tag pair with a newline separator.
    pub fn new(opening_tag: impl Into<String>, closing_tag: impl Into<String>) -> Self {
        Self {
            opening_tag: opening_tag.into(),
            closing_tag: closing_tag.into(),
            ..Default::default()
        }
    }

    /// Sets the separator.
    #[must_use]
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Rejects tag pairs the extractor cannot work with.
    ///
    /// # Errors
    ///
    /// [`LlmError::InvalidRequest`] if either tag is empty or both are equal.
    pub fn validate(&self) -> Result<(), LlmError> {
        if self.opening_tag.is_empty() || self.closing_tag.is_empty() {
            return Err(LlmError::InvalidRequest(
                "opening and closing tags must not be empty".into(),
            ));
        }
        if self.opening_tag == self.closing_tag {
            return Err(LlmError::InvalidRequest(format!(
                "opening and closing tags must differ (both are {:?})",
                self.opening_tag
            )));
        }
        Ok(())
    }

    fn max_pending(&self) -> usize {
        self.opening_tag.len().max(self.closing_tag.len()).saturating_sub(1)
    }
}

/// Where the extractor is in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Plain text; looking for the opening tag.
    Outside,
    /// A proper prefix of the opening tag is withheld.
    MatchingOpen,
    /// Inside a tag; looking for the closing tag.
    InsideTag,
    /// Inside a tag with a proper prefix of the closing tag withheld.
    MatchingClose,
}

impl Phase {
    /// `true` while a tag is open.
    pub fn is_inside(self) -> bool {
        matches!(self, Self::InsideTag | Self::MatchingClose)
    }
}

/// One unit of extractor output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    /// Text to forward downstream; may be empty.
    pub content: String,
    /// `true` if `content` came from inside a tag and is not prose.
    pub is_tag_content: bool,
    /// `true` only on the result that closes a tag.
    pub complete: bool,
    /// The full text between the tags, present only when `complete`.
    pub tag_content_extracted: Option<String>,
}

impl ExtractionResult {
    fn text(content: String) -> Self {
        Self {
            content,
            is_tag_content: false,
            complete: false,
            tag_content_extracted: None,
        }
    }

    fn completed_tag(body: String) -> Self {
        Self {
            content: body.clone(),
            is_tag_content: true,
            complete: true,
            tag_content_extracted: Some(body),
        }
    }
}

/// Clean text and tag bodies from a one-shot extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedText {
    /// Text outside tags, with segments around removed tags joined by the
    /// configured separator.
    pub text: String,
    /// Tag bodies in order of appearance.
    pub tags: Vec<String>,
}

/// Incremental extractor for one tag pair.
///
/// Owns all session state. Create one per streamed response, feed every
/// text fragment in order, and call [`finalize`](Self::finalize) once at
/// the end.
#[derive(Debug, Clone)]
pub struct TagExtractor {
    config: TagConfig,
    phase: Phase,
    pending: String,
    tag_buffer: String,
}

impl TagExtractor {
    /// Creates an extractor in the [`Phase::Outside`] state.
    ///
    /// An empty tag in `config` never matches; use [`TagConfig::validate`]
    /// to reject such configs up front.
    pub fn new(config: TagConfig) -> Self {
        Self {
            config,
            phase: Phase::Outside,
            pending: String::new(),
            tag_buffer: String::new(),
        }
    }

    /// The tag configuration.
    pub fn config(&self) -> &TagConfig {
        &self.config
    }

    /// The current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Bytes withheld as a possible partial tag.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Consumes one fragment and returns whatever it resolved.
    ///
    /// Never fails and never blocks. Returns zero results when the whole
    /// fragment was withheld or absorbed into an open tag.
    pub fn feed(&mut self, fragment: &str) -> Vec<ExtractionResult> {
        let mut results = Vec::new();
        let mut buf = std::mem::take(&mut self.pending);
        buf.push_str(fragment);
        let mut rest = buf.as_str();

        loop {
            if self.phase.is_inside() {
                let close = self.config.closing_tag.as_str();
                if let Some(at) = find_tag(rest, close) {
                    self.tag_buffer.push_str(&rest[..at]);
                    results.push(ExtractionResult::completed_tag(std::mem::take(
                        &mut self.tag_buffer,
                    )));
                    rest = &rest[at + close.len()..];
                    self.phase = Phase::Outside;
                    continue;
                }

                let split = rest.len() - partial_match_len(rest, close);
                self.tag_buffer.push_str(&rest[..split]);
                self.pending.push_str(&rest[split..]);
                self.phase = if self.pending.is_empty() {
                    Phase::InsideTag
                } else {
                    Phase::MatchingClose
                };
                break;
            }

            let open = self.config.opening_tag.as_str();
            if let Some(at) = find_tag(rest, open) {
                if at > 0 {
                    results.push(ExtractionResult::text(rest[..at].to_owned()));
                }
                rest = &rest[at + open.len()..];
                self.tag_buffer.clear();
                self.phase = Phase::InsideTag;
                continue;
            }

            let split = rest.len() - partial_match_len(rest, open);
            if split > 0 {
                results.push(ExtractionResult::text(rest[..split].to_owned()));
            }
            self.pending.push_str(&rest[split..]);
            self.phase = if self.pending.is_empty() {
                Phase::Outside
            } else {
                Phase::MatchingOpen
            };
            break;
        }

        debug_assert!(self.pending.len() <= self.config.max_pending());
        results
    }

    /// Resolves whatever is still withheld at end of stream and resets the
    /// extractor.
    ///
    /// A withheld partial opening tag never became a tag, so it is released
    /// as ordinary text. An open tag (with or without a withheld partial
    /// closing tag) is returned as a best-effort `complete` result when its
    /// body is non-empty, so a tool call cut off by an upstream disconnect
    /// can still be attempted. An empty unterminated tag yields nothing.
    pub fn finalize(&mut self) -> Vec<ExtractionResult> {
        let pending = std::mem::take(&mut self.pending);
        let mut body = std::mem::take(&mut self.tag_buffer);
        let phase = std::mem::replace(&mut self.phase, Phase::Outside);

        if phase.is_inside() {
            body.push_str(&pending);
            if body.is_empty() {
                return Vec::new();
            }
            tracing::debug!(bytes = body.len(), "unterminated tag at end of stream");
            return vec![ExtractionResult::completed_tag(body)];
        }

        if pending.is_empty() {
            Vec::new()
        } else {
            vec![ExtractionResult::text(pending)]
        }
    }

    /// Runs a fresh extractor over a complete text.
    ///
    /// Clean segments on either side of a removed tag are joined with
    /// [`TagConfig::separator`]; empty segments are skipped so no separator
    /// is doubled or left dangling.
    pub fn extract_all(config: TagConfig, text: &str) -> ExtractedText {
        let separator = config.separator.clone();
        let mut extractor = Self::new(config);
        let mut results = extractor.feed(text);
        results.extend(extractor.finalize());

        let mut segments = vec![String::new()];
        let mut tags = Vec::new();
        for result in results {
            if let Some(body) = result.tag_content_extracted {
                tags.push(body);
                segments.push(String::new());
            } else if !result.is_tag_content {
                if let Some(last) = segments.last_mut() {
                    last.push_str(&result.content);
                }
            }
        }

        let text = segments
            .into_iter()
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join(&separator);
        ExtractedText { text, tags }
    }
}

// An empty tag never matches.
fn find_tag(haystack: &str, tag: &str) -> Option<usize> {
    if tag.is_empty() {
        None
    } else {
        haystack.find(tag)
    }
}

/// Length of the longest suffix of `haystack` that is a proper prefix of `needle`.
fn partial_match_len(haystack: &str, needle: &str) -> usize {
    let longest = needle.len().saturating_sub(1).min(haystack.len());
    (1..=longest)
        .rev()
        .find(|&len| {
            let start = haystack.len() - len;
            haystack.is_char_boundary(start)
                && needle.as_bytes().starts_with(&haystack.as_bytes()[start..])
        })
        .unwrap_or(0)
}
