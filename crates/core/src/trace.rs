//! Slide extraction from agent conversation traces.
//!
//! An agent run may end with a final structured answer, or it may stop after
//! the image tool calls without ever restating the slides. The extractor
//! handles both: the latest assistant turn with a JSON slide list wins, then
//! the latest plain-text outline; failing that, tool results are handed back
//! for positional reuse.

use crate::parser::SlideListParser;
use crate::types::{ConversationTrace, Extraction, Role};
use crate::{Error, Result};

/// Extracts slides (or tool results) from a [`ConversationTrace`].
#[derive(Debug, Clone, Default)]
pub struct TraceSlideExtractor {
    parser: SlideListParser,
}

impl TraceSlideExtractor {
    /// Create an extractor using the default parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific parser for assistant messages.
    pub fn with_parser(mut self, parser: SlideListParser) -> Self {
        self.parser = parser;
        self
    }

    /// Extract from a trace.
    ///
    /// Assistant messages are tried newest first, since later turns supersede
    /// earlier ones. Structured JSON in any turn beats a plain-text outline in
    /// a newer one, so the outline fallback only runs once no turn decodes as
    /// JSON. If none holds a slide list, every tool result is returned in
    /// chronological order alongside an empty slide list. A trace with neither
    /// is a parse error.
    pub fn extract(&self, trace: &ConversationTrace) -> Result<Extraction> {
        let json_only = self.parser.clone().with_outline_fallback(false);
        let passes = [("JSON", &json_only), ("outline", &self.parser)];

        for (pass, parser) in passes {
            for (turn, message) in trace.with_role(Role::Ai).rev().enumerate() {
                if message.content.trim().is_empty() {
                    continue;
                }
                match parser.parse(&message.content) {
                    Ok(slides) => {
                        log::debug!(
                            "Assistant turn {} from the end holds {} slides ({} pass)",
                            turn + 1,
                            slides.len(),
                            pass
                        );
                        return Ok(Extraction {
                            slides,
                            resolved_images: Vec::new(),
                        });
                    }
                    Err(e) => log::debug!(
                        "Assistant turn {} from the end ({} pass): {}",
                        turn + 1,
                        pass,
                        e
                    ),
                }
            }
        }

        let resolved_images: Vec<Option<String>> = trace
            .with_role(Role::Tool)
            .map(|m| image_url_from_tool_result(&m.content))
            .collect();

        if resolved_images.is_empty() {
            let assistant_text = trace
                .with_role(Role::Ai)
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n---\n");
            return Err(Error::parse(
                format!(
                    "no assistant message in a {}-message trace holds a slide list",
                    trace.len()
                ),
                assistant_text,
            ));
        }

        log::info!(
            "Trace has no final slide list; returning {} tool results",
            resolved_images.len()
        );
        Ok(Extraction {
            slides: Vec::new(),
            resolved_images,
        })
    }
}

/// Read an image URL out of a tool result.
///
/// Tools report misses as prose ("No relevant image found", "None"), so only
/// http(s) URLs count.
pub fn image_url_from_tool_result(content: &str) -> Option<String> {
    let trimmed = content.trim().trim_matches('"');
    (trimmed.starts_with("http://") || trimmed.starts_with("https://"))
        .then(|| trimmed.to_string())
}
