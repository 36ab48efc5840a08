//! Slide list parsing.
//!
//! Decodes parse candidates into raw slide mappings and rejects JSON that
//! decodes fine but is not shaped like a slide list.

use crate::normalize::ResponseNormalizer;
use crate::outline::parse_outline;
use crate::types::RawSlide;
use crate::{Error, Result};
use serde_json::Value;

/// Parser for model output that should contain a slide list.
#[derive(Debug, Clone)]
pub struct SlideListParser {
    normalizer: ResponseNormalizer,
    /// Whether to try the `Slide N:` outline format when no JSON fits.
    outline_fallback: bool,
}

impl Default for SlideListParser {
    fn default() -> Self {
        Self {
            normalizer: ResponseNormalizer::new(),
            outline_fallback: true,
        }
    }
}

impl SlideListParser {
    /// Create a parser with the outline fallback enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the plain-text outline fallback.
    pub fn with_outline_fallback(mut self, enabled: bool) -> Self {
        self.outline_fallback = enabled;
        self
    }

    /// Parse raw model text into slide mappings.
    pub fn parse(&self, raw: &str) -> Result<Vec<RawSlide>> {
        if raw.trim().is_empty() {
            return Err(Error::parse("model output is empty", raw));
        }
        let candidates = self.normalizer.candidates(raw);
        self.parse_candidates(&candidates, raw)
    }

    /// Try each candidate in order; the first one with a slide shape wins.
    ///
    /// `raw` is only used for diagnostics and the outline fallback.
    pub fn parse_candidates(&self, candidates: &[String], raw: &str) -> Result<Vec<RawSlide>> {
        for (position, candidate) in candidates.iter().enumerate() {
            match serde_json::from_str::<Value>(candidate) {
                Ok(value) => {
                    if let Some(slides) = slide_shape(value) {
                        log::debug!(
                            "Candidate {} decoded into {} slides",
                            position + 1,
                            slides.len()
                        );
                        return Ok(slides);
                    }
                    log::debug!("Candidate {} is JSON but not a slide list", position + 1);
                }
                Err(e) => {
                    log::debug!("Candidate {} is not JSON: {}", position + 1, e);
                }
            }
        }

        if self.outline_fallback {
            let slides = parse_outline(raw);
            if !slides.is_empty() {
                log::debug!("Recovered {} slides from outline text", slides.len());
                return Ok(slides);
            }
        }

        Err(Error::parse(
            format!(
                "none of {} candidates decoded into a slide list",
                candidates.len()
            ),
            raw,
        ))
    }
}

/// Check a decoded value for a slide-list shape.
///
/// Accepts a non-empty array of objects that all carry `title`, a single
/// object with `title` (promoted to a one-element list), or an object whose
/// `slides` key holds such an array.
pub fn slide_shape(value: Value) -> Option<Vec<RawSlide>> {
    match value {
        Value::Array(items) => {
            if items.is_empty() {
                return None;
            }
            items
                .into_iter()
                .map(|item| match item {
                    Value::Object(map) if map.contains_key("title") => Some(map),
                    _ => None,
                })
                .collect()
        }
        Value::Object(mut map) => {
            if map.contains_key("title") {
                Some(vec![map])
            } else {
                match map.remove("slides") {
                    Some(slides @ Value::Array(_)) => slide_shape(slides),
                    _ => None,
                }
            }
        }
        _ => None,
    }
}
