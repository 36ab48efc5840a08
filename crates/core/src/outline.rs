//! Plain-text outline fallback.
//!
//! Some prompts ask the model for a line-oriented outline instead of JSON:
//!
//! ```text
//! Slide 1:
//! Why Rust
//! Memory safety without a garbage collector
//! Fearless concurrency
//! Image Query: rusty gears
//! ```
//!
//! This module turns such text into raw slide mappings so the validator can
//! treat both shapes the same way.

use crate::types::RawSlide;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// `Slide 3:` with an optional title after the colon. Markdown emphasis and
/// heading markers around the header are tolerated.
static SLIDE_HEADER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*[#*]*\s*slide\s+(\d+)\s*[*]*\s*:\s*(.*?)\s*[*]*\s*$").unwrap()
});

/// `Image Query: lake at sunrise`
static IMAGE_QUERY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*[*]*\s*image[ _]?query\s*[*]*\s*:\s*(.*?)\s*$").unwrap());

#[derive(Debug, Default)]
struct OutlineBlock {
    title: Option<String>,
    bullets: Vec<String>,
    image_query: Option<String>,
}

impl OutlineBlock {
    fn into_raw(self) -> RawSlide {
        let mut slide = RawSlide::new();
        if let Some(title) = self.title {
            slide.insert("title".into(), Value::String(title));
        }
        slide.insert(
            "bullets".into(),
            Value::Array(self.bullets.into_iter().map(Value::String).collect()),
        );
        if let Some(query) = self.image_query {
            slide.insert("image_query".into(), Value::String(query));
        }
        slide
    }
}

/// Parse a `Slide N:` outline into raw slide mappings.
///
/// Returns an empty list when the text has no slide headers. Blocks without
/// any bullet lines are dropped, so a status message that merely mentions
/// `Slide 1: <url>` does not read as an outline.
pub fn parse_outline(text: &str) -> Vec<RawSlide> {
    let mut blocks: Vec<OutlineBlock> = Vec::new();

    for line in text.lines() {
        if let Some(caps) = SLIDE_HEADER_REGEX.captures(line) {
            let inline_title = caps
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .filter(|t| !t.is_empty());
            blocks.push(OutlineBlock {
                title: inline_title,
                ..OutlineBlock::default()
            });
            continue;
        }

        // Text before the first header is preamble.
        let Some(block) = blocks.last_mut() else {
            continue;
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(caps) = IMAGE_QUERY_REGEX.captures(line) {
            let query = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            if !query.is_empty() {
                block.image_query = Some(query.to_string());
            }
        } else if block.title.is_none() {
            block.title = Some(trimmed.trim_matches('*').trim().to_string());
        } else {
            block.bullets.push(trimmed.to_string());
        }
    }

    log::debug!("Outline fallback found {} slide blocks", blocks.len());

    blocks
        .into_iter()
        .filter(|block| !block.bullets.is_empty())
        .map(OutlineBlock::into_raw)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_outline_blocks() {
        let text = "Here is your presentation:\n\n\
            Slide 1:\n\
            Why Rust\n\
            Memory safety\n\
            Fearless concurrency\n\
            Image Query: rusty gears\n\n\
            Slide 2:\n\
            Ecosystem\n\
            Cargo\n\
            Crates.io\n";
        let slides = parse_outline(text);

        assert_eq!(slides.len(), 2);
        assert_eq!(slides[0]["title"], "Why Rust");
        assert_eq!(
            slides[0]["bullets"],
            serde_json::json!(["Memory safety", "Fearless concurrency"])
        );
        assert_eq!(slides[0]["image_query"], "rusty gears");
        assert_eq!(slides[1]["title"], "Ecosystem");
        assert!(slides[1].get("image_query").is_none());
    }

    #[test]
    fn test_inline_title_and_markdown_header() {
        let text = "**Slide 1: Getting Started**\n- Install rustup\nImage Query: terminal";
        let slides = parse_outline(text);

        assert_eq!(slides.len(), 1);
        assert_eq!(slides[0]["title"], "Getting Started");
        assert_eq!(slides[0]["bullets"], serde_json::json!(["- Install rustup"]));
        assert_eq!(slides[0]["image_query"], "terminal");
    }

    #[test]
    fn test_no_headers_yields_nothing() {
        assert!(parse_outline("{\"error\": \"x\"}").is_empty());
        assert!(parse_outline("Slide decks are great").is_empty());
    }

    #[test]
    fn test_header_only_blocks_are_dropped() {
        let text = "All images fetched.\nSlide 1: https://img/1.jpg\nSlide 2: https://img/2.jpg";
        assert!(parse_outline(text).is_empty());

        let text = "Slide 1: Intro\nSlide 2:\nBody\nPoint one";
        let slides = parse_outline(text);
        assert_eq!(slides.len(), 1);
        assert_eq!(slides[0]["title"], "Body");
    }
}
