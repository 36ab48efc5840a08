//! Slide validation.
//!
//! Turns raw slide mappings into [`SlideRecord`]s: coerces legacy field
//! names, splits prose bullets, pads or caps the bullet count and assigns
//! indices.

use crate::types::{RawSlide, SlideImage, SlideRecord, MAX_BULLETS};
use crate::{Error, Result};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

/// Sentence or clause boundary inside a prose bullet field.
static BULLET_SPLIT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.,](?:\s+|$)|\r?\n").unwrap());

/// Leading list marker such as `- `, `• ` or `2. `.
static LIST_MARKER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*•–]|\d{1,2}[.)])\s+").unwrap());

/// Field names accepted for the bullet list, in priority order.
const BULLET_KEYS: &[&str] = &["bullets", "content"];

/// Field names accepted for the pending image query, in priority order.
const IMAGE_QUERY_KEYS: &[&str] = &["image_query", "img_query", "imageQuery"];

/// What to do with a batch when some slides fail validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationPolicy {
    /// Drop invalid slides and keep a shorter deck. Fails only if nothing survives.
    #[default]
    DropInvalid,
    /// Fail the whole batch on the first invalid slide.
    RejectBatch,
}

/// Validator for raw slide mappings.
#[derive(Debug, Clone, Default)]
pub struct SlideValidator {
    policy: ValidationPolicy,
}

impl SlideValidator {
    /// Create a validator that drops invalid slides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the batch policy.
    pub fn with_policy(mut self, policy: ValidationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Validate a batch, numbering surviving slides from 1.
    ///
    /// Any `slide_number` the model supplied is ignored.
    pub fn validate_slides(&self, raw_slides: &[RawSlide]) -> Result<Vec<SlideRecord>> {
        if raw_slides.is_empty() {
            return Err(Error::validation(0, "no slides to validate"));
        }

        let mut slides = Vec::with_capacity(raw_slides.len());
        let mut first_error = None;

        for (position, raw) in raw_slides.iter().enumerate() {
            match validate_slide(raw, position + 1, slides.len() + 1) {
                Ok(slide) => slides.push(slide),
                Err(e) => {
                    if self.policy == ValidationPolicy::RejectBatch {
                        return Err(e);
                    }
                    log::warn!("Dropping slide: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match (slides.is_empty(), first_error) {
            (true, Some(e)) => Err(e),
            _ => Ok(slides),
        }
    }
}

/// Validate one raw slide.
///
/// `position` is the slide's 1-based place in the model output (for error
/// messages); `index` is the index it gets in the deck.
pub fn validate_slide(raw: &RawSlide, position: usize, index: usize) -> Result<SlideRecord> {
    let title = match raw.get("title") {
        Some(Value::String(title)) => clean_text(title),
        Some(Value::Null) | None => return Err(Error::validation(position, "missing title")),
        Some(_) => return Err(Error::validation(position, "title is not a string")),
    };
    if title.is_empty() {
        return Err(Error::validation(position, "title is empty"));
    }

    // The first field that yields any bullets wins, so `"bullets": []` does
    // not hide a usable `content` list.
    let mut bullets = BULLET_KEYS
        .iter()
        .filter_map(|key| raw.get(*key))
        .map(coerce_bullets)
        .find(|bullets| !bullets.is_empty())
        .unwrap_or_default();
    if bullets.is_empty() {
        log::debug!("Slide {} has no bullets, padding with its title", position);
        bullets.push(title.clone());
    }
    if bullets.len() > MAX_BULLETS {
        log::debug!(
            "Slide {} has {} bullets, keeping {}",
            position,
            bullets.len(),
            MAX_BULLETS
        );
        bullets.truncate(MAX_BULLETS);
    }

    Ok(SlideRecord {
        index,
        title,
        bullets,
        image: coerce_image(raw),
    })
}

/// Turn a bullet field (list or prose) into clean bullet strings.
fn coerce_bullets(value: &Value) -> Vec<String> {
    let fragments: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                Value::Object(map) => map.get("text").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect(),
        Value::String(prose) => BULLET_SPLIT_REGEX
            .split(prose)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };

    fragments
        .iter()
        .map(|fragment| clean_text(&LIST_MARKER_REGEX.replace(fragment, "")))
        .filter(|bullet| !bullet.is_empty())
        .collect()
}

/// Work out the image state from whichever image fields are present.
fn coerce_image(raw: &RawSlide) -> SlideImage {
    if let Some(url) = raw
        .get("image_url")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
    {
        return SlideImage::Settled {
            image_url: Some(url.to_string()),
        };
    }

    IMAGE_QUERY_KEYS
        .iter()
        .filter_map(|key| raw.get(*key).and_then(Value::as_str))
        .map(clean_text)
        .find(|q| !q.is_empty())
        .map(|image_query| SlideImage::Pending { image_query })
        .unwrap_or_default()
}

/// Trim and NFC-normalize a piece of slide text.
fn clean_text(text: &str) -> String {
    text.trim().nfc().collect()
}
