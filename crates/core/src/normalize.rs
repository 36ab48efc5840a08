//! Response normalization for model output.
//!
//! Strips formatting noise (code fences, surrounding prose) from a raw model
//! response so it becomes a JSON parse candidate.

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

/// Regex matching a fenced code block anywhere in a response.
static FENCED_BLOCK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?```").unwrap());

/// Marker that opens and closes a fenced block.
const FENCE: &str = "```";

/// Produces parse candidates from raw model output.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseNormalizer;

impl ResponseNormalizer {
    /// Create a new normalizer.
    pub fn new() -> Self {
        Self
    }

    /// Strip a surrounding code fence, if there is one.
    ///
    /// When the trimmed text opens with a fence, the first line and the
    /// closing fence line are dropped. When a fenced block appears after some
    /// prose, its body is returned. Otherwise the input comes back unchanged.
    pub fn normalize<'a>(&self, raw: &'a str) -> Cow<'a, str> {
        let trimmed = raw.trim();

        if trimmed.starts_with(FENCE) {
            let lines: Vec<&str> = trimmed.lines().collect();
            if lines.len() < 2 {
                return Cow::Owned(trimmed.trim_matches('`').to_string());
            }
            let end = if lines.len() > 2 && lines[lines.len() - 1].trim_start().starts_with(FENCE) {
                lines.len() - 1
            } else if lines.len() == 2 && lines[1].trim_start().starts_with(FENCE) {
                1
            } else {
                lines.len()
            };
            return Cow::Owned(lines[1..end].join("\n"));
        }

        if let Some(caps) = FENCED_BLOCK_REGEX.captures(trimmed) {
            if let Some(body) = caps.get(1) {
                return Cow::Owned(body.as_str().to_string());
            }
        }

        Cow::Borrowed(raw)
    }

    /// Greedy span from the first `[` through the last `]`.
    pub fn bracket_span<'a>(&self, raw: &'a str) -> Option<&'a str> {
        span_between(raw, '[', ']')
    }

    /// Greedy span from the first `{` through the last `}`.
    pub fn brace_span<'a>(&self, raw: &'a str) -> Option<&'a str> {
        span_between(raw, '{', '}')
    }

    /// All parse candidates, in the order they should be tried.
    ///
    /// Fence-stripped text first, then the bracket span, then the brace span
    /// (a lone slide object wrapped in prose), then the raw text. Duplicates
    /// are dropped.
    pub fn candidates(&self, raw: &str) -> Vec<String> {
        let normalized = self.normalize(raw);
        let mut candidates: Vec<String> = Vec::with_capacity(4);

        let mut push = |candidate: &str| {
            let candidate = candidate.trim();
            if !candidate.is_empty() && !candidates.iter().any(|c| c == candidate) {
                candidates.push(candidate.to_string());
            }
        };

        push(normalized.as_ref());
        if let Some(span) = self.bracket_span(&normalized) {
            push(span);
        }
        if let Some(span) = self.brace_span(&normalized) {
            push(span);
        }
        push(raw);

        candidates
    }
}

fn span_between(raw: &str, open: char, close: char) -> Option<&str> {
    let start = raw.find(open)?;
    let end = raw.rfind(close)?;
    (start < end).then(|| &raw[start..=end])
}
