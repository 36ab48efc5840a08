//! Error types for deck generation.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while generating a deck.
#[derive(Error, Debug)]
pub enum Error {
    /// No candidate in the model output decoded into a slide list.
    ///
    /// `raw` is the untouched model output, kept for diagnostics.
    #[error("Could not parse slides from model output: {reason}")]
    Parse { reason: String, raw: String },

    /// A slide is missing a required field after coercion.
    #[error("Invalid slide {slide}: {reason}")]
    Validation { slide: usize, reason: String },

    /// The language-model call itself failed (transport, status, timeout).
    #[error("Language model call failed: {0}")]
    Model(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failed to read or write a file.
    #[error("Failed to access file: {0}")]
    IoError(#[from] std::io::Error),

    /// ZIP archive error (for PPTX).
    #[error("ZIP error: {0}")]
    ZipError(String),

    /// XML error (for PPTX).
    #[error("XML error: {0}")]
    XmlError(String),
}

impl Error {
    /// Build a parse error that keeps the raw model output.
    pub fn parse(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
            raw: raw.into(),
        }
    }

    /// Build a validation error for the slide at `slide` (1-based, model order).
    pub fn validation(slide: usize, reason: impl Into<String>) -> Self {
        Self::Validation {
            slide,
            reason: reason.into(),
        }
    }

    /// The raw model output attached to a parse error, if any.
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            Self::Parse { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

/// Failure of a single image-search or image-download call.
///
/// Distinct from "no match", which is `Ok(None)` from the search.
#[derive(Error, Debug)]
pub enum SearchError {
    /// Network failure or timeout.
    #[error("Image request transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("Image request returned HTTP {0}")]
    Status(u16),

    /// The server answered with an unreadable body.
    #[error("Image response could not be decoded: {0}")]
    Decode(String),
}
