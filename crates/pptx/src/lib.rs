//! PPTX (OOXML) backend for generated decks.
//!
//! [`PptxWriter`] renders a validated slide list into a `.pptx` package;
//! [`PptxInspector`] reads a deck back into titles and bullets.

pub mod inspect;
mod parts;
pub mod writer;

pub use inspect::{InspectedSlide, PptxInspector};
pub use writer::PptxWriter;
