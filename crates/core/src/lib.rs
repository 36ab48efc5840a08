//! Core slide model, model-output extraction and repair, and image
//! resolution for topic-to-deck generation.

pub mod error;
pub mod images;
pub mod normalize;
pub mod outline;
pub mod parser;
pub mod pipeline;
pub mod prompt;
pub mod trace;
pub mod types;
pub mod validate;

pub use error::{Error, Result, SearchError};
pub use images::{apply_positional_images, ImageResolver, ImageSearch, ImageSource};
pub use normalize::ResponseNormalizer;
pub use parser::SlideListParser;
pub use pipeline::{extract, DeckPipeline, LanguageModel, SlideExtractor};
pub use trace::TraceSlideExtractor;
pub use types::{
    ConversationTrace, Extraction, GenerationRequest, RawOutput, RawSlide, Role, SlideImage,
    SlideRecord, ToolCallRecord, TraceMessage,
};
pub use validate::{SlideValidator, ValidationPolicy};
