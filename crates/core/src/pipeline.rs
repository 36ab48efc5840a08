//! The generation pipeline.
//!
//! `model output -> extract -> validate -> resolve images`, behind a single
//! [`SlideExtractor::extract`] entry point that accepts either output shape.

use crate::images::{apply_positional_images, ImageResolver, ImageSearch};
use crate::parser::SlideListParser;
use crate::trace::TraceSlideExtractor;
use crate::types::{Extraction, GenerationRequest, RawOutput, RawSlide, SlideRecord};
use crate::validate::SlideValidator;
use crate::{Error, Result};

/// A language model that can produce slide content.
///
/// Implementations return plain text or a whole agent trace; transport and
/// timeout failures are [`Error::Model`].
pub trait LanguageModel {
    fn generate(&self, request: &GenerationRequest) -> Result<RawOutput>;
}

/// Pulls raw slides out of either shape of model output.
#[derive(Debug, Clone, Default)]
pub struct SlideExtractor {
    parser: SlideListParser,
    trace: TraceSlideExtractor,
}

impl SlideExtractor {
    /// Create an extractor with default parsing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `parser` for both plain text and assistant messages.
    pub fn with_parser(parser: SlideListParser) -> Self {
        Self {
            trace: TraceSlideExtractor::new().with_parser(parser.clone()),
            parser,
        }
    }

    /// Extract slides from model output.
    pub fn extract(&self, output: &RawOutput) -> Result<Extraction> {
        match output {
            RawOutput::Text(text) => Ok(Extraction {
                slides: self.parser.parse(text)?,
                resolved_images: Vec::new(),
            }),
            RawOutput::Trace(trace) => self.trace.extract(trace),
        }
    }
}

/// Extract slides from model output with the default extractor.
pub fn extract(output: &RawOutput) -> Result<Extraction> {
    SlideExtractor::new().extract(output)
}

/// Drives one generation request end to end.
///
/// Collaborators are borrowed so one set of clients can serve many requests.
pub struct DeckPipeline<'a> {
    model: &'a dyn LanguageModel,
    fallback: Option<&'a dyn LanguageModel>,
    search: Option<&'a dyn ImageSearch>,
    extractor: SlideExtractor,
    validator: SlideValidator,
    image_concurrency: usize,
}

impl<'a> DeckPipeline<'a> {
    /// Create a pipeline around the primary model.
    pub fn new(model: &'a dyn LanguageModel) -> Self {
        Self {
            model,
            fallback: None,
            search: None,
            extractor: SlideExtractor::new(),
            validator: SlideValidator::new(),
            image_concurrency: 1,
        }
    }

    /// Model to ask once more, tool-free, when the primary output has no slides.
    pub fn with_fallback(mut self, model: &'a dyn LanguageModel) -> Self {
        self.fallback = Some(model);
        self
    }

    /// Image search used to resolve pending image queries.
    pub fn with_image_search(mut self, search: &'a dyn ImageSearch) -> Self {
        self.search = Some(search);
        self
    }

    /// Set the extractor.
    pub fn with_extractor(mut self, extractor: SlideExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Set the slide validator.
    pub fn with_validator(mut self, validator: SlideValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Number of image searches to run at once.
    pub fn with_image_concurrency(mut self, concurrency: usize) -> Self {
        self.image_concurrency = concurrency;
        self
    }

    /// Generate the slide list for `request`.
    ///
    /// The returned slides are validated, numbered 1..n and fully settled
    /// (no pending image queries).
    pub fn generate(&self, request: &GenerationRequest) -> Result<Vec<SlideRecord>> {
        log::info!(
            "Generating {} slides on '{}'",
            request.slide_count,
            request.topic
        );

        let output = self.model.generate(request)?;
        let (raw_slides, images) = match self.extractor.extract(&output) {
            Ok(extraction) if !extraction.slides.is_empty() => {
                (extraction.slides, extraction.resolved_images)
            }
            Ok(extraction) => {
                let cause = Error::parse(
                    "agent run ended without a slide list",
                    output.diagnostic_text(),
                );
                self.retry_with_fallback(request, extraction.resolved_images, cause)?
            }
            Err(e @ Error::Parse { .. }) => self.retry_with_fallback(request, Vec::new(), e)?,
            Err(e) => return Err(e),
        };

        let mut slides = self.validator.validate_slides(&raw_slides)?;
        if slides.len() > request.slide_count {
            log::info!(
                "Model returned {} slides, keeping the first {}",
                slides.len(),
                request.slide_count
            );
            slides.truncate(request.slide_count);
        } else if slides.len() < request.slide_count {
            log::warn!(
                "Asked for {} slides, got {}",
                request.slide_count,
                slides.len()
            );
        }

        if !images.is_empty() {
            let applied = apply_positional_images(&mut slides, &images);
            log::info!("Reused {} tool-fetched images by position", applied);
        }

        Ok(self.settle_images(slides))
    }

    fn retry_with_fallback(
        &self,
        request: &GenerationRequest,
        images: Vec<Option<String>>,
        cause: Error,
    ) -> Result<(Vec<RawSlide>, Vec<Option<String>>)> {
        let Some(fallback) = self.fallback else {
            return Err(cause);
        };
        log::warn!("{}; retrying with a direct completion", cause);

        let output = fallback.generate(request)?;
        let extraction = self.extractor.extract(&output)?;
        if extraction.slides.is_empty() {
            return Err(cause);
        }
        Ok((extraction.slides, images))
    }

    fn settle_images(&self, slides: Vec<SlideRecord>) -> Vec<SlideRecord> {
        match self.search {
            Some(search) => ImageResolver::new(search)
                .with_concurrency(self.image_concurrency)
                .resolve(slides),
            None => slides
                .into_iter()
                .map(|mut slide| {
                    if slide.is_pending() {
                        log::debug!("Slide {}: no image search configured", slide.index);
                        slide.settle(None);
                    }
                    slide
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SearchError;
    use crate::types::{ConversationTrace, Role, TraceMessage};
    use std::cell::Cell;

    struct ScriptedModel {
        output: std::result::Result<RawOutput, String>,
        calls: Cell<usize>,
    }

    impl ScriptedModel {
        fn text(text: &str) -> Self {
            Self {
                output: Ok(RawOutput::Text(text.to_string())),
                calls: Cell::new(0),
            }
        }

        fn trace(messages: Vec<TraceMessage>) -> Self {
            Self {
                output: Ok(RawOutput::Trace(ConversationTrace::from(messages))),
                calls: Cell::new(0),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                output: Err(message.to_string()),
                calls: Cell::new(0),
            }
        }
    }

    impl LanguageModel for ScriptedModel {
        fn generate(&self, _request: &GenerationRequest) -> Result<RawOutput> {
            self.calls.set(self.calls.get() + 1);
            self.output.clone().map_err(Error::Model)
        }
    }

    struct EchoSearch;

    impl ImageSearch for EchoSearch {
        fn search(&self, query: &str) -> std::result::Result<Option<String>, SearchError> {
            if query == "broken" {
                return Err(SearchError::Status(503));
            }
            Ok(Some(format!("https://img.example/{}.jpg", query.replace(' ', "-"))))
        }
    }

    const THREE_SLIDES: &str = r#"```json
[
  {"slide_number": 5, "title": "Intro", "content": "What it is. Why it matters.", "image_query": "lake"},
  {"slide_number": 2, "title": "Body", "content": ["a", "b"], "img_query": "broken"},
  {"slide_number": 2, "title": "End", "bullets": ["c"], "imageQuery": "sun rise"}
]
```"#;

    #[test]
    fn test_extract_text_and_trace() {
        let text = RawOutput::Text("[{\"title\": \"A\"}]".to_string());
        assert_eq!(extract(&text).unwrap().slides.len(), 1);

        let trace = RawOutput::Trace(ConversationTrace::from(vec![TraceMessage::new(
            Role::Ai,
            "{\"title\": \"B\"}",
        )]));
        assert_eq!(extract(&trace).unwrap().slides[0]["title"], "B");
    }

    #[test]
    fn test_end_to_end_with_image_isolation() {
        let model = ScriptedModel::text(THREE_SLIDES);
        let search = EchoSearch;
        let slides = DeckPipeline::new(&model)
            .with_image_search(&search)
            .generate(&GenerationRequest::new("Lakes", 3))
            .unwrap();

        let indices: Vec<usize> = slides.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(slides[0].bullets, vec!["What it is", "Why it matters"]);
        assert_eq!(slides[0].image_url(), Some("https://img.example/lake.jpg"));
        assert_eq!(slides[1].image_url(), None);
        assert!(!slides[1].is_pending());
        assert_eq!(slides[2].image_url(), Some("https://img.example/sun-rise.jpg"));
    }

    #[test]
    fn test_without_search_every_slide_is_settled() {
        let model = ScriptedModel::text(THREE_SLIDES);
        let slides = DeckPipeline::new(&model)
            .generate(&GenerationRequest::new("Lakes", 3))
            .unwrap();
        assert!(slides.iter().all(|s| !s.is_pending() && s.image_url().is_none()));
    }

    #[test]
    fn test_extra_slides_are_truncated() {
        let model = ScriptedModel::text(THREE_SLIDES);
        let slides = DeckPipeline::new(&model)
            .generate(&GenerationRequest::new("Lakes", 2))
            .unwrap();
        assert_eq!(slides.len(), 2);
        assert_eq!(slides[1].title, "Body");
    }

    #[test]
    fn test_model_failure_is_not_a_parse_error() {
        let model = ScriptedModel::failing("timed out after 15s");
        let fallback = ScriptedModel::text(THREE_SLIDES);
        let err = DeckPipeline::new(&model)
            .with_fallback(&fallback)
            .generate(&GenerationRequest::new("Lakes", 3))
            .unwrap_err();
        assert!(matches!(err, Error::Model(_)));
        assert_eq!(fallback.calls.get(), 0);
    }

    #[test]
    fn test_parse_failure_without_fallback_keeps_raw_output() {
        let model = ScriptedModel::text("{\"error\": \"rate limited\"}");
        let err = DeckPipeline::new(&model)
            .generate(&GenerationRequest::new("Lakes", 3))
            .unwrap_err();
        assert_eq!(err.raw_output(), Some("{\"error\": \"rate limited\"}"));
    }

    #[test]
    fn test_parse_failure_uses_fallback() {
        let model = ScriptedModel::text("I could not produce JSON, sorry.");
        let fallback = ScriptedModel::text(THREE_SLIDES);
        let slides = DeckPipeline::new(&model)
            .with_fallback(&fallback)
            .generate(&GenerationRequest::new("Lakes", 3))
            .unwrap();
        assert_eq!(slides.len(), 3);
        assert_eq!(model.calls.get(), 1);
        assert_eq!(fallback.calls.get(), 1);
    }

    #[test]
    fn test_tool_only_trace_reuses_images_positionally() {
        let model = ScriptedModel::trace(vec![
            TraceMessage::new(Role::Human, "Make slides"),
            TraceMessage::new(Role::Ai, ""),
            TraceMessage::tool_result("c1", "https://img/agent-1.jpg"),
            TraceMessage::tool_result("c2", "None"),
        ]);
        let fallback = ScriptedModel::text(THREE_SLIDES);
        let search = EchoSearch;
        let slides = DeckPipeline::new(&model)
            .with_fallback(&fallback)
            .with_image_search(&search)
            .generate(&GenerationRequest::new("Lakes", 3))
            .unwrap();

        assert_eq!(slides[0].image_url(), Some("https://img/agent-1.jpg"));
        // No tool URL for slide 2, so its own (failing) query was tried.
        assert_eq!(slides[1].image_url(), None);
        assert_eq!(slides[2].image_url(), Some("https://img.example/sun-rise.jpg"));
    }

    #[test]
    fn test_tool_only_trace_without_fallback_fails() {
        let model = ScriptedModel::trace(vec![TraceMessage::tool_result(
            "c1",
            "https://img/agent-1.jpg",
        )]);
        let err = DeckPipeline::new(&model)
            .generate(&GenerationRequest::new("Lakes", 3))
            .unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_all_slides_invalid_is_validation_error() {
        let model = ScriptedModel::text("[{\"title\": \"\", \"content\": [\"a\"]}]");
        let err = DeckPipeline::new(&model)
            .generate(&GenerationRequest::new("Lakes", 1))
            .unwrap_err();
        assert!(matches!(err, Error::Validation { slide: 1, .. }));
    }
}
