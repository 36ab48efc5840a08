//! Image resolution.
//!
//! Every slide that still carries an image query gets exactly one search
//! attempt. A failed or empty search degrades only that slide to "no image".

use crate::error::SearchError;
use crate::types::SlideRecord;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Upper bound on concurrent image searches per request.
pub const MAX_IMAGE_CONCURRENCY: usize = 8;

/// An image search backend.
///
/// `Ok(None)` means the search ran and found nothing; `Err` means the search
/// itself failed.
pub trait ImageSearch: Send + Sync {
    fn search(&self, query: &str) -> std::result::Result<Option<String>, SearchError>;
}

impl<T: ImageSearch + ?Sized> ImageSearch for Box<T> {
    fn search(&self, query: &str) -> std::result::Result<Option<String>, SearchError> {
        (**self).search(query)
    }
}

/// Downloads image bytes for rendering.
pub trait ImageSource {
    fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, SearchError>;
}

/// Resolves pending image queries on a slide list.
pub struct ImageResolver<'a> {
    search: &'a dyn ImageSearch,
    concurrency: usize,
}

impl<'a> ImageResolver<'a> {
    /// Create a sequential resolver over `search`.
    pub fn new(search: &'a dyn ImageSearch) -> Self {
        Self {
            search,
            concurrency: 1,
        }
    }

    /// Resolve up to `concurrency` slides at a time (capped at
    /// [`MAX_IMAGE_CONCURRENCY`]).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, MAX_IMAGE_CONCURRENCY);
        self
    }

    /// Settle every pending slide and hand the list back.
    ///
    /// Never fails: errors are logged and the slide gets no image. Each slide
    /// only ever receives the result of its own query.
    pub fn resolve(&self, mut slides: Vec<SlideRecord>) -> Vec<SlideRecord> {
        let pending = slides.iter().filter(|s| s.is_pending()).count();
        if pending == 0 {
            return slides;
        }
        log::info!("Resolving images for {} of {} slides", pending, slides.len());

        match self.worker_pool() {
            Some(pool) => pool.install(|| {
                slides
                    .par_iter_mut()
                    .for_each(|slide| self.resolve_one(slide))
            }),
            None => slides.iter_mut().for_each(|slide| self.resolve_one(slide)),
        }

        let resolved = slides.iter().filter(|s| s.image_url().is_some()).count();
        log::info!("Resolved {} images", resolved);
        slides
    }

    /// A dedicated pool sized to the concurrency limit, if it is above one.
    fn worker_pool(&self) -> Option<ThreadPool> {
        if self.concurrency <= 1 {
            return None;
        }
        match ThreadPoolBuilder::new().num_threads(self.concurrency).build() {
            Ok(pool) => Some(pool),
            Err(e) => {
                log::warn!("Falling back to sequential image resolution: {}", e);
                None
            }
        }
    }

    fn resolve_one(&self, slide: &mut SlideRecord) {
        let Some(query) = slide.image_query().map(str::to_string) else {
            return;
        };

        let url = match self.search.search(&query) {
            Ok(Some(url)) if !url.trim().is_empty() => {
                log::debug!("Slide {}: '{}' -> {}", slide.index, query, url);
                Some(url)
            }
            Ok(_) => {
                log::warn!("Slide {}: no image found for '{}'", slide.index, query);
                None
            }
            Err(e) => {
                log::warn!("Slide {}: image search for '{}' failed: {}", slide.index, query, e);
                None
            }
        };

        slide.settle(url);
    }
}

/// Apply tool-produced image URLs to pending slides by position.
///
/// The n-th pending slide receives the n-th URL. Entries without a URL leave
/// their slide pending so the resolver can still try its query. This pairing
/// is a best guess: tool results carry no slide identity. Returns how many
/// slides were settled.
pub fn apply_positional_images(slides: &mut [SlideRecord], images: &[Option<String>]) -> usize {
    let mut applied = 0;
    for (slide, image) in slides
        .iter_mut()
        .filter(|s| s.is_pending())
        .zip(images.iter())
    {
        if let Some(url) = image {
            slide.settle(Some(url.clone()));
            applied += 1;
        }
    }
    applied
}
