//! Network collaborators for deck generation: an OpenAI-compatible chat
//! model (plain completion or image-tool agent), Unsplash image search, and
//! image download for the renderer.

pub mod fetch;
pub mod openai;
pub mod unsplash;

pub use fetch::HttpImageFetcher;
pub use openai::{ChatClient, ChatConfig, CompletionModel, ImageToolAgent};
pub use unsplash::UnsplashSearch;
