mod backend;
mod capability;
mod claude;
mod ollama;
mod summarizer;
mod tagger;

#[cfg(test)]
pub mod testing;

pub use backend::{Backend, LanguageModel};
pub use capability::{Capability, CapabilityState};
pub use summarizer::Summarizer;
pub use tagger::TagExtractor;
