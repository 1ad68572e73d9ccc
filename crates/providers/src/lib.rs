//! Language-model provider implementations for Touchline.
//!
//! All providers implement the `touchline_core::Provider` trait.
//! [`build_from_config`] selects the correct one based on configuration.

pub mod gemini;
pub mod openai_compat;
pub mod router;

pub use gemini::GeminiProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{UnconfiguredProvider, build_from_config};
