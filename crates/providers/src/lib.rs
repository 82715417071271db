//! LLM Provider implementations for Steward.
//!
//! All providers implement the `steward_core::Provider` trait. Provider
//! profiles map a name or alias to an endpoint, default model and key
//! environment variables.

pub mod openai_compat;
pub mod profiles;

pub use openai_compat::OpenAiCompatProvider;
pub use profiles::{KeyDiagnostics, ProviderProfile, ResolvedProvider, build_provider, normalize_provider};
