pub mod anthropic;
pub mod openai_compat;
pub mod prompt_tools;
pub mod registry;
pub mod traits;
pub(crate) mod util;

// Re-exports for convenience.
pub use prompt_tools::PromptToolProvider;
pub use registry::build_provider;
pub use traits::{ChatRequest, ChatResponse, LlmProvider};
