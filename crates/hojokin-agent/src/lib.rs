pub mod drafting;
pub mod gemini;
pub mod prompt;
pub mod provider;
pub mod retry;
pub mod router;

pub use drafting::{DraftError, DraftGenerator};
pub use gemini::GeminiProvider;
pub use prompt::PromptBuilder;
pub use provider::{ChatRequest, ChatResponse, LlmProvider, Message, ProviderError, Role};
pub use retry::RetryPolicy;
pub use router::{ProviderRouter, ProviderSlot};
