pub mod code;
pub mod correlation;
pub mod llm;
pub mod prompt;
pub mod reviewer;
pub mod types;

pub use code::{CodeAgent, LlmCodeAgent};
pub use reviewer::{LlmReviewerAgent, ReviewerAgent, ReviewerSettings};
