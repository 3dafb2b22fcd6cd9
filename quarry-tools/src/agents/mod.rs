//! LLM-backed stage collaborators.
//!
//! Every stage sends one or more system + user prompts through an
//! [`LlmClient`] and reads the reply through the parse-or-default contract:
//! a reply that does not parse degrades to the stage's own default value,
//! while a failed call is reported so the controller can degrade instead.
//!
//! [`LlmClient`]: crate::llm::LlmClient

pub mod edit;
pub mod expand;
pub mod gaps;
pub mod summarize;
pub mod verify;
pub mod write;

pub use edit::{LlmEditor, readability_score};
pub use expand::LlmExpander;
pub use gaps::LlmGapAnalyzer;
pub use summarize::LlmSummarizer;
pub use verify::LlmFactChecker;
pub use write::LlmWriter;
