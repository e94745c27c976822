pub mod analysis;
pub mod provider;
pub mod providers;

pub use analysis::{parse_issues, AiIssue, IssueAnalyzer};
pub use provider::{LlmError, LlmProvider, Message, Role};
pub use providers::genai::GenAiProvider;
