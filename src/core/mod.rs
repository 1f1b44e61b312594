pub mod analyzer;
pub mod diff;
pub mod git;
pub mod prompt;
pub mod report;

pub use analyzer::{AnalysisResult, DiffAnalyzer, RetryPolicy, StreamEvent};
pub use git::GitIntegration;
pub use prompt::{PromptBuilder, PromptConfig};
