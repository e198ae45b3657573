pub mod cli;
pub mod config;
pub mod errors;
pub mod feedback;
pub mod generator;
pub mod graph;
pub mod llm;
pub mod scheduler;
pub mod search;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::Config;
pub use errors::{CollaboratorError, GraphError, ResearchError, ValidationError};
pub use feedback::{FeedbackDecision, FeedbackProvider};
pub use generator::context::ResearchContext;
pub use generator::conversation::Conversation;
pub use generator::research::{ResearchOrchestrator, ResearchOutcome, ResearchPhase, run_research};
pub use generator::workflow::launch;
pub use graph::{GraphDocument, GraphStore, ReferenceRegistry};
pub use llm::TextGenerator;
pub use scheduler::{SearchTask, TaskScheduler};
pub use search::WebSearcher;
