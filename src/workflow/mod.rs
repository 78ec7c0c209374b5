pub mod classify;
pub mod orchestrator;
pub mod publish;
pub mod recommend;
pub mod types;

pub use classify::ClassificationStage;
pub use orchestrator::WorkflowOrchestrator;
pub use recommend::RecommendationStage;
pub use types::{Stage, TriageOutcome};
