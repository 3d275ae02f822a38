//! Decision pipeline: model, maker, validator, tracker, feedback, learning.

pub mod feedback;
pub mod learning;
pub mod maker;
pub mod models;
pub mod pipeline;
pub mod tracker;
pub mod validator;

pub use feedback::{FeedbackEntry, FeedbackFilter, InMemoryFeedbackProcessor};
pub use learning::{InMemoryLearningEngine, LearningData, LearningMetrics, LearningOutcome};
pub use maker::{DecisionConstraints, DecisionOption, InMemoryDecisionMaker};
pub use models::{
    Context, Decision, DecisionConfidence, DecisionFilter, DecisionMetadata, DecisionStatus,
    DecisionType, DeviceInfo,
};
pub use pipeline::DecisionPipeline;
pub use tracker::{DecisionMetrics, InMemoryDecisionTracker};
pub use validator::{RuleBasedValidator, ValidationRule};
