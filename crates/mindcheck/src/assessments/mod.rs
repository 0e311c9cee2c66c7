//! Assessment sessions, scoring, severity classification and result assembly.

pub mod catalog;
pub mod domain;
pub mod error;
pub mod guidance;
pub mod memory;
pub mod repository;
pub mod resources;
pub mod router;
pub mod scoring;
pub mod service;

#[cfg(test)]
mod tests;

pub use catalog::{
    AnswerChoice, AssessmentType, Catalog, CatalogEntry, CatalogError, CatalogProvider, Question,
    ScoringMethod, SeverityBand,
};
pub use domain::{
    AssessmentCode, AssessmentResult, AssessmentSession, ChoiceId, FollowUpTimeframe, Identity,
    ProgressView, QuestionId, ResourceSummary, SessionId, SessionStatus,
};
pub use error::{AssessmentError, ResourceError};
pub use guidance::{
    normalize_label, Guidance, GuidanceConfig, GuidanceResolver, SeverityOutcome, Tier,
    UnmappedLabelPolicy, UNKNOWN_LABEL,
};
pub use memory::{InMemorySessionRepository, ResourceDirectory, StaticCatalog};
pub use repository::{RepositoryError, SessionRepository};
pub use resources::{select_emergency_resources, EmergencyResource, ResourceProvider};
pub use router::assessment_router;
pub use scoring::{score, ScoreSheet};
pub use service::{
    completion_percentage, AssessmentService, EngineSettings, MAX_ATTACHED_RESOURCES,
    MAX_PENDING_LOOKUPS,
};
