use super::catalog::CatalogError;
use super::domain::{ChoiceId, QuestionId, SessionId, SessionStatus};
use super::repository::RepositoryError;

/// Failures surfaced by the assessment engine. Every variant aborts the requested
/// operation and leaves stored state untouched.
#[derive(Debug, thiserror::Error)]
pub enum AssessmentError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid assessment definition: {0}")]
    InvalidDefinition(String),
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),
    #[error("cannot {action} a session that is {status}")]
    InvalidTransition {
        status: SessionStatus,
        action: &'static str,
    },
    #[error("session {0} has already been completed")]
    AlreadyCompleted(SessionId),
    #[error("question {0} does not belong to this assessment")]
    UnknownQuestion(QuestionId),
    #[error("choice {choice} does not belong to question {question}")]
    UnknownChoice {
        question: QuestionId,
        choice: ChoiceId,
    },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Emergency resource lookup failure. Recovered locally during submission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourceError {
    #[error("resource provider unavailable: {0}")]
    Unavailable(String),
    #[error("resource lookup timed out after {0} ms")]
    Timeout(u128),
}
