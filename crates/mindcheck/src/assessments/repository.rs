use super::domain::{AssessmentResult, AssessmentSession, SessionId};

/// Storage abstraction so the service can be exercised in isolation.
pub trait SessionRepository: Send + Sync {
    fn insert(&self, session: AssessmentSession) -> Result<AssessmentSession, RepositoryError>;
    fn update(&self, session: AssessmentSession) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &SessionId) -> Result<Option<AssessmentSession>, RepositoryError>;
    /// Persist a completed session together with its result as one unit of work.
    ///
    /// Implementations must fail with `Conflict` when the stored session is already
    /// terminal or already has a result, writing nothing in that case.
    fn complete(
        &self,
        session: AssessmentSession,
        result: AssessmentResult,
    ) -> Result<AssessmentResult, RepositoryError>;
    fn result(&self, id: &SessionId) -> Result<Option<AssessmentResult>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
