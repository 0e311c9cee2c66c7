use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::catalog::{Catalog, CatalogEntry, CatalogProvider};
use super::domain::{
    AssessmentCode, AssessmentResult, AssessmentSession, ChoiceId, Identity, ProgressView,
    QuestionId, ResourceSummary, SessionId, SessionStatus,
};
use super::error::{AssessmentError, ResourceError};
use super::guidance::{GuidanceConfig, GuidanceResolver};
use super::repository::{RepositoryError, SessionRepository};
use super::resources::ResourceProvider;
use super::scoring;

/// Upper bound on emergency resources attached to a single result.
pub const MAX_ATTACHED_RESOURCES: usize = 3;

/// Lookup workers that may still be running inside the provider after their caller
/// timed out. Beyond this, submissions skip the lookup and report it as failed.
pub const MAX_PENDING_LOOKUPS: usize = 8;

/// Runtime knobs for result assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub resource_lookup_timeout: Duration,
    pub resource_limit: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            resource_lookup_timeout: Duration::from_millis(2_000),
            resource_limit: MAX_ATTACHED_RESOURCES,
        }
    }
}

/// Per-session mutexes so answer recording, abandonment and submission never interleave
/// on the same session id. Entries live only while a caller holds or waits on them.
#[derive(Default)]
struct SessionLocks {
    handles: Mutex<HashMap<SessionId, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    fn with_lock<T>(
        &self,
        id: &SessionId,
        work: impl FnOnce() -> Result<T, AssessmentError>,
    ) -> Result<T, AssessmentError> {
        let handle = {
            let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(handles.entry(*id).or_default())
        };
        let outcome = {
            let _guard = handle.lock().unwrap_or_else(PoisonError::into_inner);
            work()
        };
        self.release(id, handle);
        outcome
    }

    fn release(&self, id: &SessionId, handle: Arc<Mutex<()>>) {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        drop(handle);
        // Only the registry's own reference left: nobody else is waiting.
        if handles
            .get(id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            handles.remove(id);
        }
    }

    fn len(&self) -> usize {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Decrements the pending-lookup counter when a lookup worker finishes, even by panic.
struct PendingLookup(Arc<AtomicUsize>);

impl Drop for PendingLookup {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Service composing the catalog, session repository, resource provider and guidance table.
pub struct AssessmentService<C, R, P> {
    catalog: Catalog<C>,
    repository: Arc<R>,
    resources: Arc<P>,
    resolver: GuidanceResolver,
    settings: EngineSettings,
    locks: SessionLocks,
    pending_lookups: Arc<AtomicUsize>,
}

impl<C, R, P> AssessmentService<C, R, P>
where
    C: CatalogProvider + 'static,
    R: SessionRepository + 'static,
    P: ResourceProvider + 'static,
{
    pub fn new(
        catalog: Arc<C>,
        repository: Arc<R>,
        resources: Arc<P>,
        guidance: GuidanceConfig,
        settings: EngineSettings,
    ) -> Self {
        Self {
            catalog: Catalog::new(catalog),
            repository,
            resources,
            resolver: GuidanceResolver::new(guidance),
            settings,
            locks: SessionLocks::default(),
            pending_lookups: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Active questions and choices for an assessment, in display order.
    pub fn catalog_entry(&self, code: &AssessmentCode) -> Result<CatalogEntry, AssessmentError> {
        self.catalog.entry(code)
    }

    /// Open a new session in `started`.
    pub fn open(
        &self,
        code: &AssessmentCode,
        identity: Identity,
    ) -> Result<AssessmentSession, AssessmentError> {
        let entry = self.catalog.entry(code)?;
        if entry.requires_login && !identity.is_authenticated() {
            return Err(AssessmentError::InvalidIdentity(format!(
                "{code} requires an authenticated user"
            )));
        }

        let session = AssessmentSession::new(entry.code, identity, Utc::now());
        let stored = self.repository.insert(session)?;
        info!(
            session_id = %stored.id,
            assessment = %stored.assessment,
            authenticated = stored.identity.is_authenticated(),
            "assessment session opened"
        );
        Ok(stored)
    }

    /// Record (or overwrite) the answer for one question.
    pub fn record_answer(
        &self,
        id: &SessionId,
        question: QuestionId,
        choice: ChoiceId,
    ) -> Result<AssessmentSession, AssessmentError> {
        self.locks.with_lock(id, || {
            let mut session = self.load(id)?;
            session.ensure_open("record_answer")?;
            let entry = self.catalog.entry(&session.assessment)?;
            entry.choice(question, choice)?;

            let previous = session.record(question, choice)?;
            self.repository.update(session.clone())?;
            debug!(
                session_id = %id,
                question = %question,
                choice = %choice,
                overwritten = previous.is_some(),
                "answer recorded"
            );
            Ok(session)
        })
    }

    /// Move a non-terminal session to `abandoned`. No result is produced.
    pub fn abandon(&self, id: &SessionId) -> Result<AssessmentSession, AssessmentError> {
        self.locks.with_lock(id, || {
            let mut session = self.load(id)?;
            session.abandon()?;
            self.repository.update(session.clone())?;
            info!(session_id = %id, "assessment session abandoned");
            Ok(session)
        })
    }

    pub fn completion_percentage(&self, id: &SessionId) -> Result<f64, AssessmentError> {
        let session = self.load(id)?;
        let entry = self.catalog.entry(&session.assessment)?;
        Ok(completion_percentage(&session, &entry))
    }

    pub fn progress(&self, id: &SessionId) -> Result<ProgressView, AssessmentError> {
        let session = self.load(id)?;
        let entry = self.catalog.entry(&session.assessment)?;
        let questions_answered = entry
            .questions
            .iter()
            .filter(|question| session.answers.contains_key(&question.id))
            .count();

        Ok(ProgressView {
            session_id: session.id,
            completion_percentage: completion_percentage(&session, &entry),
            questions_answered,
            total_questions: entry.questions.len(),
            status: session.status,
            total_score: session.total_score,
            severity_label: session.severity_label.clone(),
            assessment: session.assessment,
        })
    }

    /// Score, classify and finalize a session, producing its one and only result.
    ///
    /// Partial submissions are scored on whatever was answered. The session and result are
    /// written together; any failure leaves the stored session as it was.
    pub fn submit(&self, id: &SessionId) -> Result<AssessmentResult, AssessmentError> {
        self.locks.with_lock(id, || self.finalize(id))
    }

    fn finalize(&self, id: &SessionId) -> Result<AssessmentResult, AssessmentError> {
        let mut session = self.load(id)?;
        if session.status == SessionStatus::Completed {
            return Err(AssessmentError::AlreadyCompleted(*id));
        }
        session.ensure_open("submit")?;

        let entry = self.catalog.entry(&session.assessment)?;
        let completion = completion_percentage(&session, &entry);
        if completion < 100.0 {
            info!(session_id = %id, completion, "submitting partially answered session");
        }

        let completed_at = Utc::now();
        session.completed_at = Some(completed_at);
        session.status = SessionStatus::Completed;

        let sheet = scoring::score(&session.answers, &entry);
        let outcome = self.resolver.resolve(&entry, sheet.total)?;
        session.total_score = Some(sheet.total);
        session.severity_label = Some(outcome.label.clone());

        let (resources, resource_lookup_failed) = if outcome.tier.requires_resources() {
            match self.lookup_resources() {
                Ok(resources) => (resources, false),
                Err(err) => {
                    warn!(session_id = %id, error = %err, "emergency resource lookup failed; result will omit resources");
                    (Vec::new(), true)
                }
            }
        } else {
            (Vec::new(), false)
        };

        let result = AssessmentResult {
            session_id: session.id,
            total_score: sheet.total,
            severity_label: outcome.label,
            tier: outcome.tier,
            raw_scores: sheet.per_question,
            subscale_scores: sheet.subscales,
            recommendations: outcome.recommendations,
            resources,
            resource_lookup_failed,
            follow_up_recommended: outcome.tier.requires_resources(),
            follow_up_timeframe: outcome.tier.follow_up_timeframe(),
            generated_at: completed_at,
        };

        let stored = self
            .repository
            .complete(session, result)
            .map_err(|err| match err {
                RepositoryError::Conflict => AssessmentError::AlreadyCompleted(*id),
                other => AssessmentError::Repository(other),
            })?;

        info!(
            session_id = %id,
            total_score = stored.total_score,
            severity = %stored.severity_label,
            tier = %stored.tier,
            resources = stored.resources.len(),
            "assessment session completed"
        );
        Ok(stored)
    }

    pub fn session(&self, id: &SessionId) -> Result<AssessmentSession, AssessmentError> {
        self.load(id)
    }

    /// The result of a completed session.
    pub fn result(&self, id: &SessionId) -> Result<AssessmentResult, AssessmentError> {
        self.repository
            .result(id)?
            .ok_or_else(|| AssessmentError::NotFound(format!("result for session {id}")))
    }

    /// Session ids currently holding a slot in the lock registry.
    pub fn locked_sessions(&self) -> usize {
        self.locks.len()
    }

    fn load(&self, id: &SessionId) -> Result<AssessmentSession, AssessmentError> {
        self.repository
            .fetch(id)?
            .ok_or_else(|| AssessmentError::NotFound(format!("session {id}")))
    }

    /// Ask the provider for crisis resources, giving up after the configured timeout.
    fn lookup_resources(&self) -> Result<Vec<ResourceSummary>, ResourceError> {
        let provider = Arc::clone(&self.resources);
        let limit = self.settings.resource_limit.min(MAX_ATTACHED_RESOURCES);
        let timeout = self.settings.resource_lookup_timeout;

        if self.pending_lookups.fetch_add(1, Ordering::AcqRel) >= MAX_PENDING_LOOKUPS {
            self.pending_lookups.fetch_sub(1, Ordering::AcqRel);
            return Err(ResourceError::Unavailable(format!(
                "{MAX_PENDING_LOOKUPS} earlier lookups have not returned"
            )));
        }
        let pending = PendingLookup(Arc::clone(&self.pending_lookups));

        let (sender, receiver) = mpsc::channel();
        thread::Builder::new()
            .name("resource-lookup".to_string())
            .spawn(move || {
                let _pending = pending;
                // The receiver may have timed out already.
                let _ = sender.send(provider.emergency_resources(limit, true));
            })
            .map_err(|err| ResourceError::Unavailable(err.to_string()))?;

        match receiver.recv_timeout(timeout) {
            Ok(Ok(mut resources)) => {
                resources.truncate(limit);
                Ok(resources)
            }
            Ok(Err(err)) => Err(err),
            Err(RecvTimeoutError::Timeout) => Err(ResourceError::Timeout(timeout.as_millis())),
            Err(RecvTimeoutError::Disconnected) => Err(ResourceError::Unavailable(
                "resource lookup worker exited without a response".to_string(),
            )),
        }
    }
}

/// Share of required questions answered, as a percentage rounded to one decimal.
/// Returns `0.0` when the assessment has no required questions.
pub fn completion_percentage(session: &AssessmentSession, entry: &CatalogEntry) -> f64 {
    let required = entry.required_question_count();
    if required == 0 {
        return 0.0;
    }
    let answered = entry
        .questions
        .iter()
        .filter(|question| question.is_required && session.answers.contains_key(&question.id))
        .count();

    ((answered as f64 * 1000.0) / required as f64).round() / 10.0
}
