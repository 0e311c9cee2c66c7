use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::assessments::catalog::{AnswerChoice, AssessmentType, Question, ScoringMethod, SeverityBand};
use crate::assessments::domain::{
    AssessmentCode, AssessmentResult, AssessmentSession, ChoiceId, Identity, QuestionId,
    ResourceSummary, SessionId,
};
use crate::assessments::error::ResourceError;
use crate::assessments::memory::{InMemorySessionRepository, StaticCatalog};
use crate::assessments::repository::{RepositoryError, SessionRepository};
use crate::assessments::resources::ResourceProvider;
use crate::assessments::{AssessmentService, EngineSettings, GuidanceConfig};

pub(super) fn code(raw: &str) -> AssessmentCode {
    AssessmentCode(raw.to_string())
}

/// Choice ids encode their question and score so fixtures stay readable.
pub(super) fn choice_id(question: u32, score: i32) -> ChoiceId {
    ChoiceId(question * 10 + score as u32)
}

pub(super) fn frequency_question(id: u32, order: u32) -> Question {
    Question {
        id: QuestionId(id),
        order,
        text: format!("Question {order}"),
        is_required: true,
        is_active: true,
        weight: None,
        subscale: None,
        choices: ["Not at all", "Several days", "More than half the days", "Nearly every day"]
            .iter()
            .enumerate()
            .map(|(index, text)| AnswerChoice {
                id: choice_id(id, index as i32),
                text: text.to_string(),
                score_value: index as i32,
                order: index as u32 + 1,
                is_active: true,
            })
            .collect(),
    }
}

pub(super) fn questionnaire(raw_code: &str, questions: u32, method: ScoringMethod) -> AssessmentType {
    AssessmentType {
        code: code(raw_code),
        name: format!("{raw_code} questionnaire"),
        max_score: questions * 3,
        scoring_method: method,
        is_active: true,
        requires_login: false,
        questions: (1..=questions)
            .map(|order| frequency_question(order, order))
            .collect(),
    }
}

/// Three questions scored 0-3 with minimal and mild bands.
pub(super) fn mini_bands() -> Vec<SeverityBand> {
    vec![
        SeverityBand::new(0, 4, "minimal"),
        SeverityBand::new(5, 9, "mild"),
    ]
}

pub(super) fn phq9_bands() -> Vec<SeverityBand> {
    vec![
        SeverityBand::new(0, 4, "Minimal"),
        SeverityBand::new(5, 9, "Mild"),
        SeverityBand::new(10, 14, "Moderate"),
        SeverityBand::new(15, 19, "Moderately Severe"),
        SeverityBand::new(20, 27, "Severe"),
    ]
}

pub(super) fn pair_bands() -> Vec<SeverityBand> {
    vec![
        SeverityBand::new(0, 2, "minimal"),
        SeverityBand::new(3, 6, "mild"),
    ]
}

pub(super) fn catalog() -> StaticCatalog {
    let mut locked = questionnaire("LOCKED", 2, ScoringMethod::Sum);
    locked.requires_login = true;

    let mut retired = questionnaire("RETIRED", 2, ScoringMethod::Sum);
    retired.is_active = false;

    StaticCatalog::default()
        .with_assessment(questionnaire("MINI3", 3, ScoringMethod::Sum), mini_bands())
        .with_assessment(questionnaire("PHQ9", 9, ScoringMethod::Sum), phq9_bands())
        .with_assessment(questionnaire("PAIR", 2, ScoringMethod::Sum), pair_bands())
        .with_assessment(questionnaire("AVG4", 4, ScoringMethod::Average), mini_bands())
        .with_assessment(locked, pair_bands())
        .with_assessment(retired, pair_bands())
}

pub(super) fn crisis_lines() -> Vec<ResourceSummary> {
    ["Lifeline", "Text Line", "Veterans Line", "Overflow Line"]
        .iter()
        .map(|name| ResourceSummary {
            name: name.to_string(),
            contact: format!("{name} contact"),
            availability: "24/7".to_string(),
        })
        .collect()
}

/// Resource provider returning a fixed list and counting lookups.
#[derive(Default)]
pub(super) struct FixedResources {
    pub(super) resources: Vec<ResourceSummary>,
    pub(super) calls: AtomicUsize,
    pub(super) requested_limits: Mutex<Vec<(usize, bool)>>,
}

impl FixedResources {
    pub(super) fn new(resources: Vec<ResourceSummary>) -> Self {
        Self {
            resources,
            ..Self::default()
        }
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ResourceProvider for FixedResources {
    fn emergency_resources(
        &self,
        limit: usize,
        crisis_only: bool,
    ) -> Result<Vec<ResourceSummary>, ResourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested_limits
            .lock()
            .expect("limits mutex poisoned")
            .push((limit, crisis_only));
        // Deliberately ignores the limit so the service cap is exercised.
        Ok(self.resources.clone())
    }
}

pub(super) struct FailingResources;

impl ResourceProvider for FailingResources {
    fn emergency_resources(
        &self,
        _limit: usize,
        _crisis_only: bool,
    ) -> Result<Vec<ResourceSummary>, ResourceError> {
        Err(ResourceError::Unavailable("directory offline".to_string()))
    }
}

pub(super) struct SlowResources(pub(super) Duration);

impl ResourceProvider for SlowResources {
    fn emergency_resources(
        &self,
        _limit: usize,
        _crisis_only: bool,
    ) -> Result<Vec<ResourceSummary>, ResourceError> {
        thread::sleep(self.0);
        Ok(crisis_lines())
    }
}

/// Provider that sleeps before answering and counts how many lookups reached it.
pub(super) struct StalledResources {
    delay: Duration,
    calls: AtomicUsize,
}

impl StalledResources {
    pub(super) fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ResourceProvider for StalledResources {
    fn emergency_resources(
        &self,
        _limit: usize,
        _crisis_only: bool,
    ) -> Result<Vec<ResourceSummary>, ResourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        Ok(crisis_lines())
    }
}

/// Repository that can be told to fail the final completion write.
#[derive(Default)]
pub(super) struct FlakyRepository {
    pub(super) inner: InMemorySessionRepository,
    pub(super) fail_complete: AtomicBool,
}

impl SessionRepository for FlakyRepository {
    fn insert(&self, session: AssessmentSession) -> Result<AssessmentSession, RepositoryError> {
        self.inner.insert(session)
    }

    fn update(&self, session: AssessmentSession) -> Result<(), RepositoryError> {
        self.inner.update(session)
    }

    fn fetch(&self, id: &SessionId) -> Result<Option<AssessmentSession>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn complete(
        &self,
        session: AssessmentSession,
        result: AssessmentResult,
    ) -> Result<AssessmentResult, RepositoryError> {
        if self.fail_complete.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("write timed out".to_string()));
        }
        self.inner.complete(session, result)
    }

    fn result(&self, id: &SessionId) -> Result<Option<AssessmentResult>, RepositoryError> {
        self.inner.result(id)
    }
}

pub(super) type MemoryService<P> = AssessmentService<StaticCatalog, InMemorySessionRepository, P>;

pub(super) fn service_with<P>(resources: Arc<P>) -> (MemoryService<P>, Arc<InMemorySessionRepository>)
where
    P: ResourceProvider + 'static,
{
    let repository = Arc::new(InMemorySessionRepository::default());
    let service = AssessmentService::new(
        Arc::new(catalog()),
        repository.clone(),
        resources,
        GuidanceConfig::default(),
        EngineSettings::default(),
    );
    (service, repository)
}

pub(super) fn service() -> MemoryService<FixedResources> {
    service_with(Arc::new(FixedResources::new(crisis_lines()))).0
}

pub(super) fn anonymous() -> Identity {
    Identity::Anonymous("browser-session-1".to_string())
}

/// Open a session and answer questions `1..` with the given scores.
pub(super) fn answered<P>(
    service: &MemoryService<P>,
    raw_code: &str,
    scores: &[i32],
) -> AssessmentSession
where
    P: ResourceProvider + 'static,
{
    let session = service
        .open(&code(raw_code), anonymous())
        .expect("session opens");
    let mut latest = session;
    for (index, score) in scores.iter().enumerate() {
        let question = index as u32 + 1;
        latest = service
            .record_answer(&latest.id, QuestionId(question), choice_id(question, *score))
            .expect("answer recorded");
    }
    latest
}
