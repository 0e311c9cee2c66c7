//! In-process adapters for the catalog, session, and resource seams. Suitable for demos,
//! tests, and single-node deployments that keep state in memory.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use super::catalog::{AssessmentType, CatalogError, CatalogProvider, SeverityBand};
use super::domain::{AssessmentCode, AssessmentResult, AssessmentSession, ResourceSummary, SessionId};
use super::error::ResourceError;
use super::repository::{RepositoryError, SessionRepository};
use super::resources::{select_emergency_resources, EmergencyResource, ResourceProvider};

/// Fixed set of assessment definitions keyed by short code.
#[derive(Debug, Default, Clone)]
pub struct StaticCatalog {
    definitions: BTreeMap<AssessmentCode, (AssessmentType, Vec<SeverityBand>)>,
}

impl StaticCatalog {
    pub fn with_assessment(mut self, definition: AssessmentType, bands: Vec<SeverityBand>) -> Self {
        self.definitions
            .insert(definition.code.clone(), (definition, bands));
        self
    }

    pub fn codes(&self) -> Vec<AssessmentCode> {
        self.definitions.keys().cloned().collect()
    }
}

impl CatalogProvider for StaticCatalog {
    fn assessment_type(
        &self,
        code: &AssessmentCode,
    ) -> Result<Option<AssessmentType>, CatalogError> {
        Ok(self
            .definitions
            .get(code)
            .map(|(definition, _)| definition.clone()))
    }

    fn severity_bands(&self, code: &AssessmentCode) -> Result<Vec<SeverityBand>, CatalogError> {
        Ok(self
            .definitions
            .get(code)
            .map(|(_, bands)| bands.clone())
            .unwrap_or_default())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    sessions: HashMap<SessionId, AssessmentSession>,
    results: HashMap<SessionId, AssessmentResult>,
}

/// Sessions and results behind a single mutex so `complete` is atomic.
#[derive(Debug, Default, Clone)]
pub struct InMemorySessionRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemorySessionRepository {
    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("session store mutex poisoned".to_string()))
    }

    pub fn sessions(&self) -> Result<Vec<AssessmentSession>, RepositoryError> {
        let mut sessions: Vec<_> = self.state()?.sessions.values().cloned().collect();
        sessions.sort_by_key(|session| session.started_at);
        Ok(sessions)
    }
}

impl SessionRepository for InMemorySessionRepository {
    fn insert(&self, session: AssessmentSession) -> Result<AssessmentSession, RepositoryError> {
        let mut state = self.state()?;
        if state.sessions.contains_key(&session.id) {
            return Err(RepositoryError::Conflict);
        }
        state.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    fn update(&self, session: AssessmentSession) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        match state.sessions.get_mut(&session.id) {
            Some(stored) => {
                *stored = session;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch(&self, id: &SessionId) -> Result<Option<AssessmentSession>, RepositoryError> {
        Ok(self.state()?.sessions.get(id).cloned())
    }

    fn complete(
        &self,
        session: AssessmentSession,
        result: AssessmentResult,
    ) -> Result<AssessmentResult, RepositoryError> {
        let mut state = self.state()?;
        let stored = state
            .sessions
            .get(&session.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.status.is_terminal() || state.results.contains_key(&session.id) {
            return Err(RepositoryError::Conflict);
        }
        state.results.insert(session.id, result.clone());
        state.sessions.insert(session.id, session);
        Ok(result)
    }

    fn result(&self, id: &SessionId) -> Result<Option<AssessmentResult>, RepositoryError> {
        Ok(self.state()?.results.get(id).cloned())
    }
}

/// Resource provider over a fixed directory of records.
#[derive(Debug, Default, Clone)]
pub struct ResourceDirectory {
    records: Vec<EmergencyResource>,
}

impl ResourceDirectory {
    pub fn new(records: Vec<EmergencyResource>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[EmergencyResource] {
        &self.records
    }
}

impl ResourceProvider for ResourceDirectory {
    fn emergency_resources(
        &self,
        limit: usize,
        crisis_only: bool,
    ) -> Result<Vec<ResourceSummary>, ResourceError> {
        Ok(select_emergency_resources(&self.records, limit, crisis_only))
    }
}
