use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::catalog::CatalogProvider;
use super::domain::{AssessmentCode, AssessmentSession, ChoiceId, Identity, QuestionId, SessionId};
use super::error::AssessmentError;
use super::repository::SessionRepository;
use super::resources::ResourceProvider;
use super::service::AssessmentService;

type SharedService<C, R, P> = Arc<AssessmentService<C, R, P>>;

/// Router builder exposing session lifecycle endpoints.
pub fn assessment_router<C, R, P>(service: SharedService<C, R, P>) -> Router
where
    C: CatalogProvider + 'static,
    R: SessionRepository + 'static,
    P: ResourceProvider + 'static,
{
    Router::new()
        .route("/api/v1/assessments/:code", get(catalog_handler::<C, R, P>))
        .route(
            "/api/v1/assessments/:code/sessions",
            post(open_handler::<C, R, P>),
        )
        .route(
            "/api/v1/sessions/:session_id/answers",
            put(answer_handler::<C, R, P>),
        )
        .route(
            "/api/v1/sessions/:session_id/submit",
            post(submit_handler::<C, R, P>),
        )
        .route(
            "/api/v1/sessions/:session_id/abandon",
            post(abandon_handler::<C, R, P>),
        )
        .route(
            "/api/v1/sessions/:session_id/progress",
            get(progress_handler::<C, R, P>),
        )
        .route(
            "/api/v1/sessions/:session_id/result",
            get(result_handler::<C, R, P>),
        )
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
pub struct OpenSessionRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub question_id: QuestionId,
    pub choice_id: ChoiceId,
}

/// Public view of a freshly opened session. Identity values are not echoed back.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: SessionId,
    pub assessment: AssessmentCode,
    pub status: &'static str,
    pub identity_mode: &'static str,
    pub started_at: DateTime<Utc>,
}

impl From<&AssessmentSession> for SessionView {
    fn from(session: &AssessmentSession) -> Self {
        Self {
            session_id: session.id,
            assessment: session.assessment.clone(),
            status: session.status.label(),
            identity_mode: match session.identity {
                Identity::Authenticated(_) => "authenticated",
                Identity::Anonymous(_) => "anonymous",
            },
            started_at: session.started_at,
        }
    }
}

fn parse_session_id(raw: &str) -> Result<SessionId, AssessmentError> {
    Uuid::parse_str(raw)
        .map(SessionId)
        .map_err(|_| AssessmentError::NotFound(format!("session {raw}")))
}

/// Run a session mutation on the blocking pool. Mutations wait on the per-session lock,
/// which a submission holds for as long as its resource lookup takes.
async fn run_locked<T, F>(work: F) -> Response
where
    F: FnOnce() -> Result<T, AssessmentError> + Send + 'static,
    T: Serialize + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(Ok(body)) => (StatusCode::OK, Json(body)).into_response(),
        Ok(Err(err)) => err.into_response(),
        Err(join_error) => {
            let payload = json!({ "error": join_error.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

pub(crate) async fn catalog_handler<C, R, P>(
    State(service): State<SharedService<C, R, P>>,
    Path(code): Path<String>,
) -> Response
where
    C: CatalogProvider + 'static,
    R: SessionRepository + 'static,
    P: ResourceProvider + 'static,
{
    match service.catalog_entry(&AssessmentCode(code)) {
        Ok(entry) => (StatusCode::OK, Json(entry)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn open_handler<C, R, P>(
    State(service): State<SharedService<C, R, P>>,
    Path(code): Path<String>,
    Json(request): Json<OpenSessionRequest>,
) -> Response
where
    C: CatalogProvider + 'static,
    R: SessionRepository + 'static,
    P: ResourceProvider + 'static,
{
    let opened = Identity::from_context(request.user_id, request.session_key)
        .and_then(|identity| service.open(&AssessmentCode(code), identity));
    match opened {
        Ok(session) => (StatusCode::CREATED, Json(SessionView::from(&session))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn answer_handler<C, R, P>(
    State(service): State<SharedService<C, R, P>>,
    Path(session_id): Path<String>,
    Json(request): Json<AnswerRequest>,
) -> Response
where
    C: CatalogProvider + 'static,
    R: SessionRepository + 'static,
    P: ResourceProvider + 'static,
{
    let id = match parse_session_id(&session_id) {
        Ok(id) => id,
        Err(err) => return err.into_response(),
    };

    run_locked(move || {
        service.record_answer(&id, request.question_id, request.choice_id)?;
        service.progress(&id)
    })
    .await
}

pub(crate) async fn submit_handler<C, R, P>(
    State(service): State<SharedService<C, R, P>>,
    Path(session_id): Path<String>,
) -> Response
where
    C: CatalogProvider + 'static,
    R: SessionRepository + 'static,
    P: ResourceProvider + 'static,
{
    let id = match parse_session_id(&session_id) {
        Ok(id) => id,
        Err(err) => return err.into_response(),
    };

    run_locked(move || service.submit(&id)).await
}

pub(crate) async fn abandon_handler<C, R, P>(
    State(service): State<SharedService<C, R, P>>,
    Path(session_id): Path<String>,
) -> Response
where
    C: CatalogProvider + 'static,
    R: SessionRepository + 'static,
    P: ResourceProvider + 'static,
{
    let id = match parse_session_id(&session_id) {
        Ok(id) => id,
        Err(err) => return err.into_response(),
    };

    run_locked(move || {
        service.abandon(&id)?;
        service.progress(&id)
    })
    .await
}

pub(crate) async fn progress_handler<C, R, P>(
    State(service): State<SharedService<C, R, P>>,
    Path(session_id): Path<String>,
) -> Response
where
    C: CatalogProvider + 'static,
    R: SessionRepository + 'static,
    P: ResourceProvider + 'static,
{
    match parse_session_id(&session_id).and_then(|id| service.progress(&id)) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn result_handler<C, R, P>(
    State(service): State<SharedService<C, R, P>>,
    Path(session_id): Path<String>,
) -> Response
where
    C: CatalogProvider + 'static,
    R: SessionRepository + 'static,
    P: ResourceProvider + 'static,
{
    match parse_session_id(&session_id).and_then(|id| service.result(&id)) {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err) => err.into_response(),
    }
}

impl AssessmentError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AssessmentError::NotFound(_) => StatusCode::NOT_FOUND,
            AssessmentError::InvalidIdentity(_) => StatusCode::UNAUTHORIZED,
            AssessmentError::InvalidTransition { .. } | AssessmentError::AlreadyCompleted(_) => {
                StatusCode::CONFLICT
            }
            AssessmentError::UnknownQuestion(_) | AssessmentError::UnknownChoice { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AssessmentError::InvalidDefinition(_)
            | AssessmentError::Catalog(_)
            | AssessmentError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AssessmentError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.to_string() });
        (self.status_code(), Json(payload)).into_response()
    }
}
