use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::AssessmentError;
use super::guidance::Tier;

/// Short code identifying an assessment type (e.g. `PHQ9`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssessmentCode(pub String);

impl fmt::Display for AssessmentCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QuestionId(pub u32);

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChoiceId(pub u32);

impl fmt::Display for ChoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier wrapper for assessment sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who is taking the assessment. Exactly one identity mode is captured per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "id", rename_all = "snake_case")]
pub enum Identity {
    Authenticated(String),
    Anonymous(String),
}

impl Identity {
    /// Build an identity from host-supplied context. An authenticated id takes precedence
    /// over an anonymous correlation key; blank values are treated as absent.
    pub fn from_context(
        user_id: Option<String>,
        session_key: Option<String>,
    ) -> Result<Self, AssessmentError> {
        let present = |value: Option<String>| {
            value
                .map(|raw| raw.trim().to_string())
                .filter(|trimmed| !trimmed.is_empty())
        };

        if let Some(user_id) = present(user_id) {
            return Ok(Self::Authenticated(user_id));
        }
        if let Some(key) = present(session_key) {
            return Ok(Self::Anonymous(key));
        }
        Err(AssessmentError::InvalidIdentity(
            "either an authenticated user id or an anonymous session key is required".to_string(),
        ))
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Started,
    InProgress,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One person's attempt at one assessment type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentSession {
    pub id: SessionId,
    pub assessment: AssessmentCode,
    pub identity: Identity,
    pub status: SessionStatus,
    pub answers: BTreeMap<QuestionId, ChoiceId>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_score: Option<i32>,
    pub severity_label: Option<String>,
}

impl AssessmentSession {
    pub fn new(assessment: AssessmentCode, identity: Identity, started_at: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::generate(),
            assessment,
            identity,
            status: SessionStatus::Started,
            answers: BTreeMap::new(),
            started_at,
            completed_at: None,
            total_score: None,
            severity_label: None,
        }
    }

    /// Time between opening and completion; `None` until completed.
    pub fn elapsed(&self) -> Option<Duration> {
        self.completed_at.map(|completed| completed - self.started_at)
    }

    pub(crate) fn ensure_open(&self, action: &'static str) -> Result<(), AssessmentError> {
        if self.status.is_terminal() {
            return Err(AssessmentError::InvalidTransition {
                status: self.status,
                action,
            });
        }
        Ok(())
    }

    /// Record or overwrite the answer for a question, advancing `started` to `in_progress`.
    pub(crate) fn record(
        &mut self,
        question: QuestionId,
        choice: ChoiceId,
    ) -> Result<Option<ChoiceId>, AssessmentError> {
        self.ensure_open("record_answer")?;
        let previous = self.answers.insert(question, choice);
        if self.status == SessionStatus::Started {
            self.status = SessionStatus::InProgress;
        }
        Ok(previous)
    }

    pub(crate) fn abandon(&mut self) -> Result<(), AssessmentError> {
        self.ensure_open("abandon")?;
        self.status = SessionStatus::Abandoned;
        Ok(())
    }
}

/// When a follow-up with a professional is suggested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FollowUpTimeframe {
    #[serde(rename = "immediately")]
    Immediately,
    #[serde(rename = "within_24h")]
    Within24h,
    #[serde(rename = "within_week")]
    WithinWeek,
    #[serde(rename = "within_month")]
    WithinMonth,
}

impl FollowUpTimeframe {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Immediately => "immediately",
            Self::Within24h => "within_24h",
            Self::WithinWeek => "within_week",
            Self::WithinMonth => "within_month",
        }
    }
}

/// Contact card for an emergency resource attached to a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub name: String,
    pub contact: String,
    pub availability: String,
}

/// Immutable scored-and-classified outcome of a completed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentResult {
    pub session_id: SessionId,
    pub total_score: i32,
    pub severity_label: String,
    pub tier: Tier,
    pub raw_scores: BTreeMap<QuestionId, i32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub subscale_scores: BTreeMap<String, i32>,
    pub recommendations: Vec<String>,
    pub resources: Vec<ResourceSummary>,
    pub resource_lookup_failed: bool,
    pub follow_up_recommended: bool,
    pub follow_up_timeframe: Option<FollowUpTimeframe>,
    pub generated_at: DateTime<Utc>,
}

/// Snapshot of a session's progress for polling clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressView {
    pub session_id: SessionId,
    pub assessment: AssessmentCode,
    pub status: SessionStatus,
    pub completion_percentage: f64,
    pub questions_answered: usize,
    pub total_questions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_score: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity_label: Option<String>,
}
