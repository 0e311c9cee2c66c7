use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::domain::{AssessmentCode, ChoiceId, QuestionId};
use super::error::AssessmentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMethod {
    Sum,
    Average,
    Weighted,
}

/// Published definition of a questionnaire, including inactive questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentType {
    pub code: AssessmentCode,
    pub name: String,
    pub max_score: u32,
    pub scoring_method: ScoringMethod,
    pub is_active: bool,
    pub requires_login: bool,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    /// 1-based position, unique and contiguous within the assessment type.
    pub order: u32,
    pub text: String,
    pub is_required: bool,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscale: Option<String>,
    pub choices: Vec<AnswerChoice>,
}

impl Question {
    /// Multiplier under weighted scoring; unset weights count once.
    pub fn weight(&self) -> u32 {
        self.weight.unwrap_or(1)
    }

    pub fn choice(&self, id: ChoiceId) -> Option<&AnswerChoice> {
        self.choices.iter().find(|choice| choice.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerChoice {
    pub id: ChoiceId,
    pub text: String,
    pub score_value: i32,
    pub order: u32,
    pub is_active: bool,
}

/// Closed score interval `[min_score, max_score]` mapped to a severity label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityBand {
    pub min_score: i32,
    pub max_score: i32,
    pub label: String,
}

impl SeverityBand {
    pub fn new(min_score: i32, max_score: i32, label: impl Into<String>) -> Self {
        Self {
            min_score,
            max_score,
            label: label.into(),
        }
    }

    pub fn contains(&self, score: i32) -> bool {
        self.min_score <= score && score <= self.max_score
    }
}

/// Source of assessment definitions, typically backed by the host's persistence layer.
pub trait CatalogProvider: Send + Sync {
    fn assessment_type(&self, code: &AssessmentCode)
        -> Result<Option<AssessmentType>, CatalogError>;
    fn severity_bands(&self, code: &AssessmentCode) -> Result<Vec<SeverityBand>, CatalogError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Validated, scoring-ready view of one assessment type: active questions in order,
/// each with its active choices in order, plus the ordered band table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub code: AssessmentCode,
    pub name: String,
    pub max_score: u32,
    pub scoring_method: ScoringMethod,
    pub requires_login: bool,
    pub questions: Vec<Question>,
    pub bands: Vec<SeverityBand>,
}

impl CatalogEntry {
    pub fn from_definition(
        definition: AssessmentType,
        bands: Vec<SeverityBand>,
    ) -> Result<Self, AssessmentError> {
        let code = definition.code.clone();
        if !definition.is_active {
            return Err(AssessmentError::NotFound(format!("assessment {code}")));
        }

        check_question_orders(&code, &definition.questions)?;

        let mut seen_ids = BTreeSet::new();
        let mut questions = Vec::new();
        for mut question in definition.questions {
            if !seen_ids.insert(question.id) {
                return Err(invalid(&code, format!("duplicate question id {}", question.id)));
            }
            if !question.is_active {
                continue;
            }

            let mut orders = BTreeSet::new();
            if let Some(duplicate) = question.choices.iter().find(|c| !orders.insert(c.order)) {
                return Err(invalid(
                    &code,
                    format!(
                        "question {} repeats choice order {}",
                        question.id, duplicate.order
                    ),
                ));
            }

            question.choices.retain(|choice| choice.is_active);
            if question.choices.is_empty() {
                return Err(invalid(
                    &code,
                    format!("question {} has no active choices", question.id),
                ));
            }
            question.choices.sort_by_key(|choice| choice.order);
            questions.push(question);
        }

        if questions.is_empty() {
            return Err(invalid(&code, "no active questions".to_string()));
        }
        questions.sort_by_key(|question| question.order);

        let bands = check_bands(&code, definition.max_score, bands)?;

        Ok(Self {
            code,
            name: definition.name,
            max_score: definition.max_score,
            scoring_method: definition.scoring_method,
            requires_login: definition.requires_login,
            questions,
            bands,
        })
    }

    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|question| question.id == id)
    }

    /// Resolve an answer pair, rejecting ids outside this assessment.
    pub fn choice(
        &self,
        question: QuestionId,
        choice: ChoiceId,
    ) -> Result<&AnswerChoice, AssessmentError> {
        self.question(question)
            .ok_or(AssessmentError::UnknownQuestion(question))?
            .choice(choice)
            .ok_or(AssessmentError::UnknownChoice { question, choice })
    }

    pub fn required_question_count(&self) -> usize {
        self.questions.iter().filter(|q| q.is_required).count()
    }

    /// First band whose closed interval contains `score`.
    pub fn band_for(&self, score: i32) -> Option<&SeverityBand> {
        self.bands.iter().find(|band| band.contains(score))
    }
}

/// Loads catalog entries from a provider and enforces definition integrity.
pub struct Catalog<P> {
    provider: Arc<P>,
}

impl<P> Catalog<P>
where
    P: CatalogProvider + 'static,
{
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    pub fn entry(&self, code: &AssessmentCode) -> Result<CatalogEntry, AssessmentError> {
        let definition = self
            .provider
            .assessment_type(code)?
            .ok_or_else(|| AssessmentError::NotFound(format!("assessment {code}")))?;
        let bands = self.provider.severity_bands(code)?;
        CatalogEntry::from_definition(definition, bands)
    }
}

fn invalid(code: &AssessmentCode, detail: String) -> AssessmentError {
    AssessmentError::InvalidDefinition(format!("{code}: {detail}"))
}

fn check_question_orders(
    code: &AssessmentCode,
    questions: &[Question],
) -> Result<(), AssessmentError> {
    let mut orders: Vec<u32> = questions.iter().map(|question| question.order).collect();
    orders.sort_unstable();
    for (expected, actual) in (1u32..).zip(orders.iter().copied()) {
        if expected != actual {
            return Err(invalid(
                code,
                format!("question orders must be unique and contiguous from 1, found {actual} at position {expected}"),
            ));
        }
    }
    Ok(())
}

/// Bands must not overlap. A score is therefore matched by at most one band, and a
/// definition that would need first-match resolution is rejected at load time, before
/// any session can be opened against it.
fn check_bands(
    code: &AssessmentCode,
    max_score: u32,
    mut bands: Vec<SeverityBand>,
) -> Result<Vec<SeverityBand>, AssessmentError> {
    if let Some(band) = bands.iter().find(|band| band.min_score > band.max_score) {
        return Err(invalid(
            code,
            format!(
                "band '{}' has min {} above max {}",
                band.label, band.min_score, band.max_score
            ),
        ));
    }

    bands.sort_by_key(|band| band.min_score);
    for pair in bands.windows(2) {
        if pair[1].min_score <= pair[0].max_score {
            return Err(invalid(
                code,
                format!("bands '{}' and '{}' overlap", pair[0].label, pair[1].label),
            ));
        }
    }

    let mut cursor: i64 = 0;
    for band in &bands {
        if i64::from(band.min_score) > cursor && cursor <= i64::from(max_score) {
            warn!(
                assessment = %code,
                gap_start = cursor,
                gap_end = i64::from(band.min_score) - 1,
                "severity bands leave a gap; scores inside it resolve to Unknown"
            );
        }
        cursor = cursor.max(i64::from(band.max_score) + 1);
    }
    if cursor <= i64::from(max_score) {
        warn!(
            assessment = %code,
            gap_start = cursor,
            gap_end = max_score,
            "severity bands do not reach the maximum score"
        );
    }

    Ok(bands)
}
