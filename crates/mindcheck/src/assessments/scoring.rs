//! Pure scoring over a session's answers. No I/O, no side effects.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::catalog::{CatalogEntry, ScoringMethod};
use super::domain::{ChoiceId, QuestionId};

/// Score breakdown for one set of answers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScoreSheet {
    pub total: i32,
    pub per_question: BTreeMap<QuestionId, i32>,
    pub subscales: BTreeMap<String, i32>,
}

/// Score the recorded answers against a catalog entry.
///
/// Answers referencing questions or choices outside the entry are skipped; the session
/// state machine rejects them at record time so this only matters for hand-built input.
pub fn score(answers: &BTreeMap<QuestionId, ChoiceId>, entry: &CatalogEntry) -> ScoreSheet {
    let mut sheet = ScoreSheet::default();
    let mut weighted: i64 = 0;

    for (question_id, choice_id) in answers {
        let Some(question) = entry.question(*question_id) else {
            continue;
        };
        let Some(choice) = question.choice(*choice_id) else {
            continue;
        };

        let value = choice.score_value;
        sheet.per_question.insert(*question_id, value);
        weighted += i64::from(value) * i64::from(question.weight());

        if let Some(subscale) = &question.subscale {
            *sheet.subscales.entry(subscale.clone()).or_insert(0) += value;
        }
    }

    let sum: i64 = sheet.per_question.values().map(|value| i64::from(*value)).sum();
    let count = sheet.per_question.len() as i64;

    let total = match entry.scoring_method {
        ScoringMethod::Sum => sum,
        ScoringMethod::Average => round_half_away_from_zero(sum, count),
        ScoringMethod::Weighted => weighted,
    };
    sheet.total = clamp_i32(total);
    sheet
}

/// Integer division rounding halves away from zero: 3/2 → 2, 5/4 → 1, -3/2 → -2.
/// A zero denominator yields 0.
pub fn round_half_away_from_zero(numerator: i64, denominator: i64) -> i64 {
    if denominator == 0 {
        return 0;
    }
    let negative = (numerator < 0) != (denominator < 0);
    let (n, d) = (numerator.unsigned_abs(), denominator.unsigned_abs());
    let magnitude = ((2 * n + d) / (2 * d)) as i64;
    if negative {
        -magnitude
    } else {
        magnitude
    }
}

fn clamp_i32(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}
