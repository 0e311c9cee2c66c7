use crate::infra::{build_service, ApiService};
use chrono::Utc;
use clap::Args;
use mindcheck::assessments::{AssessmentCode, AssessmentResult, Identity};
use mindcheck::config::EngineConfig;
use mindcheck::error::AppError;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Assessment code from the seeded catalog (PHQ9 or GAD7)
    #[arg(long, default_value = "PHQ9")]
    pub(crate) assessment: String,
    /// Comma-separated score values, one per question in display order
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub(crate) answers: Vec<i32>,
    /// Take the assessment as this authenticated user instead of anonymously
    #[arg(long)]
    pub(crate) user: Option<String>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let service = build_service(&EngineConfig::default());
    let result = run_scripted_session(&service, &args)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Open a session, answer questions in order by score value, and submit.
pub(crate) fn run_scripted_session(
    service: &ApiService,
    args: &DemoArgs,
) -> Result<AssessmentResult, AppError> {
    let code = AssessmentCode(args.assessment.trim().to_ascii_uppercase());
    let entry = service.catalog_entry(&code)?;
    if args.answers.len() > entry.questions.len() {
        return Err(AppError::InvalidInput(format!(
            "{code} has {} questions but {} answers were supplied",
            entry.questions.len(),
            args.answers.len()
        )));
    }

    let identity = Identity::from_context(
        args.user.clone(),
        Some(format!("demo-{}", Utc::now().timestamp_millis())),
    )?;
    let session = service.open(&code, identity)?;
    eprintln!("Opened {} session {} ({})", code, session.id, entry.name);

    for (question, score) in entry.questions.iter().zip(&args.answers) {
        let choice = question
            .choices
            .iter()
            .find(|choice| choice.score_value == *score)
            .ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "question {} has no choice scored {score}",
                    question.order
                ))
            })?;
        service.record_answer(&session.id, question.id, choice.id)?;
        eprintln!("  Q{} {} -> {}", question.order, question.text, choice.text);
    }

    let progress = service.progress(&session.id)?;
    eprintln!(
        "Submitting at {:.1}% completion ({}/{} answered)",
        progress.completion_percentage, progress.questions_answered, progress.total_questions
    );

    Ok(service.submit(&session.id)?)
}
