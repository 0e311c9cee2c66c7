use metrics_exporter_prometheus::PrometheusHandle;
use mindcheck::assessments::{
    AnswerChoice, AssessmentCode, AssessmentService, AssessmentType, ChoiceId, EmergencyResource,
    InMemorySessionRepository, Question, QuestionId, ResourceDirectory, ScoringMethod,
    SeverityBand, StaticCatalog,
};
use mindcheck::config::EngineConfig;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub(crate) type ApiService =
    AssessmentService<StaticCatalog, InMemorySessionRepository, ResourceDirectory>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

const FREQUENCY_SCALE: [(&str, i32); 4] = [
    ("Not at all", 0),
    ("Several days", 1),
    ("More than half the days", 2),
    ("Nearly every day", 3),
];

const PHQ9_ITEMS: [&str; 9] = [
    "Little interest or pleasure in doing things",
    "Feeling down, depressed, or hopeless",
    "Trouble falling or staying asleep, or sleeping too much",
    "Feeling tired or having little energy",
    "Poor appetite or overeating",
    "Feeling bad about yourself, or that you are a failure or have let yourself or your family down",
    "Trouble concentrating on things, such as reading the newspaper or watching television",
    "Moving or speaking so slowly that other people could have noticed, or being so fidgety or restless that you have been moving around a lot more than usual",
    "Thoughts that you would be better off dead or of hurting yourself in some way",
];

const GAD7_ITEMS: [&str; 7] = [
    "Feeling nervous, anxious or on edge",
    "Not being able to stop or control worrying",
    "Worrying too much about different things",
    "Trouble relaxing",
    "Being so restless that it is hard to sit still",
    "Becoming easily annoyed or irritable",
    "Feeling afraid as if something awful might happen",
];

/// Frequency-scale questionnaire. Question ids start at `id_base + 1`; choice ids are
/// `question_id * 10 + score`.
fn frequency_questionnaire(code: &str, name: &str, id_base: u32, items: &[&str]) -> AssessmentType {
    let questions = items
        .iter()
        .zip(1u32..)
        .map(|(text, order)| {
            let id = id_base + order;
            Question {
                id: QuestionId(id),
                order,
                text: text.to_string(),
                is_required: true,
                is_active: true,
                weight: None,
                subscale: None,
                choices: FREQUENCY_SCALE
                    .iter()
                    .zip(1u32..)
                    .map(|((label, score), choice_order)| AnswerChoice {
                        id: ChoiceId(id * 10 + *score as u32),
                        text: label.to_string(),
                        score_value: *score,
                        order: choice_order,
                        is_active: true,
                    })
                    .collect(),
            }
        })
        .collect::<Vec<_>>();

    AssessmentType {
        code: AssessmentCode(code.to_string()),
        name: name.to_string(),
        max_score: questions.len() as u32 * 3,
        scoring_method: ScoringMethod::Sum,
        is_active: true,
        requires_login: false,
        questions,
    }
}

/// PHQ-9 and GAD-7 with their published severity bands.
pub(crate) fn standard_catalog() -> StaticCatalog {
    StaticCatalog::default()
        .with_assessment(
            frequency_questionnaire("PHQ9", "Patient Health Questionnaire-9", 100, &PHQ9_ITEMS),
            vec![
                SeverityBand::new(0, 4, "Minimal"),
                SeverityBand::new(5, 9, "Mild"),
                SeverityBand::new(10, 14, "Moderate"),
                SeverityBand::new(15, 19, "Moderately Severe"),
                SeverityBand::new(20, 27, "Severe"),
            ],
        )
        .with_assessment(
            frequency_questionnaire(
                "GAD7",
                "Generalized Anxiety Disorder 7-item",
                200,
                &GAD7_ITEMS,
            ),
            vec![
                SeverityBand::new(0, 4, "Minimal"),
                SeverityBand::new(5, 9, "Mild"),
                SeverityBand::new(10, 14, "Moderate"),
                SeverityBand::new(15, 21, "Severe"),
            ],
        )
}

fn us_resource(
    name: &str,
    contact: &str,
    description: &str,
    availability: &str,
    is_crisis_line: bool,
    priority: u32,
) -> EmergencyResource {
    EmergencyResource {
        name: name.to_string(),
        contact: contact.to_string(),
        description: description.to_string(),
        availability: availability.to_string(),
        country: "US".to_string(),
        is_crisis_line,
        is_active: true,
        priority,
    }
}

pub(crate) fn emergency_directory() -> ResourceDirectory {
    ResourceDirectory::new(vec![
        us_resource(
            "988 Suicide & Crisis Lifeline",
            "988",
            "Free and confidential emotional support for people in suicidal crisis or emotional distress.",
            "24/7",
            true,
            1,
        ),
        us_resource(
            "Crisis Text Line",
            "Text HOME to 741741",
            "Crisis support via text message from trained counselors.",
            "24/7",
            true,
            2,
        ),
        us_resource(
            "SAMHSA National Helpline",
            "1-800-662-4357",
            "Treatment referral and information for mental health and substance use disorders.",
            "24/7",
            false,
            3,
        ),
        us_resource(
            "NAMI HelpLine",
            "1-800-950-6264",
            "Information, resource referrals and support for people affected by mental illness.",
            "Monday-Friday 10am-10pm ET",
            false,
            4,
        ),
        us_resource(
            "Veterans Crisis Line",
            "988 then press 1",
            "Confidential support for veterans in crisis, their families and friends.",
            "24/7",
            true,
            5,
        ),
    ])
}

/// Service over the seeded catalog, an in-memory session store and the resource directory.
pub(crate) fn build_service(engine: &EngineConfig) -> Arc<ApiService> {
    Arc::new(AssessmentService::new(
        Arc::new(standard_catalog()),
        Arc::new(InMemorySessionRepository::default()),
        Arc::new(emergency_directory()),
        engine.guidance(),
        engine.settings(),
    ))
}
