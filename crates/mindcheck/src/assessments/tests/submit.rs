use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use super::common::*;
use crate::assessments::catalog::{ScoringMethod, SeverityBand};
use crate::assessments::domain::{FollowUpTimeframe, QuestionId, SessionStatus};
use crate::assessments::error::AssessmentError;
use crate::assessments::guidance::{GuidanceConfig, Tier, UnmappedLabelPolicy};
use crate::assessments::memory::{InMemorySessionRepository, StaticCatalog};
use crate::assessments::repository::SessionRepository;
use crate::assessments::{AssessmentService, EngineSettings, MAX_PENDING_LOOKUPS};

fn short_timeout() -> EngineSettings {
    EngineSettings {
        resource_lookup_timeout: Duration::from_millis(50),
        ..EngineSettings::default()
    }
}

#[test]
fn mild_submission_scores_and_skips_resources() {
    let resources = Arc::new(FixedResources::new(crisis_lines()));
    let (service, repository) = service_with(resources.clone());
    let session = answered(&service, "MINI3", &[2, 3, 1]);

    let result = service.submit(&session.id).expect("submits");

    assert_eq!(result.total_score, 6);
    assert_eq!(result.severity_label, "mild");
    assert_eq!(result.tier, Tier::Medium);
    assert!(!result.follow_up_recommended);
    assert!(result.follow_up_timeframe.is_none());
    assert!(result.resources.is_empty());
    assert!(!result.resource_lookup_failed);
    assert_eq!(resources.calls(), 0);
    assert_eq!(result.raw_scores[&QuestionId(1)], 2);
    assert_eq!(result.raw_scores[&QuestionId(2)], 3);
    assert_eq!(result.raw_scores[&QuestionId(3)], 1);

    let stored = repository
        .fetch(&session.id)
        .expect("fetch succeeds")
        .expect("session stored");
    assert_eq!(stored.status, SessionStatus::Completed);
    assert_eq!(stored.total_score, Some(6));
    assert_eq!(stored.severity_label.as_deref(), Some("mild"));
    assert_eq!(stored.completed_at, Some(result.generated_at));
    assert!(stored.elapsed().is_some_and(|elapsed| elapsed >= chrono::Duration::zero()));
}

#[test]
fn maximum_mini_score_lands_in_top_band() {
    let service = service();
    let session = answered(&service, "MINI3", &[3, 3, 3]);
    let result = service.submit(&session.id).expect("submits");
    assert_eq!(result.total_score, 9);
    assert_eq!(result.severity_label, "mild");
}

#[test]
fn submitting_without_answers_scores_zero() {
    let service = service();
    let session = service.open(&code("MINI3"), anonymous()).expect("opens");

    let result = service.submit(&session.id).expect("submits");

    assert_eq!(result.total_score, 0);
    assert_eq!(result.severity_label, "minimal");
    assert_eq!(result.tier, Tier::Low);
    assert!(result.raw_scores.is_empty());
}

#[test]
fn partial_submission_scores_what_was_answered() {
    let service = service();
    let session = answered(&service, "PAIR", &[3]);
    assert_eq!(
        service.completion_percentage(&session.id).expect("computes"),
        50.0
    );

    let result = service.submit(&session.id).expect("submits");
    assert_eq!(result.total_score, 3);
    assert_eq!(result.severity_label, "mild");
}

#[test]
fn severe_results_attach_capped_crisis_resources() {
    let resources = Arc::new(FixedResources::new(crisis_lines()));
    let (service, _) = service_with(resources.clone());
    let session = answered(&service, "PHQ9", &[3; 9]);

    let result = service.submit(&session.id).expect("submits");

    assert_eq!(result.total_score, 27);
    assert_eq!(result.severity_label, "Severe");
    assert_eq!(result.tier, Tier::Critical);
    assert!(result.follow_up_recommended);
    assert_eq!(result.follow_up_timeframe, Some(FollowUpTimeframe::Immediately));
    assert_eq!(result.resources.len(), 3);
    assert_eq!(result.resources[0].name, "Lifeline");
    assert!(!result.resource_lookup_failed);
    assert_eq!(resources.calls(), 1);
    assert_eq!(
        *resources.requested_limits.lock().expect("limits mutex"),
        vec![(3, true)]
    );
}

#[test]
fn moderate_results_suggest_follow_up_within_a_week() {
    let service = service();
    // 3 + 3 + 3 + 1 = 10
    let session = answered(&service, "PHQ9", &[3, 3, 3, 1, 0, 0, 0, 0, 0]);

    let result = service.submit(&session.id).expect("submits");

    assert_eq!(result.severity_label, "Moderate");
    assert_eq!(result.tier, Tier::High);
    assert_eq!(result.follow_up_timeframe, Some(FollowUpTimeframe::WithinWeek));
    assert!(!result.resources.is_empty());
}

#[test]
fn configured_limit_caps_resources() {
    let resources = Arc::new(FixedResources::new(crisis_lines()));
    let service = AssessmentService::new(
        Arc::new(catalog()),
        Arc::new(InMemorySessionRepository::default()),
        resources.clone(),
        GuidanceConfig::default(),
        EngineSettings {
            resource_limit: 1,
            ..EngineSettings::default()
        },
    );
    let session = answered(&service, "PHQ9", &[3; 9]);

    let result = service.submit(&session.id).expect("submits");
    assert_eq!(result.resources.len(), 1);
    assert_eq!(
        *resources.requested_limits.lock().expect("limits mutex"),
        vec![(1, true)]
    );
}

#[test]
fn second_submission_is_rejected_and_result_is_unchanged() {
    let service = service();
    let session = answered(&service, "MINI3", &[2, 3, 1]);
    let first = service.submit(&session.id).expect("submits");

    match service.submit(&session.id) {
        Err(AssessmentError::AlreadyCompleted(id)) => assert_eq!(id, session.id),
        other => panic!("expected already completed, got {other:?}"),
    }
    assert_eq!(service.result(&session.id).expect("result stored"), first);
}

#[test]
fn answers_after_completion_are_rejected() {
    let service = service();
    let session = answered(&service, "MINI3", &[1, 1, 1]);
    service.submit(&session.id).expect("submits");

    assert!(matches!(
        service.record_answer(&session.id, QuestionId(1), choice_id(1, 3)),
        Err(AssessmentError::InvalidTransition {
            status: SessionStatus::Completed,
            ..
        })
    ));
    assert!(matches!(
        service.abandon(&session.id),
        Err(AssessmentError::InvalidTransition { .. })
    ));
}

#[test]
fn last_written_answer_is_scored() {
    let service = service();
    let session = answered(&service, "MINI3", &[0, 0, 0]);
    service
        .record_answer(&session.id, QuestionId(2), choice_id(2, 3))
        .expect("overwrites");

    let result = service.submit(&session.id).expect("submits");
    assert_eq!(result.total_score, 3);
    assert_eq!(result.raw_scores[&QuestionId(2)], 3);
}

#[test]
fn failing_resource_provider_degrades_result() {
    let (service, _) = service_with(Arc::new(FailingResources));
    let session = answered(&service, "PHQ9", &[3; 9]);

    let result = service.submit(&session.id).expect("still completes");

    assert_eq!(result.tier, Tier::Critical);
    assert!(result.resources.is_empty());
    assert!(result.resource_lookup_failed);
    assert!(result.follow_up_recommended);
}

#[test]
fn slow_resource_provider_times_out() {
    let service = AssessmentService::new(
        Arc::new(catalog()),
        Arc::new(InMemorySessionRepository::default()),
        Arc::new(SlowResources(Duration::from_millis(500))),
        GuidanceConfig::default(),
        short_timeout(),
    );
    let session = answered(&service, "PHQ9", &[3; 9]);

    let result = service.submit(&session.id).expect("still completes");

    assert!(result.resources.is_empty());
    assert!(result.resource_lookup_failed);
    assert_eq!(
        service.session(&session.id).expect("stored").status,
        SessionStatus::Completed
    );
}

#[test]
fn failed_completion_write_leaves_session_open() {
    let repository = Arc::new(FlakyRepository::default());
    let service = AssessmentService::new(
        Arc::new(catalog()),
        repository.clone(),
        Arc::new(FixedResources::new(crisis_lines())),
        GuidanceConfig::default(),
        EngineSettings::default(),
    );
    let session = service.open(&code("MINI3"), anonymous()).expect("opens");
    for question in 1..=3 {
        service
            .record_answer(&session.id, QuestionId(question), choice_id(question, 2))
            .expect("records");
    }

    repository.fail_complete.store(true, Ordering::SeqCst);
    assert!(matches!(
        service.submit(&session.id),
        Err(AssessmentError::Repository(_))
    ));

    let stored = service.session(&session.id).expect("stored");
    assert_eq!(stored.status, SessionStatus::InProgress);
    assert!(stored.completed_at.is_none());
    assert!(stored.total_score.is_none());
    assert!(matches!(
        service.result(&session.id),
        Err(AssessmentError::NotFound(_))
    ));

    repository.fail_complete.store(false, Ordering::SeqCst);
    let result = service.submit(&session.id).expect("retry succeeds");
    assert_eq!(result.total_score, 6);
}

#[test]
fn unmapped_band_label_rolls_back_under_reject_policy() {
    let catalog = StaticCatalog::default().with_assessment(
        questionnaire("ODD", 2, ScoringMethod::Sum),
        vec![
            SeverityBand::new(0, 2, "minimal"),
            SeverityBand::new(3, 6, "elevated"),
        ],
    );
    let service = AssessmentService::new(
        Arc::new(catalog.clone()),
        Arc::new(InMemorySessionRepository::default()),
        Arc::new(FixedResources::default()),
        GuidanceConfig::default(),
        EngineSettings::default(),
    );
    let session = service.open(&code("ODD"), anonymous()).expect("opens");
    service
        .record_answer(&session.id, QuestionId(1), choice_id(1, 3))
        .expect("records");

    assert!(matches!(
        service.submit(&session.id),
        Err(AssessmentError::InvalidDefinition(_))
    ));
    assert_eq!(
        service.session(&session.id).expect("stored").status,
        SessionStatus::InProgress
    );

    let lenient = AssessmentService::new(
        Arc::new(catalog),
        Arc::new(InMemorySessionRepository::default()),
        Arc::new(FixedResources::default()),
        GuidanceConfig {
            unmapped: UnmappedLabelPolicy::FallbackToMinimal,
            ..GuidanceConfig::default()
        },
        EngineSettings::default(),
    );
    let session = lenient.open(&code("ODD"), anonymous()).expect("opens");
    lenient
        .record_answer(&session.id, QuestionId(1), choice_id(1, 3))
        .expect("records");
    let result = lenient.submit(&session.id).expect("falls back");
    assert_eq!(result.severity_label, "elevated");
    assert_eq!(result.tier, Tier::Low);
}

#[test]
fn concurrent_submissions_produce_one_result() {
    let service = service();
    let session = answered(&service, "MINI3", &[2, 2, 2]);
    let service = Arc::new(service);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let service = Arc::clone(&service);
            let id = session.id;
            std::thread::spawn(move || service.submit(&id))
        })
        .collect();
    let outcomes: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("submit thread"))
        .collect();

    let completed = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    let rejected = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, Err(AssessmentError::AlreadyCompleted(_))))
        .count();
    assert_eq!(completed, 1);
    assert_eq!(rejected, 3);
}

#[test]
fn stalled_lookups_are_capped() {
    let provider = Arc::new(StalledResources::new(Duration::from_secs(2)));
    let service = AssessmentService::new(
        Arc::new(catalog()),
        Arc::new(InMemorySessionRepository::default()),
        provider.clone(),
        GuidanceConfig::default(),
        EngineSettings {
            resource_lookup_timeout: Duration::from_millis(5),
            ..EngineSettings::default()
        },
    );

    for _ in 0..MAX_PENDING_LOOKUPS + 3 {
        let session = answered(&service, "PHQ9", &[3; 9]);
        let result = service.submit(&session.id).expect("still completes");
        assert!(result.resource_lookup_failed);
    }

    // Workers may still be starting up when their caller gives up.
    let deadline = std::time::Instant::now() + Duration::from_secs(1);
    while provider.calls() < MAX_PENDING_LOOKUPS && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(provider.calls(), MAX_PENDING_LOOKUPS);
    assert_eq!(service.locked_sessions(), 0);
}
