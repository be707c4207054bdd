mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{add_question, answer, seeded_store, services, FlakyStore};
use lamad_competency::services::{Membership, ProgressBoard};
use lamad_competency::{CompetencyError, CompetencyStore, ProgressStatus, Redirect, ViewState};

#[tokio::test]
async fn test_ecg_basics_review_scenario() {
    let store = Arc::new(seeded_store());
    let services = services(store.clone());
    let membership = ViewState::new(Membership::new());

    services
        .enrollment
        .enroll(&membership, Some("ada"), "ada", "ecg-basics")
        .await
        .unwrap();
    services.progress.record_answer(Some("ada"), "ecg-q1", false).await.unwrap();

    let record = services.progress.progress_for("ada", "ecg-basics").await.unwrap();
    assert_eq!((record.answered_questions, record.total_questions), (1, 2));
    assert_eq!(record.percent, 50);
    assert_eq!(record.status, ProgressStatus::InProgress);

    let board = ViewState::new(ProgressBoard::from_records(
        services.progress.compute_for_learner("ada").await.unwrap(),
    ));
    let approved = services
        .review
        .approve_competency(&board, Some("sam"), "ada", "ecg-basics")
        .await
        .unwrap()
        .committed()
        .unwrap();
    assert_eq!(approved.percent, 100);
    assert_eq!(approved.approved_by.as_deref(), Some("sam"));
    assert_eq!(board.read(|b| b.get("ada", "ecg-basics").map(|r| r.percent)), Some(100));

    let record = services.progress.progress_for("ada", "ecg-basics").await.unwrap();
    assert_eq!(record.percent, 100);
    assert_eq!(record.status, ProgressStatus::Completed);

    // a third question does not pull an approved competency back down
    add_question(&store, "ecg-basics", "ecg-q3");
    let record = services.progress.progress_for("ada", "ecg-basics").await.unwrap();
    assert_eq!(record.total_questions, 3);
    assert_eq!(record.percent, 100);
    assert!(record.overridden);
}

#[tokio::test]
async fn test_organic_progress_regresses_when_questions_are_added() {
    let store = Arc::new(seeded_store());
    let services = services(store.clone());
    let membership = ViewState::new(Membership::new());

    services.enrollment.enroll(&membership, Some("bea"), "bea", "ecg-basics").await.unwrap();
    answer(&store, "bea", "ecg-q1", true);
    answer(&store, "bea", "ecg-q2", true);
    assert_eq!(services.progress.progress_for("bea", "ecg-basics").await.unwrap().percent, 100);

    add_question(&store, "ecg-basics", "ecg-q3");
    let record = services.progress.progress_for("bea", "ecg-basics").await.unwrap();
    assert_eq!(record.percent, 67);
    assert_eq!(record.status, ProgressStatus::InProgress);
}

#[tokio::test]
async fn test_zero_question_competency_is_zero_percent() {
    let store = Arc::new(seeded_store());
    let services = services(store.clone());
    let membership = ViewState::new(Membership::new());

    services.enrollment.enroll(&membership, Some("ada"), "ada", "neuro-crit").await.unwrap();
    let record = services.progress.progress_for("ada", "neuro-crit").await.unwrap();
    assert_eq!(record.total_questions, 0);
    assert_eq!(record.percent, 0);
}

#[tokio::test]
async fn test_percent_always_in_range() {
    let store = Arc::new(seeded_store());
    let services = services(store.clone());
    let membership = ViewState::new(Membership::new());

    for id in ["ecg-basics", "cpr", "vent-mgmt", "cardiac-cath"] {
        services.enrollment.enroll(&membership, Some("ada"), "ada", id).await.unwrap();
    }
    for question in ["ecg-q1", "ecg-q2", "cpr-q1"] {
        answer(&store, "ada", question, false);
        // re-answering never counts twice
        answer(&store, "ada", question, true);
    }

    let records = services.progress.compute_for_learner("ada").await.unwrap();
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r.percent <= 100));
    assert!(records.iter().all(|r| r.answered_questions <= r.total_questions));
}

#[tokio::test]
async fn test_cohort_average() {
    let store = Arc::new(seeded_store());
    let services = services(store.clone());
    let membership = ViewState::new(Membership::new());

    // ada: ecg 50%, cpr 100% -> 75; bea: no enrollments -> 0
    services.enrollment.enroll(&membership, Some("ada"), "ada", "ecg-basics").await.unwrap();
    services.enrollment.enroll(&membership, Some("ada"), "ada", "cpr").await.unwrap();
    answer(&store, "ada", "ecg-q1", true);
    answer(&store, "ada", "cpr-q1", true);

    assert_eq!(services.progress.learner_average("ada").await.unwrap(), 75.0);

    let cohort = services
        .progress
        .compute_cohort(&["ada".to_string(), "bea".to_string()])
        .await
        .unwrap();
    assert_eq!(cohort.learners.len(), 2);
    assert_eq!(cohort.cohort_average, 37.5);

    let empty = services.progress.compute_cohort(&[]).await.unwrap();
    assert_eq!(empty.cohort_average, 0.0);
}

#[tokio::test]
async fn test_progress_for_unenrolled_pair_is_not_found() {
    let services = services(Arc::new(seeded_store()));
    let result = services.progress.progress_for("ada", "cpr").await;
    assert!(matches!(result, Err(CompetencyError::NotFound(_))));
}

#[tokio::test]
async fn test_answer_to_unknown_question_is_not_found() {
    let store = Arc::new(seeded_store());
    let services = services(store.clone());

    let err = services
        .progress
        .record_answer(Some("ada"), "no-such-question", true)
        .await
        .unwrap_err();
    assert!(matches!(err, CompetencyError::NotFound(_)));
    assert_eq!(err.user_message(), "question no-such-question");

    services.progress.record_answer(Some("ada"), "ecg-q1", true).await.unwrap();
}

#[tokio::test]
async fn test_approve_is_idempotent_and_requires_enrollment() {
    let store = Arc::new(seeded_store());
    let services = services(store.clone());
    let membership = ViewState::new(Membership::new());
    let board = ViewState::new(ProgressBoard::default());

    let missing = services.review.approve_competency(&board, Some("sam"), "ada", "cpr").await;
    assert!(matches!(missing, Err(CompetencyError::NotFound(_))));

    services.enrollment.enroll(&membership, Some("ada"), "ada", "cpr").await.unwrap();
    let first = services
        .review
        .approve_competency(&board, Some("sam"), "ada", "cpr")
        .await
        .unwrap()
        .committed()
        .unwrap();
    let second = services
        .review
        .approve_competency(&board, Some("root"), "ada", "cpr")
        .await
        .unwrap()
        .committed()
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(store.progress_overrides("ada").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_approve_requires_supervisor_surface() {
    let services = services(Arc::new(seeded_store()));
    let board = ViewState::new(ProgressBoard::default());

    let denied = services.review.approve_competency(&board, Some("ada"), "ada", "cpr").await;
    assert!(matches!(
        denied,
        Err(CompetencyError::AuthzDenied { redirect: Redirect::Forbidden })
    ));
}

#[tokio::test]
async fn test_failed_approval_rolls_back_board() {
    let flaky = Arc::new(FlakyStore::new(seeded_store()));
    let services = services(flaky.clone());
    let membership = ViewState::new(Membership::new());

    services.enrollment.enroll(&membership, Some("ada"), "ada", "ecg-basics").await.unwrap();
    let board = ViewState::new(ProgressBoard::from_records(
        services.progress.compute_for_learner("ada").await.unwrap(),
    ));
    let before = board.snapshot();

    flaky.fail_writes.store(true, Ordering::SeqCst);
    let result = services
        .review
        .approve_competency(&board, Some("sam"), "ada", "ecg-basics")
        .await;

    assert!(matches!(result, Err(CompetencyError::Remote(_))));
    assert_eq!(board.snapshot(), before);
    assert_eq!(board.read(|b| b.get("ada", "ecg-basics").map(|r| r.percent)), Some(0));
}
