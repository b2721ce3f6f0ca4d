//! End-to-end runs with the built-in stage processors, configured the way
//! the CLI configures them.

use chrono::{Duration as ChronoDuration, Utc};
use std::io::Write;
use std::sync::Arc;

use ticket_pipeline::config::PipelineConfig;
use ticket_pipeline::processors::closure::CLOSURE_NOTE;
use ticket_pipeline::{
    load_tickets, AdvanceOutcome, Checkpoint, ResumePayload, RiskLevel, Stage, StageStatus,
    TicketFields, TicketStatus, WorkflowEngine, WorkflowError,
};

fn iam_ticket_due_in(id: &str, days: i64) -> TicketFields {
    let mut fields = TicketFields::new(id, "IAM");
    fields.description = "Remove stale admin grants".to_string();
    fields.sla_deadline = Some((Utc::now() + ChronoDuration::days(days)).to_rfc3339());
    fields.application_owner = Some("IAM-Space".to_string());
    fields.contacts = vec!["app-team@example.com".to_string()];
    fields
}

fn standard_engine() -> Arc<WorkflowEngine> {
    Arc::new(WorkflowEngine::from_config(&PipelineConfig::default()).unwrap())
}

#[tokio::test]
async fn test_iam_ticket_due_tomorrow() {
    let engine = standard_engine();
    engine.load(iam_ticket_due_in("T1", 1)).await.unwrap();

    let outcome = engine.advance("T1").await.unwrap();
    assert!(matches!(outcome, AdvanceOutcome::Paused { checkpoint: Checkpoint::Priority, .. }));

    let record = engine.snapshot("T1").await.unwrap();
    assert_eq!(record.stage_status(Stage::CategoryCheck), StageStatus::Completed);
    assert_eq!(
        record.stage_entry(Stage::CategoryCheck).message,
        "Confirmed: IAM ticket"
    );
    assert_eq!(record.fields.deliverable_type.as_deref(), Some("IAM Category"));
    assert_eq!(record.fields.risk_level, Some(RiskLevel::High));
    assert_eq!(record.stage_status(Stage::SlaPrioritization), StageStatus::Completed);
    assert!(record
        .stage_entry(Stage::SlaPrioritization)
        .message
        .starts_with("Risk: High"));
    assert!(record.waiting_for_priority_confirmation);

    let outcome = engine
        .resume("T1", Checkpoint::Priority, ResumePayload::default())
        .await
        .unwrap();
    assert!(outcome.is_applied());

    let record = engine.snapshot("T1").await.unwrap();
    assert_eq!(record.current_stage, 5);
    assert!(record.waiting_for_review);
    assert_eq!(record.stage_status(Stage::EvidenceCollection), StageStatus::InProgress);
    assert_eq!(
        record.stage_entry(Stage::AppOwnerCheck).message,
        "App owner verified (IAM-Space)"
    );
    let draft = record.fields.evidence_request.as_ref().unwrap();
    assert_eq!(draft.recipients, vec!["app-team@example.com"]);

    engine
        .resume("T1", Checkpoint::Review, ResumePayload::default())
        .await
        .unwrap();
    engine
        .resume("T1", Checkpoint::Closure, ResumePayload::default())
        .await
        .unwrap();

    let record = engine.snapshot("T1").await.unwrap();
    assert_eq!(record.status, TicketStatus::Completed);
    assert!(record.fields.description.ends_with(CLOSURE_NOTE));
    assert_eq!(record.stage_entry(Stage::Logging).message, "Logged successfully");
}

#[tokio::test]
async fn test_non_iam_ticket_is_rejected() {
    let engine = standard_engine();
    engine
        .load(TicketFields::new("N1", "Network"))
        .await
        .unwrap();

    let err = engine.advance("N1").await.unwrap_err();
    match err {
        WorkflowError::RejectedByPolicy { reason, .. } => {
            assert_eq!(reason, "Not an IAM ticket (Category: Network)")
        }
        other => panic!("unexpected error {other:?}"),
    }
    let record = engine.snapshot("N1").await.unwrap();
    assert_eq!(record.current_stage, 1);
    assert!(record.is_completed());
}

#[tokio::test]
async fn test_far_deadline_is_low_risk_and_owner_outside_spaces_fails() {
    let engine = standard_engine();
    let mut fields = iam_ticket_due_in("T2", 30);
    fields.application_owner = Some("someone@elsewhere.org".to_string());
    engine.load(fields).await.unwrap();

    engine.advance("T2").await.unwrap();
    assert_eq!(
        engine.snapshot("T2").await.unwrap().fields.risk_level,
        Some(RiskLevel::Low)
    );

    let err = engine
        .resume("T2", Checkpoint::Priority, ResumePayload::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::ProcessorFailure { stage: Stage::AppOwnerCheck, .. }
    ));
    let record = engine.snapshot("T2").await.unwrap();
    assert_eq!(record.status, TicketStatus::InProgress);
    assert_eq!(record.stage_status(Stage::AppOwnerCheck), StageStatus::Error);
}

#[tokio::test]
async fn test_ownership_file_feeds_enrichment() {
    let dir = tempfile::tempdir().unwrap();

    let ownership_path = dir.path().join("ownership.json");
    std::fs::write(
        &ownership_path,
        r#"[{"ait_number": "AIT-42", "application_name": "Payments Console",
             "application_owner": "Security-Space", "lob_owner": "Retail",
             "ait_owner": "Dana", "contacts": ["dana@example.com"]}]"#,
    )
    .unwrap();

    let tickets_path = dir.path().join("tickets.json");
    let mut file = std::fs::File::create(&tickets_path).unwrap();
    let due = (Utc::now() + ChronoDuration::days(4)).format("%Y-%m-%d").to_string();
    write!(
        file,
        r#"[{{"ticket_id": "T7", "category": "iam", "description": "Rotate keys",
             "sla_deadline": "{due}", "ait_number": "AIT-42"}}]"#
    )
    .unwrap();

    let mut config = PipelineConfig::default();
    config.processors.ownership_data_file = Some(ownership_path);
    let engine = WorkflowEngine::from_config(&config).unwrap();
    engine
        .load_batch(load_tickets(&tickets_path).unwrap())
        .await
        .unwrap();

    engine.advance("T7").await.unwrap();
    assert_eq!(
        engine.snapshot("T7").await.unwrap().fields.risk_level,
        Some(RiskLevel::Medium)
    );
    engine
        .resume("T7", Checkpoint::Priority, ResumePayload::default())
        .await
        .unwrap();

    let record = engine.snapshot("T7").await.unwrap();
    assert!(record.waiting_for_review);
    assert_eq!(record.fields.application_name.as_deref(), Some("Payments Console"));
    assert_eq!(record.fields.application_owner.as_deref(), Some("Security-Space"));
    assert_eq!(record.fields.contacts, vec!["dana@example.com"]);
    assert_eq!(
        record.stage_entry(Stage::OwnershipEnrichment).message,
        "Owner: Retail"
    );
}

#[tokio::test]
async fn test_missing_contacts_fail_evidence_collection() {
    let engine = standard_engine();
    let mut fields = iam_ticket_due_in("T9", 3);
    fields.contacts.clear();
    engine.load(fields).await.unwrap();
    engine.advance("T9").await.unwrap();

    let err = engine
        .resume("T9", Checkpoint::Priority, ResumePayload::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::ProcessorFailure { stage: Stage::EvidenceCollection, .. }
    ));
    assert!(!engine.snapshot("T9").await.unwrap().waiting_for_review);
}
