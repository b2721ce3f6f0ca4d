//! Shared fixtures for the integration tests
//!
//! Fake stage processors record every invocation so tests can assert which
//! stages ran and how often.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ticket_pipeline::processors::{ProcessorError, ProcessorOutcome, ProcessorRegistry, StageProcessor};
use ticket_pipeline::{NotificationHub, RiskLevel, Stage, TicketFields, TicketRecord, WorkflowEngine};

/// Stages invoked so far, in order
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Stage>>>);

impl CallLog {
    pub fn record(&self, stage: Stage) {
        self.0.lock().unwrap().push(stage);
    }

    pub fn calls(&self) -> Vec<Stage> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, stage: Stage) -> usize {
        self.calls().iter().filter(|s| **s == stage).count()
    }
}

#[derive(Debug, Clone)]
pub enum Behaviour {
    Pass,
    SetRisk(RiskLevel),
    Reject(String),
    Fail(String),
    /// Fail the first `n` invocations, then pass
    FailTimes(usize),
    Panic,
    Delay(Duration),
}

pub struct FakeProcessor {
    stage: Stage,
    behaviour: Behaviour,
    log: CallLog,
    invocations: AtomicUsize,
}

impl FakeProcessor {
    pub fn new(stage: Stage, behaviour: Behaviour, log: CallLog) -> Self {
        Self {
            stage,
            behaviour,
            log,
            invocations: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl StageProcessor for FakeProcessor {
    fn name(&self) -> &str {
        self.stage.name()
    }

    async fn process(&self, mut fields: TicketFields) -> Result<ProcessorOutcome, ProcessorError> {
        self.log.record(self.stage);
        let attempt = self.invocations.fetch_add(1, Ordering::SeqCst);

        match &self.behaviour {
            Behaviour::Pass => {}
            Behaviour::SetRisk(risk) => fields.risk_level = Some(*risk),
            Behaviour::Reject(reason) => return Ok(ProcessorOutcome::rejected(reason.clone())),
            Behaviour::Fail(reason) => return Err(ProcessorError::Unavailable(reason.clone())),
            Behaviour::FailTimes(n) if attempt < *n => {
                return Err(ProcessorError::Lookup(format!("attempt {} failed", attempt + 1)))
            }
            Behaviour::FailTimes(_) => {}
            Behaviour::Panic => panic!("processor for {} blew up", self.stage),
            Behaviour::Delay(delay) => tokio::time::sleep(*delay).await,
        }
        Ok(ProcessorOutcome::processed(fields, format!("{} done", self.stage)))
    }
}

/// Every engine-driven stage passes; SLA prioritization assigns Medium risk
pub fn recording_registry(log: &CallLog) -> ProcessorRegistry {
    registry_with(log, &[])
}

/// Like `recording_registry` with some stages swapped for other behaviours
pub fn registry_with(log: &CallLog, overrides: &[(Stage, Behaviour)]) -> ProcessorRegistry {
    let mut registry = ProcessorRegistry::new();
    for stage in Stage::ALL.into_iter().skip(1) {
        let behaviour = overrides
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, b)| b.clone())
            .unwrap_or(match stage {
                Stage::SlaPrioritization => Behaviour::SetRisk(RiskLevel::Medium),
                _ => Behaviour::Pass,
            });
        registry.register(stage, Arc::new(FakeProcessor::new(stage, behaviour, log.clone())));
    }
    registry
}

pub fn iam_ticket(id: &str) -> TicketFields {
    let mut fields = TicketFields::new(id, "IAM");
    fields.description = "Grant access to the payments console".to_string();
    fields.contacts = vec!["owner@example.com".to_string()];
    fields
}

pub async fn engine_with(registry: ProcessorRegistry, tickets: &[&str]) -> Arc<WorkflowEngine> {
    let engine = Arc::new(WorkflowEngine::new(registry, NotificationHub::new(64)));
    for id in tickets {
        engine.load(iam_ticket(id)).await.unwrap();
    }
    engine
}

pub fn assert_consistent(record: &TicketRecord) {
    if let Err(problem) = record.check_invariants() {
        panic!("ticket {} is inconsistent: {problem}", record.ticket_id());
    }
}
