// Workflow engine - owns every ticket record and drives it through the stage table
//
// Locking: the id -> slot table is only locked to look up or insert a slot.
// Each slot carries its own async mutex, held for the full duration of one
// advance/resume call (processor invocations included), so operations on one
// ticket are serialized while different tickets run concurrently. The last
// broadcast snapshot is kept separately so readers never wait on a ticket
// that is mid-transition.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn, Instrument};

use super::errors::WorkflowError;
use super::transitions::{transition, SideEffect, StageEvent};
use crate::config::PipelineConfig;
use crate::loader::LoaderError;
use crate::notifications::{HubEvent, NotificationHub, Subscription};
use crate::observability::{EngineMetrics, OperationTimer};
use crate::processors::{ProcessorOutcome, ProcessorRegistry};
use crate::telemetry::{create_ticket_span, generate_correlation_id};
use crate::ticket::{
    Checkpoint, RiskLevel, Stage, StageStatus, TicketFields, TicketId, TicketRecord,
};

/// Where an advance call left the ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Halted at a checkpoint until the matching resume arrives
    Paused { checkpoint: Checkpoint, stage: Stage },
    /// This call ran the final stage
    Completed,
    /// Nothing to do; the ticket had already finished or been rejected
    AlreadyCompleted,
}

/// Result of a resume or acknowledge call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// The checkpoint was cleared by this call. `continuation` holds the
    /// follow-up advance result when the engine ran it inline.
    Resumed { continuation: Option<AdvanceOutcome> },
    /// The checkpoint had already been passed; nothing changed
    AlreadySatisfied,
}

impl ResumeOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ResumeOutcome::Resumed { .. })
    }
}

/// Human input supplied with a resume command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResumePayload {
    /// Overrides the risk level computed by SLA prioritization
    pub risk_level: Option<RiskLevel>,
}

impl ResumePayload {
    pub fn with_risk_level(risk_level: RiskLevel) -> Self {
        Self {
            risk_level: Some(risk_level),
        }
    }
}

struct TicketSlot {
    record: Mutex<TicketRecord>,
    published: StdMutex<TicketRecord>,
}

impl TicketSlot {
    fn new(record: TicketRecord) -> Self {
        Self {
            published: StdMutex::new(record.clone()),
            record: Mutex::new(record),
        }
    }

    fn published(&self) -> TicketRecord {
        self.published
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

pub struct WorkflowEngine {
    tickets: RwLock<HashMap<TicketId, Arc<TicketSlot>>>,
    processors: ProcessorRegistry,
    hub: NotificationHub,
    metrics: Arc<EngineMetrics>,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("processors", &self.processors)
            .field("hub", &self.hub)
            .field("metrics", &self.metrics.get_stats())
            .finish()
    }
}

impl WorkflowEngine {
    pub fn new(processors: ProcessorRegistry, hub: NotificationHub) -> Self {
        Self {
            tickets: RwLock::new(HashMap::new()),
            processors,
            hub,
            metrics: Arc::new(EngineMetrics::new()),
        }
    }

    /// Engine with the built-in processors and a hub sized from configuration
    pub fn from_config(config: &PipelineConfig) -> Result<Self, LoaderError> {
        let processors = ProcessorRegistry::standard(&config.processors)?;
        let hub = NotificationHub::new(config.engine.observer_buffer);
        Ok(Self::new(processors, hub))
    }

    pub fn hub(&self) -> &NotificationHub {
        &self.hub
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Register a freshly fetched ticket
    pub async fn load(&self, fields: TicketFields) -> Result<TicketRecord, WorkflowError> {
        let record = TicketRecord::new(fields);
        let ticket_id = record.ticket_id().to_string();
        {
            let mut tickets = self.tickets.write().await;
            if tickets.contains_key(&ticket_id) {
                return Err(WorkflowError::DuplicateTicket { ticket_id });
            }
            tickets.insert(ticket_id.clone(), Arc::new(TicketSlot::new(record.clone())));
        }

        info!(ticket_id = %ticket_id, "Ticket registered");
        self.emit(HubEvent::TicketUpdate {
            ticket: record.clone(),
        });
        Ok(record)
    }

    /// Register a batch, stopping at the first duplicate
    pub async fn load_batch(
        &self,
        batch: impl IntoIterator<Item = TicketFields>,
    ) -> Result<usize, WorkflowError> {
        let mut loaded = 0;
        for fields in batch {
            self.load(fields).await?;
            loaded += 1;
        }
        Ok(loaded)
    }

    async fn slot(&self, ticket_id: &str) -> Result<Arc<TicketSlot>, WorkflowError> {
        self.tickets
            .read()
            .await
            .get(ticket_id)
            .cloned()
            .ok_or_else(|| WorkflowError::NotFound {
                ticket_id: ticket_id.to_string(),
            })
    }

    pub async fn contains(&self, ticket_id: &str) -> bool {
        self.tickets.read().await.contains_key(ticket_id)
    }

    /// Latest published snapshot of one ticket
    pub async fn snapshot(&self, ticket_id: &str) -> Result<TicketRecord, WorkflowError> {
        Ok(self.slot(ticket_id).await?.published())
    }

    /// Latest published snapshots of every ticket, ordered by id
    pub async fn snapshots(&self) -> Vec<TicketRecord> {
        let slots: Vec<Arc<TicketSlot>> = self.tickets.read().await.values().cloned().collect();
        let mut records: Vec<TicketRecord> = slots.iter().map(|slot| slot.published()).collect();
        records.sort_by(|a, b| a.ticket_id().cmp(b.ticket_id()));
        records
    }

    /// Subscribe to engine events; the first event is a snapshot of every ticket
    pub async fn subscribe(&self) -> Subscription {
        self.prime(self.hub.subscribe()).await
    }

    /// Subscribe with a queue of `buffer` events instead of the configured default
    pub async fn subscribe_with_buffer(&self, buffer: usize) -> Subscription {
        self.prime(self.hub.subscribe_with_buffer(buffer)).await
    }

    // Register before taking the snapshot so no update can fall between the two
    async fn prime(&self, mut subscription: Subscription) -> Subscription {
        subscription.prime(self.snapshots().await);
        subscription
    }

    /// Run the ticket forward until it completes, is rejected, fails, or hits a checkpoint
    pub async fn advance(&self, ticket_id: &str) -> Result<AdvanceOutcome, WorkflowError> {
        let correlation_id = generate_correlation_id();
        let span = create_ticket_span("advance", ticket_id, Some(&correlation_id));
        async {
            let slot = self.slot(ticket_id).await?;
            let mut record = slot.record.lock().await;
            self.run_advance(&slot, &mut record).await
        }
        .instrument(span)
        .await
    }

    /// Clear a checkpoint and continue the pipeline inline, under the same ticket lock
    pub async fn resume(
        &self,
        ticket_id: &str,
        checkpoint: Checkpoint,
        payload: ResumePayload,
    ) -> Result<ResumeOutcome, WorkflowError> {
        let correlation_id = generate_correlation_id();
        let span = create_ticket_span("resume", ticket_id, Some(&correlation_id));
        async {
            let slot = self.slot(ticket_id).await?;
            let mut record = slot.record.lock().await;
            if !self.apply_resume(&slot, &mut record, checkpoint, payload)? {
                return Ok(ResumeOutcome::AlreadySatisfied);
            }
            let continuation = self.run_advance(&slot, &mut record).await?;
            Ok(ResumeOutcome::Resumed {
                continuation: Some(continuation),
            })
        }
        .instrument(span)
        .await
    }

    /// Clear a checkpoint without continuing; the caller schedules the advance
    pub async fn acknowledge(
        &self,
        ticket_id: &str,
        checkpoint: Checkpoint,
        payload: ResumePayload,
    ) -> Result<ResumeOutcome, WorkflowError> {
        let span = create_ticket_span("acknowledge", ticket_id, None);
        async {
            let slot = self.slot(ticket_id).await?;
            let mut record = slot.record.lock().await;
            if self.apply_resume(&slot, &mut record, checkpoint, payload)? {
                Ok(ResumeOutcome::Resumed { continuation: None })
            } else {
                Ok(ResumeOutcome::AlreadySatisfied)
            }
        }
        .instrument(span)
        .await
    }

    /// Returns false when the checkpoint had already been passed
    fn apply_resume(
        &self,
        slot: &TicketSlot,
        record: &mut TicketRecord,
        checkpoint: Checkpoint,
        payload: ResumePayload,
    ) -> Result<bool, WorkflowError> {
        let ticket_id = record.ticket_id().to_string();
        let invalid = || WorkflowError::InvalidTransition {
            ticket_id: ticket_id.clone(),
            checkpoint,
        };

        if !record.checkpoint_flag(checkpoint) {
            if record.is_checkpoint_cleared(checkpoint) {
                self.metrics.record_idempotent_resume();
                info!(
                    ticket_id = %record.ticket_id(),
                    checkpoint = %checkpoint,
                    "Checkpoint already passed, ignoring duplicate resume"
                );
                return Ok(false);
            }
            warn!(
                ticket_id = %record.ticket_id(),
                checkpoint = %checkpoint,
                current_stage = record.current_stage,
                "Resume for a checkpoint the ticket is not awaiting"
            );
            return Err(invalid());
        }

        let stage = checkpoint.stage();
        let step = transition(stage, StageEvent::Resumed(checkpoint), record.closure_approved)
            .ok_or_else(invalid)?;

        if let Some(risk_level) = payload.risk_level {
            record.fields.risk_level = Some(risk_level);
        }
        record.set_checkpoint_flag(checkpoint, false);

        match step.effect {
            SideEffect::CompleteStage => {
                let message = match checkpoint {
                    Checkpoint::Priority => format!(
                        "Risk Confirmed: {}",
                        record.fields.risk_level.unwrap_or(RiskLevel::Unknown)
                    ),
                    Checkpoint::Review => "Review approved - Evidence collected".to_string(),
                    Checkpoint::Closure => "Closure confirmed".to_string(),
                };
                record.set_stage_status(stage, StageStatus::Completed, message);
                record.enter_stage(step.next_stage);
            }
            SideEffect::ApproveClosure => {
                record.closure_approved = true;
                record.set_stage_status(
                    stage,
                    StageStatus::InProgress,
                    "Closure confirmed - closing ticket",
                );
            }
            other => {
                // The table only yields the two effects above for resume events
                error!(effect = ?other, "Unexpected resume transition");
                record.set_checkpoint_flag(checkpoint, true);
                return Err(invalid());
            }
        }

        self.metrics.record_resume();
        info!(
            ticket_id = %record.ticket_id(),
            checkpoint = %checkpoint,
            risk_override = ?payload.risk_level,
            "Checkpoint resumed"
        );
        self.publish(slot, record);
        Ok(true)
    }

    async fn run_advance(
        &self,
        slot: &TicketSlot,
        record: &mut TicketRecord,
    ) -> Result<AdvanceOutcome, WorkflowError> {
        if record.is_completed() {
            return Ok(AdvanceOutcome::AlreadyCompleted);
        }
        if let Some(checkpoint) = record.awaiting() {
            return Ok(AdvanceOutcome::Paused {
                checkpoint,
                stage: checkpoint.stage(),
            });
        }

        self.metrics.record_advance();
        let timer = OperationTimer::new("advance");
        let ticket_id = record.ticket_id().to_string();
        self.emit(HubEvent::ProcessingStart {
            message: format!("Processing ticket {ticket_id}"),
            ticket: None,
        });

        let result = self.drive(slot, record).await;
        timer.finish();

        match &result {
            Ok(AdvanceOutcome::Completed) => {
                self.metrics.record_completion();
                info!(ticket_id = %ticket_id, "Ticket processed successfully");
                self.emit(HubEvent::ProcessingComplete {
                    message: format!("Ticket {ticket_id} processed successfully"),
                    ticket: Some(record.clone()),
                });
            }
            Ok(AdvanceOutcome::Paused { checkpoint, stage }) => {
                info!(
                    ticket_id = %ticket_id,
                    checkpoint = %checkpoint,
                    stage = %stage,
                    "Ticket paused at checkpoint"
                );
            }
            Ok(AdvanceOutcome::AlreadyCompleted) => {}
            Err(err @ WorkflowError::RejectedByPolicy { .. }) => {
                self.metrics.record_policy_rejection();
                info!(ticket_id = %ticket_id, error = %err, "Ticket rejected by policy");
                self.emit(HubEvent::ProcessingComplete {
                    message: err.to_string(),
                    ticket: Some(record.clone()),
                });
            }
            Err(err) => {
                self.metrics.record_processor_failure();
                error!(ticket_id = %ticket_id, error = %err, "Ticket processing error");
                self.emit(HubEvent::Error {
                    message: err.to_string(),
                    ticket: Some(record.clone()),
                });
            }
        }

        result
    }

    /// Feed events into the transition table until the ticket halts
    async fn drive(
        &self,
        slot: &TicketSlot,
        record: &mut TicketRecord,
    ) -> Result<AdvanceOutcome, WorkflowError> {
        loop {
            let stage = record.stage();

            if record.stage_status(stage) == StageStatus::Completed {
                match stage.next() {
                    Some(next) => {
                        record.enter_stage(next);
                        continue;
                    }
                    None => {
                        record.mark_completed();
                        self.publish(slot, record);
                        return Ok(AdvanceOutcome::Completed);
                    }
                }
            }

            let Some(entered) = transition(stage, StageEvent::Entered, record.closure_approved) else {
                return Err(self.processor_failure(record, stage, "stage cannot be entered"));
            };

            match entered.effect {
                SideEffect::AwaitCheckpoint(checkpoint) => {
                    record.set_checkpoint_flag(checkpoint, true);
                    record.set_stage_status(
                        stage,
                        StageStatus::InProgress,
                        checkpoint.waiting_message(),
                    );
                    self.publish(slot, record);
                    return Ok(AdvanceOutcome::Paused { checkpoint, stage });
                }
                SideEffect::InvokeProcessor => {}
                other => {
                    let reason = format!("unexpected entry effect {other:?}");
                    return Err(self.processor_failure(record, stage, &reason));
                }
            }

            record.set_stage_status(stage, StageStatus::InProgress, format!("Running {stage}"));
            self.publish(slot, record);

            let outcome = match self.invoke(stage, record.fields.clone()).await {
                Ok(outcome) => outcome,
                Err(reason) => {
                    record.set_stage_status(stage, StageStatus::Error, reason.clone());
                    self.publish(slot, record);
                    return Err(self.processor_failure(record, stage, &reason));
                }
            };

            match outcome {
                ProcessorOutcome::Rejected { reason } => {
                    let step = transition(stage, StageEvent::ProcessorRejected, record.closure_approved)
                        .map(|t| t.effect)
                        .unwrap_or(SideEffect::FailStage);
                    record.set_stage_status(stage, StageStatus::Error, reason.clone());
                    if step == SideEffect::HaltTerminal {
                        record.mark_completed();
                        self.publish(slot, record);
                        return Err(WorkflowError::RejectedByPolicy {
                            ticket_id: record.ticket_id().to_string(),
                            stage,
                            reason,
                        });
                    }
                    self.publish(slot, record);
                    return Err(self.processor_failure(record, stage, &reason));
                }
                ProcessorOutcome::Processed { fields, summary } => {
                    record.merge_fields(fields);
                    let Some(step) =
                        transition(stage, StageEvent::ProcessorSucceeded, record.closure_approved)
                    else {
                        return Err(self.processor_failure(record, stage, "no transition after success"));
                    };

                    match step.effect {
                        SideEffect::AwaitCheckpoint(checkpoint) => {
                            // Prioritization has produced its result; review still owes one
                            let status = match checkpoint {
                                Checkpoint::Priority => StageStatus::Completed,
                                Checkpoint::Review | Checkpoint::Closure => StageStatus::InProgress,
                            };
                            record.set_checkpoint_flag(checkpoint, true);
                            record.set_stage_status(
                                stage,
                                status,
                                format!("{summary} | {}", checkpoint.waiting_message()),
                            );
                            self.publish(slot, record);
                            return Ok(AdvanceOutcome::Paused { checkpoint, stage });
                        }
                        SideEffect::CompleteStage => {
                            record.set_stage_status(stage, StageStatus::Completed, summary);
                            self.publish(slot, record);
                            record.enter_stage(step.next_stage);
                        }
                        SideEffect::FinishPipeline => {
                            record.set_stage_status(stage, StageStatus::Completed, summary);
                            record.mark_completed();
                            self.publish(slot, record);
                            return Ok(AdvanceOutcome::Completed);
                        }
                        other => {
                            let reason = format!("unexpected success effect {other:?}");
                            return Err(self.processor_failure(record, stage, &reason));
                        }
                    }
                }
            }
        }
    }

    /// Run the stage's processor on its own task so a panic stays contained
    async fn invoke(&self, stage: Stage, fields: TicketFields) -> Result<ProcessorOutcome, String> {
        let Some(processor) = self.processors.get(stage) else {
            return Err(format!("no processor registered for {stage}"));
        };
        self.metrics.record_processor_invocation();

        let name = processor.name().to_string();
        let handle = tokio::spawn(async move { processor.process(fields).await });
        match handle.await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(err)) => Err(format!("{name}: {err}")),
            Err(join_err) if join_err.is_panic() => Err(format!("{name} panicked")),
            Err(join_err) => Err(format!("{name} did not finish: {join_err}")),
        }
    }

    fn processor_failure(&self, record: &TicketRecord, stage: Stage, reason: &str) -> WorkflowError {
        WorkflowError::ProcessorFailure {
            ticket_id: record.ticket_id().to_string(),
            stage,
            reason: reason.to_string(),
        }
    }

    /// Store the snapshot readers see and broadcast it
    fn publish(&self, slot: &TicketSlot, record: &TicketRecord) {
        debug_assert!(
            record.check_invariants().is_ok(),
            "ticket invariants violated: {:?}",
            record.check_invariants()
        );
        *slot
            .published
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = record.clone();
        self.emit(HubEvent::TicketUpdate {
            ticket: record.clone(),
        });
    }

    fn emit(&self, event: HubEvent) {
        let report = self.hub.broadcast(event);
        self.metrics.record_broadcast();
        if report.dropped > 0 {
            self.metrics.record_dropped_observers(report.dropped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::{ProcessorError, StageProcessor};
    use async_trait::async_trait;

    struct Passthrough;

    #[async_trait]
    impl StageProcessor for Passthrough {
        fn name(&self) -> &str {
            "passthrough"
        }

        async fn process(&self, fields: TicketFields) -> Result<ProcessorOutcome, ProcessorError> {
            Ok(ProcessorOutcome::processed(fields, "ok"))
        }
    }

    fn engine() -> WorkflowEngine {
        let mut registry = ProcessorRegistry::new();
        for stage in Stage::ALL.into_iter().skip(1) {
            registry.register(stage, Arc::new(Passthrough));
        }
        WorkflowEngine::new(registry, NotificationHub::new(8))
    }

    #[test]
    fn test_load_publishes_initial_record() {
        tokio_test::block_on(async {
            let engine = engine();
            let mut subscription = engine.hub().subscribe();
            let record = engine.load(TicketFields::new("T1", "IAM")).await.unwrap();

            assert_eq!(record.version, 0);
            assert_eq!(engine.snapshot("T1").await.unwrap(), record);
            assert_eq!(
                subscription.try_recv(),
                Some(HubEvent::TicketUpdate { ticket: record })
            );
        });
    }

    #[test]
    fn test_published_snapshot_tracks_each_mutation() {
        tokio_test::block_on(async {
            let engine = engine();
            engine.load(TicketFields::new("T1", "IAM")).await.unwrap();
            engine.advance("T1").await.unwrap();

            let published = engine.snapshot("T1").await.unwrap();
            let slot = engine.slot("T1").await.unwrap();
            assert_eq!(*slot.record.lock().await, published);
            assert_eq!(published.version, 4);
        });
    }

    #[test]
    fn test_closure_resume_keeps_stage_in_progress_until_processor_runs() {
        tokio_test::block_on(async {
            let engine = engine();
            engine.load(TicketFields::new("T1", "IAM")).await.unwrap();
            engine.advance("T1").await.unwrap();
            for checkpoint in [Checkpoint::Priority, Checkpoint::Review] {
                engine
                    .resume("T1", checkpoint, ResumePayload::default())
                    .await
                    .unwrap();
            }

            let outcome = engine
                .acknowledge("T1", Checkpoint::Closure, ResumePayload::default())
                .await
                .unwrap();
            assert!(outcome.is_applied());

            let record = engine.snapshot("T1").await.unwrap();
            assert!(record.closure_approved);
            assert!(!record.waiting_for_closure_confirmation);
            assert_eq!(record.stage_status(Stage::TicketClosure), StageStatus::InProgress);
            assert!(record.is_checkpoint_cleared(Checkpoint::Closure));

            assert_eq!(engine.advance("T1").await.unwrap(), AdvanceOutcome::Completed);
        });
    }
}
