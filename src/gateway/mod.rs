// Command gateway - validates external commands and hands advancement to the dispatcher

pub mod dispatcher;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::info;

use crate::notifications::Subscription;
use crate::ticket::{Checkpoint, RiskLevel, TicketRecord};
use crate::workflows::{ResumeOutcome, ResumePayload, WorkflowEngine, WorkflowError};
pub use dispatcher::{AdvanceDispatcher, AdvanceResult, DispatchError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    /// The command was applied and an advance has been queued
    Accepted,
    /// The checkpoint had already been passed; nothing was queued
    AlreadySatisfied,
}

/// Synchronous reply to a command; the outcome itself arrives through the hub
#[derive(Debug, Serialize)]
pub struct CommandAck {
    pub status: AckStatus,
    pub message: String,
    #[serde(skip)]
    completion: Option<oneshot::Receiver<AdvanceResult>>,
}

impl CommandAck {
    fn accepted(message: String, completion: oneshot::Receiver<AdvanceResult>) -> Self {
        Self {
            status: AckStatus::Accepted,
            message,
            completion: Some(completion),
        }
    }

    fn already_satisfied(message: String) -> Self {
        Self {
            status: AckStatus::AlreadySatisfied,
            message,
            completion: None,
        }
    }

    /// Wait for the advance queued by this command. `None` when nothing was
    /// queued or the dispatcher shut down before running it.
    pub async fn completion(self) -> Option<AdvanceResult> {
        self.completion?.await.ok()
    }
}

pub struct CommandGateway {
    engine: Arc<WorkflowEngine>,
    dispatcher: AdvanceDispatcher,
}

impl CommandGateway {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self {
            dispatcher: AdvanceDispatcher::new(Arc::clone(&engine)),
            engine,
        }
    }

    pub fn engine(&self) -> &Arc<WorkflowEngine> {
        &self.engine
    }

    pub async fn list_tickets(&self) -> Vec<TicketRecord> {
        self.engine.snapshots().await
    }

    /// Tickets whose category matches, ignoring case
    pub async fn list_tickets_in_category(&self, category: &str) -> Vec<TicketRecord> {
        self.engine
            .snapshots()
            .await
            .into_iter()
            .filter(|record| record.fields.category.eq_ignore_ascii_case(category))
            .collect()
    }

    pub async fn get_ticket(&self, ticket_id: &str) -> Result<TicketRecord, GatewayError> {
        Ok(self.engine.snapshot(ticket_id).await?)
    }

    pub async fn subscribe(&self) -> Subscription {
        self.engine.subscribe().await
    }

    pub async fn subscribe_with_buffer(&self, buffer: usize) -> Subscription {
        self.engine.subscribe_with_buffer(buffer).await
    }

    /// Start (or restart after a failure) processing of a ticket
    pub async fn process(&self, ticket_id: &str) -> Result<CommandAck, GatewayError> {
        if !self.engine.contains(ticket_id).await {
            return Err(WorkflowError::NotFound {
                ticket_id: ticket_id.to_string(),
            }
            .into());
        }
        let completion = self.dispatcher.enqueue(ticket_id).await?;
        info!(ticket_id = %ticket_id, "Processing requested");
        Ok(CommandAck::accepted(
            format!("Processing started for ticket {ticket_id}"),
            completion,
        ))
    }

    pub async fn confirm_priority(
        &self,
        ticket_id: &str,
        risk_level: Option<RiskLevel>,
    ) -> Result<CommandAck, GatewayError> {
        let payload = ResumePayload { risk_level };
        self.resume(ticket_id, Checkpoint::Priority, payload).await
    }

    pub async fn approve_review(&self, ticket_id: &str) -> Result<CommandAck, GatewayError> {
        self.resume(ticket_id, Checkpoint::Review, ResumePayload::default())
            .await
    }

    pub async fn confirm_closure(&self, ticket_id: &str) -> Result<CommandAck, GatewayError> {
        self.resume(ticket_id, Checkpoint::Closure, ResumePayload::default())
            .await
    }

    async fn resume(
        &self,
        ticket_id: &str,
        checkpoint: Checkpoint,
        payload: ResumePayload,
    ) -> Result<CommandAck, GatewayError> {
        match self.engine.acknowledge(ticket_id, checkpoint, payload).await? {
            ResumeOutcome::AlreadySatisfied => Ok(CommandAck::already_satisfied(format!(
                "{} already confirmed for ticket {ticket_id}",
                capitalize(checkpoint.as_str())
            ))),
            ResumeOutcome::Resumed { .. } => {
                let completion = self.dispatcher.enqueue(ticket_id).await?;
                Ok(CommandAck::accepted(
                    format!(
                        "{} confirmed for ticket {ticket_id}, continuing workflow",
                        capitalize(checkpoint.as_str())
                    ),
                    completion,
                ))
            }
        }
    }

    /// Drain queued work and stop the per-ticket workers
    pub async fn shutdown(&self, grace: Duration) -> Result<(), GatewayError> {
        self.dispatcher.shutdown(grace).await?;
        self.engine.metrics().log_stats();
        Ok(())
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
