use thiserror::Error;

use crate::ticket::{Checkpoint, Stage, TicketId};

/// Errors surfaced by the workflow engine at the per-ticket operation boundary
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Ticket {ticket_id} not found")]
    NotFound { ticket_id: TicketId },

    #[error("Invalid transition: ticket {ticket_id} is not awaiting {checkpoint} confirmation")]
    InvalidTransition {
        ticket_id: TicketId,
        checkpoint: Checkpoint,
    },

    #[error("Stage processor failed for ticket {ticket_id} at {stage}: {reason}")]
    ProcessorFailure {
        ticket_id: TicketId,
        stage: Stage,
        reason: String,
    },

    #[error("Ticket {ticket_id} rejected by policy at {stage}: {reason}")]
    RejectedByPolicy {
        ticket_id: TicketId,
        stage: Stage,
        reason: String,
    },

    #[error("Ticket {ticket_id} is already registered")]
    DuplicateTicket { ticket_id: TicketId },
}

impl WorkflowError {
    pub fn ticket_id(&self) -> &str {
        match self {
            WorkflowError::NotFound { ticket_id }
            | WorkflowError::InvalidTransition { ticket_id, .. }
            | WorkflowError::ProcessorFailure { ticket_id, .. }
            | WorkflowError::RejectedByPolicy { ticket_id, .. }
            | WorkflowError::DuplicateTicket { ticket_id } => ticket_id,
        }
    }

    /// Errors caused by the caller's request rather than by pipeline processing
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            WorkflowError::NotFound { .. }
                | WorkflowError::InvalidTransition { .. }
                | WorkflowError::DuplicateTicket { .. }
        )
    }
}
