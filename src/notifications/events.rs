use serde::{Deserialize, Serialize};

use crate::ticket::TicketRecord;

/// Events delivered to observers, serialised with a `type` tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubEvent {
    /// Full snapshot sent once when an observer subscribes
    InitialState { tickets: Vec<TicketRecord> },
    TicketUpdate { ticket: TicketRecord },
    ProcessingStart {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ticket: Option<TicketRecord>,
    },
    ProcessingComplete {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ticket: Option<TicketRecord>,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ticket: Option<TicketRecord>,
    },
}

impl HubEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            HubEvent::InitialState { .. } => "initial_state",
            HubEvent::TicketUpdate { .. } => "ticket_update",
            HubEvent::ProcessingStart { .. } => "processing_start",
            HubEvent::ProcessingComplete { .. } => "processing_complete",
            HubEvent::Error { .. } => "error",
        }
    }

    /// Ticket snapshot carried by the event, if any
    pub fn ticket(&self) -> Option<&TicketRecord> {
        match self {
            HubEvent::InitialState { .. } => None,
            HubEvent::TicketUpdate { ticket } => Some(ticket),
            HubEvent::ProcessingStart { ticket, .. }
            | HubEvent::ProcessingComplete { ticket, .. }
            | HubEvent::Error { ticket, .. } => ticket.as_ref(),
        }
    }
}
