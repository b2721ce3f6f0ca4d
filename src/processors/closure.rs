use async_trait::async_trait;

use super::{ProcessorError, ProcessorOutcome, StageProcessor};
use crate::ticket::TicketFields;

pub const CLOSURE_NOTE: &str = "Evidence attached, ticket closed.";

/// Appends the closure note to the ticket description
#[derive(Debug, Clone, Copy, Default)]
pub struct TicketCloser;

#[async_trait]
impl StageProcessor for TicketCloser {
    fn name(&self) -> &str {
        "ticket_closer"
    }

    async fn process(&self, mut fields: TicketFields) -> Result<ProcessorOutcome, ProcessorError> {
        if !fields.description.ends_with(CLOSURE_NOTE) {
            if fields.description.is_empty() {
                fields.description = CLOSURE_NOTE.to_string();
            } else {
                fields.description = format!("{} | {}", fields.description, CLOSURE_NOTE);
            }
        }
        Ok(ProcessorOutcome::processed(fields, "Ticket closed"))
    }
}
