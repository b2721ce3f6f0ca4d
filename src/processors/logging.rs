use async_trait::async_trait;
use tracing::info;

use super::{ProcessorError, ProcessorOutcome, StageProcessor};
use crate::ticket::TicketFields;

/// Final audit entry for a processed ticket
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditLogger;

#[async_trait]
impl StageProcessor for AuditLogger {
    fn name(&self) -> &str {
        "audit_logger"
    }

    async fn process(&self, fields: TicketFields) -> Result<ProcessorOutcome, ProcessorError> {
        let risk = fields
            .risk_level
            .map(|risk| risk.to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        info!(
            ticket_id = %fields.ticket_id,
            risk_level = %risk,
            category = %fields.category,
            "Processed ticket"
        );
        Ok(ProcessorOutcome::processed(fields, "Logged successfully"))
    }
}
