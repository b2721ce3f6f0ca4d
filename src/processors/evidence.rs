use async_trait::async_trait;

use super::{ProcessorError, ProcessorOutcome, StageProcessor};
use crate::ticket::{EvidenceRequest, TicketFields};

/// Drafts the evidence request for the application team.
///
/// The draft is stored on the ticket for human review; nothing is sent.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvidenceCollector;

impl EvidenceCollector {
    pub fn draft(fields: &TicketFields) -> EvidenceRequest {
        let application = fields
            .application_name
            .as_deref()
            .unwrap_or("your application");
        let greeting = fields.ait_owner.as_deref().unwrap_or("team");

        EvidenceRequest {
            recipients: fields.contacts.clone(),
            subject: format!("[{}] Evidence request for {}", fields.ticket_id, application),
            body: format!(
                "Hello {greeting},\n\n\
                 Ticket {} requires evidence before it can be closed:\n{}\n\n\
                 Please reply with the supporting evidence.",
                fields.ticket_id, fields.description
            ),
        }
    }
}

#[async_trait]
impl StageProcessor for EvidenceCollector {
    fn name(&self) -> &str {
        "evidence_collector"
    }

    async fn process(&self, mut fields: TicketFields) -> Result<ProcessorOutcome, ProcessorError> {
        if fields.contacts.is_empty() {
            return Err(ProcessorError::InvalidInput(format!(
                "ticket {} has no contacts to request evidence from",
                fields.ticket_id
            )));
        }
        let request = Self::draft(&fields);
        let summary = format!(
            "Evidence request drafted for {} contact(s)",
            request.recipients.len()
        );
        fields.evidence_request = Some(request);
        Ok(ProcessorOutcome::processed(fields, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drafts_request_for_contacts() {
        let mut fields = TicketFields::new("T7", "IAM");
        fields.contacts = vec!["a@example.com".to_string(), "b@example.com".to_string()];
        fields.application_name = Some("Payroll".to_string());

        let ProcessorOutcome::Processed { fields, summary } =
            EvidenceCollector.process(fields).await.unwrap()
        else {
            panic!("expected processed outcome");
        };
        let request = fields.evidence_request.unwrap();
        assert_eq!(request.recipients.len(), 2);
        assert!(request.subject.contains("T7"));
        assert_eq!(summary, "Evidence request drafted for 2 contact(s)");
    }

    #[tokio::test]
    async fn test_no_contacts_is_an_error() {
        let result = EvidenceCollector.process(TicketFields::new("T7", "IAM")).await;
        assert!(matches!(result, Err(ProcessorError::InvalidInput(_))));
    }
}
