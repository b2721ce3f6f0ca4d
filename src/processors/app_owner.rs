use async_trait::async_trait;

use super::{ProcessorError, ProcessorOutcome, StageProcessor};
use crate::ticket::TicketFields;

/// Verifies the application owner belongs to a space this team handles
#[derive(Debug, Clone)]
pub struct AppOwnerCheck {
    allowed_spaces: Vec<String>,
    allowed_domains: Vec<String>,
}

impl AppOwnerCheck {
    pub fn new(allowed_spaces: Vec<String>, allowed_domains: Vec<String>) -> Self {
        Self {
            allowed_spaces,
            allowed_domains,
        }
    }

    fn is_allowed(&self, owner: &str) -> bool {
        if self.allowed_spaces.iter().any(|space| space == owner) {
            return true;
        }
        owner
            .rsplit_once('@')
            .map(|(_, domain)| {
                self.allowed_domains
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(domain))
            })
            .unwrap_or(false)
    }
}

#[async_trait]
impl StageProcessor for AppOwnerCheck {
    fn name(&self) -> &str {
        "app_owner_check"
    }

    async fn process(&self, fields: TicketFields) -> Result<ProcessorOutcome, ProcessorError> {
        match fields.application_owner.as_deref() {
            Some(owner) if self.is_allowed(owner) => {
                let summary = format!("App owner verified ({owner})");
                Ok(ProcessorOutcome::processed(fields, summary))
            }
            Some(owner) => Ok(ProcessorOutcome::rejected(format!(
                "App owner {owner} is outside the allowed spaces"
            ))),
            None => Ok(ProcessorOutcome::rejected("Ticket has no application owner")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check() -> AppOwnerCheck {
        AppOwnerCheck::new(
            vec!["IAM-Space".to_string(), "Security-Space".to_string()],
            vec!["example.com".to_string()],
        )
    }

    #[test]
    fn test_spaces_and_domains() {
        let check = check();
        assert!(check.is_allowed("IAM-Space"));
        assert!(check.is_allowed("owner@Example.com"));
        assert!(!check.is_allowed("Finance-Space"));
        assert!(!check.is_allowed("owner@elsewhere.org"));
    }

    #[tokio::test]
    async fn test_missing_owner_is_rejected() {
        let outcome = check().process(TicketFields::new("T1", "IAM")).await.unwrap();
        assert!(matches!(outcome, ProcessorOutcome::Rejected { .. }));
    }
}
