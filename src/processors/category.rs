use async_trait::async_trait;

use super::{ProcessorError, ProcessorOutcome, StageProcessor};
use crate::ticket::TicketFields;

/// Keeps only tickets in the required category
#[derive(Debug, Clone)]
pub struct CategoryCheck {
    required_category: String,
}

impl CategoryCheck {
    pub fn new(required_category: impl Into<String>) -> Self {
        Self {
            required_category: required_category.into(),
        }
    }
}

#[async_trait]
impl StageProcessor for CategoryCheck {
    fn name(&self) -> &str {
        "category_check"
    }

    async fn process(&self, mut fields: TicketFields) -> Result<ProcessorOutcome, ProcessorError> {
        let category = fields.category.trim();
        if !category.eq_ignore_ascii_case(&self.required_category) {
            return Ok(ProcessorOutcome::rejected(format!(
                "Not an {} ticket (Category: {})",
                self.required_category,
                if category.is_empty() { "none" } else { category }
            )));
        }

        let summary = format!("Confirmed: {} ticket", fields.category);
        fields.deliverable_type = Some(format!("{} Category", self.required_category));
        Ok(ProcessorOutcome::processed(fields, summary))
    }
}
