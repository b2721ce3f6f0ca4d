use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{ProcessorError, ProcessorOutcome, StageProcessor};
use crate::ticket::TicketFields;

/// Ownership details for one application, keyed by AIT number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipRecord {
    pub ait_number: String,
    #[serde(default)]
    pub application_name: Option<String>,
    #[serde(default)]
    pub application_owner: Option<String>,
    #[serde(default)]
    pub lob_owner: Option<String>,
    #[serde(default)]
    pub ait_owner: Option<String>,
    #[serde(default)]
    pub contacts: Vec<String>,
}

/// Copies ownership details onto tickets from an in-memory directory
#[derive(Debug, Clone, Default)]
pub struct OwnershipEnrichment {
    directory: HashMap<String, OwnershipRecord>,
}

impl OwnershipEnrichment {
    pub fn new(records: Vec<OwnershipRecord>) -> Self {
        let directory = records
            .into_iter()
            .map(|record| (record.ait_number.clone(), record))
            .collect();
        Self { directory }
    }

    pub fn len(&self) -> usize {
        self.directory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directory.is_empty()
    }
}

#[async_trait]
impl StageProcessor for OwnershipEnrichment {
    fn name(&self) -> &str {
        "ownership_enrichment"
    }

    async fn process(&self, mut fields: TicketFields) -> Result<ProcessorOutcome, ProcessorError> {
        let Some(ait_number) = fields.ait_number.clone() else {
            let summary = format!(
                "No AIT number; owner: {}",
                fields.lob_owner.as_deref().unwrap_or("Unknown")
            );
            return Ok(ProcessorOutcome::processed(fields, summary));
        };

        let Some(record) = self.directory.get(&ait_number) else {
            let summary = format!("No ownership record for AIT {ait_number}");
            return Ok(ProcessorOutcome::processed(fields, summary));
        };

        fields.application_name = record.application_name.clone();
        fields.application_owner = record.application_owner.clone();
        fields.lob_owner = record.lob_owner.clone();
        fields.ait_owner = record.ait_owner.clone();
        fields.contacts = record.contacts.clone();

        let summary = format!(
            "Owner: {}",
            fields.lob_owner.as_deref().unwrap_or("Unknown")
        );
        Ok(ProcessorOutcome::processed(fields, summary))
    }
}
