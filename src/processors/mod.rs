// Stage processors - deterministic transforms applied to a ticket at one stage
//
// The engine treats every processor as an external collaborator: it hands
// over a snapshot of the business fields and merges whatever comes back.

pub mod app_owner;
pub mod category;
pub mod closure;
pub mod evidence;
pub mod logging;
pub mod ownership;
pub mod sla;

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ProcessorConfig;
use crate::loader::{load_ownership_records, LoaderError};
use crate::ticket::{Stage, TicketFields};

pub use app_owner::AppOwnerCheck;
pub use category::CategoryCheck;
pub use closure::TicketCloser;
pub use evidence::EvidenceCollector;
pub use logging::AuditLogger;
pub use ownership::{OwnershipEnrichment, OwnershipRecord};
pub use sla::SlaPrioritizer;

/// Result of running a processor over one ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorOutcome {
    /// Updated fields plus a one-line summary for the stage entry
    Processed { fields: TicketFields, summary: String },
    /// The ticket was filtered out by the stage's policy
    Rejected { reason: String },
}

impl ProcessorOutcome {
    pub fn processed(fields: TicketFields, summary: impl Into<String>) -> Self {
        ProcessorOutcome::Processed {
            fields,
            summary: summary.into(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        ProcessorOutcome::Rejected {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Invalid ticket data: {0}")]
    InvalidInput(String),
    #[error("Lookup failed: {0}")]
    Lookup(String),
    #[error("Processor unavailable: {0}")]
    Unavailable(String),
}

/// A deterministic transform for one pipeline stage
#[async_trait]
pub trait StageProcessor: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    async fn process(&self, fields: TicketFields) -> Result<ProcessorOutcome, ProcessorError>;
}

/// Processors keyed by the stage they serve
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<Stage, Arc<dyn StageProcessor>>,
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stages: Vec<_> = self.processors.keys().collect();
        stages.sort();
        f.debug_struct("ProcessorRegistry")
            .field("stages", &stages)
            .finish()
    }
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry populated with the built-in processors for every engine-driven stage
    pub fn standard(config: &ProcessorConfig) -> Result<Self, LoaderError> {
        let ownership = OwnershipEnrichment::new(match &config.ownership_data_file {
            Some(path) => load_ownership_records(path)?,
            None => Vec::new(),
        });
        if ownership.is_empty() {
            debug!("No ownership records loaded; enrichment will pass tickets through");
        } else {
            info!(applications = ownership.len(), "Ownership directory loaded");
        }

        Ok(Self::new()
            .with(
                Stage::CategoryCheck,
                CategoryCheck::new(config.required_category.clone()),
            )
            .with(
                Stage::SlaPrioritization,
                SlaPrioritizer::new(config.high_risk_days, config.medium_risk_days),
            )
            .with(Stage::OwnershipEnrichment, ownership)
            .with(
                Stage::AppOwnerCheck,
                AppOwnerCheck::new(
                    config.allowed_owner_spaces.clone(),
                    config.allowed_owner_domains.clone(),
                ),
            )
            .with(Stage::EvidenceCollection, EvidenceCollector)
            .with(Stage::TicketClosure, TicketCloser)
            .with(Stage::Logging, AuditLogger))
    }

    pub fn with(mut self, stage: Stage, processor: impl StageProcessor + 'static) -> Self {
        self.register(stage, Arc::new(processor));
        self
    }

    pub fn register(&mut self, stage: Stage, processor: Arc<dyn StageProcessor>) {
        self.processors.insert(stage, processor);
    }

    pub fn get(&self, stage: Stage) -> Option<Arc<dyn StageProcessor>> {
        self.processors.get(&stage).cloned()
    }
}
