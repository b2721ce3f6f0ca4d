// Ticket record model and the fixed stage table

pub mod stages;
pub mod types;

pub use stages::{Checkpoint, Gate, Stage, StageDefinition, STAGE_COUNT, STAGE_TABLE};
pub use types::{
    EvidenceRequest, RiskLevel, StageEntry, StageStatus, TicketFields, TicketId, TicketRecord,
    TicketStatus,
};
