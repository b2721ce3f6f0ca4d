// Ticket Pipeline Library - checkpointed stage workflow for governance tickets
// This exposes the core components for the CLI, testing and integration

pub mod config;
pub mod gateway;
pub mod loader;
pub mod notifications;
pub mod observability;
pub mod processors;
pub mod telemetry;
pub mod ticket;
pub mod workflows;

// Re-export key types for easy access
pub use config::PipelineConfig;
pub use gateway::{AckStatus, CommandAck, CommandGateway, GatewayError};
pub use loader::{load_ownership_records, load_tickets, LoaderError};
pub use notifications::{HubEvent, NotificationHub, ObserverId, Subscription};
pub use observability::{EngineMetrics, EngineStats, OperationTimer};
pub use processors::{ProcessorError, ProcessorOutcome, ProcessorRegistry, StageProcessor};
pub use telemetry::{create_ticket_span, generate_correlation_id, init_telemetry, shutdown_telemetry};
pub use ticket::{
    Checkpoint, RiskLevel, Stage, StageStatus, TicketFields, TicketRecord, TicketStatus,
};
pub use workflows::{AdvanceOutcome, ResumeOutcome, ResumePayload, WorkflowEngine, WorkflowError};
