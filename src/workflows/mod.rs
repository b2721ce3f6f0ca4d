// Workflow orchestration: the stage transition table and the engine that drives it

pub mod engine;
pub mod errors;
pub mod transitions;

pub use engine::{AdvanceOutcome, ResumeOutcome, ResumePayload, WorkflowEngine};
pub use errors::WorkflowError;
pub use transitions::{transition, SideEffect, StageEvent, Transition};
