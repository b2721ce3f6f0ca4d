// Ticket record model
//
// A record is split into business fields (what stage processors read and
// rewrite) and workflow-control fields (owned by the workflow engine).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::stages::{Checkpoint, Stage, STAGE_COUNT};

pub type TicketId = String;

/// Risk classification assigned by SLA prioritization or a human override
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Unknown,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
            RiskLevel::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "unknown" => Ok(RiskLevel::Unknown),
            other => Err(format!("unknown risk level '{other}'")),
        }
    }
}

impl TryFrom<String> for RiskLevel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Evidence request drafted during evidence collection (never sent by the engine)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRequest {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Business data carried by a ticket
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketFields {
    pub ticket_id: TicketId,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub deliverable_type: Option<String>,
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub sla_deadline: Option<String>,
    #[serde(default)]
    pub created_on: Option<String>,
    #[serde(default)]
    pub ait_number: Option<String>,
    #[serde(default)]
    pub application_name: Option<String>,
    #[serde(default)]
    pub application_owner: Option<String>,
    #[serde(default)]
    pub lob_owner: Option<String>,
    #[serde(default)]
    pub ait_owner: Option<String>,
    #[serde(default)]
    pub arm_id: Option<String>,
    #[serde(default)]
    pub contacts: Vec<String>,
    #[serde(default)]
    pub evidence_request: Option<EvidenceRequest>,
}

impl TicketFields {
    pub fn new(ticket_id: impl Into<TicketId>, category: impl Into<String>) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            category: category.into(),
            ..Default::default()
        }
    }
}

/// Overall ticket status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TicketStatus {
    NotStarted,
    InProgress,
    Completed,
}

/// Per-stage status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageStatus {
    Pending,
    InProgress,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEntry {
    /// 1-based display id
    pub id: usize,
    pub name: String,
    pub status: StageStatus,
    pub message: String,
}

/// Versioned state document for one ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRecord {
    #[serde(flatten)]
    pub fields: TicketFields,
    pub current_stage: usize,
    pub status: TicketStatus,
    pub stages: Vec<StageEntry>,
    pub waiting_for_priority_confirmation: bool,
    pub waiting_for_review: bool,
    pub waiting_for_closure_confirmation: bool,
    pub closure_approved: bool,
    /// Bumped on every mutation applied by the engine
    pub version: u64,
}

impl TicketRecord {
    /// Create a record for a freshly fetched ticket
    pub fn new(fields: TicketFields) -> Self {
        let mut stages: Vec<StageEntry> = Stage::ALL
            .iter()
            .map(|stage| StageEntry {
                id: stage.index() + 1,
                name: stage.name().to_string(),
                status: StageStatus::Pending,
                message: String::new(),
            })
            .collect();
        stages[Stage::TicketFetching.index()].status = StageStatus::Completed;
        stages[Stage::TicketFetching.index()].message = "Ticket fetched successfully".to_string();

        Self {
            fields,
            current_stage: Stage::TicketFetching.index(),
            status: TicketStatus::NotStarted,
            stages,
            waiting_for_priority_confirmation: false,
            waiting_for_review: false,
            waiting_for_closure_confirmation: false,
            closure_approved: false,
            version: 0,
        }
    }

    pub fn ticket_id(&self) -> &str {
        &self.fields.ticket_id
    }

    /// Stage the pipeline is positioned at
    pub fn stage(&self) -> Stage {
        Stage::from_index(self.current_stage).unwrap_or(Stage::TERMINAL)
    }

    pub fn stage_entry(&self, stage: Stage) -> &StageEntry {
        &self.stages[stage.index()]
    }

    pub fn stage_status(&self, stage: Stage) -> StageStatus {
        self.stage_entry(stage).status
    }

    pub fn checkpoint_flag(&self, checkpoint: Checkpoint) -> bool {
        match checkpoint {
            Checkpoint::Priority => self.waiting_for_priority_confirmation,
            Checkpoint::Review => self.waiting_for_review,
            Checkpoint::Closure => self.waiting_for_closure_confirmation,
        }
    }

    /// Checkpoint the pipeline is currently paused at, if any
    pub fn awaiting(&self) -> Option<Checkpoint> {
        Checkpoint::ALL
            .into_iter()
            .find(|checkpoint| self.checkpoint_flag(*checkpoint))
    }

    /// True once a checkpoint has been confirmed for this ticket
    pub fn is_checkpoint_cleared(&self, checkpoint: Checkpoint) -> bool {
        if self.checkpoint_flag(checkpoint) {
            return false;
        }
        let stage = checkpoint.stage();
        if self.current_stage > stage.index() {
            return true;
        }
        match checkpoint {
            Checkpoint::Closure => self.closure_approved,
            Checkpoint::Priority | Checkpoint::Review => {
                self.current_stage == stage.index()
                    && self.stage_status(stage) == StageStatus::Completed
            }
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TicketStatus::Completed
    }

    /// Completed through a policy rejection rather than by finishing the pipeline
    pub fn is_rejected(&self) -> bool {
        self.is_completed() && self.stage_status(self.stage()) == StageStatus::Error
    }

    pub(crate) fn set_checkpoint_flag(&mut self, checkpoint: Checkpoint, value: bool) {
        match checkpoint {
            Checkpoint::Priority => self.waiting_for_priority_confirmation = value,
            Checkpoint::Review => self.waiting_for_review = value,
            Checkpoint::Closure => self.waiting_for_closure_confirmation = value,
        }
    }

    /// Move the pipeline position forward; never moves backwards
    pub(crate) fn enter_stage(&mut self, stage: Stage) {
        self.current_stage = self.current_stage.max(stage.index());
    }

    pub(crate) fn set_stage_status(
        &mut self,
        stage: Stage,
        status: StageStatus,
        message: impl Into<String>,
    ) {
        let entry = &mut self.stages[stage.index()];
        entry.status = status;
        entry.message = message.into();
        if status == StageStatus::InProgress && self.status == TicketStatus::NotStarted {
            self.status = TicketStatus::InProgress;
        }
        self.version += 1;
    }

    /// Merge processor output, keeping the immutable ticket id
    pub(crate) fn merge_fields(&mut self, mut output: TicketFields) {
        output.ticket_id = std::mem::take(&mut self.fields.ticket_id);
        self.fields = output;
    }

    pub(crate) fn mark_completed(&mut self) {
        self.status = TicketStatus::Completed;
        self.version += 1;
    }

    /// Invariants the engine maintains; used by tests and debug assertions
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.stages.len() != STAGE_COUNT {
            return Err(format!("expected {STAGE_COUNT} stage entries"));
        }
        let raised = Checkpoint::ALL
            .iter()
            .filter(|c| self.checkpoint_flag(**c))
            .count();
        if raised > 1 {
            return Err(format!("{raised} checkpoint flags raised at once"));
        }
        if let Some(entry) = self.stages[self.current_stage + 1..]
            .iter()
            .find(|entry| entry.status != StageStatus::Pending)
        {
            return Err(format!("stage '{}' beyond current stage is not pending", entry.name));
        }
        if self.is_completed() {
            if raised > 0 {
                return Err("completed ticket still awaits a checkpoint".to_string());
            }
            if !self.stage().is_terminal() && !self.is_rejected() {
                return Err("completed ticket stopped before the terminal stage".to_string());
            }
        }
        Ok(())
    }
}
