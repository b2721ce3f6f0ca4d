// Fixed stage sequence for the approval pipeline
//
// The table below is the single source of truth for stage order, display
// names and checkpoint gates. Indices are 0-based internally; the `id`
// exposed on stage entries is 1-based.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Precondition satisfied by the loader, never run by the engine
    TicketFetching,
    CategoryCheck,
    SlaPrioritization,
    OwnershipEnrichment,
    AppOwnerCheck,
    EvidenceCollection,
    TicketClosure,
    Logging,
}

/// Named human checkpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    Priority,
    Review,
    Closure,
}

/// Where a stage's checkpoint sits relative to its processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Processor runs, stage completes, pipeline moves on
    None,
    /// Processor runs first, then the pipeline pauses for confirmation
    AfterProcessor(Checkpoint),
    /// Pipeline pauses on entry; the processor runs only once approved
    BeforeProcessor(Checkpoint),
}

#[derive(Debug, Clone, Copy)]
pub struct StageDefinition {
    pub stage: Stage,
    pub name: &'static str,
    pub gate: Gate,
    /// Whether a processor rejection at this stage ends the ticket for good
    pub rejection_is_terminal: bool,
}

pub const STAGE_COUNT: usize = 8;

pub const STAGE_TABLE: [StageDefinition; STAGE_COUNT] = [
    StageDefinition {
        stage: Stage::TicketFetching,
        name: "Ticket Fetching",
        gate: Gate::None,
        rejection_is_terminal: false,
    },
    StageDefinition {
        stage: Stage::CategoryCheck,
        name: "Category Check",
        gate: Gate::None,
        rejection_is_terminal: true,
    },
    StageDefinition {
        stage: Stage::SlaPrioritization,
        name: "SLA Prioritization",
        gate: Gate::AfterProcessor(Checkpoint::Priority),
        rejection_is_terminal: false,
    },
    StageDefinition {
        stage: Stage::OwnershipEnrichment,
        name: "Ownership Enrichment",
        gate: Gate::None,
        rejection_is_terminal: false,
    },
    StageDefinition {
        stage: Stage::AppOwnerCheck,
        name: "App Owner Check",
        gate: Gate::None,
        rejection_is_terminal: false,
    },
    StageDefinition {
        stage: Stage::EvidenceCollection,
        name: "Evidence Collection",
        gate: Gate::AfterProcessor(Checkpoint::Review),
        rejection_is_terminal: false,
    },
    StageDefinition {
        stage: Stage::TicketClosure,
        name: "Ticket Closure",
        gate: Gate::BeforeProcessor(Checkpoint::Closure),
        rejection_is_terminal: false,
    },
    StageDefinition {
        stage: Stage::Logging,
        name: "Logging",
        gate: Gate::None,
        rejection_is_terminal: false,
    },
];

impl Stage {
    pub const ALL: [Stage; STAGE_COUNT] = [
        Stage::TicketFetching,
        Stage::CategoryCheck,
        Stage::SlaPrioritization,
        Stage::OwnershipEnrichment,
        Stage::AppOwnerCheck,
        Stage::EvidenceCollection,
        Stage::TicketClosure,
        Stage::Logging,
    ];

    /// Last stage of the pipeline
    pub const TERMINAL: Stage = Stage::Logging;

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Stage> {
        Self::ALL.get(index).copied()
    }

    pub fn definition(self) -> &'static StageDefinition {
        &STAGE_TABLE[self.index()]
    }

    pub fn name(self) -> &'static str {
        self.definition().name
    }

    pub fn gate(self) -> Gate {
        self.definition().gate
    }

    pub fn next(self) -> Option<Stage> {
        Self::from_index(self.index() + 1)
    }

    pub fn is_terminal(self) -> bool {
        self == Self::TERMINAL
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Checkpoint {
    pub const ALL: [Checkpoint; 3] = [Checkpoint::Priority, Checkpoint::Review, Checkpoint::Closure];

    /// Stage that owns this checkpoint
    pub fn stage(self) -> Stage {
        match self {
            Checkpoint::Priority => Stage::SlaPrioritization,
            Checkpoint::Review => Stage::EvidenceCollection,
            Checkpoint::Closure => Stage::TicketClosure,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Checkpoint::Priority => "priority",
            Checkpoint::Review => "review",
            Checkpoint::Closure => "closure",
        }
    }

    /// Stage message shown while the pipeline is paused here
    pub fn waiting_message(self) -> &'static str {
        match self {
            Checkpoint::Priority => "Waiting for priority confirmation",
            Checkpoint::Review => "Waiting for application team review",
            Checkpoint::Closure => "Waiting for final closure confirmation",
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Checkpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "priority" => Ok(Checkpoint::Priority),
            "review" => Ok(Checkpoint::Review),
            "closure" => Ok(Checkpoint::Closure),
            other => Err(format!("unknown checkpoint '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_order_matches_enum() {
        for (index, definition) in STAGE_TABLE.iter().enumerate() {
            assert_eq!(definition.stage.index(), index);
            assert_eq!(Stage::from_index(index), Some(definition.stage));
        }
        assert_eq!(Stage::from_index(STAGE_COUNT), None);
    }

    #[test]
    fn test_checkpoints_point_at_gated_stages() {
        for checkpoint in Checkpoint::ALL {
            match checkpoint.stage().gate() {
                Gate::AfterProcessor(c) | Gate::BeforeProcessor(c) => assert_eq!(c, checkpoint),
                Gate::None => panic!("{checkpoint} stage has no gate"),
            }
        }
    }

    #[test]
    fn test_only_category_check_rejects_terminally() {
        let terminal: Vec<Stage> = STAGE_TABLE
            .iter()
            .filter(|s| s.rejection_is_terminal)
            .map(|s| s.stage)
            .collect();
        assert_eq!(terminal, vec![Stage::CategoryCheck]);
    }

    #[test]
    fn test_checkpoint_parsing() {
        assert_eq!("Priority".parse::<Checkpoint>(), Ok(Checkpoint::Priority));
        assert_eq!(" closure ".parse::<Checkpoint>(), Ok(Checkpoint::Closure));
        assert!("approval".parse::<Checkpoint>().is_err());
    }
}
