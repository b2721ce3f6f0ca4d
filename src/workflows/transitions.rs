// Stage transition table
//
// Maps (stage, event) to (next stage, side effect). The engine drives a
// ticket by feeding events into `transition` and performing the returned
// effect; checkpoint gating lives here rather than in engine control flow.

use crate::ticket::{Checkpoint, Gate, Stage};

/// Events observed by a ticket while positioned at a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    /// The pipeline is positioned at a stage that still has work to do
    Entered,
    ProcessorSucceeded,
    ProcessorRejected,
    Resumed(Checkpoint),
}

/// Work the engine performs for a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    InvokeProcessor,
    /// Raise the checkpoint flag and halt advancement
    AwaitCheckpoint(Checkpoint),
    /// Mark the stage completed and move on to `next_stage`
    CompleteStage,
    /// Clear the closure flag and record approval; the processor runs next
    ApproveClosure,
    /// Mark the last stage completed and the ticket completed
    FinishPipeline,
    /// Mark the stage failed and the ticket completed; no resume restarts it
    HaltTerminal,
    /// Mark the stage failed but leave the ticket resumable by a new advance
    FailStage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next_stage: Stage,
    pub effect: SideEffect,
}

impl Transition {
    fn stay(stage: Stage, effect: SideEffect) -> Self {
        Self {
            next_stage: stage,
            effect,
        }
    }
}

/// Look up the transition for `event` at `stage`.
///
/// `closure_approved` selects the second phase of the two-phase closure gate.
/// `None` means the event is not valid at this stage.
pub fn transition(stage: Stage, event: StageEvent, closure_approved: bool) -> Option<Transition> {
    let gate = stage.gate();
    match (gate, event) {
        // The fetching precondition is satisfied by the loader
        (_, _) if stage == Stage::TicketFetching => None,

        (Gate::BeforeProcessor(checkpoint), StageEvent::Entered) if !closure_approved => {
            Some(Transition::stay(stage, SideEffect::AwaitCheckpoint(checkpoint)))
        }
        (_, StageEvent::Entered) => Some(Transition::stay(stage, SideEffect::InvokeProcessor)),

        (Gate::AfterProcessor(checkpoint), StageEvent::ProcessorSucceeded) => {
            Some(Transition::stay(stage, SideEffect::AwaitCheckpoint(checkpoint)))
        }
        (_, StageEvent::ProcessorSucceeded) => match stage.next() {
            Some(next) => Some(Transition {
                next_stage: next,
                effect: SideEffect::CompleteStage,
            }),
            None => Some(Transition::stay(stage, SideEffect::FinishPipeline)),
        },

        (_, StageEvent::ProcessorRejected) if stage.definition().rejection_is_terminal => {
            Some(Transition::stay(stage, SideEffect::HaltTerminal))
        }
        (_, StageEvent::ProcessorRejected) => Some(Transition::stay(stage, SideEffect::FailStage)),

        (Gate::AfterProcessor(gated), StageEvent::Resumed(checkpoint)) if gated == checkpoint => {
            stage.next().map(|next| Transition {
                next_stage: next,
                effect: SideEffect::CompleteStage,
            })
        }
        (Gate::BeforeProcessor(gated), StageEvent::Resumed(checkpoint))
            if gated == checkpoint && !closure_approved =>
        {
            Some(Transition::stay(stage, SideEffect::ApproveClosure))
        }
        (_, StageEvent::Resumed(_)) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_stage_runs_processor_then_completes() {
        let entered = transition(Stage::CategoryCheck, StageEvent::Entered, false).unwrap();
        assert_eq!(entered.effect, SideEffect::InvokeProcessor);

        let done = transition(Stage::CategoryCheck, StageEvent::ProcessorSucceeded, false).unwrap();
        assert_eq!(done.effect, SideEffect::CompleteStage);
        assert_eq!(done.next_stage, Stage::SlaPrioritization);
    }

    #[test]
    fn test_priority_pauses_after_processor() {
        let t = transition(Stage::SlaPrioritization, StageEvent::ProcessorSucceeded, false).unwrap();
        assert_eq!(t.effect, SideEffect::AwaitCheckpoint(Checkpoint::Priority));
        assert_eq!(t.next_stage, Stage::SlaPrioritization);

        let resumed = transition(
            Stage::SlaPrioritization,
            StageEvent::Resumed(Checkpoint::Priority),
            false,
        )
        .unwrap();
        assert_eq!(resumed.effect, SideEffect::CompleteStage);
        assert_eq!(resumed.next_stage, Stage::OwnershipEnrichment);
    }

    #[test]
    fn test_closure_is_two_phase() {
        let first = transition(Stage::TicketClosure, StageEvent::Entered, false).unwrap();
        assert_eq!(first.effect, SideEffect::AwaitCheckpoint(Checkpoint::Closure));

        let approve = transition(
            Stage::TicketClosure,
            StageEvent::Resumed(Checkpoint::Closure),
            false,
        )
        .unwrap();
        assert_eq!(approve.effect, SideEffect::ApproveClosure);

        let second = transition(Stage::TicketClosure, StageEvent::Entered, true).unwrap();
        assert_eq!(second.effect, SideEffect::InvokeProcessor);

        assert_eq!(
            transition(Stage::TicketClosure, StageEvent::Resumed(Checkpoint::Closure), true),
            None
        );
    }

    #[test]
    fn test_rejections_split_terminal_and_resumable() {
        let category = transition(Stage::CategoryCheck, StageEvent::ProcessorRejected, false).unwrap();
        assert_eq!(category.effect, SideEffect::HaltTerminal);

        let owner = transition(Stage::AppOwnerCheck, StageEvent::ProcessorRejected, false).unwrap();
        assert_eq!(owner.effect, SideEffect::FailStage);
    }

    #[test]
    fn test_mismatched_resume_has_no_entry() {
        assert_eq!(
            transition(Stage::SlaPrioritization, StageEvent::Resumed(Checkpoint::Review), false),
            None
        );
        assert_eq!(
            transition(Stage::OwnershipEnrichment, StageEvent::Resumed(Checkpoint::Priority), false),
            None
        );
    }

    #[test]
    fn test_logging_finishes_pipeline() {
        let t = transition(Stage::Logging, StageEvent::ProcessorSucceeded, false).unwrap();
        assert_eq!(t.effect, SideEffect::FinishPipeline);
    }

    #[test]
    fn test_fetching_is_never_driven() {
        assert_eq!(transition(Stage::TicketFetching, StageEvent::Entered, false), None);
    }
}
