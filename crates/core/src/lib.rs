pub mod intent;
pub mod machine;
pub mod orchestrator;
pub mod order;
pub mod prompt;
pub mod quest;
pub mod steps;

use steps::Step;

/// Represents commands that the core logic (`Orchestrator`) issues to the runtime.
///
/// This enum is the primary API for decoupling the conversation's decisions
/// from the runtime's execution of side effects (speaking, drawing the HUD,
/// ending the quest).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Command the runtime to speak the given NPC line to the player.
    Speak(String),
    /// Show what the player said, as transcribed.
    ShowPlayerText(String),
    /// The conversation entered a new step.
    StepChanged(Step),
    /// The order satisfied the quest and the conversation reached `Step::Success`.
    QuestSucceeded,
    /// The order was rejected by the quest rule; carries the reason.
    QuestFailed(String),
}
