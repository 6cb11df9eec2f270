//! Line-based stand-in for speech-to-text and the kiosk devices.
//!
//! Every line typed on stdin is either a slash command or a player utterance.

use cafe_quest_core::machine::ActionGate;
use cafe_quest_core::orchestrator::Input;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Walk up to the counter.
    Start,
    Restart,
    Reprompt,
    /// A device reported that an action finished.
    Action(ActionGate),
    Quit,
    Help,
    /// Anything else is treated as a transcript.
    Say(String),
    Unknown(String),
}

pub const HELP: &str = "\
/start    talk to the barista
/restart  start the order over
/reprompt ask the barista to repeat
/paid     payment terminal approved
/handed   receipt and drink handed over
/said     farewell finished playing
/quit     leave";

impl ConsoleCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Some(Self::Say(line.to_string()));
        };
        Some(match command.to_lowercase().as_str() {
            "start" => Self::Start,
            "restart" => Self::Restart,
            "reprompt" => Self::Reprompt,
            "confirm" => Self::Action(ActionGate::Confirmed),
            "paid" => Self::Action(ActionGate::PaymentApproved),
            "handed" => Self::Action(ActionGate::ReceiptHanded),
            "said" => Self::Action(ActionGate::FarewellSaid),
            "quit" | "exit" => Self::Quit,
            "help" => Self::Help,
            _ => Self::Unknown(line.to_string()),
        })
    }

    /// The orchestrator input this command maps to directly, if any.
    /// `Start` and `Restart` go through [`crate::game::GameFlow`] first.
    pub fn as_input(&self) -> Option<Input> {
        match self {
            Self::Reprompt => Some(Input::Reprompt),
            Self::Action(gate) => Some(Input::ActionCompleted(*gate)),
            Self::Say(text) => Some(Input::Transcript(text.clone())),
            _ => None,
        }
    }
}
