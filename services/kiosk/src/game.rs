//! Session-level flow around one conversation: the player can only start
//! talking to the barista once, and the quest ends on success.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GamePhase {
    #[default]
    Idle,
    FaceToFace,
    Completed,
}

#[derive(Debug, Default)]
pub struct GameFlow {
    phase: GamePhase,
}

impl GameFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    /// Returns `false` when a conversation is already running or the quest is
    /// over; the caller must not send `Begin` then.
    pub fn try_start(&mut self) -> bool {
        match self.phase {
            GamePhase::Idle => {
                self.phase = GamePhase::FaceToFace;
                tracing::info!("Face-to-face conversation started.");
                true
            }
            GamePhase::FaceToFace => {
                tracing::warn!("Already talking to the barista; start ignored.");
                false
            }
            GamePhase::Completed => {
                tracing::warn!("Quest already completed; start ignored.");
                false
            }
        }
    }

    /// Restarting is only meaningful mid-conversation.
    pub fn try_restart(&self) -> bool {
        self.phase == GamePhase::FaceToFace
    }

    pub fn complete(&mut self) {
        tracing::info!("Quest completed.");
        self.phase = GamePhase::Completed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_start_is_refused() {
        let mut game = GameFlow::new();
        assert!(game.try_start());
        assert!(!game.try_start());
        assert_eq!(game.phase(), GamePhase::FaceToFace);
    }

    #[test]
    fn completed_quest_cannot_be_restarted() {
        let mut game = GameFlow::new();
        assert!(!game.try_restart());
        game.try_start();
        assert!(game.try_restart());

        game.complete();

        assert!(!game.try_start());
        assert!(!game.try_restart());
    }
}
