use crate::{
    Command,
    intent::IntentRouter,
    machine::{ActionGate, Advance, DialogueStateMachine, HoldReason},
    order::OrderState,
    prompt::PromptComposer,
    steps::{self, Step},
};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Events fed into a running [`Orchestrator`], one at a time in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Start the conversation, or restart it from scratch.
    Begin,
    /// One completed utterance from speech-to-text.
    Transcript(String),
    /// Ask the current question again now.
    Reprompt,
    /// An external device (payment terminal, printer, TTS) finished its action.
    ActionCompleted(ActionGate),
    /// A timer scheduled by the orchestrator itself fired.
    Timer { token: TimerToken, kind: TimerKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// `seq` must match the latest reprompt started; older ones were replaced.
    Reprompt { seq: u64 },
    Action(ActionGate),
}

/// Identifies the session generation and step entry a timer was scheduled
/// under. A timer whose token no longer matches is stale and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken {
    pub generation: u64,
    pub epoch: u64,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// `None` disables the no-answer reprompt.
    pub reprompt_after: Option<Duration>,
    /// Complete payment, hand-off and farewell on timers (mock devices).
    pub auto_complete_actions: bool,
    pub payment_delay: Duration,
    pub handoff_delay: Duration,
    pub farewell_delay: Duration,
    /// Echo each transcript to the player's HUD.
    pub mirror_transcript: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            reprompt_after: Some(Duration::from_secs(6)),
            auto_complete_actions: true,
            payment_delay: Duration::from_millis(800),
            handoff_delay: Duration::from_millis(600),
            farewell_delay: Duration::from_millis(500),
            mirror_transcript: true,
        }
    }
}

/// What the orchestrator logs on every step entry.
#[derive(Debug, Serialize)]
struct OrderSnapshot<'a> {
    step: Step,
    order: &'a OrderState,
}

/// Creates the input queue for an orchestrator.
pub fn input_channel(capacity: usize) -> (mpsc::Sender<Input>, mpsc::Receiver<Input>) {
    mpsc::channel(capacity)
}

/// Drives one conversation: routes transcripts, advances the state machine,
/// speaks prompts and runs the timers for reprompts and mock device actions.
///
/// All state is mutated from `handle_input`, which `run` calls for one input
/// at a time, so no two transcripts are ever applied concurrently.
pub struct Orchestrator {
    fsm: DialogueStateMachine,
    router: IntentRouter,
    prompts: PromptComposer,
    config: OrchestratorConfig,
    command_tx: mpsc::Sender<Command>,
    // Weak so pending timers alone never keep the loop alive after the
    // runtime drops its senders.
    self_tx: mpsc::WeakSender<Input>,
    generation: u64,
    epoch: u64,
    reprompt_seq: u64,
    // Set by a failed quest check: steps answered on the first pass are
    // skipped until the next `Begin`.
    recovering: bool,
    reprompt_timer: Option<JoinHandle<()>>,
    action_timers: Vec<JoinHandle<()>>,
    last_player_text: Option<String>,
}

impl Orchestrator {
    pub fn new(
        fsm: DialogueStateMachine,
        router: IntentRouter,
        prompts: PromptComposer,
        config: OrchestratorConfig,
        command_tx: mpsc::Sender<Command>,
        input_tx: &mpsc::Sender<Input>,
    ) -> Self {
        Self {
            fsm,
            router,
            prompts,
            config,
            command_tx,
            self_tx: input_tx.downgrade(),
            generation: 0,
            epoch: 0,
            reprompt_seq: 0,
            recovering: false,
            reprompt_timer: None,
            action_timers: Vec::new(),
            last_player_text: None,
        }
    }

    pub fn machine(&self) -> &DialogueStateMachine {
        &self.fsm
    }

    pub fn current_step(&self) -> Step {
        self.fsm.current_step()
    }

    pub fn token(&self) -> TimerToken {
        TimerToken {
            generation: self.generation,
            epoch: self.epoch,
        }
    }

    /// The current step and order as JSON, or `None` before `Begin`.
    pub fn order_snapshot(&self) -> Option<String> {
        let order = self.fsm.order().ok()?;
        let snapshot = OrderSnapshot {
            step: self.fsm.current_step(),
            order,
        };
        match serde_json::to_string(&snapshot) {
            Ok(json) => Some(json),
            Err(e) => {
                tracing::warn!("Failed to serialize order snapshot: {}", e);
                None
            }
        }
    }

    /// Processes inputs until every sender is gone.
    pub async fn run(mut self, mut input_rx: mpsc::Receiver<Input>) {
        while let Some(input) = input_rx.recv().await {
            self.handle_input(input).await;
        }
        self.cancel_timers();
        tracing::info!("Input queue closed; orchestrator stopped.");
    }

    pub async fn handle_input(&mut self, input: Input) {
        match input {
            Input::Begin => self.begin().await,
            Input::Transcript(text) => self.handle_transcript(text).await,
            Input::Reprompt => {
                if self.fsm.is_started() {
                    self.prompt_current().await;
                }
            }
            Input::ActionCompleted(gate) => {
                if ActionGate::for_step(self.fsm.current_step()) == Some(gate) {
                    self.complete_action(gate).await;
                } else {
                    tracing::warn!(
                        "Ignoring {} completion while on step {}",
                        gate,
                        self.fsm.current_step()
                    );
                }
            }
            Input::Timer { token, kind } => {
                if token != self.token() {
                    tracing::debug!("Dropping stale {:?} timer {:?}", kind, token);
                    return;
                }
                match kind {
                    TimerKind::Reprompt { seq } if seq != self.reprompt_seq => {
                        tracing::debug!("Dropping superseded reprompt {}", seq);
                    }
                    TimerKind::Reprompt { .. } => {
                        self.reprompt_timer = None;
                        self.prompt_current().await;
                    }
                    TimerKind::Action(gate) => self.complete_action(gate).await,
                }
            }
        }
    }

    async fn begin(&mut self) {
        self.cancel_timers();
        self.generation += 1;
        self.epoch = 0;
        self.recovering = false;
        self.last_player_text = None;
        self.prompts.reset_session();

        let step = self.fsm.begin(OrderState::new());
        tracing::info!("Conversation started (generation {}).", self.generation);
        self.emit(Command::StepChanged(step)).await;
        self.say(steps::FIRST_LINE.to_string()).await;
        self.advance().await;
    }

    async fn handle_transcript(&mut self, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }

        if self.config.mirror_transcript && self.last_player_text.as_deref() != Some(text.as_str()) {
            self.emit(Command::ShowPlayerText(text.clone())).await;
            self.last_player_text = Some(text.clone());
        }

        let step = self.fsm.current_step();
        let routed = match self.fsm.order_mut() {
            Ok(order) => self.router.apply(&text, order, step),
            Err(e) => {
                tracing::warn!("Transcript \"{}\" dropped: {}", text, e);
                return;
            }
        };
        tracing::debug!("Routed \"{}\" at {}: {:?}", text, step, routed);
        if routed.affirmed {
            self.fsm.mark_confirmed();
        }

        if !self.advance().await {
            self.prompt_current().await;
        }
    }

    async fn complete_action(&mut self, gate: ActionGate) {
        tracing::debug!("{} completed on step {}", gate, self.fsm.current_step());
        self.fsm.mark(gate);
        // If the step still lacks slots the reprompt timer keeps asking.
        self.advance().await;
    }

    /// Tries to leave the current step, passing through any step that is
    /// already satisfied. Returns whether the step changed.
    async fn advance(&mut self) -> bool {
        let mut changed = false;
        loop {
            let advance = match self.fsm.try_advance() {
                Ok(advance) => advance,
                Err(e) => {
                    tracing::error!("Cannot advance: {}", e);
                    return changed;
                }
            };

            match advance {
                Advance::Held(HoldReason::MissingSlots(missing)) => {
                    tracing::debug!("Still need {:?} on {}", missing, self.fsm.current_step());
                    return changed;
                }
                Advance::Held(reason) => {
                    tracing::debug!("Holding on {}: {:?}", self.fsm.current_step(), reason);
                    return changed;
                }
                Advance::Entered(step) => {
                    changed = true;
                    if !self.recovering || self.fsm.is_blocked() {
                        self.enter_step(step).await;
                        return true;
                    }
                    tracing::info!("Passing through {} (already satisfied).", step);
                    self.emit(Command::StepChanged(step)).await;
                }
                Advance::QuestSucceeded => {
                    self.enter_step(Step::Success).await;
                    return true;
                }
                Advance::QuestFailed { reason } => {
                    self.recovering = true;
                    self.emit(Command::QuestFailed(reason)).await;
                    self.enter_step(Step::ConfirmOrder).await;
                    return true;
                }
            }
        }
    }

    /// Jumps straight to `step`, for recovery and debugging.
    pub async fn force_step(&mut self, step: Step) {
        self.fsm.force_step(step);
        self.enter_step(step).await;
    }

    async fn enter_step(&mut self, step: Step) {
        self.cancel_timers();
        self.epoch += 1;
        if let Some(snapshot) = self.order_snapshot() {
            tracing::debug!("Order snapshot: {}", snapshot);
        }
        self.emit(Command::StepChanged(step)).await;

        match step {
            Step::PaymentProcessing => {
                self.prompt_current().await;
                self.schedule_action(ActionGate::PaymentApproved, self.config.payment_delay);
            }
            Step::ReceiptHandOff => {
                self.prompt_current().await;
                self.schedule_action(ActionGate::ReceiptHanded, self.config.handoff_delay);
            }
            Step::Farewell => {
                self.say(steps::LAST_LINE.to_string()).await;
                self.schedule_action(ActionGate::FarewellSaid, self.config.farewell_delay);
            }
            Step::Success => {
                self.say(steps::SUCCESS_LINE.to_string()).await;
                self.emit(Command::QuestSucceeded).await;
            }
            _ => self.prompt_current().await,
        }
    }

    async fn prompt_current(&mut self) {
        let step = self.fsm.current_step();
        let text = match self.fsm.order() {
            Ok(order) => {
                let order = order.clone();
                self.prompts.compose(step, &order).await
            }
            Err(e) => {
                tracing::warn!("No prompt: {}", e);
                return;
            }
        };
        self.say(text).await;
        self.start_reprompt();
    }

    async fn say(&self, text: String) {
        if text.is_empty() {
            return;
        }
        tracing::info!("NPC: \"{}\"", text);
        self.emit(Command::Speak(text)).await;
    }

    async fn emit(&self, command: Command) {
        if let Err(e) = self.command_tx.send(command).await {
            tracing::warn!("Failed to send command to runtime: {:?}", e);
        }
    }

    fn start_reprompt(&mut self) {
        self.reprompt_seq += 1;
        let Some(delay) = self.config.reprompt_after else {
            return;
        };
        if self.fsm.current_step().is_terminal() {
            return;
        }
        if let Some(handle) = self.reprompt_timer.take() {
            handle.abort();
        }
        let kind = TimerKind::Reprompt {
            seq: self.reprompt_seq,
        };
        self.reprompt_timer = self.schedule(delay, kind);
    }

    fn schedule_action(&mut self, gate: ActionGate, delay: Duration) {
        if !self.config.auto_complete_actions {
            tracing::debug!("Waiting for external {} signal.", gate);
            return;
        }
        if let Some(handle) = self.schedule(delay, TimerKind::Action(gate)) {
            self.action_timers.push(handle);
        }
    }

    fn schedule(&self, delay: Duration, kind: TimerKind) -> Option<JoinHandle<()>> {
        let tx = self.self_tx.upgrade()?;
        let token = self.token();
        Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(Input::Timer { token, kind }).await.is_err() {
                tracing::debug!("Orchestrator gone before {:?} timer fired.", kind);
            }
        }))
    }

    fn cancel_timers(&mut self) {
        self.reprompt_seq += 1;
        if let Some(handle) = self.reprompt_timer.take() {
            handle.abort();
        }
        for handle in self.action_timers.drain(..) {
            handle.abort();
        }
    }
}
