//! Slot-gated dialogue state machine.
//!
//! The machine only decides transitions. Speaking, listening and scheduling
//! belong to the orchestrator, which reads the returned [`Advance`] to decide
//! what to do next.

use crate::order::{OrderState, PaymentMethod, Slot};
use crate::quest::{ExactDrink, QuestRule};
use crate::steps::{self, Step};
use std::fmt;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DialogueError {
    #[error("dialogue has not been started; call begin() with an order first")]
    NotStarted,
}

/// External actions a step waits on, as opposed to information it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionGate {
    Confirmed,
    PaymentApproved,
    ReceiptHanded,
    FarewellSaid,
}

impl ActionGate {
    /// The gate `step` waits on before it can be left, if any.
    pub fn for_step(step: Step) -> Option<ActionGate> {
        match step {
            Step::ConfirmOrder => Some(ActionGate::Confirmed),
            Step::PaymentProcessing => Some(ActionGate::PaymentApproved),
            Step::ReceiptHandOff => Some(ActionGate::ReceiptHanded),
            Step::Farewell => Some(ActionGate::FarewellSaid),
            _ => None,
        }
    }
}

impl fmt::Display for ActionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionFlags {
    pub confirmed: bool,
    pub payment_approved: bool,
    pub receipt_handed: bool,
    pub farewell_said: bool,
}

impl ActionFlags {
    pub fn is_set(&self, gate: ActionGate) -> bool {
        match gate {
            ActionGate::Confirmed => self.confirmed,
            ActionGate::PaymentApproved => self.payment_approved,
            ActionGate::ReceiptHanded => self.receipt_handed,
            ActionGate::FarewellSaid => self.farewell_said,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoldReason {
    MissingSlots(Vec<Slot>),
    AwaitingAction(ActionGate),
    Terminal,
}

/// Result of one [`DialogueStateMachine::try_advance`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// Still on the same step; ask again or keep waiting.
    Held(HoldReason),
    Entered(Step),
    /// Entered `Step::Success`.
    QuestSucceeded,
    /// The quest rule rejected the order; the machine is back on
    /// `Step::ConfirmOrder`.
    QuestFailed { reason: String },
}

impl Advance {
    pub fn changed_step(&self) -> bool {
        !matches!(self, Advance::Held(_))
    }
}

pub struct DialogueStateMachine {
    current: Step,
    order: Option<OrderState>,
    flags: ActionFlags,
    quest_rule: Box<dyn QuestRule>,
}

impl Default for DialogueStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DialogueStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialogueStateMachine")
            .field("current", &self.current)
            .field("order", &self.order)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl DialogueStateMachine {
    pub fn new() -> Self {
        Self::with_quest_rule(Box::new(ExactDrink::default()))
    }

    pub fn with_quest_rule(quest_rule: Box<dyn QuestRule>) -> Self {
        Self {
            current: Step::Greeting,
            order: None,
            flags: ActionFlags::default(),
            quest_rule,
        }
    }

    /// Binds `order`, rewinds to `Step::Greeting` and clears every action flag.
    pub fn begin(&mut self, order: OrderState) -> Step {
        self.order = Some(order);
        self.current = Step::Greeting;
        self.flags = ActionFlags::default();
        tracing::info!("[FSM] begin -> {}", self.current);
        self.current
    }

    pub fn is_started(&self) -> bool {
        self.order.is_some()
    }

    pub fn current_step(&self) -> Step {
        self.current
    }

    pub fn flags(&self) -> ActionFlags {
        self.flags
    }

    pub fn order(&self) -> Result<&OrderState, DialogueError> {
        self.order.as_ref().ok_or(DialogueError::NotStarted)
    }

    pub fn order_mut(&mut self) -> Result<&mut OrderState, DialogueError> {
        self.order.as_mut().ok_or(DialogueError::NotStarted)
    }

    pub fn missing_slots(&self) -> Result<Vec<Slot>, DialogueError> {
        Ok(steps::missing_slots(self.current, self.order()?))
    }

    /// Whether `try_advance` would hold right now. Not started counts as
    /// blocked.
    pub fn is_blocked(&self) -> bool {
        let Ok(order) = self.order() else {
            return true;
        };
        self.current.is_terminal()
            || !steps::missing_slots(self.current, order).is_empty()
            || ActionGate::for_step(self.current).is_some_and(|gate| !self.flags.is_set(gate))
    }

    pub fn try_advance(&mut self) -> Result<Advance, DialogueError> {
        let order = self.order.as_ref().ok_or(DialogueError::NotStarted)?;

        if self.current.is_terminal() {
            return Ok(Advance::Held(HoldReason::Terminal));
        }

        let missing = steps::missing_slots(self.current, order);
        if !missing.is_empty() {
            tracing::debug!("[FSM] {} holding, missing {:?}", self.current, missing);
            return Ok(Advance::Held(HoldReason::MissingSlots(missing)));
        }

        let next = match self.next_step(order) {
            Ok(next) => next,
            Err(gate) => {
                tracing::debug!("[FSM] {} waiting on {}", self.current, gate);
                return Ok(Advance::Held(HoldReason::AwaitingAction(gate)));
            }
        };

        if next == Step::Success {
            if let Err(reason) = self.quest_rule.evaluate(order) {
                tracing::warn!("[FSM] quest failed: {}", reason);
                self.current = Step::ConfirmOrder;
                return Ok(Advance::QuestFailed { reason });
            }
            self.current = Step::Success;
            tracing::info!("[FSM] -> {} (quest succeeded)", self.current);
            return Ok(Advance::QuestSucceeded);
        }

        self.current = next;
        tracing::info!("[FSM] -> {}", self.current);
        Ok(Advance::Entered(next))
    }

    /// Jumps to `step` without any checks.
    pub fn force_step(&mut self, step: Step) -> Step {
        tracing::info!("[FSM] forced {} -> {}", self.current, step);
        self.current = step;
        step
    }

    pub fn mark(&mut self, gate: ActionGate) {
        match gate {
            ActionGate::Confirmed => self.flags.confirmed = true,
            ActionGate::PaymentApproved => self.flags.payment_approved = true,
            ActionGate::ReceiptHanded => self.flags.receipt_handed = true,
            ActionGate::FarewellSaid => self.flags.farewell_said = true,
        }
    }

    pub fn mark_confirmed(&mut self) {
        self.mark(ActionGate::Confirmed);
    }

    pub fn mark_payment_approved(&mut self) {
        self.mark(ActionGate::PaymentApproved);
    }

    pub fn mark_receipt_handed(&mut self) {
        self.mark(ActionGate::ReceiptHanded);
    }

    pub fn mark_farewell_said(&mut self) {
        self.mark(ActionGate::FarewellSaid);
    }

    /// Next step once the current one has all of its slots, or the gate
    /// still blocking it.
    fn next_step(&self, order: &OrderState) -> Result<Step, ActionGate> {
        let gated = |gate: ActionGate, next: Step| {
            if self.flags.is_set(gate) { Ok(next) } else { Err(gate) }
        };

        match self.current {
            Step::Greeting => Ok(Step::TakeOrder),
            Step::TakeOrder => Ok(Step::ConfirmOrder),
            Step::ConfirmOrder => gated(ActionGate::Confirmed, Step::DineOption),
            Step::DineOption => Ok(Step::Points),
            Step::Points => Ok(Step::Coupon),
            Step::Coupon => Ok(Step::PaymentMethod),
            Step::PaymentMethod => match order.payment_method {
                PaymentMethod::Cash => Ok(Step::CashReceipt),
                _ => Ok(Step::PaymentProcessing),
            },
            Step::CashReceipt => Ok(Step::PaymentProcessing),
            Step::PaymentProcessing => gated(ActionGate::PaymentApproved, Step::ReceiptHandOff),
            Step::ReceiptHandOff => gated(ActionGate::ReceiptHanded, Step::Farewell),
            Step::Farewell => gated(ActionGate::FarewellSaid, Step::Success),
            Step::Success => Ok(Step::Success),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{Choice, DineOption, MenuItem, TempOption};
    use crate::quest::AnyOrder;

    fn started() -> DialogueStateMachine {
        let mut fsm = DialogueStateMachine::new();
        fsm.begin(OrderState::new());
        fsm
    }

    fn filled_order(payment_method: PaymentMethod) -> OrderState {
        OrderState {
            menu_item: MenuItem::Americano,
            temp_option: TempOption::Ice,
            dine_option: DineOption::DineIn,
            points_option: Choice::No,
            coupon_option: Choice::No,
            payment_method,
            cash_receipt_option: Choice::No,
            receipt_needed: Some(false),
            ..OrderState::default()
        }
    }

    #[test]
    fn try_advance_before_begin_is_an_error() {
        let mut fsm = DialogueStateMachine::new();
        assert_eq!(fsm.try_advance(), Err(DialogueError::NotStarted));
        assert_eq!(fsm.current_step(), Step::Greeting);
    }

    #[test]
    fn greeting_advances_without_slots() {
        let mut fsm = started();
        assert_eq!(fsm.current_step(), Step::Greeting);
        assert_eq!(fsm.try_advance(), Ok(Advance::Entered(Step::TakeOrder)));
    }

    #[test]
    fn missing_slots_hold_the_step_on_repeated_calls() {
        let mut fsm = started();
        fsm.force_step(Step::TakeOrder);
        for _ in 0..5 {
            let advance = fsm.try_advance().unwrap();
            assert_eq!(
                advance,
                Advance::Held(HoldReason::MissingSlots(vec![Slot::MenuItem, Slot::TempOption]))
            );
            assert_eq!(fsm.current_step(), Step::TakeOrder);
        }
    }

    #[test]
    fn confirm_order_needs_explicit_confirmation() {
        let mut fsm = started();
        *fsm.order_mut().unwrap() = filled_order(PaymentMethod::Card);
        fsm.force_step(Step::ConfirmOrder);

        assert_eq!(
            fsm.try_advance(),
            Ok(Advance::Held(HoldReason::AwaitingAction(ActionGate::Confirmed)))
        );

        fsm.mark_confirmed();
        assert_eq!(fsm.try_advance(), Ok(Advance::Entered(Step::DineOption)));
    }

    #[test]
    fn action_gated_steps_never_advance_without_their_mark() {
        let cases = [
            (Step::PaymentProcessing, ActionGate::PaymentApproved, Step::ReceiptHandOff),
            (Step::ReceiptHandOff, ActionGate::ReceiptHanded, Step::Farewell),
            (Step::ConfirmOrder, ActionGate::Confirmed, Step::DineOption),
        ];
        for (step, gate, next) in cases {
            let mut fsm = started();
            *fsm.order_mut().unwrap() = filled_order(PaymentMethod::Card);
            fsm.force_step(step);
            for _ in 0..10 {
                assert_eq!(
                    fsm.try_advance(),
                    Ok(Advance::Held(HoldReason::AwaitingAction(gate)))
                );
            }
            fsm.mark(gate);
            assert_eq!(fsm.try_advance(), Ok(Advance::Entered(next)));
        }
    }

    #[test]
    fn card_payment_skips_cash_receipt() {
        let mut fsm = started();
        *fsm.order_mut().unwrap() = filled_order(PaymentMethod::Card);
        fsm.force_step(Step::PaymentMethod);
        assert_eq!(fsm.try_advance(), Ok(Advance::Entered(Step::PaymentProcessing)));
    }

    #[test]
    fn cash_payment_goes_through_cash_receipt() {
        let mut fsm = started();
        *fsm.order_mut().unwrap() = filled_order(PaymentMethod::Cash);
        fsm.force_step(Step::PaymentMethod);
        assert_eq!(fsm.try_advance(), Ok(Advance::Entered(Step::CashReceipt)));
        assert_eq!(fsm.try_advance(), Ok(Advance::Entered(Step::PaymentProcessing)));
    }

    #[test]
    fn success_is_absorbing_and_checked_once() {
        let mut fsm = started();
        *fsm.order_mut().unwrap() = filled_order(PaymentMethod::Card);
        fsm.force_step(Step::Farewell);
        fsm.mark_farewell_said();

        assert_eq!(fsm.try_advance(), Ok(Advance::QuestSucceeded));
        // Breaking the order afterwards must not re-run the rule.
        fsm.order_mut().unwrap().menu_item = MenuItem::Latte;
        for _ in 0..3 {
            assert_eq!(fsm.try_advance(), Ok(Advance::Held(HoldReason::Terminal)));
            assert_eq!(fsm.current_step(), Step::Success);
        }
    }

    #[test]
    fn wrong_drink_is_sent_back_to_confirm_order() {
        let mut fsm = started();
        let mut order = filled_order(PaymentMethod::Card);
        order.menu_item = MenuItem::Latte;
        *fsm.order_mut().unwrap() = order;
        fsm.force_step(Step::Farewell);
        fsm.mark_farewell_said();

        match fsm.try_advance().unwrap() {
            Advance::QuestFailed { reason } => assert!(!reason.is_empty()),
            other => panic!("expected QuestFailed, got {other:?}"),
        }
        assert_eq!(fsm.current_step(), Step::ConfirmOrder);
    }

    #[test]
    fn is_blocked_tracks_slots_and_gates() {
        let mut fsm = DialogueStateMachine::new();
        assert!(fsm.is_blocked());

        fsm.begin(OrderState::new());
        assert!(!fsm.is_blocked(), "greeting needs nothing");

        fsm.force_step(Step::TakeOrder);
        assert!(fsm.is_blocked());

        *fsm.order_mut().unwrap() = filled_order(PaymentMethod::Card);
        fsm.force_step(Step::PaymentProcessing);
        assert!(fsm.is_blocked());
        fsm.mark_payment_approved();
        assert!(!fsm.is_blocked());
    }

    #[test]
    fn begin_clears_flags_and_rewinds() {
        let mut fsm = started();
        fsm.mark_confirmed();
        fsm.mark_payment_approved();
        fsm.force_step(Step::Coupon);

        fsm.begin(OrderState::new());

        assert_eq!(fsm.current_step(), Step::Greeting);
        assert_eq!(fsm.flags(), ActionFlags::default());
    }

    #[test]
    fn custom_quest_rule_is_used() {
        let mut fsm = DialogueStateMachine::with_quest_rule(Box::new(AnyOrder));
        let mut order = filled_order(PaymentMethod::Card);
        order.menu_item = MenuItem::Mocha;
        fsm.begin(order);
        fsm.force_step(Step::Farewell);
        fsm.mark_farewell_said();
        assert_eq!(fsm.try_advance(), Ok(Advance::QuestSucceeded));
    }
}
