//! Keyword router from a transcribed utterance to order slots.
//!
//! Matching is plain substring containment over a normalized form of the
//! utterance, scoped to the step the conversation is on. The only signal that
//! crosses steps is affirmation, which the caller turns into
//! `DialogueStateMachine::mark_confirmed`.

use crate::order::{Choice, DineOption, MenuItem, OrderState, PaymentMethod, Slot, TempOption};
use crate::steps::Step;
use regex::Regex;
use std::sync::LazyLock;

/// Phone numbers and coupon barcodes: a run of exactly 10 or 11 ASCII digits.
/// Longer runs never match, so nothing gets truncated into a number.
static PHONE_RX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^0-9])([0-9]{10,11})(?:[^0-9]|$)").expect("phone pattern is valid")
});

const AFFIRM: &[&str] = &["네", "예", "맞", "응", "그래", "좋아"];
/// Request phrasing that accepts an offer without a literal "yes".
const ACCEPT: &[&str] = &["주세요", "할게", "해주", "필요해", "쓸게", "사용", "부탁"];
const NEGATE: &[&str] = &["아니", "노", "안해", "안할", "필요없", "괜찮", "없어"];

const AMERICANO: &[&str] = &["아메리카노", "아아", "뜨아"];
const LATTE: &[&str] = &["라떼", "라테"];
const CAPPUCCINO: &[&str] = &["카푸치노"];
const MOCHA: &[&str] = &["모카"];
const ICE: &[&str] = &["아이스", "차갑", "시원", "아아"];
const HOT: &[&str] = &["뜨거", "핫", "따뜻", "뜨아"];

const DINE_IN: &[&str] = &["매장", "먹고가", "먹고갈"];
const TAKE_OUT: &[&str] = &["포장", "테이크아웃", "가져갈", "가지고갈"];

const POINTS: &[&str] = &["적립", "포인트"];
const COUPON: &[&str] = &["쿠폰", "바코드"];
const PRESENT: &[&str] = &["보여", "제시", "여기"];
const CASH: &[&str] = &["현금"];
const CARD: &[&str] = &["카드", "페이", "간편결제"];
const RECEIPT: &[&str] = &["영수증"];

/// What a single utterance did to the order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutedIntent {
    /// A yes-like keyword was present, whatever the step.
    pub affirmed: bool,
    pub filled: Vec<Slot>,
}

impl RoutedIntent {
    pub fn is_empty(&self) -> bool {
        !self.affirmed && self.filled.is_empty()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IntentRouter;

impl IntentRouter {
    pub fn new() -> Self {
        Self
    }

    /// Applies `utterance` to `state` for the rules of `step`.
    pub fn apply(&self, utterance: &str, state: &mut OrderState, step: Step) -> RoutedIntent {
        let text = normalize(utterance);
        let mut routed = RoutedIntent::default();
        if text.is_empty() {
            return routed;
        }

        routed.affirmed = contains_any(&text, AFFIRM);

        match step {
            Step::TakeOrder | Step::ConfirmOrder => apply_menu(&text, state, &mut routed),
            Step::DineOption => {
                if contains_any(&text, DINE_IN) {
                    state.dine_option = DineOption::DineIn;
                    routed.filled.push(Slot::DineOption);
                } else if contains_any(&text, TAKE_OUT) {
                    state.dine_option = DineOption::TakeOut;
                    routed.filled.push(Slot::DineOption);
                }
            }
            Step::Points => {
                let number = extract_number(&text);
                if contains_any(&text, POINTS) || number.is_some() {
                    if let Some(choice) = decide(&text, number.is_some()) {
                        state.points_option = choice;
                        routed.filled.push(Slot::PointsOption);
                    }
                    if let Some(number) = number {
                        state.points_phone_number = number;
                        routed.filled.push(Slot::PointsPhoneNumber);
                    }
                }
            }
            Step::Coupon => apply_coupon(&text, state, &mut routed),
            Step::PaymentMethod => {
                let method = if contains_any(&text, CASH) {
                    PaymentMethod::Cash
                } else if contains_any(&text, CARD) {
                    PaymentMethod::Card
                } else {
                    PaymentMethod::None
                };
                if method != PaymentMethod::None {
                    state.payment_method = method;
                    routed.filled.push(Slot::PaymentMethod);
                }
            }
            Step::CashReceipt => {
                let number = extract_number(&text);
                if contains_any(&text, RECEIPT) || number.is_some() {
                    if let Some(choice) = decide(&text, number.is_some()) {
                        state.cash_receipt_option = choice;
                        routed.filled.push(Slot::CashReceiptOption);
                    }
                    if let Some(number) = number {
                        state.cash_receipt_phone_number = number;
                        routed.filled.push(Slot::CashReceiptPhoneNumber);
                    }
                }
            }
            Step::ReceiptHandOff => {
                if contains_any(&text, RECEIPT) {
                    if let Some(choice) = decide(&text, false) {
                        state.receipt_needed = Some(choice == Choice::Yes);
                        routed.filled.push(Slot::ReceiptNeeded);
                    }
                }
            }
            Step::Greeting
            | Step::PaymentProcessing
            | Step::Farewell
            | Step::Success => {}
        }

        routed
    }
}

/// Trims and strips whitespace and hyphens so "010-1234 5678" and
/// "아이스 아메리카노" match the same way as their compact forms.
pub fn normalize(utterance: &str) -> String {
    utterance
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect()
}

/// First standalone 10–11 digit run in already normalized text.
pub fn extract_number(text: &str) -> Option<String> {
    PHONE_RX
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

/// Yes/no for an option question. Negation wins; `implied_yes` covers a
/// customer who just reads out a number.
fn decide(text: &str, implied_yes: bool) -> Option<Choice> {
    if contains_any(text, NEGATE) {
        Some(Choice::No)
    } else if implied_yes || contains_any(text, AFFIRM) || contains_any(text, ACCEPT) {
        Some(Choice::Yes)
    } else {
        None
    }
}

fn apply_menu(text: &str, state: &mut OrderState, routed: &mut RoutedIntent) {
    let menu = if contains_any(text, AMERICANO) {
        MenuItem::Americano
    } else if contains_any(text, LATTE) {
        MenuItem::Latte
    } else if contains_any(text, CAPPUCCINO) {
        MenuItem::Cappuccino
    } else if contains_any(text, MOCHA) {
        MenuItem::Mocha
    } else {
        MenuItem::None
    };
    if menu != MenuItem::None {
        state.menu_item = menu;
        routed.filled.push(Slot::MenuItem);
    }

    let temp = if contains_any(text, ICE) {
        TempOption::Ice
    } else if contains_any(text, HOT) {
        TempOption::Hot
    } else {
        TempOption::None
    };
    if temp != TempOption::None {
        state.temp_option = temp;
        routed.filled.push(Slot::TempOption);
    }
}

fn apply_coupon(text: &str, state: &mut OrderState, routed: &mut RoutedIntent) {
    let number = extract_number(text);
    let presented = contains_any(text, PRESENT);
    if !(contains_any(text, COUPON) || presented || number.is_some()) {
        return;
    }

    if let Some(choice) = decide(text, presented || number.is_some()) {
        state.coupon_option = choice;
        routed.filled.push(Slot::CouponOption);
    }
    if presented && state.coupon_option == Choice::Yes {
        state.coupon_presented = true;
        routed.filled.push(Slot::CouponPresented);
    }
    if let Some(number) = number {
        state.coupon_code = number;
        routed.filled.push(Slot::CouponCode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(text: &str, step: Step) -> (OrderState, RoutedIntent) {
        let mut state = OrderState::new();
        let routed = IntentRouter::new().apply(text, &mut state, step);
        (state, routed)
    }

    #[test]
    fn blank_input_is_a_no_op() {
        for text in ["", "   ", "\t\n"] {
            let (state, routed) = route(text, Step::TakeOrder);
            assert_eq!(state, OrderState::default());
            assert!(routed.is_empty());
        }
    }

    #[test]
    fn normalize_keeps_hangul_and_drops_spacing() {
        assert_eq!(normalize("  아이스 아메리카노  주세요 "), "아이스아메리카노주세요");
        assert_eq!(normalize("010-1234 -5678"), "01012345678");
    }

    #[test]
    fn take_order_fills_menu_and_temperature() {
        let (state, routed) = route("아이스 아메리카노 주세요", Step::TakeOrder);
        assert_eq!(state.menu_item, MenuItem::Americano);
        assert_eq!(state.temp_option, TempOption::Ice);
        assert_eq!(routed.filled, vec![Slot::MenuItem, Slot::TempOption]);
        assert!(!routed.affirmed);
    }

    #[test]
    fn partial_order_only_fills_what_was_said() {
        let (state, _) = route("따뜻한 걸로요", Step::TakeOrder);
        assert_eq!(state.menu_item, MenuItem::None);
        assert_eq!(state.temp_option, TempOption::Hot);
    }

    #[test]
    fn nicknames_imply_temperature() {
        let (state, _) = route("아아 한 잔이요", Step::TakeOrder);
        assert_eq!(state.menu_item, MenuItem::Americano);
        assert_eq!(state.temp_option, TempOption::Ice);

        let (state, _) = route("뜨아요", Step::TakeOrder);
        assert_eq!(state.temp_option, TempOption::Hot);
    }

    #[test]
    fn keywords_outside_the_current_step_are_ignored() {
        let (state, _) = route("현금으로 할게요", Step::TakeOrder);
        assert_eq!(state, OrderState::default());

        let (state, _) = route("아이스 아메리카노", Step::PaymentMethod);
        assert_eq!(state, OrderState::default());
    }

    #[test]
    fn affirmation_is_reported_on_any_step() {
        for step in Step::ALL {
            let (_, routed) = route("네 맞아요", step);
            assert!(routed.affirmed, "affirmation missed at {step}");
        }
    }

    #[test]
    fn payment_method_prefers_cash_and_maps_pay_apps_to_card() {
        let (state, _) = route("현금으로 할게요", Step::PaymentMethod);
        assert_eq!(state.payment_method, PaymentMethod::Cash);

        let (state, _) = route("카카오페이요", Step::PaymentMethod);
        assert_eq!(state.payment_method, PaymentMethod::Card);
    }

    #[test]
    fn points_opt_in_and_number() {
        let (state, _) = route("포인트 적립해주세요", Step::Points);
        assert_eq!(state.points_option, Choice::Yes);
        assert!(state.points_phone_number.is_empty());

        let (state, _) = route("적립 안 할게요", Step::Points);
        assert_eq!(state.points_option, Choice::No);

        let (state, routed) = route("010-1234-5678 이요", Step::Points);
        assert_eq!(state.points_option, Choice::Yes);
        assert_eq!(state.points_phone_number, "01012345678");
        assert_eq!(routed.filled, vec![Slot::PointsOption, Slot::PointsPhoneNumber]);
    }

    #[test]
    fn phone_number_is_independent_of_spacing() {
        let variants = [
            "01012345678",
            "010 1234 5678",
            "010-1234-5678",
            " 010 - 1234 - 5678 ",
            "0-1-0-1-2-3-4-5-6-7-8",
        ];
        for text in variants {
            let (state, _) = route(text, Step::CashReceipt);
            assert_eq!(state.cash_receipt_phone_number, "01012345678", "input {text:?}");
        }
    }

    #[test]
    fn short_digit_runs_are_not_numbers() {
        let (state, routed) = route("123456789", Step::Points);
        assert!(state.points_phone_number.is_empty());
        assert!(routed.filled.is_empty());
    }

    #[test]
    fn overlong_digit_runs_are_rejected_not_truncated() {
        assert_eq!(extract_number("010123456789"), None);
        assert_eq!(extract_number("번호는0101234567890"), None);
        assert_eq!(
            extract_number("번호는01012345678이에요"),
            Some("01012345678".to_string())
        );
        assert_eq!(
            extract_number("쿠폰123456789012또는0212345678"),
            Some("0212345678".to_string())
        );

        let (state, routed) = route("0101 2345 6789", Step::Points);
        assert!(state.points_phone_number.is_empty());
        assert!(routed.filled.is_empty());
    }

    #[test]
    fn coupon_presented_or_declined() {
        let (state, _) = route("쿠폰 보여드릴게요", Step::Coupon);
        assert_eq!(state.coupon_option, Choice::Yes);
        assert!(state.coupon_presented);

        let (state, _) = route("쿠폰 없어요", Step::Coupon);
        assert_eq!(state.coupon_option, Choice::No);
        assert!(!state.coupon_presented);

        let (state, _) = route("바코드 1234567890", Step::Coupon);
        assert_eq!(state.coupon_option, Choice::Yes);
        assert_eq!(state.coupon_code, "1234567890");
    }

    #[test]
    fn receipt_needed_yes_and_no() {
        let (state, _) = route("영수증 주세요", Step::ReceiptHandOff);
        assert_eq!(state.receipt_needed, Some(true));

        let (state, _) = route("영수증은 필요없어요", Step::ReceiptHandOff);
        assert_eq!(state.receipt_needed, Some(false));

        let (state, _) = route("음...", Step::ReceiptHandOff);
        assert_eq!(state.receipt_needed, None);
    }

    #[test]
    fn dine_option_keywords() {
        let (state, _) = route("매장에서 먹고 갈게요", Step::DineOption);
        assert_eq!(state.dine_option, DineOption::DineIn);

        let (state, _) = route("포장이요", Step::DineOption);
        assert_eq!(state.dine_option, DineOption::TakeOut);
    }
}
