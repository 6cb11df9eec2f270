//! Step catalog: the ordering steps, what each step needs from the order
//! before it is satisfied, and the template line spoken for it.

use crate::order::{Choice, DineOption, OrderState, PaymentMethod, Slot};
use serde::Serialize;
use std::fmt;

pub const FIRST_LINE: &str = "어서오세요. 주문 도와드리겠습니다.";
pub const LAST_LINE: &str =
    "주문 완료되었습니다. 뒷쪽에서 대기해주시면 메뉴 준비해서 번호 불러드리겠습니다.";
pub const SUCCESS_LINE: &str = "퀘스트를 성공하셨습니다. 축하드립니다!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Step {
    Greeting,
    /// Menu and hot/ice.
    TakeOrder,
    /// Read the order back and wait for a yes.
    ConfirmOrder,
    DineOption,
    Points,
    Coupon,
    PaymentMethod,
    /// Only entered when paying cash.
    CashReceipt,
    PaymentProcessing,
    ReceiptHandOff,
    Farewell,
    Success,
}

impl Step {
    pub const ALL: [Step; 12] = [
        Step::Greeting,
        Step::TakeOrder,
        Step::ConfirmOrder,
        Step::DineOption,
        Step::Points,
        Step::Coupon,
        Step::PaymentMethod,
        Step::CashReceipt,
        Step::PaymentProcessing,
        Step::ReceiptHandOff,
        Step::Farewell,
        Step::Success,
    ];

    pub fn is_terminal(&self) -> bool {
        *self == Step::Success
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Slots a step always needs before it can be left.
pub fn required_slots(step: Step) -> &'static [Slot] {
    match step {
        Step::TakeOrder | Step::ConfirmOrder => &[Slot::MenuItem, Slot::TempOption],
        Step::DineOption => &[Slot::DineOption],
        Step::Points => &[Slot::PointsOption],
        Step::Coupon => &[Slot::CouponOption],
        Step::PaymentMethod | Step::PaymentProcessing => &[Slot::PaymentMethod],
        Step::CashReceipt => &[Slot::CashReceiptOption],
        Step::ReceiptHandOff => &[Slot::ReceiptNeeded],
        Step::Greeting | Step::Farewell | Step::Success => &[],
    }
}

/// Slots still missing for `step`, static requirements first, then the
/// conditional ones that apply to the current answers.
///
/// An empty result means the step has all the information it needs.
pub fn missing_slots(step: Step, state: &OrderState) -> Vec<Slot> {
    let mut missing: Vec<Slot> = required_slots(step)
        .iter()
        .copied()
        .filter(|slot| !state.is_filled(*slot))
        .collect();

    match step {
        Step::Points => {
            if state.points_option == Choice::Yes && !state.is_filled(Slot::PointsPhoneNumber) {
                missing.push(Slot::PointsPhoneNumber);
            }
        }
        Step::Coupon => {
            // Either a presented coupon or a code is enough; presenting is what we ask for.
            if state.coupon_option == Choice::Yes && !state.has_coupon() {
                missing.push(Slot::CouponPresented);
            }
        }
        Step::CashReceipt => {
            if state.payment_method == PaymentMethod::Cash
                && state.cash_receipt_option == Choice::Yes
                && !state.is_filled(Slot::CashReceiptPhoneNumber)
            {
                missing.push(Slot::CashReceiptPhoneNumber);
            }
        }
        _ => {}
    }

    missing
}

/// Role and rules for the LLM path. The per-step template is sent as the
/// user message alongside it.
pub fn system_preamble() -> &'static str {
    "너는 카페 직원이다. 아래 순서를 반드시 지키며 한 번에 한 가지씩 짧고 또렷하게 말한다.\n\
     순서: 주문 받기(Hot/Ice 포함) → 주문 재확인 → 매장/테이크아웃 → 포인트 → 쿠폰 → 결제수단 → \
     (현금 시) 현금영수증 → 영수증 필요 여부 → 결제 완료 멘트.\n\
     슬롯이 비었으면 그 항목만 정중히 재질문한다. 사용자가 중간 변경을 요청하면 해당 슬롯을 갱신하고 다시 짧게 재확인한다.\n\
     첫 멘트와 마지막 멘트는 고정 문구를 사용한다."
}

/// Template line for `step` given what has been answered so far.
///
/// This is also the fallback whenever LLM generation is off or fails, so it
/// must stay pure.
pub fn prompt_for(step: Step, state: &OrderState) -> String {
    match step {
        Step::Greeting => FIRST_LINE.to_string(),
        Step::TakeOrder => "어떤 음료로 준비해드릴까요? (예: 아메리카노/라떼) \
                            뜨거운 것과 아이스 중에 무엇으로 하실지도 알려주세요."
            .to_string(),
        Step::ConfirmOrder => confirm_text(state),
        Step::DineOption => "매장에서 드시나요, 테이크아웃으로 가져가시나요?".to_string(),
        Step::Points => match state.points_option {
            Choice::None => "포인트 적립하시겠어요?".to_string(),
            Choice::Yes if state.points_phone_number.is_empty() => {
                "포인트 적립 번호를 알려주세요.".to_string()
            }
            _ => "포인트 적립 확인했습니다.".to_string(),
        },
        Step::Coupon => match state.coupon_option {
            Choice::None => "쿠폰 사용하시겠어요?".to_string(),
            Choice::Yes if !state.has_coupon() => {
                "쿠폰을 보여주세요. (실물 또는 휴대폰 바코드)".to_string()
            }
            _ => "쿠폰 확인했습니다.".to_string(),
        },
        Step::PaymentMethod => "결제는 카드로 하시겠어요, 현금으로 하시겠어요?".to_string(),
        Step::CashReceipt => match state.cash_receipt_option {
            Choice::None => "현금영수증 하시겠어요?".to_string(),
            Choice::Yes if state.cash_receipt_phone_number.is_empty() => {
                "현금영수증 번호를 알려주세요.".to_string()
            }
            _ => "현금영수증 처리 완료되었습니다.".to_string(),
        },
        Step::PaymentProcessing => match state.payment_method {
            PaymentMethod::Cash => "결제 진행하겠습니다. 금액을 준비해주세요.".to_string(),
            _ => "결제 진행하겠습니다. 카드 단말기에 카드를 꽂아주세요.".to_string(),
        },
        Step::ReceiptHandOff => match state.receipt_needed {
            None => "영수증 필요하신가요?".to_string(),
            Some(true) => "영수증과 주문번호표 드릴게요.".to_string(),
            Some(false) => "주문번호표만 드리겠습니다.".to_string(),
        },
        Step::Farewell => LAST_LINE.to_string(),
        Step::Success => "퀘스트 완료 처리합니다.".to_string(),
    }
}

fn confirm_text(state: &OrderState) -> String {
    let mut text = String::from("주문 확인하겠습니다.");
    let temp = state.temp_option.spoken();
    if !temp.is_empty() {
        text.push(' ');
        text.push_str(temp);
    }
    let menu = state.menu_item.spoken();
    if !menu.is_empty() {
        text.push(' ');
        text.push_str(menu);
    }
    match state.dine_option {
        DineOption::DineIn => text.push_str(", 매장 취식"),
        DineOption::TakeOut => text.push_str(", 테이크아웃"),
        DineOption::None => {}
    }
    text.push_str(" 맞으실까요?");
    text
}
