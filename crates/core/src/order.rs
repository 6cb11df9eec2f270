//! The order slot model.
//!
//! One `OrderState` exists per conversation. Every enum field starts at its
//! `None` sentinel, which is also its `Default`; a slot counts as filled once it
//! leaves that sentinel.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum MenuItem {
    #[default]
    None,
    Americano,
    Latte,
    Cappuccino,
    Mocha,
}

impl MenuItem {
    /// Name as read back to the customer.
    pub fn spoken(&self) -> &'static str {
        match self {
            MenuItem::None => "",
            MenuItem::Americano => "아메리카노",
            MenuItem::Latte => "라떼",
            MenuItem::Cappuccino => "카푸치노",
            MenuItem::Mocha => "모카",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum TempOption {
    #[default]
    None,
    Hot,
    Ice,
}

impl TempOption {
    pub fn spoken(&self) -> &'static str {
        match self {
            TempOption::None => "",
            TempOption::Hot => "뜨거운",
            TempOption::Ice => "아이스",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DineOption {
    #[default]
    None,
    DineIn,
    TakeOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PaymentMethod {
    #[default]
    None,
    Card,
    Cash,
}

/// Yes/no answer that has not necessarily been given yet.
///
/// Shared by the points, coupon and cash-receipt questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Choice {
    #[default]
    None,
    Yes,
    No,
}

/// Identifies one field of [`OrderState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    MenuItem,
    TempOption,
    DineOption,
    PointsOption,
    PointsPhoneNumber,
    CouponOption,
    CouponPresented,
    CouponCode,
    PaymentMethod,
    CashReceiptOption,
    CashReceiptPhoneNumber,
    ReceiptNeeded,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Slot::MenuItem => "menu_item",
            Slot::TempOption => "temp_option",
            Slot::DineOption => "dine_option",
            Slot::PointsOption => "points_option",
            Slot::PointsPhoneNumber => "points_phone_number",
            Slot::CouponOption => "coupon_option",
            Slot::CouponPresented => "coupon_presented",
            Slot::CouponCode => "coupon_code",
            Slot::PaymentMethod => "payment_method",
            Slot::CashReceiptOption => "cash_receipt_option",
            Slot::CashReceiptPhoneNumber => "cash_receipt_phone_number",
            Slot::ReceiptNeeded => "receipt_needed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrderState {
    pub menu_item: MenuItem,
    pub temp_option: TempOption,
    pub dine_option: DineOption,

    pub points_option: Choice,
    pub points_phone_number: String,

    pub coupon_option: Choice,
    /// Physical coupon or phone barcode shown at the counter.
    pub coupon_presented: bool,
    pub coupon_code: String,

    pub payment_method: PaymentMethod,
    pub cash_receipt_option: Choice,
    pub cash_receipt_phone_number: String,

    /// `None` until the customer has answered.
    pub receipt_needed: Option<bool>,
}

impl OrderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_filled(&self, slot: Slot) -> bool {
        match slot {
            Slot::MenuItem => self.menu_item != MenuItem::None,
            Slot::TempOption => self.temp_option != TempOption::None,
            Slot::DineOption => self.dine_option != DineOption::None,
            Slot::PointsOption => self.points_option != Choice::None,
            Slot::PointsPhoneNumber => !self.points_phone_number.is_empty(),
            Slot::CouponOption => self.coupon_option != Choice::None,
            Slot::CouponPresented => self.coupon_presented,
            Slot::CouponCode => !self.coupon_code.is_empty(),
            Slot::PaymentMethod => self.payment_method != PaymentMethod::None,
            Slot::CashReceiptOption => self.cash_receipt_option != Choice::None,
            Slot::CashReceiptPhoneNumber => !self.cash_receipt_phone_number.is_empty(),
            Slot::ReceiptNeeded => self.receipt_needed.is_some(),
        }
    }

    pub fn all_filled(&self, slots: &[Slot]) -> bool {
        slots.iter().all(|slot| self.is_filled(*slot))
    }

    pub fn has_coupon(&self) -> bool {
        self.coupon_presented || !self.coupon_code.is_empty()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_order_has_nothing_filled() {
        let order = OrderState::new();
        let every_slot = [
            Slot::MenuItem,
            Slot::TempOption,
            Slot::DineOption,
            Slot::PointsOption,
            Slot::PointsPhoneNumber,
            Slot::CouponOption,
            Slot::CouponPresented,
            Slot::CouponCode,
            Slot::PaymentMethod,
            Slot::CashReceiptOption,
            Slot::CashReceiptPhoneNumber,
            Slot::ReceiptNeeded,
        ];
        for slot in every_slot {
            assert!(!order.is_filled(slot), "{slot} should start unfilled");
        }
    }

    #[test]
    fn receipt_needed_false_still_counts_as_filled() {
        let mut order = OrderState::new();
        order.receipt_needed = Some(false);
        assert!(order.is_filled(Slot::ReceiptNeeded));
    }

    #[test]
    fn reset_clears_every_field() {
        let mut order = OrderState {
            menu_item: MenuItem::Mocha,
            temp_option: TempOption::Hot,
            points_phone_number: "01012345678".to_string(),
            coupon_presented: true,
            receipt_needed: Some(true),
            ..OrderState::default()
        };
        assert!(order.all_filled(&[Slot::MenuItem, Slot::TempOption]));
        assert!(order.has_coupon());

        order.reset();

        assert_eq!(order, OrderState::default());
    }
}
