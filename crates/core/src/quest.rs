//! Quest-completion rules, checked once when the conversation is about to
//! reach `Step::Success`.

use crate::order::{MenuItem, OrderState, TempOption};

pub trait QuestRule: Send + Sync {
    /// `Err` carries the reason shown to the player.
    fn evaluate(&self, order: &OrderState) -> Result<(), String>;
}

/// The order must be exactly this drink. There is no quantity slot, so one
/// cup is assumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExactDrink {
    pub menu_item: MenuItem,
    pub temp_option: TempOption,
}

impl ExactDrink {
    pub fn new(menu_item: MenuItem, temp_option: TempOption) -> Self {
        Self {
            menu_item,
            temp_option,
        }
    }
}

impl Default for ExactDrink {
    /// The shipped scenario: one iced Americano.
    fn default() -> Self {
        Self::new(MenuItem::Americano, TempOption::Ice)
    }
}

impl QuestRule for ExactDrink {
    fn evaluate(&self, order: &OrderState) -> Result<(), String> {
        if order.menu_item == self.menu_item && order.temp_option == self.temp_option {
            Ok(())
        } else {
            Err(format!(
                "Quest 조건 불일치: {} {} 1잔 주문이 아닙니다.",
                self.temp_option.spoken(),
                self.menu_item.spoken()
            ))
        }
    }
}

/// Rule that accepts every order, for free-play sessions.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnyOrder;

impl QuestRule for AnyOrder {
    fn evaluate(&self, _order: &OrderState) -> Result<(), String> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rule_wants_one_iced_americano() {
        let rule = ExactDrink::default();
        let mut order = OrderState {
            menu_item: MenuItem::Americano,
            temp_option: TempOption::Ice,
            ..OrderState::default()
        };
        assert!(rule.evaluate(&order).is_ok());

        order.temp_option = TempOption::Hot;
        let reason = rule.evaluate(&order).unwrap_err();
        assert!(reason.contains("아이스 아메리카노"), "reason was {reason}");
    }

    #[test]
    fn any_order_always_passes() {
        assert!(AnyOrder.evaluate(&OrderState::default()).is_ok());
    }
}
