//! Checks a translated request before anything is written to the POS.

use rust_decimal::Decimal;

use kasir_core::domain::request::{DiscountMode, ResolvedOrderRequest};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String },
}

impl GuardrailDecision {
    fn deny(reason_code: &'static str, user_message: impl Into<String>) -> Self {
        Self::Deny { reason_code, user_message: user_message.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub max_line_quantity: u32,
    pub max_percentage_discount: Decimal,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { max_line_quantity: 100, max_percentage_discount: Decimal::ONE_HUNDRED }
    }
}

impl GuardrailPolicy {
    pub fn evaluate(&self, request: &ResolvedOrderRequest) -> GuardrailDecision {
        let missing: Vec<&str> = [
            ("name", request.customer_name.trim().is_empty()),
            ("phone number", request.phone.trim().is_empty()),
            ("address", request.address.trim().is_empty()),
            ("products", request.lines.iter().all(|line| line.quantity == 0)),
        ]
        .into_iter()
        .filter_map(|(field, absent)| absent.then_some(field))
        .collect();
        if !missing.is_empty() {
            return GuardrailDecision::deny(
                "missing_fields",
                format!("The order is missing: {}. Please resend the full order format.", missing.join(", ")),
            );
        }

        if let Some(line) = request.lines.iter().find(|line| line.quantity > self.max_line_quantity) {
            return GuardrailDecision::deny(
                "quantity_out_of_range",
                format!(
                    "Quantity {} for `{}` is above the limit of {}. Please check the order.",
                    line.quantity, line.name, self.max_line_quantity
                ),
            );
        }

        let discount = &request.discount;
        if discount.value < Decimal::ZERO {
            return GuardrailDecision::deny("negative_discount", "A discount cannot be negative.");
        }
        if discount.mode == DiscountMode::Percentage && discount.value > self.max_percentage_discount {
            return GuardrailDecision::deny(
                "discount_out_of_range",
                format!("A {}% discount is not allowed.", discount.value.normalize()),
            );
        }

        GuardrailDecision::Allow
    }
}
