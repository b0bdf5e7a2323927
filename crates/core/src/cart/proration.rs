use rust_decimal::{Decimal, RoundingStrategy};
use tracing::warn;

use crate::domain::order::OrderLine;

/// Outcome of prorating one bundle instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Proration {
    pub normal_total: Decimal,
    pub bundle_total: Decimal,
    pub discounted: bool,
}

fn whole_units(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

/// Spreads the gap between the components' standalone total and the bundle
/// price across `components`, proportionally to each line's gross amount.
/// `components` must hold exactly the lines of one bundle instance.
pub fn prorate(components: &mut [OrderLine], bundle_price: Decimal, bundles: u32) -> Proration {
    let normal_total: Decimal = components.iter().map(OrderLine::gross).sum();
    let bundle_total = bundle_price * Decimal::from(bundles);

    if whole_units(normal_total) == whole_units(bundle_total) {
        return Proration { normal_total, bundle_total, discounted: false };
    }

    let gap = normal_total - bundle_total;
    for line in components.iter_mut() {
        let discount = if normal_total.is_zero() {
            line.gross()
        } else {
            line.unit_price * gap / normal_total * Decimal::from(line.quantity)
        };
        line.discount += discount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

        if !line.discount_within_gross() {
            warn!(
                event_name = "cart.proration.discount_exceeds_gross",
                sku = %line.sku,
                discount = %line.discount,
                gross = %line.gross(),
                "prorated discount exceeds line gross"
            );
        }
    }

    Proration { normal_total, bundle_total, discounted: true }
}
