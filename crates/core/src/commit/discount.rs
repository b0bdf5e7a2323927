use rust_decimal::{Decimal, RoundingStrategy};

use crate::domain::order::{OrderLine, SkuKey};
use crate::domain::request::{DiscountMode, DiscountSpec};
use crate::ports::{LineUpdate, OrderDetail};

pub const PRORATION_NOTE: &str = "Promo Paket";
pub const GLOBAL_NOTE: &str = "Diskon";

fn cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Per-row updates carrying prorated bundle discounts. Rows are matched to
/// aggregated lines by SKU key; a discounted line without a committed row is
/// an error naming the line.
pub fn proration_updates(
    detail: &OrderDetail,
    lines: &[OrderLine],
) -> Result<Vec<LineUpdate>, String> {
    let mut updates = Vec::new();
    for line in lines.iter().filter(|line| !line.discount.is_zero()) {
        if matches!(line.sku, SkuKey::Bundle { .. }) {
            continue;
        }
        let Some(row) = detail.lines.iter().find(|row| row.sku.as_ref() == Some(&line.sku)) else {
            return Err(format!("no committed row for `{}` ({})", line.name, line.sku));
        };
        updates.push(LineUpdate {
            line_id: row.line_id.clone(),
            discount: row.discount + line.discount,
            note: PRORATION_NOTE.to_string(),
            price: row.price,
            quantity: row.quantity,
        });
    }
    Ok(updates)
}

/// Spreads an order-wide discount over every row with a positive amount.
/// Fixed discounts are weighted by each row's share of the order total.
pub fn global_updates(detail: &OrderDetail, spec: &DiscountSpec) -> Result<Vec<LineUpdate>, String> {
    if spec.is_zero() {
        return Ok(Vec::new());
    }
    if detail.lines.is_empty() {
        return Err("the committed order has no lines".to_string());
    }
    if spec.mode == DiscountMode::Fixed && detail.total_amount.is_zero() {
        return Err("order total is zero; a fixed discount cannot be apportioned".to_string());
    }

    Ok(detail
        .lines
        .iter()
        .filter(|row| row.amount > Decimal::ZERO)
        .map(|row| {
            let share = match spec.mode {
                DiscountMode::Fixed => row.amount * spec.value / detail.total_amount,
                DiscountMode::Percentage => row.amount * spec.value / Decimal::ONE_HUNDRED,
            };
            LineUpdate {
                line_id: row.line_id.clone(),
                discount: cents(row.discount + share),
                note: GLOBAL_NOTE.to_string(),
                price: row.price,
                quantity: row.quantity,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::catalog::{BundleId, ItemId, VariantId};
    use crate::domain::order::{LineOrigin, OrderLine, RemoteOrderId, SkuKey};
    use crate::domain::request::{DiscountMode, DiscountSpec};
    use crate::ports::{OrderDetail, OrderDetailLine};

    use super::{global_updates, proration_updates};

    fn row(id: &str, sku: SkuKey, price: i64, quantity: u32) -> OrderDetailLine {
        OrderDetailLine {
            line_id: id.to_string(),
            sku: Some(sku),
            name: format!("row {id}"),
            quantity,
            price: Decimal::new(price, 0),
            amount: Decimal::new(price, 0) * Decimal::from(quantity),
            discount: Decimal::ZERO,
        }
    }

    fn detail(lines: Vec<OrderDetailLine>) -> OrderDetail {
        let total = lines.iter().map(|line| line.amount).sum();
        OrderDetail {
            id: RemoteOrderId("1".to_string()),
            order_no: "SO-1".to_string(),
            total_amount: total,
            formatted_total: String::new(),
            lines,
        }
    }

    fn gin() -> SkuKey {
        SkuKey::variant(ItemId("10".to_string()), VariantId("1".to_string()))
    }

    fn tonic() -> SkuKey {
        SkuKey::item(ItemId("20".to_string()))
    }

    #[test]
    fn percentage_discount_is_a_share_of_each_row() {
        let detail = detail(vec![row("L1", gin(), 100_000, 1)]);
        let spec = DiscountSpec { mode: DiscountMode::Percentage, value: Decimal::new(10, 0) };

        let updates = global_updates(&detail, &spec).expect("updates");
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].discount, Decimal::new(10_000, 0));
    }

    #[test]
    fn fixed_discount_is_weighted_by_the_order_total() {
        let detail = detail(vec![row("L1", gin(), 50_000, 1), row("L2", tonic(), 150_000, 1)]);
        let spec = DiscountSpec { mode: DiscountMode::Fixed, value: Decimal::new(20_000, 0) };

        let updates = global_updates(&detail, &spec).expect("updates");
        assert_eq!(updates[0].discount, Decimal::new(5_000, 0));
        assert_eq!(updates[1].discount, Decimal::new(15_000, 0));
    }

    #[test]
    fn global_pass_keeps_existing_row_discounts() {
        let mut first = row("L1", gin(), 100_000, 1);
        first.discount = Decimal::new(2_000, 0);
        first.amount = Decimal::new(98_000, 0);
        let spec = DiscountSpec { mode: DiscountMode::Percentage, value: Decimal::new(10, 0) };

        let updates = global_updates(&detail(vec![first]), &spec).expect("updates");
        assert_eq!(updates[0].discount, Decimal::new(11_800, 0));
    }

    #[test]
    fn rows_without_a_positive_amount_are_skipped() {
        let mut free = row("L2", tonic(), 0, 1);
        free.amount = Decimal::ZERO;
        let detail = detail(vec![row("L1", gin(), 100_000, 1), free]);
        let spec = DiscountSpec { mode: DiscountMode::Percentage, value: Decimal::new(5, 0) };

        let updates = global_updates(&detail, &spec).expect("updates");
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].line_id, "L1");
    }

    #[test]
    fn fixed_discount_on_a_zero_total_is_an_error() {
        let mut free = row("L1", gin(), 0, 1);
        free.amount = Decimal::ZERO;
        let spec = DiscountSpec { mode: DiscountMode::Fixed, value: Decimal::new(1_000, 0) };

        assert!(global_updates(&detail(vec![free]), &spec).is_err());
    }

    #[test]
    fn zero_discount_produces_no_updates() {
        let detail = detail(vec![row("L1", gin(), 100_000, 1)]);
        assert!(global_updates(&detail, &DiscountSpec::none()).expect("updates").is_empty());
    }

    #[test]
    fn proration_rows_are_found_by_key_not_position() {
        let detail = detail(vec![row("L1", tonic(), 20_000, 2), row("L2", gin(), 95_000, 1)]);
        let lines = vec![OrderLine {
            sku: gin(),
            name: "Gin".to_string(),
            quantity: 1,
            unit_price: Decimal::new(95_000, 0),
            discount: Decimal::new(15_000, 0),
            origin: LineOrigin::BundleComponent { bundle_id: BundleId("b1".to_string()) },
        }];

        let updates = proration_updates(&detail, &lines).expect("updates");
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].line_id, "L2");
        assert_eq!(updates[0].discount, Decimal::new(15_000, 0));
        assert_eq!(updates[0].price, Decimal::new(95_000, 0));
    }

    #[test]
    fn discounted_line_without_a_row_is_reported() {
        let detail = detail(vec![row("L1", tonic(), 20_000, 2)]);
        let lines = vec![OrderLine {
            sku: gin(),
            name: "Gin".to_string(),
            quantity: 1,
            unit_price: Decimal::new(95_000, 0),
            discount: Decimal::new(15_000, 0),
            origin: LineOrigin::Item,
        }];

        let error = proration_updates(&detail, &lines).expect_err("missing row");
        assert!(error.contains("Gin"));
    }
}
