use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::domain::order::{OrderLine, SkuKey};

/// Merges lines sharing a SKU key. Quantities and discounts are summed; name,
/// price and origin come from the first occurrence, and groups keep the
/// order in which their key was first seen.
pub fn aggregate(lines: &[OrderLine]) -> Vec<OrderLine> {
    let mut positions: HashMap<&SkuKey, usize> = HashMap::new();
    let mut merged: Vec<OrderLine> = Vec::with_capacity(lines.len());

    for line in lines {
        match positions.get(&line.sku) {
            Some(&position) => {
                let group = &mut merged[position];
                group.quantity += line.quantity;
                group.discount += line.discount;
            }
            None => {
                positions.insert(&line.sku, merged.len());
                merged.push(line.clone());
            }
        }
    }

    merged
}

/// Sum of net line amounts.
pub fn subtotal(lines: &[OrderLine]) -> Decimal {
    lines.iter().map(OrderLine::net).sum()
}
