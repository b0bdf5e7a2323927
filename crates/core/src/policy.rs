//! Deterministic lines appended to every order: the delivery fee and the
//! accessories that depend on the order subtotal.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::request::{DeliveryClass, LineRequest};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeliveryTier {
    pub max_km: f64,
    pub line_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryPolicy {
    /// Neighbourhood names served without a distance-tiered fee.
    pub free_areas: Vec<String>,
    /// Inside a free area and within this radius no fee line is added.
    pub free_radius_km: f64,
    pub subsidy_line: String,
    /// Sorted by `max_km`; the last tier also covers anything beyond it.
    pub tiers: Vec<DeliveryTier>,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        let free_areas = [
            "Gedongan",
            "Gedangan",
            "Gentan",
            "Kadilangu",
            "Kudu",
            "Kwarasan",
            "Langenharjo",
            "Madegondo",
            "Gonilan",
            "Gumpang",
            "Pabelan",
            "Blulukan",
            "Karangasem",
            "Baturan",
            "Gajahan",
            "Paulan",
        ];
        Self {
            free_areas: free_areas.iter().map(|area| area.to_string()).collect(),
            free_radius_km: 5.0,
            subsidy_line: "Subsidi Ongkir 10K".to_string(),
            tiers: vec![
                DeliveryTier { max_km: 5.0, line_name: "Ongkir 10K".to_string() },
                DeliveryTier { max_km: 10.0, line_name: "Ongkir 15K".to_string() },
                DeliveryTier { max_km: 15.0, line_name: "Ongkir 20K".to_string() },
                DeliveryTier { max_km: 25.0, line_name: "Ongkir 30K".to_string() },
                DeliveryTier { max_km: 45.0, line_name: "Ongkir 45K".to_string() },
            ],
        }
    }
}

impl DeliveryPolicy {
    pub fn in_free_area(&self, address: &str) -> bool {
        let address = address.to_lowercase();
        self.free_areas.iter().any(|area| address.contains(&area.to_lowercase()))
    }

    /// Name of the catalog item that carries the delivery fee for this
    /// address, or `None` when delivery is free.
    pub fn fee_line_name(&self, address: &str, distance_km: f64) -> Option<&str> {
        if self.in_free_area(address) {
            if distance_km <= self.free_radius_km {
                return None;
            }
            return Some(&self.subsidy_line);
        }

        self.tiers
            .iter()
            .find(|tier| distance_km <= tier.max_km)
            .or_else(|| self.tiers.last())
            .map(|tier| tier.line_name.as_str())
    }

    pub fn fee_line(&self, address: &str, distance_km: f64) -> Option<LineRequest> {
        self.fee_line_name(address, distance_km).map(|name| LineRequest::item(name, 1))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.free_radius_km < 0.0 {
            return Err("free_radius_km must not be negative".to_string());
        }
        if self.tiers.is_empty() {
            return Err("at least one delivery tier is required".to_string());
        }
        let sorted = self.tiers.windows(2).all(|pair| pair[0].max_km < pair[1].max_km);
        if !sorted {
            return Err("delivery tiers must be sorted by ascending max_km".to_string());
        }
        if self.tiers.iter().any(|tier| tier.line_name.trim().is_empty()) {
            return Err("delivery tier line names must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessoryPolicy {
    pub cup_item: String,
    /// Subtotals strictly below this get one cup, everything else two.
    pub single_cup_below: Decimal,
    /// Merch bands: `(low_above, high_from)`; low band is exclusive on both ends.
    pub merch_low_above: Decimal,
    pub merch_high_from: Decimal,
    pub merch_low_bundle: String,
    pub merch_high_bundle: String,
}

impl Default for AccessoryPolicy {
    fn default() -> Self {
        Self {
            cup_item: "Cup".to_string(),
            single_cup_below: Decimal::new(100_000, 0),
            merch_low_above: Decimal::new(150_000, 0),
            merch_high_from: Decimal::new(250_000, 0),
            merch_low_bundle: "Merch Babe 1".to_string(),
            merch_high_bundle: "Merch Babe 2".to_string(),
        }
    }
}

impl AccessoryPolicy {
    pub fn cup_line(&self, subtotal: Decimal) -> LineRequest {
        let quantity = if subtotal < self.single_cup_below { 1 } else { 2 };
        LineRequest::item(self.cup_item.clone(), quantity)
    }

    pub fn merch_line(&self, subtotal: Decimal) -> Option<LineRequest> {
        if subtotal >= self.merch_high_from {
            return Some(LineRequest::bundle(self.merch_high_bundle.clone(), 1));
        }
        if subtotal > self.merch_low_above {
            return Some(LineRequest::bundle(self.merch_low_bundle.clone(), 1));
        }
        None
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.merch_low_above >= self.merch_high_from {
            return Err("merch_low_above must be below merch_high_from".to_string());
        }
        if self.cup_item.trim().is_empty() {
            return Err("cup_item must not be empty".to_string());
        }
        Ok(())
    }
}

/// Timing model behind the dispatch and arrival times on an invoice.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtaPolicy {
    /// Standard orders leave the warehouse within this window.
    pub standard_dispatch_minutes: i64,
    pub prep_minutes: i64,
    pub instant_speed_kmh: f64,
    pub express_speed_kmh: f64,
    /// Added to every instant or express arrival estimate.
    pub handover_minutes: i64,
    /// Added to the route duration when no estimate can be computed.
    pub fallback_margin_minutes: i64,
}

impl Default for EtaPolicy {
    fn default() -> Self {
        Self {
            standard_dispatch_minutes: 60,
            prep_minutes: 10,
            instant_speed_kmh: 25.0,
            express_speed_kmh: 35.0,
            handover_minutes: 3,
            fallback_margin_minutes: 20,
        }
    }
}

impl EtaPolicy {
    /// Minutes from now until the courier reaches the customer, or `None`
    /// when the distance or speed cannot produce an estimate.
    pub fn travel_minutes(&self, class: DeliveryClass, distance_km: f64) -> Option<i64> {
        let speed = match class {
            DeliveryClass::Standard => return Some(self.standard_dispatch_minutes),
            DeliveryClass::Instant => self.instant_speed_kmh,
            DeliveryClass::Express => self.express_speed_kmh,
        };
        if !distance_km.is_finite() || distance_km < 0.0 || !speed.is_finite() || speed <= 0.0 {
            return None;
        }
        let riding = (distance_km / speed * 60.0).ceil() as i64;
        Some(self.prep_minutes + riding)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.standard_dispatch_minutes <= 0 {
            return Err("standard_dispatch_minutes must be positive".to_string());
        }
        if self.instant_speed_kmh.is_nan() || self.instant_speed_kmh <= 0.0 {
            return Err("instant_speed_kmh must be positive".to_string());
        }
        if self.express_speed_kmh.is_nan() || self.express_speed_kmh <= 0.0 {
            return Err("express_speed_kmh must be positive".to_string());
        }
        if self.prep_minutes < 0 || self.handover_minutes < 0 || self.fallback_margin_minutes < 0 {
            return Err("minute offsets must not be negative".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::request::{DeliveryClass, LineKind};

    use super::{AccessoryPolicy, DeliveryPolicy, EtaPolicy};

    #[test]
    fn free_area_inside_radius_has_no_fee_line() {
        let policy = DeliveryPolicy::default();
        assert_eq!(policy.fee_line_name("Jl. Mawar 3, Gonilan, Kartasura", 2.4), None);
        assert!(policy.fee_line("Jl. Mawar 3, Gonilan, Kartasura", 2.4).is_none());
        assert_eq!(
            policy.fee_line_name("Jl. Mawar 3, Gonilan, Kartasura", 7.0),
            Some("Subsidi Ongkir 10K")
        );
    }

    #[test]
    fn outside_free_areas_uses_distance_tiers() {
        let policy = DeliveryPolicy::default();
        assert_eq!(policy.fee_line_name("Jl. Slamet Riyadi, Solo", 4.0), Some("Ongkir 10K"));
        assert_eq!(policy.fee_line_name("Jl. Slamet Riyadi, Solo", 12.5), Some("Ongkir 20K"));
        assert_eq!(policy.fee_line_name("Klaten", 60.0), Some("Ongkir 45K"));
    }

    #[test]
    fn unsorted_tiers_are_rejected() {
        let mut policy = DeliveryPolicy::default();
        policy.tiers.reverse();
        assert!(policy.validate().is_err());
    }

    #[test]
    fn cup_count_follows_subtotal_threshold() {
        let policy = AccessoryPolicy::default();
        assert_eq!(policy.cup_line(Decimal::new(99_999, 0)).quantity, 1);
        assert_eq!(policy.cup_line(Decimal::new(100_000, 0)).quantity, 2);
    }

    #[test]
    fn merch_bands_pick_the_right_bundle() {
        let policy = AccessoryPolicy::default();
        assert!(policy.merch_line(Decimal::new(150_000, 0)).is_none());

        let low = policy.merch_line(Decimal::new(150_001, 0)).expect("low band");
        assert_eq!(low.name, "Merch Babe 1");
        assert_eq!(low.kind, LineKind::Bundle);

        let high = policy.merch_line(Decimal::new(250_000, 0)).expect("high band");
        assert_eq!(high.name, "Merch Babe 2");
    }

    #[test]
    fn eta_depends_on_delivery_class() {
        let policy = EtaPolicy::default();
        assert_eq!(policy.travel_minutes(DeliveryClass::Standard, 30.0), Some(60));
        assert_eq!(policy.travel_minutes(DeliveryClass::Instant, 5.0), Some(22));
        assert_eq!(policy.travel_minutes(DeliveryClass::Express, 7.0), Some(22));
        assert_eq!(policy.travel_minutes(DeliveryClass::Instant, f64::NAN), None);
    }
}
