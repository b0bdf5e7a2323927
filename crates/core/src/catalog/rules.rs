use crate::domain::catalog::BundleCategory;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryTrigger {
    Prefix(String),
    Contains(String),
}

impl QueryTrigger {
    fn fires(&self, query: &str) -> bool {
        match self {
            Self::Prefix(prefix) => query.starts_with(prefix.as_str()),
            Self::Contains(fragment) => query.contains(fragment.as_str()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NameMatcher {
    Contains(Vec<String>),
    StartsWith(Vec<String>),
    Exact(String),
}

impl NameMatcher {
    pub fn matches(&self, name: &str) -> bool {
        let lowered = name.trim().to_lowercase();
        match self {
            Self::Contains(fragments) => {
                fragments.iter().any(|fragment| lowered.contains(fragment.as_str()))
            }
            Self::StartsWith(prefixes) => {
                prefixes.iter().any(|prefix| lowered.starts_with(prefix.as_str()))
            }
            Self::Exact(expected) => lowered == *expected,
        }
    }
}

/// Routes a bundle query to a restricted slice of the bundle catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryRule {
    pub category: BundleCategory,
    pub triggers: Vec<QueryTrigger>,
    pub matcher: NameMatcher,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryRules {
    rules: Vec<CategoryRule>,
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_lowercase()).collect()
}

impl Default for CategoryRules {
    fn default() -> Self {
        let prefixes = |values: &[&str]| -> Vec<QueryTrigger> {
            values.iter().map(|value| QueryTrigger::Prefix(value.to_string())).collect()
        };
        let contains = |value: &str| vec![QueryTrigger::Contains(value.to_string())];

        Self::new(vec![
            CategoryRule {
                category: BundleCategory::Merch,
                triggers: prefixes(&["merch", "mer"]),
                matcher: NameMatcher::Contains(owned(&["merch", "merh"])),
            },
            CategoryRule {
                category: BundleCategory::Guarantee,
                triggers: prefixes(&["babe garansiin", "garansi", "garan"]),
                matcher: NameMatcher::Exact("babe garansi-in !!!".to_string()),
            },
            CategoryRule {
                category: BundleCategory::Coupon,
                triggers: contains("kupon"),
                matcher: NameMatcher::Contains(owned(&["kupon"])),
            },
            CategoryRule {
                category: BundleCategory::Voucher,
                triggers: contains("voucher"),
                matcher: NameMatcher::Contains(owned(&["voucher"])),
            },
            CategoryRule {
                category: BundleCategory::Compliment,
                triggers: prefixes(&["komplimen", "komp"]),
                matcher: NameMatcher::StartsWith(owned(&["komplimen", "komp"])),
            },
            CategoryRule {
                category: BundleCategory::Delivery,
                triggers: contains("delivery"),
                matcher: NameMatcher::Contains(owned(&["delivery"])),
            },
            CategoryRule {
                category: BundleCategory::Prize,
                triggers: prefixes(&["hadiah"]),
                matcher: NameMatcher::StartsWith(owned(&["hadiah"])),
            },
        ])
    }
}

impl CategoryRules {
    /// Rules are tried in order; the first whose trigger fires wins.
    pub fn new(rules: Vec<CategoryRule>) -> Self {
        Self { rules }
    }

    pub fn rule_for_query(&self, query: &str) -> Option<&CategoryRule> {
        let query = query.trim().to_lowercase();
        self.rules.iter().find(|rule| rule.triggers.iter().any(|trigger| trigger.fires(&query)))
    }

    pub fn classify(&self, bundle_name: &str) -> BundleCategory {
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(bundle_name))
            .map(|rule| rule.category)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::catalog::BundleCategory;

    use super::CategoryRules;

    #[test]
    fn query_prefixes_route_to_categories() {
        let rules = CategoryRules::default();
        let category = |query: &str| rules.rule_for_query(query).map(|rule| rule.category);

        assert_eq!(category("Merch Babe 1"), Some(BundleCategory::Merch));
        assert_eq!(category("garansi botol"), Some(BundleCategory::Guarantee));
        assert_eq!(category("pakai KUPON diskon"), Some(BundleCategory::Coupon));
        assert_eq!(category("komp es batu"), Some(BundleCategory::Compliment));
        assert_eq!(category("free delivery"), Some(BundleCategory::Delivery));
        assert_eq!(category("hadiah ulang tahun"), Some(BundleCategory::Prize));
        assert_eq!(category("paket party gin"), None);
    }

    #[test]
    fn guarantee_matches_only_the_exact_bundle_name() {
        let rules = CategoryRules::default();
        let Some(rule) = rules.rule_for_query("babe garansiin") else {
            panic!("guarantee rule should fire");
        };

        assert!(rule.matcher.matches("Babe Garansi-in !!!"));
        assert!(!rule.matcher.matches("Babe Garansi-in Plus"));
    }

    #[test]
    fn bundle_names_are_classified_with_plain_fallback() {
        let rules = CategoryRules::default();
        assert_eq!(rules.classify("Merh Kaos Babe"), BundleCategory::Merch);
        assert_eq!(rules.classify("Voucher 50K"), BundleCategory::Voucher);
        assert_eq!(rules.classify("Paket Party"), BundleCategory::Plain);
    }
}
