use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Item,
    Bundle,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub kind: LineKind,
    pub name: String,
    pub quantity: u32,
}

impl LineRequest {
    pub fn item(name: impl Into<String>, quantity: u32) -> Self {
        Self { kind: LineKind::Item, name: name.into(), quantity }
    }

    pub fn bundle(name: impl Into<String>, quantity: u32) -> Self {
        Self { kind: LineKind::Bundle, name: name.into(), quantity }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountMode {
    Fixed,
    Percentage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountSpec {
    pub mode: DiscountMode,
    /// Currency amount in fixed mode, percent points (10 = 10%) in percentage mode.
    pub value: Decimal,
}

impl DiscountSpec {
    pub fn none() -> Self {
        Self { mode: DiscountMode::Fixed, value: Decimal::ZERO }
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }
}

impl Default for DiscountSpec {
    fn default() -> Self {
        Self::none()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Bri,
    Credit,
    Bca,
    Qris,
}

impl PaymentMethod {
    pub fn label(self) -> &'static str {
        match self {
            Self::Cash => "CASH",
            Self::Bri => "BRI",
            Self::Credit => "HUTANG",
            Self::Bca => "BCA",
            Self::Qris => "QRIS",
        }
    }

    /// Unknown payment names fall back to cash.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "bri" => Self::Bri,
            "hutang" | "credit" | "tab" => Self::Credit,
            "bca" => Self::Bca,
            "qris" => Self::Qris,
            _ => Self::Cash,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryClass {
    Standard,
    Instant,
    Express,
}

impl DeliveryClass {
    pub fn code(self) -> &'static str {
        match self {
            Self::Standard => "FD",
            Self::Instant => "I",
            Self::Express => "EX",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Standard => "Standard Delivery",
            Self::Instant => "Instant",
            Self::Express => "Express",
        }
    }

    pub fn from_code(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "FD" | "STANDARD" => Some(Self::Standard),
            "I" | "INSTANT" => Some(Self::Instant),
            "EX" | "EXPRESS" => Some(Self::Express),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayCondition {
    Rain,
    Traffic,
    NoExpedition,
    Backlog,
}

impl DelayCondition {
    pub fn minutes(self) -> i64 {
        match self {
            Self::Rain => 5,
            Self::Traffic => 5,
            Self::NoExpedition => 15,
            Self::Backlog => 10,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rain" | "hujan" => Some(Self::Rain),
            "traffic" | "macet" => Some(Self::Traffic),
            "no_expedition" | "etj" => Some(Self::NoExpedition),
            "backlog" | "numpuk" => Some(Self::Backlog),
            _ => None,
        }
    }
}

/// Flags lifted from the raw message text rather than from the translation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMarkers {
    pub pending: bool,
    pub update_receipt: bool,
    pub request_update: bool,
}

impl MessageMarkers {
    pub fn scan(raw: &str) -> Self {
        let lowered = raw.to_lowercase();
        Self {
            pending: lowered.contains("pending"),
            update_receipt: lowered.contains("update-struk"),
            request_update: lowered.contains("req-update"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedOrderRequest {
    pub customer_name: String,
    pub phone: String,
    pub address: String,
    pub payment_method: PaymentMethod,
    pub payment_settled: bool,
    pub discount: DiscountSpec,
    pub lines: Vec<LineRequest>,
    pub notes: String,
    pub delivery_class: DeliveryClass,
    pub delay_conditions: Vec<DelayCondition>,
    #[serde(default)]
    pub markers: MessageMarkers,
}

impl ResolvedOrderRequest {
    pub fn delay_minutes(&self) -> i64 {
        self.delay_conditions.iter().map(|condition| condition.minutes()).sum()
    }
}
