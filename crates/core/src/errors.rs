use thiserror::Error;

use crate::domain::order::OrderStage;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid order stage transition from {from:?} to {to:?}")]
    InvalidStageTransition { from: OrderStage, to: OrderStage },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failure of a single call against the POS backend.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("{operation}: rate limited by backend")]
    RateLimited { operation: String },
    #[error("{operation}: not found")]
    NotFound { operation: String },
    #[error("{operation}: {detail}")]
    Transport { operation: String, detail: String },
    #[error("{operation}: rejected: {message}")]
    Rejected { operation: String, message: String },
    #[error("backend credentials unavailable: {0}")]
    Credentials(String),
}

impl BackendError {
    pub fn transport(operation: impl Into<String>, detail: impl ToString) -> Self {
        Self::Transport { operation: operation.into(), detail: detail.to_string() }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("no catalog entry found for `{query}`")]
    NotFound { query: String },
    #[error("no catalog entry matched `{query}`")]
    AmbiguousNoMatch { query: String },
    #[error("insufficient stock for `{product}`: short by {shortfall}")]
    InsufficientStock { product: String, shortfall: u32 },
    #[error("catalog lookup for `{query}` failed: {source}")]
    Backend { query: String, source: BackendError },
}

/// Stable names of the failure taxonomy, used in logs and the order journal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    TranslationFailure,
    AddressResolution,
    DistanceRejected,
    OrderCreation,
    ResolutionNotFound,
    ResolutionAmbiguousNoMatch,
    ResolutionInsufficientStock,
    BackendRateLimited,
    BackendNotFound,
    BackendTransportError,
    DiscountComputationError,
    PostCommitReadFailure,
    InvariantViolation,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TranslationFailure => "translation_failure",
            Self::AddressResolution => "address_resolution",
            Self::DistanceRejected => "distance_rejected",
            Self::OrderCreation => "order_creation",
            Self::ResolutionNotFound => "resolution_not_found",
            Self::ResolutionAmbiguousNoMatch => "resolution_ambiguous_no_match",
            Self::ResolutionInsufficientStock => "resolution_insufficient_stock",
            Self::BackendRateLimited => "backend_rate_limited",
            Self::BackendNotFound => "backend_not_found",
            Self::BackendTransportError => "backend_transport_error",
            Self::DiscountComputationError => "discount_computation_error",
            Self::PostCommitReadFailure => "post_commit_read_failure",
            Self::InvariantViolation => "invariant_violation",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum OrderError {
    #[error("translation failed: {detail}")]
    Translation { detail: String },
    #[error("address could not be resolved: {detail}")]
    AddressResolution { detail: String },
    #[error("delivery distance {distance_km:.1} km exceeds the {max_km:.0} km limit")]
    DistanceRejected { distance_km: f64, max_km: f64 },
    #[error("order creation failed: {source}")]
    OrderCreation { source: BackendError },
    #[error("order {order_no}: {source}")]
    Resolution { order_no: String, source: ResolutionError },
    #[error("order {order_no}: adding `{product}` failed: {source}")]
    LineCommit { order_no: String, product: String, source: BackendError },
    #[error("order {order_no}: discount computation failed: {detail}")]
    DiscountComputation { order_no: String, detail: String },
    #[error("order {order_no}: discounts applied to {applied} of {total} lines: {source}")]
    DiscountPush { order_no: String, applied: usize, total: usize, source: BackendError },
    #[error("order {order_no}: reading committed order failed: {source}")]
    PostCommitRead { order_no: String, source: BackendError },
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Translation { .. } => ErrorKind::TranslationFailure,
            Self::AddressResolution { .. } => ErrorKind::AddressResolution,
            Self::DistanceRejected { .. } => ErrorKind::DistanceRejected,
            Self::OrderCreation { source } => backend_kind(source, ErrorKind::OrderCreation),
            Self::Resolution { source, .. } => match source {
                ResolutionError::NotFound { .. } => ErrorKind::ResolutionNotFound,
                ResolutionError::AmbiguousNoMatch { .. } => ErrorKind::ResolutionAmbiguousNoMatch,
                ResolutionError::InsufficientStock { .. } => {
                    ErrorKind::ResolutionInsufficientStock
                }
                ResolutionError::Backend { source, .. } => {
                    backend_kind(source, ErrorKind::BackendTransportError)
                }
            },
            Self::LineCommit { source, .. } => {
                backend_kind(source, ErrorKind::BackendTransportError)
            }
            Self::DiscountComputation { .. } => ErrorKind::DiscountComputationError,
            Self::DiscountPush { source, .. } => {
                backend_kind(source, ErrorKind::DiscountComputationError)
            }
            Self::PostCommitRead { .. } => ErrorKind::PostCommitReadFailure,
            Self::Domain(_) => ErrorKind::InvariantViolation,
        }
    }

    /// Text sent back to the operator who forwarded the order.
    pub fn user_message(&self) -> String {
        match self {
            Self::Translation { .. } => {
                "The order message could not be understood. Check the format and resend it."
                    .to_string()
            }
            Self::AddressResolution { .. } => {
                "The address could not be found. Send a clearer address or a map link.".to_string()
            }
            Self::DistanceRejected { distance_km, max_km } => format!(
                "Delivery distance is {distance_km:.1} km, beyond our {max_km:.0} km range. Please check the address."
            ),
            Self::OrderCreation { source } => {
                format!("The order could not be created in the POS: {source}")
            }
            Self::Resolution { order_no, source } => match source {
                ResolutionError::NotFound { query } => format!(
                    "Order {order_no} voided: `{query}` is not in the catalog. Check the product name and resend."
                ),
                ResolutionError::AmbiguousNoMatch { query } => format!(
                    "Order {order_no} voided: no product matched `{query}`. Write the full product name, or check whether it should be ordered as a bundle."
                ),
                ResolutionError::InsufficientStock { product, shortfall } => format!(
                    "Order {order_no} voided: stock of `{product}` is short by {shortfall}."
                ),
                ResolutionError::Backend { query, source } if source.is_rate_limited() => format!(
                    "Order {order_no} voided while looking up `{query}`: the POS is rate limiting requests. Wait a minute and resend."
                ),
                ResolutionError::Backend { query, source } => format!(
                    "Order {order_no} voided while looking up `{query}`: {source}"
                ),
            },
            Self::LineCommit { order_no, product, source } if source.is_rate_limited() => format!(
                "Order {order_no} voided while adding `{product}`: the POS is rate limiting requests. Wait a minute and resend."
            ),
            Self::LineCommit { order_no, product, source } => {
                format!("Order {order_no} voided: `{product}` could not be added ({source}).")
            }
            Self::DiscountComputation { order_no, detail } => {
                format!("Order {order_no} voided: discounts could not be computed ({detail}).")
            }
            Self::DiscountPush { order_no, applied, total, source } if *applied == 0 => format!(
                "Order {order_no} voided: no discount could be applied out of {total} lines ({source})."
            ),
            Self::DiscountPush { order_no, applied, total, source } => format!(
                "Order {order_no} voided: discounts were only applied to {applied} of {total} lines ({source})."
            ),
            Self::PostCommitRead { order_no, source } => {
                format!("Order {order_no} voided: the committed order could not be read back ({source}).")
            }
            Self::Domain(error) => format!("Internal order error: {error}"),
        }
    }
}

fn backend_kind(error: &BackendError, fallback: ErrorKind) -> ErrorKind {
    match error {
        BackendError::RateLimited { .. } => ErrorKind::BackendRateLimited,
        BackendError::NotFound { .. } => ErrorKind::BackendNotFound,
        BackendError::Transport { .. } => ErrorKind::BackendTransportError,
        BackendError::Rejected { .. } | BackendError::Credentials(_) => fallback,
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{BackendError, ErrorKind, OrderError, ResolutionError};

    #[test]
    fn rate_limit_during_lookup_keeps_its_own_kind() {
        let error = OrderError::Resolution {
            order_no: "SO-7".to_string(),
            source: ResolutionError::Backend {
                query: "gin".to_string(),
                source: BackendError::RateLimited { operation: "item detail".to_string() },
            },
        };

        assert_eq!(error.kind(), ErrorKind::BackendRateLimited);
        assert!(error.user_message().contains("rate limiting"));
    }

    #[test]
    fn no_match_message_carries_guidance_and_order_number() {
        let error = OrderError::Resolution {
            order_no: "SO-8".to_string(),
            source: ResolutionError::AmbiguousNoMatch { query: "gin tonic".to_string() },
        };

        let message = error.user_message();
        assert_eq!(error.kind(), ErrorKind::ResolutionAmbiguousNoMatch);
        assert!(message.contains("SO-8"));
        assert!(message.contains("gin tonic"));
        assert!(message.contains("bundle"));
    }

    #[test]
    fn partial_discount_push_is_reported_distinctly() {
        let partial = OrderError::DiscountPush {
            order_no: "SO-9".to_string(),
            applied: 2,
            total: 3,
            source: BackendError::transport("update line", "timeout"),
        };
        let total = OrderError::DiscountPush {
            order_no: "SO-9".to_string(),
            applied: 0,
            total: 3,
            source: BackendError::transport("update line", "timeout"),
        };

        assert!(partial.user_message().contains("only applied to 2 of 3"));
        assert!(total.user_message().contains("no discount could be applied"));
    }

    #[test]
    fn distance_rejection_reports_both_numbers() {
        let error = OrderError::DistanceRejected { distance_km: 46.04, max_km: 45.0 };
        assert_eq!(error.kind(), ErrorKind::DistanceRejected);
        assert!(error.user_message().contains("46.0 km"));
        assert!(error.user_message().contains("45 km"));
    }
}
