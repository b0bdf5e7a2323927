pub mod audit;
pub mod cart;
pub mod catalog;
pub mod commit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod invoice;
pub mod policy;
pub mod ports;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use audit::{AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink, NoopAuditSink};
pub use cart::resolver::{strategy_for, BundleStrategy, CatalogResolver};
pub use catalog::CatalogIndex;
pub use commit::admin::{CancelReport, OrderAdmin};
pub use commit::{CommitContext, CommitSettings, CommittedOrder, OrderCommitProtocol};
pub use config::AppConfig;
pub use domain::order::{OrderLine, OrderStage, RemoteOrder, RemoteOrderId, SkuKey};
pub use domain::request::{LineRequest, ResolvedOrderRequest};
pub use errors::{BackendError, ErrorKind, OrderError, ResolutionError};
pub use invoice::{InvoiceInput, InvoiceRenderer};
