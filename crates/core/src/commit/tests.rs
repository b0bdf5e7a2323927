use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::audit::InMemoryAuditSink;
use crate::cart::resolver::{strategy_for, CatalogResolver};
use crate::catalog::rules::CategoryRules;
use crate::catalog::CatalogIndex;
use crate::config::BundleMode;
use crate::domain::catalog::{
    BundleCategory, BundleComponent, BundleId, CatalogBundle, CatalogItem, CatalogSnapshot, ItemId,
    Variant, VariantId,
};
use crate::domain::order::{OrderStage, RemoteOrderStatus};
use crate::errors::DomainError;
use crate::domain::request::{
    DeliveryClass, DiscountMode, DiscountSpec, LineRequest, MessageMarkers, PaymentMethod,
    ResolvedOrderRequest,
};
use crate::errors::{BackendError, ErrorKind, OrderError};
use crate::ports::{CustomerSpec, Disambiguation};
use crate::testing::{FakePosBackend, ScriptedDisambiguator};

use super::{failure_reply, order_note, CommitContext, CommitSettings, OrderCommitProtocol};

fn item(id: &str, name: &str, price: i64, variants: Vec<Variant>) -> CatalogItem {
    CatalogItem {
        id: ItemId(id.to_string()),
        name: name.to_string(),
        price: Decimal::new(price, 0),
        variants,
        hidden: false,
    }
}

fn gin_batch(stock: i64) -> Variant {
    Variant {
        id: VariantId("v1".to_string()),
        name: "Batch A".to_string(),
        price: Decimal::new(45_000, 0),
        stock,
        held: 0,
    }
}

fn bundle(id: &str, name: &str, price: i64, components: Vec<BundleComponent>) -> CatalogBundle {
    CatalogBundle {
        id: BundleId(id.to_string()),
        name: name.to_string(),
        price: Decimal::new(price, 0),
        components,
        hidden: false,
        category: BundleCategory::Plain,
    }
}

fn items() -> Vec<CatalogItem> {
    vec![
        item("10", "Gin Gordon's 750ml", 45_000, vec![gin_batch(10)]),
        item("20", "Tonic Water Schweppes", 12_000, Vec::new()),
        item("30", "Cup", 0, Vec::new()),
        item("40", "Ongkir 10K", 10_000, Vec::new()),
        item("41", "Ongkir 15K", 15_000, Vec::new()),
        item("42", "Gratis Ongkir", 0, Vec::new()),
        item("50", "Vodka Smirnoff 700ml", 60_000, Vec::new()),
        item("51", "Club Soda 1L", 40_000, Vec::new()),
    ]
}

fn bundles() -> Vec<CatalogBundle> {
    vec![
        bundle(
            "b1",
            "Paket Gin Hemat",
            40_000,
            vec![BundleComponent {
                row_id: None,
                item_id: ItemId("10".to_string()),
                variant_id: None,
                quantity: 1,
            }],
        ),
        bundle(
            "b4",
            "Paket Vodka Soda",
            80_000,
            vec![
                BundleComponent {
                    row_id: None,
                    item_id: ItemId("50".to_string()),
                    variant_id: None,
                    quantity: 1,
                },
                BundleComponent {
                    row_id: None,
                    item_id: ItemId("51".to_string()),
                    variant_id: None,
                    quantity: 1,
                },
            ],
        ),
        bundle("b2", "Merch Babe 1", 0, Vec::new()),
        bundle("b3", "Merch Babe 2", 0, Vec::new()),
    ]
}

fn backend() -> FakePosBackend {
    let backend = FakePosBackend::new();
    let backend = items().into_iter().fold(backend, FakePosBackend::with_item);
    bundles().into_iter().fold(backend, FakePosBackend::with_bundle)
}

struct Harness {
    protocol: OrderCommitProtocol,
    backend: Arc<FakePosBackend>,
    audit: Arc<InMemoryAuditSink>,
}

fn harness(backend: FakePosBackend, disambiguator: ScriptedDisambiguator, mode: BundleMode) -> Harness {
    let backend = Arc::new(backend);
    let audit = Arc::new(InMemoryAuditSink::default());
    let index = Arc::new(CatalogIndex::new(
        CatalogSnapshot { items: items(), bundles: bundles(), synced_at: None },
        CategoryRules::default(),
    ));
    let resolver = CatalogResolver::new(
        index,
        backend.clone(),
        Arc::new(disambiguator),
        strategy_for(mode, "X"),
        10,
        "X",
    );
    let protocol =
        OrderCommitProtocol::new(resolver, backend.clone(), audit.clone(), CommitSettings::default());
    Harness { protocol, backend, audit }
}

fn request(lines: Vec<LineRequest>) -> ResolvedOrderRequest {
    ResolvedOrderRequest {
        customer_name: "Rina".to_string(),
        phone: "+6281234567890".to_string(),
        address: "Jl. Kusumodilagan 12, Jebres".to_string(),
        payment_method: PaymentMethod::Qris,
        payment_settled: true,
        discount: DiscountSpec::none(),
        lines,
        notes: String::new(),
        delivery_class: DeliveryClass::Standard,
        delay_conditions: Vec::new(),
        markers: MessageMarkers::default(),
    }
}

fn context() -> CommitContext {
    CommitContext {
        correlation_id: "msg-1".to_string(),
        order_date: NaiveDate::from_ymd_opt(2026, 3, 14).expect("valid date"),
        zone_text: "Jebres, Surakarta".to_string(),
        distance_km: 3.2,
        notes_summary: String::new(),
    }
}

fn gin_and_bundle() -> Vec<LineRequest> {
    vec![LineRequest::item("gin gordon", 1), LineRequest::bundle("paket gin hemat", 1)]
}

#[tokio::test]
async fn item_and_bundle_order_reaches_paid_with_aggregated_lines() {
    let h = harness(backend(), ScriptedDisambiguator::default(), BundleMode::Expanded);

    let committed = h.protocol.commit(&request(gin_and_bundle()), &context()).await.expect("commit");

    assert_eq!(committed.order.stage, OrderStage::Paid);
    assert!(committed.payment_recorded);
    assert_eq!(committed.lines.len(), 3);
    assert_eq!(committed.lines[0].name, "Gin Gordon's 750ml");
    assert_eq!(committed.lines[0].quantity, 2);
    assert_eq!(committed.lines[0].discount, Decimal::new(5_000, 0));
    assert_eq!(h.backend.calls_to("add_item"), 3);
    assert_eq!(h.backend.calls_to("add_bundle"), 0);

    let remote = h.backend.order(&committed.order.id).expect("remote order");
    assert_eq!(remote.status, RemoteOrderStatus::Finalized);
    assert_eq!(remote.total(), Decimal::new(95_000, 0));
    assert_eq!(committed.detail.total_amount, Decimal::new(95_000, 0));
    assert_eq!(remote.payments.len(), 1);
    assert_eq!(remote.payments[0].mode_id, "pm-4");
    assert_eq!(remote.payments[0].amount, Decimal::new(95_000, 0));
    assert_eq!(remote.notes, "[FD]");
    assert_eq!(
        remote.customer,
        CustomerSpec::New { name: "Rina".to_string(), phone: "+6281234567890".to_string() }
    );
    assert_eq!(committed.receipt_url.as_deref(), Some("https://receipts.test/SO-0001"));
    assert_eq!(h.audit.event_types(), vec!["order.created", "order.finalized", "order.committed"]);
}

#[tokio::test]
async fn opaque_bundles_are_added_as_one_line_without_proration() {
    let h = harness(backend(), ScriptedDisambiguator::default(), BundleMode::Opaque);

    let committed = h.protocol.commit(&request(gin_and_bundle()), &context()).await.expect("commit");

    assert_eq!(h.backend.calls_to("add_bundle"), 1);
    assert_eq!(h.backend.calls_to("update_line"), 0);
    assert_eq!(h.backend.calls_to("fetch_bundle_detail"), 0);
    assert!(h.backend.calls().iter().any(|call| call == "add_bundle b1 x1 (1 components)"));
    assert_eq!(committed.detail.total_amount, Decimal::new(95_000, 0));
}

#[tokio::test]
async fn insufficient_stock_voids_before_any_line_is_added() {
    let h = harness(backend(), ScriptedDisambiguator::default(), BundleMode::Expanded);

    let error = h
        .protocol
        .commit(&request(vec![LineRequest::item("gin gordon", 20)]), &context())
        .await
        .expect_err("stock shortfall");

    assert_eq!(error.kind(), ErrorKind::ResolutionInsufficientStock);
    assert!(error.user_message().contains("Gin Gordon's 750ml"));
    assert_eq!(h.backend.calls_to("add_item"), 0);
    assert_eq!(h.backend.orders()[0].status, RemoteOrderStatus::Voided);
    assert_eq!(h.audit.event_types(), vec!["order.created", "order.voided"]);
}

#[tokio::test]
async fn disambiguation_miss_voids_with_guidance() {
    let disambiguator =
        ScriptedDisambiguator::default().answer("gin gordon", Disambiguation::NoMatch);
    let h = harness(backend(), disambiguator, BundleMode::Expanded);

    let error = h
        .protocol
        .commit(&request(vec![LineRequest::item("gin gordon", 1)]), &context())
        .await
        .expect_err("no match");

    assert_eq!(error.kind(), ErrorKind::ResolutionAmbiguousNoMatch);
    assert!(error.user_message().contains("full product name"));
    assert_eq!(h.backend.orders()[0].status, RemoteOrderStatus::Voided);
}

#[tokio::test]
async fn failed_line_add_names_the_product_and_stops() {
    let backend = backend().fail_after(
        "add_item",
        1,
        BackendError::RateLimited { operation: "add_item".to_string() },
    );
    let h = harness(backend, ScriptedDisambiguator::default(), BundleMode::Expanded);

    let error = h.protocol.commit(&request(gin_and_bundle()), &context()).await.expect_err("add");

    match &error {
        OrderError::LineCommit { product, .. } => assert_eq!(product, "Ongkir 10K"),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(error.kind(), ErrorKind::BackendRateLimited);
    assert_eq!(h.backend.calls_to("add_item"), 2);
    assert_eq!(h.backend.orders()[0].status, RemoteOrderStatus::Voided);
}

#[tokio::test]
async fn percentage_discount_is_spread_after_bundle_proration() {
    let h = harness(backend(), ScriptedDisambiguator::default(), BundleMode::Expanded);
    let mut order = request(gin_and_bundle());
    order.discount = DiscountSpec { mode: DiscountMode::Percentage, value: Decimal::new(10, 0) };

    let committed = h.protocol.commit(&order, &context()).await.expect("commit");

    let gin = committed.detail.lines.iter().find(|line| line.name.starts_with("Gin")).expect("gin");
    assert_eq!(gin.discount, Decimal::new(13_500, 0));
    assert_eq!(committed.detail.total_amount, Decimal::new(85_500, 0));
}

#[tokio::test]
async fn partial_discount_push_is_reported_and_voids() {
    let backend = backend().fail_after(
        "update_line",
        2,
        BackendError::transport("update_line", "connection reset"),
    );
    let h = harness(backend, ScriptedDisambiguator::default(), BundleMode::Expanded);
    let mut order = request(gin_and_bundle());
    order.discount = DiscountSpec { mode: DiscountMode::Fixed, value: Decimal::new(10_000, 0) };

    let error = h.protocol.commit(&order, &context()).await.expect_err("push");

    match error {
        OrderError::DiscountPush { applied, total, .. } => {
            assert_eq!(applied, 1);
            assert_eq!(total, 2);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(h.backend.orders()[0].status, RemoteOrderStatus::Voided);
}

#[tokio::test]
async fn payment_failure_leaves_the_order_open() {
    let backend = backend()
        .fail_on("record_payment", BackendError::transport("record_payment", "timeout"));
    let h = harness(backend, ScriptedDisambiguator::default(), BundleMode::Expanded);

    let committed = h.protocol.commit(&request(gin_and_bundle()), &context()).await.expect("commit");

    assert_eq!(committed.order.stage, OrderStage::UnpaidOpen);
    assert!(!committed.payment_recorded);
    assert_eq!(h.backend.orders()[0].status, RemoteOrderStatus::Open);
}

#[tokio::test]
async fn unsettled_orders_stay_open_without_payment_calls() {
    let h = harness(backend(), ScriptedDisambiguator::default(), BundleMode::Expanded);
    let mut order = request(gin_and_bundle());
    order.payment_settled = false;

    let committed = h.protocol.commit(&order, &context()).await.expect("commit");

    assert_eq!(committed.order.stage, OrderStage::UnpaidOpen);
    assert_eq!(h.backend.calls_to("list_payment_modes"), 0);
}

#[tokio::test]
async fn creation_failure_has_nothing_to_void() {
    let backend = backend().fail_on(
        "create_order",
        BackendError::Rejected { operation: "create_order".to_string(), message: "closed".to_string() },
    );
    let h = harness(backend, ScriptedDisambiguator::default(), BundleMode::Expanded);

    let error = h.protocol.commit(&request(gin_and_bundle()), &context()).await.expect_err("create");

    assert!(matches!(error, OrderError::OrderCreation { .. }));
    assert_eq!(h.backend.calls_to("set_status"), 0);
}

#[tokio::test]
async fn read_back_failure_voids_the_order() {
    let backend = backend().fail_after(
        "fetch_order_detail",
        1,
        BackendError::transport("fetch_order_detail", "502"),
    );
    let h = harness(backend, ScriptedDisambiguator::default(), BundleMode::Expanded);

    let error = h.protocol.commit(&request(gin_and_bundle()), &context()).await.expect_err("read");

    assert_eq!(error.kind(), ErrorKind::PostCommitReadFailure);
    assert_eq!(h.backend.orders()[0].status, RemoteOrderStatus::Voided);
}

#[tokio::test]
async fn known_customers_are_attached_by_id() {
    let backend = backend().with_customer("+6281234567890", "C-77");
    let h = harness(backend, ScriptedDisambiguator::default(), BundleMode::Expanded);

    h.protocol.commit(&request(gin_and_bundle()), &context()).await.expect("commit");

    assert_eq!(
        h.backend.orders()[0].customer,
        CustomerSpec::Existing { customer_id: "C-77".to_string() }
    );
}

#[tokio::test]
async fn customer_lookup_failure_falls_back_to_raw_details() {
    let backend = backend()
        .fail_on("find_customer", BackendError::transport("find_customer", "timeout"));
    let h = harness(backend, ScriptedDisambiguator::default(), BundleMode::Expanded);

    h.protocol.commit(&request(gin_and_bundle()), &context()).await.expect("commit");

    assert!(matches!(h.backend.orders()[0].customer, CustomerSpec::New { .. }));
}

#[tokio::test]
async fn free_area_orders_carry_no_delivery_line() {
    let h = harness(backend(), ScriptedDisambiguator::default(), BundleMode::Expanded);
    let mut context = context();
    context.zone_text = "Gentan, Baki, Sukoharjo".to_string();

    let committed = h.protocol.commit(&request(gin_and_bundle()), &context).await.expect("commit");

    let fee_calls = ["add_item 40 ", "add_item 41 ", "add_item 42 "];
    assert!(!h
        .backend
        .calls()
        .iter()
        .any(|call| fee_calls.iter().any(|fee| call.starts_with(fee))));
    assert_eq!(committed.detail.total_amount, Decimal::new(85_000, 0));
}

#[tokio::test]
async fn delivery_fee_counts_toward_the_cup_threshold() {
    let h = harness(backend(), ScriptedDisambiguator::default(), BundleMode::Expanded);

    let committed = h
        .protocol
        .commit(&request(vec![LineRequest::item("gin gordon", 2)]), &context())
        .await
        .expect("commit");

    let calls = h.backend.calls();
    assert!(calls.iter().any(|call| call == "add_item 40 x1"));
    assert!(calls.iter().any(|call| call == "add_item 30 x2"));
    assert_eq!(committed.detail.total_amount, Decimal::new(100_000, 0));
}

#[tokio::test]
async fn multi_component_bundle_spreads_its_discount_across_components() {
    let h = harness(backend(), ScriptedDisambiguator::default(), BundleMode::Expanded);
    let lines =
        vec![LineRequest::item("tonic water", 1), LineRequest::bundle("paket vodka soda", 1)];

    let committed = h.protocol.commit(&request(lines), &context()).await.expect("commit");

    assert_eq!(committed.order.stage, OrderStage::Paid);
    let discount_of = |prefix: &str| {
        committed
            .detail
            .lines
            .iter()
            .find(|line| line.name.starts_with(prefix))
            .map(|line| line.discount)
            .expect("component line")
    };
    assert_eq!(discount_of("Vodka"), Decimal::new(12_000, 0));
    assert_eq!(discount_of("Club Soda"), Decimal::new(8_000, 0));
    assert_eq!(discount_of("Tonic"), Decimal::ZERO);
    assert_eq!(discount_of("Vodka") + discount_of("Club Soda"), Decimal::new(20_000, 0));
    assert!(h.backend.calls().iter().any(|call| call == "add_item 30 x2"));
    assert_eq!(committed.detail.total_amount, Decimal::new(102_000, 0));
}

#[tokio::test]
async fn rejected_stage_transition_voids_the_order() {
    let h = harness(backend(), ScriptedDisambiguator::default(), BundleMode::Expanded);
    let mut order = h.protocol.create(&request(Vec::new()), &context()).await.expect("create");

    let error = h
        .protocol
        .advance(&mut order, OrderStage::Paid, &context())
        .await
        .expect_err("created orders cannot jump to paid");

    assert!(matches!(error, OrderError::Domain(DomainError::InvalidStageTransition { .. })));
    assert_eq!(order.stage, OrderStage::Voided);
    assert_eq!(h.backend.orders()[0].status, RemoteOrderStatus::Voided);
    assert!(h.backend.calls().iter().any(|call| call.starts_with("set_status")));
    assert_eq!(h.audit.event_types(), vec!["order.created", "order.voided"]);
}

#[tokio::test]
async fn higher_subtotals_add_two_cups_and_merch() {
    let h = harness(backend(), ScriptedDisambiguator::default(), BundleMode::Opaque);

    h.protocol
        .commit(&request(vec![LineRequest::item("gin gordon", 4)]), &context())
        .await
        .expect("commit");

    let calls = h.backend.calls();
    assert!(calls.iter().any(|call| call == "add_item 30 x2"));
    assert!(calls.iter().any(|call| call.starts_with("add_bundle b2 x1")));
}

#[test]
fn notes_and_failure_replies_carry_context() {
    let order = request(Vec::new());
    assert_eq!(order_note(&order, "  ring the bell "), "[FD] ring the bell");

    let reply = failure_reply(
        &order,
        &OrderError::DistanceRejected { distance_km: 46.0, max_km: 45.0 },
    );
    assert!(reply.contains("Rina"));
    assert!(reply.contains("+6281234567890"));
    assert!(reply.contains("46.0 km"));
}
