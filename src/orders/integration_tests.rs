//! Integration Tests for order creation
//!
//! Full create flow over in-memory collaborators: catalog, ledger, lock,
//! transaction log, order store and a scriptable provider.

#[cfg(test)]
mod integration_tests {
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::balance::{BalanceService, MemoryLedger, MemoryTransactionLog, TransactionKind};
    use crate::catalog::{CatalogStatus, MockCatalog, Service, ServiceLookup};
    use crate::config::DispatchConfig;
    use crate::orders::{
        CreateOrder, Dispatcher, MemoryOrderStore, OrderError, OrderPatch, OrderService,
        OrderStatus,
    };
    use crate::provider::{MockProvider, MockProviderFactory, SubmitReply};
    use crate::retry::RetryPolicy;
    use crate::task_lock::{LockKind, MemoryTaskLock, TaskLock};

    const USER: i64 = 1001;
    const PROVIDER: i64 = 1;
    const SERVICE: i64 = 5;

    struct TestHarness {
        service: OrderService,
        catalog: Arc<MockCatalog>,
        ledger: Arc<MemoryLedger>,
        lock: Arc<MemoryTaskLock>,
        transactions: Arc<MemoryTransactionLog>,
        store: Arc<MemoryOrderStore>,
        provider: Arc<MockProvider>,
    }

    impl TestHarness {
        /// User with `balance`, one active provider and a service priced at `rate` per 1000
        fn new(balance: Decimal, rate: Decimal) -> Self {
            let catalog = Arc::new(MockCatalog::new());
            catalog.add_provider(PROVIDER, true);
            catalog.add_service(SERVICE, PROVIDER, rate);

            let ledger = Arc::new(MemoryLedger::with_balance(USER, balance));
            let lock = Arc::new(MemoryTaskLock::new());
            let transactions = Arc::new(MemoryTransactionLog::new());
            let store = Arc::new(MemoryOrderStore::new());
            let provider = Arc::new(MockProvider::new(42));
            let factory = Arc::new(MockProviderFactory::new());
            factory.register(PROVIDER, provider.clone());

            let balance = Arc::new(BalanceService::new(
                ledger.clone(),
                lock.clone(),
                transactions.clone(),
                Duration::from_secs(60),
                RetryPolicy::new(3, Duration::from_millis(1)),
            ));
            let (dispatcher, _) = Dispatcher::start(
                &DispatchConfig {
                    workers: 2,
                    queue_size: 64,
                    submit_timeout_ms: 500,
                    enqueue_timeout_ms: 50,
                    writeback_attempts: 2,
                    drain_timeout_ms: 1_000,
                },
                factory,
                store.clone(),
            );

            let service = OrderService::new(catalog.clone(), balance, store.clone(), dispatcher);

            Self {
                service,
                catalog,
                ledger,
                lock,
                transactions,
                store,
                provider,
            }
        }

        fn request(&self, quantity: i64) -> CreateOrder {
            CreateOrder {
                user_id: USER,
                service: ServiceLookup::ById(SERVICE),
                quantity,
                link: "https://instagram.com/p/abc".into(),
            }
        }

        async fn wait_response(&self, order_id: i64) -> String {
            for _ in 0..200 {
                let resp = self.store.snapshot(order_id).unwrap().provider_order_response;
                if !resp.is_empty() {
                    return resp;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            panic!("order {} never got a provider response", order_id);
        }
    }

    // ========================================================================
    // Happy Path
    // ========================================================================

    /// Balance 100, rate 10 per 1000, quantity 1000 → price 10, balance 90
    #[tokio::test]
    async fn test_order_price_deducted_and_submitted() {
        let h = TestHarness::new(Decimal::from(100), Decimal::from(10));

        let order = h.service.create_order(h.request(1000)).await.unwrap();

        assert_eq!(order.price, Decimal::from(10));
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.provider_id, PROVIDER);
        assert_eq!(h.ledger.get(USER), Some(Decimal::from(90)));
        assert!(!h.lock.is_held(USER, LockKind::BalanceUpdate));

        let records = h.transactions.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, TransactionKind::PlayOrder);
        assert_eq!(records[0].amount, Decimal::from(10));
        assert_eq!(records[0].order_id, Some(order.order_id));

        assert_eq!(h.wait_response(order.order_id).await, "Order: 42");
        let stored = h.store.snapshot(order.order_id).unwrap();
        assert_eq!(stored.provider_order_id, 42);

        let sent = h.provider.submitted();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].provider_service_id, SERVICE * 10);
        assert_eq!(sent[0].quantity, 1000);
    }

    #[tokio::test]
    async fn test_custom_rate_overrides_service_rate() {
        let h = TestHarness::new(Decimal::from(100), Decimal::from(10));
        h.catalog.set_custom_rate(USER, SERVICE, Decimal::from(4));

        let order = h.service.create_order(h.request(500)).await.unwrap();

        assert_eq!(order.price, Decimal::from(2));
        assert_eq!(h.ledger.get(USER), Some(Decimal::from(98)));
    }

    #[tokio::test]
    async fn test_third_party_lookup_by_seq() {
        let h = TestHarness::new(Decimal::from(100), Decimal::from(10));
        let mut req = h.request(1000);
        req.service = ServiceLookup::BySeq(SERVICE as i32);

        let order = h.service.create_order(req).await.unwrap();
        assert_eq!(order.service_id, SERVICE);
    }

    // ========================================================================
    // Rejections
    // ========================================================================

    /// Balance 5, price 10 → rejected, nothing persisted, lock released
    #[tokio::test]
    async fn test_insufficient_funds_leaves_no_trace() {
        let h = TestHarness::new(Decimal::from(5), Decimal::from(10));

        let err = h.service.create_order(h.request(1000)).await.unwrap_err();

        assert!(matches!(err, OrderError::NotEnoughBalance));
        assert_eq!(h.ledger.get(USER), Some(Decimal::from(5)));
        assert!(h.store.all().is_empty());
        assert!(h.transactions.records().is_empty());
        assert!(!h.lock.is_held(USER, LockKind::BalanceUpdate));
        assert_eq!(h.provider.submit_count(), 0);
    }

    #[tokio::test]
    async fn test_quantity_outside_bounds() {
        let h = TestHarness::new(Decimal::from(100), Decimal::from(10));

        let err = h.service.create_order(h.request(10_001)).await.unwrap_err();
        assert!(matches!(
            err,
            OrderError::QuantityInvalid { min: 1, max: 10_000 }
        ));
        assert_eq!(h.lock.acquire_count(), 0);
    }

    #[tokio::test]
    async fn test_inactive_service_and_provider() {
        let h = TestHarness::new(Decimal::from(100), Decimal::from(10));
        h.catalog.add_provider(2, false);
        h.catalog.add_service_with(Service {
            service_id: 6,
            seq: 6,
            title: "disabled".into(),
            description: String::new(),
            service_type: "Default".into(),
            min_amount: 1,
            max_amount: 100,
            rate: Decimal::ONE,
            provider_service_id: 60,
            provider_id: PROVIDER,
            category_id: 1,
            category_name: String::new(),
            status: CatalogStatus::Disabled,
        });
        h.catalog.add_service(7, 2, Decimal::ONE);

        let mut req = h.request(10);
        req.service = ServiceLookup::ById(6);
        assert!(matches!(
            h.service.create_order(req.clone()).await,
            Err(OrderError::ServiceNotFound)
        ));

        req.service = ServiceLookup::ById(7);
        assert!(matches!(
            h.service.create_order(req.clone()).await,
            Err(OrderError::ProviderNotFound)
        ));

        req.service = ServiceLookup::ById(999);
        assert!(matches!(
            h.service.create_order(req).await,
            Err(OrderError::ServiceNotFound)
        ));
        assert_eq!(h.ledger.get(USER), Some(Decimal::from(100)));
    }

    #[tokio::test]
    async fn test_held_lock_rejects_order() {
        let h = TestHarness::new(Decimal::from(100), Decimal::from(10));
        let _held = h
            .lock
            .acquire(USER, LockKind::BalanceUpdate, Duration::from_secs(60))
            .await
            .unwrap();

        let err = h.service.create_order(h.request(1000)).await.unwrap_err();
        assert!(matches!(err, OrderError::BackgroundTaskExists));
        assert_eq!(h.ledger.get(USER), Some(Decimal::from(100)));
        assert!(h.store.all().is_empty());
    }

    // ========================================================================
    // Partial failures
    // ========================================================================

    #[tokio::test]
    async fn test_order_insert_failure_compensates_debit() {
        let h = TestHarness::new(Decimal::from(100), Decimal::from(10));
        h.store.set_fail_create(true);

        let err = h.service.create_order(h.request(1000)).await.unwrap_err();

        assert!(matches!(err, OrderError::Persistence(_)));
        assert_eq!(h.ledger.get(USER), Some(Decimal::from(100)));
        assert!(h.transactions.records().is_empty());
        assert_eq!(h.provider.submit_count(), 0);
    }

    #[tokio::test]
    async fn test_transaction_log_failure_keeps_order() {
        let h = TestHarness::new(Decimal::from(100), Decimal::from(10));
        h.transactions.set_fail(true);

        let order = h.service.create_order(h.request(1000)).await.unwrap();

        assert_eq!(h.ledger.get(USER), Some(Decimal::from(90)));
        assert_eq!(h.wait_response(order.order_id).await, "Order: 42");
    }

    #[tokio::test]
    async fn test_provider_error_recorded_on_order() {
        let h = TestHarness::new(Decimal::from(100), Decimal::from(10));
        h.provider
            .set_submit_reply(Ok(SubmitReply::Error("Link is invalid".into())));

        let order = h.service.create_order(h.request(1000)).await.unwrap();

        assert_eq!(
            h.wait_response(order.order_id).await,
            "Error: Link is invalid"
        );
        assert_eq!(h.store.snapshot(order.order_id).unwrap().provider_order_id, 0);
        // The charge stands until reconciliation decides
        assert_eq!(h.ledger.get(USER), Some(Decimal::from(90)));
    }

    // ========================================================================
    // Concurrency
    // ========================================================================

    /// Many concurrent orders never drive the balance negative, and every
    /// persisted order is paid for exactly once.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_orders_never_overspend() {
        let h = Arc::new(TestHarness::new(Decimal::from(100), Decimal::from(10)));

        let mut tasks = Vec::new();
        for _ in 0..50 {
            let h = h.clone();
            tasks.push(tokio::spawn(async move {
                h.service.create_order(h.request(1000)).await
            }));
        }

        let mut created = 0i64;
        for t in tasks {
            match t.await.unwrap() {
                Ok(_) => created += 1,
                Err(OrderError::BackgroundTaskExists) | Err(OrderError::NotEnoughBalance) => {}
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        let balance = h.ledger.get(USER).unwrap();
        assert!(balance >= Decimal::ZERO);
        assert!(created <= 10);
        assert_eq!(balance, Decimal::from(100 - created * 10));
        assert_eq!(h.store.all().len() as i64, created);
        assert_eq!(h.transactions.records().len() as i64, created);
    }

    // ========================================================================
    // Lookups and operator override
    // ========================================================================

    #[tokio::test]
    async fn test_get_and_list_scoped_to_owner() {
        let h = TestHarness::new(Decimal::from(100), Decimal::from(1));
        let a = h.service.create_order(h.request(100)).await.unwrap();
        let b = h.service.create_order(h.request(100)).await.unwrap();

        assert_eq!(
            h.service.get_order(USER, a.order_id).await.unwrap().order_id,
            a.order_id
        );
        assert!(matches!(
            h.service.get_order(USER + 1, a.order_id).await,
            Err(OrderError::OrderNotFound)
        ));

        let page = h.service.list_orders(USER, None, None, 10).await.unwrap();
        assert_eq!(
            page.iter().map(|o| o.order_id).collect::<Vec<_>>(),
            vec![b.order_id, a.order_id]
        );
        let next = h
            .service
            .list_orders(USER, None, Some(b.order_id), 10)
            .await
            .unwrap();
        assert_eq!(next.len(), 1);

        let many = h
            .service
            .get_orders(USER, &[a.order_id, 9999, b.order_id])
            .await
            .unwrap();
        assert_eq!(many.len(), 2);
    }

    #[tokio::test]
    async fn test_admin_update() {
        let h = TestHarness::new(Decimal::from(100), Decimal::from(1));
        let order = h.service.create_order(h.request(100)).await.unwrap();

        let updated = h
            .service
            .admin_update(
                order.order_id,
                OrderPatch {
                    status: Some(OrderStatus::Completed),
                    remains: Some(0),
                    start_counter: Some(250),
                    note: Some("delivered manually".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Completed);
        assert_eq!(updated.start_counter, 250);
        assert_eq!(updated.note, "delivered manually");

        assert!(matches!(
            h.service.admin_update(order.order_id, OrderPatch::default()).await,
            Err(OrderError::InvalidRequest(_))
        ));
        assert!(matches!(
            h.service
                .admin_update(
                    12345,
                    OrderPatch {
                        note: Some("x".into()),
                        ..Default::default()
                    }
                )
                .await,
            Err(OrderError::OrderNotFound)
        ));
    }
}
