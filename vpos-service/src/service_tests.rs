//! Service-layer tests against the in-memory store and a scripted gateway.

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use vpos_repo::MemoryStore;
    use vpos_types::{
        AppError, CardEnrollment, CardId, ChargeOrder, GatewayCard, GatewayError, GatewayOutcome,
        Money, PaymentGateway, PaymentRef, PaymentStore, ProcessId, ReversionStatus, RiskIndex,
        RollbackOutcome, SingleBuyOrder, TransactionId, TransactionStatus, UserId,
    };

    use crate::service::{
        CardRegistry, ChargeRequest, EnrollmentDefaults, Reconciler, SingleBuyRequest,
        reconciler::SAME_DAY_MESSAGE, registry::EnrollmentRequest,
    };

    // ─────────────────────────────────────────────────────────────────────────
    // Scripted gateway
    // ─────────────────────────────────────────────────────────────────────────

    /// Gateway double: provider cards and operation outcomes are scripted per
    /// test, and calls are counted. Callback digests are a stand-in scheme:
    /// `digest-{shop_process_id}`.
    #[derive(Default)]
    pub struct MockGateway {
        pub listed_cards: Mutex<Vec<GatewayCard>>,
        pub charge_results: Mutex<VecDeque<Result<GatewayOutcome, GatewayError>>>,
        pub poll_results: Mutex<VecDeque<Result<GatewayOutcome, GatewayError>>>,
        pub rollback_results: Mutex<VecDeque<Result<RollbackOutcome, GatewayError>>>,
        pub poll_calls: AtomicUsize,
        pub deleted_aliases: Mutex<Vec<String>>,
        pub reject_deletes: Mutex<bool>,
        pub charge_orders: Mutex<Vec<ChargeOrder>>,
        pub single_buy_orders: Mutex<Vec<SingleBuyOrder>>,
    }

    impl MockGateway {
        pub fn list_card(&self, card_id: CardId, alias: &str) {
            self.listed_cards.lock().unwrap().push(GatewayCard {
                card_id,
                last4: "1234".into(),
                exp_year: 2028,
                exp_month: 11,
                brand: "VISA".into(),
                card_type: "credit".into(),
                alias_token: alias.into(),
            });
        }

        pub fn script_charge(&self, result: Result<GatewayOutcome, GatewayError>) {
            self.charge_results.lock().unwrap().push_back(result);
        }

        pub fn script_poll(&self, result: Result<GatewayOutcome, GatewayError>) {
            self.poll_results.lock().unwrap().push_back(result);
        }

        pub fn script_rollback(&self, result: Result<RollbackOutcome, GatewayError>) {
            self.rollback_results.lock().unwrap().push_back(result);
        }
    }

    pub fn approved_outcome(tx: TransactionId, token: &str) -> GatewayOutcome {
        GatewayOutcome {
            transaction_id: Some(tx),
            success: true,
            description: "Transaccion aprobada".into(),
            amount: None,
            authorization_code: "A0042".into(),
            customer_ip: None,
            risk_index: RiskIndex::Low,
            verification_token: Some(token.into()),
            raw: json!({ "operation": { "response_code": "00" } }),
        }
    }

    fn outcome_from_payload(payload: &Value) -> GatewayOutcome {
        let op = &payload["operation"];
        GatewayOutcome {
            transaction_id: op["shop_process_id"].as_i64().map(TransactionId::new),
            success: op["response_code"] == json!("00"),
            description: op["response_description"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            amount: None,
            authorization_code: op["authorization_number"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            customer_ip: None,
            risk_index: RiskIndex::Unknown,
            verification_token: op["token"].as_str().map(str::to_string),
            raw: payload.clone(),
        }
    }

    #[async_trait]
    impl PaymentGateway for MockGateway {
        async fn init_card_registration(
            &self,
            enrollment: &CardEnrollment,
        ) -> Result<ProcessId, GatewayError> {
            Ok(ProcessId(format!("proc-{}", enrollment.card_id)))
        }

        async fn user_cards(&self, _user: UserId) -> Result<Vec<GatewayCard>, GatewayError> {
            Ok(self.listed_cards.lock().unwrap().clone())
        }

        async fn user_card(
            &self,
            user: UserId,
            card: CardId,
        ) -> Result<Option<GatewayCard>, GatewayError> {
            Ok(self
                .user_cards(user)
                .await?
                .into_iter()
                .find(|c| c.card_id == card))
        }

        async fn delete_card(&self, _user: UserId, alias: &str) -> Result<(), GatewayError> {
            if *self.reject_deletes.lock().unwrap() {
                return Err(GatewayError::Rejected("DeleteNotAllowed".into()));
            }
            self.deleted_aliases.lock().unwrap().push(alias.to_string());
            Ok(())
        }

        async fn charge(&self, order: &ChargeOrder) -> Result<GatewayOutcome, GatewayError> {
            self.charge_orders.lock().unwrap().push(order.clone());
            self.charge_results
                .lock()
                .unwrap()
                .pop_front()
                .expect("unscripted charge call")
        }

        async fn init_single_buy(
            &self,
            order: &SingleBuyOrder,
        ) -> Result<ProcessId, GatewayError> {
            self.single_buy_orders.lock().unwrap().push(order.clone());
            Ok(ProcessId(format!("proc-sb-{}", order.transaction_id)))
        }

        async fn poll_confirmation(
            &self,
            _tx: TransactionId,
        ) -> Result<GatewayOutcome, GatewayError> {
            self.poll_calls.fetch_add(1, Ordering::SeqCst);
            self.poll_results
                .lock()
                .unwrap()
                .pop_front()
                .expect("unscripted poll call")
        }

        async fn rollback(&self, _tx: TransactionId) -> Result<RollbackOutcome, GatewayError> {
            self.rollback_results
                .lock()
                .unwrap()
                .pop_front()
                .expect("unscripted rollback call")
        }

        fn verify_callback(
            &self,
            payload: &Value,
            stored_token: Option<&str>,
        ) -> Result<GatewayOutcome, GatewayError> {
            let op = payload.get("operation").ok_or(GatewayError::SignatureMismatch)?;
            let supplied = op
                .get("token")
                .and_then(Value::as_str)
                .ok_or(GatewayError::SignatureMismatch)?;
            let expected = format!("digest-{}", op["shop_process_id"]);
            if supplied != expected && stored_token != Some(supplied) {
                return Err(GatewayError::SignatureMismatch);
            }
            Ok(outcome_from_payload(payload))
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fixtures
    // ─────────────────────────────────────────────────────────────────────────

    pub const USER: UserId = UserId::new(42);

    pub fn services() -> (
        Arc<MemoryStore>,
        Arc<MockGateway>,
        CardRegistry<MemoryStore, MockGateway>,
        Reconciler<MemoryStore, MockGateway>,
    ) {
        let store = Arc::new(MemoryStore::new());
        store.add_user(USER);
        let gateway = Arc::new(MockGateway::default());
        let registry = CardRegistry::new(
            Arc::clone(&store),
            Arc::clone(&gateway),
            EnrollmentDefaults {
                cellphone: "0000000".into(),
                email: "payments@example.com".into(),
            },
        );
        let reconciler = Reconciler::new(Arc::clone(&store), Arc::clone(&gateway));
        (store, gateway, registry, reconciler)
    }

    fn enrollment() -> EnrollmentRequest {
        EnrollmentRequest {
            user_id: USER,
            cellphone: None,
            email: None,
            return_url: "https://shop.example.com/cards/done".into(),
        }
    }

    /// Registers and confirms a card, returning its id.
    async fn registered_card(
        gateway: &MockGateway,
        registry: &CardRegistry<MemoryStore, MockGateway>,
    ) -> CardId {
        let start = registry.begin_registration(enrollment()).await.unwrap();
        gateway.list_card(start.card_id, "alias-1");
        registry.confirm_registration(USER).await.unwrap();
        start.card_id
    }

    fn charge_request(card_id: CardId) -> ChargeRequest {
        ChargeRequest {
            user_id: USER,
            card_id,
            payment_ref: PaymentRef::new(9),
            amount: Money::from_minor(15_000_000).unwrap(),
            description: "order 9".into(),
            installments: None,
            customer_ip: Some("10.0.0.9".into()),
        }
    }

    pub fn single_buy_request() -> SingleBuyRequest {
        SingleBuyRequest {
            payment_ref: PaymentRef::new(9),
            amount: Money::from_minor(15_000_000).unwrap(),
            description: "order 9".into(),
            return_url: "https://shop.example.com/done".into(),
            cancel_url: None,
            zimple: false,
            additional_data: String::new(),
            user_id: Some(USER),
            customer_ip: None,
        }
    }

    fn callback_payload(tx: TransactionId, token: &str) -> Value {
        json!({
            "operation": {
                "token": token,
                "shop_process_id": tx.value(),
                "response_code": "00",
                "response_description": "Transaccion aprobada",
                "amount": "150000.00",
                "currency": "PYG",
                "authorization_number": "A0042"
            }
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Card registration
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_registration_end_to_end() {
        let (store, gateway, registry, _) = services();

        let start = registry.begin_registration(enrollment()).await.unwrap();
        assert!(start.process_id.starts_with("proc-"));
        let shell = store.get_card(USER, start.card_id).await.unwrap().unwrap();
        assert!(!shell.is_active);
        assert!(shell.is_default);

        gateway.list_card(start.card_id, "alias-1");
        let card = registry.confirm_registration(USER).await.unwrap();
        assert_eq!(card.id, start.card_id);
        assert_eq!(card.brand, "VISA");
        assert_eq!(card.last4, "1234");

        let stored = store.get_card(USER, card.id).await.unwrap().unwrap();
        assert!(stored.is_active);
        assert_eq!(stored.alias_token.as_deref(), Some("alias-1"));
    }

    #[tokio::test]
    async fn test_registration_requires_known_user() {
        let (_, _, registry, _) = services();
        let err = registry
            .begin_registration(EnrollmentRequest {
                user_id: UserId::new(7),
                ..enrollment()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_confirm_without_pending_registration() {
        let (_, _, registry, _) = services();
        let err = registry.confirm_registration(USER).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_confirm_not_in_provider_listing_is_not_found() {
        let (_, _, registry, _) = services();
        registry.begin_registration(enrollment()).await.unwrap();
        // Listing stays empty: the user abandoned the hosted form.
        let err = registry.confirm_registration(USER).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_second_card_is_not_default() {
        let (store, gateway, registry, _) = services();
        let first = registered_card(&gateway, &registry).await;

        let start = registry.begin_registration(enrollment()).await.unwrap();
        gateway.list_card(start.card_id, "alias-2");
        registry.confirm_registration(USER).await.unwrap();

        let cards = store.list_active_cards(USER).await.unwrap();
        assert_eq!(cards.len(), 2);
        assert!(cards.iter().find(|c| c.id == first).unwrap().is_default);
        assert!(!cards.iter().find(|c| c.id == start.card_id).unwrap().is_default);

        registry.set_default(USER, start.card_id).await.unwrap();
        let defaults: Vec<_> = store
            .list_active_cards(USER)
            .await
            .unwrap()
            .into_iter()
            .filter(|c| c.is_default)
            .collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, start.card_id);
    }

    #[tokio::test]
    async fn test_delete_card_requires_provider_confirmation() {
        let (store, gateway, registry, _) = services();
        let card_id = registered_card(&gateway, &registry).await;

        *gateway.reject_deletes.lock().unwrap() = true;
        let err = registry.delete(USER, card_id).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(store.get_card(USER, card_id).await.unwrap().is_some());

        *gateway.reject_deletes.lock().unwrap() = false;
        assert!(registry.delete(USER, card_id).await.unwrap());
        assert!(store.get_card(USER, card_id).await.unwrap().is_none());
        assert_eq!(*gateway.deleted_aliases.lock().unwrap(), vec!["alias-1"]);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Charges
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_charge_success_with_sanitized_view() {
        let (_, gateway, registry, reconciler) = services();
        let card_id = registered_card(&gateway, &registry).await;
        gateway.script_charge(Ok(approved_outcome(TransactionId::new(1), "tok-1")));

        let response = reconciler.charge(charge_request(card_id)).await.unwrap();
        assert_eq!(response.view.status, TransactionStatus::Success);
        assert_eq!(response.view.amount.to_wire(), "150000.00");
        assert_eq!(response.private.authorization_code, "A0042");

        let public = serde_json::to_value(&response.view).unwrap();
        assert!(public.get("authorization_code").is_none());
        assert!(public.get("risk_index").is_none());
    }

    #[tokio::test]
    async fn test_charge_rejection_is_terminal_with_provider_wording() {
        let (store, gateway, registry, reconciler) = services();
        let card_id = registered_card(&gateway, &registry).await;
        gateway.script_charge(Err(GatewayError::Rejected("Tarjeta invalida".into())));

        let response = reconciler.charge(charge_request(card_id)).await.unwrap();
        assert_eq!(response.view.status, TransactionStatus::Fail);
        assert_eq!(response.view.response_description, "Tarjeta invalida");

        let stored = store
            .get_transaction(response.view.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, TransactionStatus::Fail);
    }

    #[tokio::test]
    async fn test_charge_unavailable_leaves_transaction_pending() {
        let (store, gateway, registry, reconciler) = services();
        let card_id = registered_card(&gateway, &registry).await;
        gateway.script_charge(Err(GatewayError::Unavailable("connect timeout".into())));

        let err = reconciler.charge(charge_request(card_id)).await.unwrap_err();
        assert!(matches!(err, AppError::GatewayUnavailable(_)));

        let pending = store
            .latest_by_status(PaymentRef::new(9), TransactionStatus::Pending)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_charge_unknown_card() {
        let (_, _, _, reconciler) = services();
        let err = reconciler
            .charge(charge_request(CardId::new(99)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_charge_installments_reach_the_gateway_order() {
        let (_, gateway, registry, reconciler) = services();
        let card_id = registered_card(&gateway, &registry).await;
        gateway.script_charge(Ok(approved_outcome(TransactionId::new(0), "tok-1")));
        gateway.script_charge(Ok(approved_outcome(TransactionId::new(0), "tok-2")));

        reconciler.charge(charge_request(card_id)).await.unwrap();
        reconciler
            .charge(ChargeRequest {
                payment_ref: PaymentRef::new(10),
                installments: Some(6),
                ..charge_request(card_id)
            })
            .await
            .unwrap();

        let orders = gateway.charge_orders.lock().unwrap();
        assert_eq!(orders[0].installments, 1);
        assert_eq!(orders[1].installments, 6);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Single-buy and status polling
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_single_buy_opens_pending_transaction() {
        let (store, _, _, reconciler) = services();
        let start = reconciler
            .init_single_buy(single_buy_request())
            .await
            .unwrap();
        assert!(start.process_id.starts_with("proc-sb-"));

        let tx = store
            .get_transaction(start.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert!(tx.card_id.is_none());
    }

    #[tokio::test]
    async fn test_zimple_single_buy_passes_wallet_fields_through() {
        let (_, gateway, _, reconciler) = services();
        reconciler
            .init_single_buy(SingleBuyRequest {
                zimple: true,
                additional_data: "0981123456".into(),
                ..single_buy_request()
            })
            .await
            .unwrap();

        let orders = gateway.single_buy_orders.lock().unwrap();
        assert!(orders[0].zimple);
        assert_eq!(orders[0].additional_data, "0981123456");
    }

    #[tokio::test]
    async fn test_status_poll_applies_confirmation() {
        let (_, gateway, _, reconciler) = services();
        let start = reconciler
            .init_single_buy(single_buy_request())
            .await
            .unwrap();
        gateway.script_poll(Ok(approved_outcome(start.transaction_id, "tok-sb")));

        let response = reconciler
            .transaction_status(PaymentRef::new(9), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.view.transaction_id, start.transaction_id);
        assert_eq!(response.view.status, TransactionStatus::Success);
        assert_eq!(gateway.poll_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_terminal_status_short_circuits_poll() {
        let (_, gateway, _, reconciler) = services();
        let start = reconciler
            .init_single_buy(single_buy_request())
            .await
            .unwrap();
        reconciler
            .ledger()
            .mark_failed(start.transaction_id, "Transaccion denegada")
            .await
            .unwrap();

        let response = reconciler
            .transaction_status(PaymentRef::new(9), Some(start.transaction_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.view.status, TransactionStatus::Fail);
        assert_eq!(response.view.response_description, "Transaccion denegada");
        assert_eq!(gateway.poll_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_status_without_matching_transaction() {
        let (_, _, _, reconciler) = services();
        let response = reconciler
            .transaction_status(PaymentRef::new(1), None)
            .await
            .unwrap();
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_status_poll_unavailable_keeps_pending() {
        let (store, gateway, _, reconciler) = services();
        let start = reconciler
            .init_single_buy(single_buy_request())
            .await
            .unwrap();
        gateway.script_poll(Err(GatewayError::Unavailable("read timeout".into())));

        let err = reconciler
            .transaction_status(PaymentRef::new(9), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::GatewayUnavailable(_)));

        let tx = store
            .get_transaction(start.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reversal
    // ─────────────────────────────────────────────────────────────────────────

    /// Charges successfully and returns the transaction id.
    async fn successful_charge(
        gateway: &MockGateway,
        registry: &CardRegistry<MemoryStore, MockGateway>,
        reconciler: &Reconciler<MemoryStore, MockGateway>,
    ) -> TransactionId {
        let card_id = registered_card(gateway, registry).await;
        gateway.script_charge(Ok(approved_outcome(TransactionId::new(0), "tok-1")));
        let response = reconciler.charge(charge_request(card_id)).await.unwrap();
        response.view.transaction_id
    }

    #[tokio::test]
    async fn test_same_day_reversal_succeeds() {
        let (store, gateway, registry, reconciler) = services();
        let tx_id = successful_charge(&gateway, &registry, &reconciler).await;
        gateway.script_rollback(Ok(RollbackOutcome {
            success: true,
            description: "RollbackSuccessful".into(),
            raw: json!({ "status": "success" }),
        }));

        let response = reconciler.reverse(PaymentRef::new(9), None).await.unwrap();
        assert_eq!(response.transaction_id, tx_id);
        assert_eq!(response.status, ReversionStatus::Success);

        let tx = store.get_transaction(tx_id).await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Reversed);
    }

    #[tokio::test]
    async fn test_yesterday_reversal_fails_with_fixed_message() {
        let (store, gateway, registry, reconciler) = services();
        let tx_id = successful_charge(&gateway, &registry, &reconciler).await;
        store.backdate_transaction(tx_id, chrono::Utc::now() - chrono::Duration::days(1));

        let response = reconciler.reverse(PaymentRef::new(9), None).await.unwrap();
        assert_eq!(response.status, ReversionStatus::Fail);
        assert_eq!(response.response_description, SAME_DAY_MESSAGE);

        // No provider call was made and the capture stands.
        assert!(gateway.rollback_results.lock().unwrap().is_empty());
        let tx = store.get_transaction(tx_id).await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Success);
    }

    #[tokio::test]
    async fn test_provider_refused_rollback_keeps_capture() {
        let (store, gateway, registry, reconciler) = services();
        let tx_id = successful_charge(&gateway, &registry, &reconciler).await;
        gateway.script_rollback(Ok(RollbackOutcome {
            success: false,
            description: "Transaccion no reversible".into(),
            raw: json!({ "status": "error" }),
        }));

        let response = reconciler.reverse(PaymentRef::new(9), None).await.unwrap();
        assert_eq!(response.status, ReversionStatus::Fail);
        assert_eq!(response.response_description, "Transaccion no reversible");

        let tx = store.get_transaction(tx_id).await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Success);
    }

    #[tokio::test]
    async fn test_reversal_unavailable_keeps_capture() {
        let (store, gateway, registry, reconciler) = services();
        let tx_id = successful_charge(&gateway, &registry, &reconciler).await;
        gateway.script_rollback(Err(GatewayError::Unavailable("connect timeout".into())));

        let err = reconciler.reverse(PaymentRef::new(9), None).await.unwrap_err();
        assert!(matches!(err, AppError::GatewayUnavailable(_)));

        let tx = store.get_transaction(tx_id).await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Success);
    }

    #[tokio::test]
    async fn test_reversal_without_successful_transaction() {
        let (_, _, _, reconciler) = services();
        let err = reconciler.reverse(PaymentRef::new(9), None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_explicit_reversal_target_must_be_successful() {
        let (_, _, _, reconciler) = services();
        let start = reconciler
            .init_single_buy(single_buy_request())
            .await
            .unwrap();
        let err = reconciler
            .reverse(PaymentRef::new(9), Some(start.transaction_id))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Callbacks
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_callback_applies_and_publishes_event() {
        let (store, _, _, reconciler) = services();
        let start = reconciler
            .init_single_buy(single_buy_request())
            .await
            .unwrap();
        let mut events = reconciler.subscribe();

        let token = format!("digest-{}", start.transaction_id);
        let view = reconciler
            .handle_callback(&callback_payload(start.transaction_id, &token))
            .await
            .unwrap();
        assert_eq!(view.status, TransactionStatus::Success);

        let tx = store
            .get_transaction(start.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Success);
        assert_eq!(tx.authorization_code, "A0042");

        let event = events.try_recv().unwrap();
        assert_eq!(event.transaction_id, start.transaction_id);
        assert_eq!(event.view.status, TransactionStatus::Success);
        let event_json = serde_json::to_value(&event.view).unwrap();
        assert!(event_json.get("authorization_code").is_none());
    }

    #[tokio::test]
    async fn test_callback_accepted_by_stored_token() {
        let (_, gateway, _, reconciler) = services();
        let start = reconciler
            .init_single_buy(single_buy_request())
            .await
            .unwrap();
        gateway.script_poll(Ok(GatewayOutcome {
            success: false,
            ..approved_outcome(start.transaction_id, "tok-stored")
        }));
        // Poll stores the token together with the fail outcome.
        reconciler
            .transaction_status(PaymentRef::new(9), Some(start.transaction_id))
            .await
            .unwrap();

        // A later callback signed with neither scheme but carrying the stored
        // token verifies, then acknowledges without rewriting the terminal
        // status.
        let view = reconciler
            .handle_callback(&callback_payload(start.transaction_id, "tok-stored"))
            .await
            .unwrap();
        assert_eq!(view.status, TransactionStatus::Fail);
    }

    #[tokio::test]
    async fn test_forged_callback_changes_nothing() {
        let (store, _, _, reconciler) = services();
        let start = reconciler
            .init_single_buy(single_buy_request())
            .await
            .unwrap();
        let mut events = reconciler.subscribe();

        let err = reconciler
            .handle_callback(&callback_payload(start.transaction_id, "forged"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SignatureMismatch));

        let tx = store
            .get_transaction(start.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_callback_for_unknown_transaction() {
        let (_, _, _, reconciler) = services();
        let tx = TransactionId::new(777);
        let err = reconciler
            .handle_callback(&callback_payload(tx, &format!("digest-{tx}")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_callback_after_poll_is_a_noop() {
        let (store, gateway, _, reconciler) = services();
        let start = reconciler
            .init_single_buy(single_buy_request())
            .await
            .unwrap();
        gateway.script_poll(Ok(approved_outcome(start.transaction_id, "tok-sb")));
        reconciler
            .transaction_status(PaymentRef::new(9), None)
            .await
            .unwrap();
        let settled = store
            .get_transaction(start.transaction_id)
            .await
            .unwrap()
            .unwrap();

        let mut events = reconciler.subscribe();
        let token = format!("digest-{}", start.transaction_id);
        let view = reconciler
            .handle_callback(&callback_payload(start.transaction_id, &token))
            .await
            .unwrap();
        assert_eq!(view.status, TransactionStatus::Success);

        // No rewrite, no event.
        let after = store
            .get_transaction(start.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.updated_at, settled.updated_at);
        assert!(events.try_recv().is_err());
    }
}
