//! Checkout flow components.
//!
//! [`SummaryService`] fetches the authoritative order summary,
//! [`CouponResolver`] applies discount codes, and the state machine in
//! [`payment`] drives confirmation. [`CheckoutFlow`] wires them to one
//! storefront session.

pub mod coupon;
pub mod payment;
pub mod summary;
pub mod widget;

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{instrument, warn};

use crate::client::StorefrontApi;
use crate::config::AppConfig;
use crate::errors::CheckoutError;
use crate::events::{CheckoutEvent, EventSender};
use crate::models::{
    CheckoutSummary, DeliveryDetails, GatewayConfig, Invoice, PaymentMethod, StatusMessage,
};
use crate::session::SessionContext;

pub use coupon::CouponResolver;
pub use payment::{PaymentOrchestrator, PaymentOutcome};
pub use summary::SummaryService;
pub use widget::HostedWidget;

/// In-memory state of the payment step for one page visit.
///
/// The summary is immutable here; navigating away and re-entering builds a
/// new session. The discount changes only through coupon application and
/// the method only through [`select_method`](Self::select_method), so the
/// displayed total always equals `totalAmount - discount`.
#[derive(Debug, Clone)]
pub struct PaymentSession {
    pub identity: String,
    pub delivery: DeliveryDetails,
    pub summary: CheckoutSummary,
    pub gateway: GatewayConfig,
    method: PaymentMethod,
    discount: Decimal,
}

impl PaymentSession {
    pub fn new(
        identity: String,
        delivery: DeliveryDetails,
        summary: CheckoutSummary,
        gateway: GatewayConfig,
    ) -> Self {
        Self {
            identity,
            delivery,
            summary,
            gateway,
            method: PaymentMethod::CashOnDelivery,
            discount: Decimal::ZERO,
        }
    }

    pub fn method(&self) -> PaymentMethod {
        self.method
    }

    pub fn discount(&self) -> Decimal {
        self.discount
    }

    /// Total the user will be charged: summary total minus discount.
    pub fn final_total(&self) -> Decimal {
        self.summary.total_amount - self.discount
    }

    /// Switches the active payment method. Leaves the discount and the
    /// summary untouched.
    pub fn select_method(&mut self, method: PaymentMethod) {
        self.method = method;
    }

    /// Methods offered to the user. The hosted gateway is withheld when its
    /// configuration is missing; PayPal is listed but refused on confirm.
    pub fn available_methods(&self) -> Vec<PaymentMethod> {
        let mut methods = vec![PaymentMethod::CashOnDelivery];
        if self.gateway.is_enabled() {
            methods.push(PaymentMethod::HostedGateway);
        }
        methods.push(PaymentMethod::Card);
        methods.push(PaymentMethod::PayPal);
        methods
    }

    pub(crate) fn set_discount(&mut self, discount: Decimal) {
        self.discount = discount;
    }
}

/// Entry point for the payment step, wiring the checkout components to one
/// storefront session.
#[derive(Clone)]
pub struct CheckoutFlow {
    api: Arc<dyn StorefrontApi>,
    summary: SummaryService,
    coupons: CouponResolver,
    orchestrator: PaymentOrchestrator,
    session: SessionContext,
    events: EventSender,
}

impl CheckoutFlow {
    pub fn new(
        api: Arc<dyn StorefrontApi>,
        widget: Arc<dyn HostedWidget>,
        session: SessionContext,
        events: EventSender,
        config: &AppConfig,
    ) -> Self {
        Self {
            summary: SummaryService::new(Arc::clone(&api), session.clone(), events.clone()),
            coupons: CouponResolver::new(Arc::clone(&api), events.clone()),
            orchestrator: PaymentOrchestrator::new(
                Arc::clone(&api),
                widget,
                session.clone(),
                events.clone(),
                config,
            ),
            api,
            session,
            events,
        }
    }

    /// Enters the payment page: checks the upstream preconditions, fetches
    /// the summary, and loads gateway availability.
    ///
    /// Precondition failures surface before any fetch is issued, so a
    /// missing identity never costs a network round trip.
    #[instrument(skip(self))]
    pub async fn enter_payment(&self) -> Result<PaymentSession, CheckoutError> {
        let (identity, delivery) = self.summary.preconditions().await?;
        self.events
            .send_or_log(CheckoutEvent::PaymentPageEntered {
                identity: identity.clone(),
            })
            .await;

        let summary = self.summary.fetch_summary(&identity).await?;
        let gateway = self.load_gateway().await;
        Ok(PaymentSession::new(identity, delivery, summary, gateway))
    }

    /// Applies a coupon code to the page state and reports the banner to
    /// show. Never fails the page.
    pub async fn apply_coupon(&self, page: &mut PaymentSession, code: &str) -> StatusMessage {
        self.coupons.apply(page, code).await
    }

    /// Switches the active payment method.
    pub async fn select_method(&self, page: &mut PaymentSession, method: PaymentMethod) {
        page.select_method(method);
        self.events
            .send_or_log(CheckoutEvent::MethodSelected { method })
            .await;
    }

    /// Runs one confirmation attempt for the current page state.
    pub async fn confirm(&self, page: &PaymentSession) -> Result<PaymentOutcome, CheckoutError> {
        self.orchestrator.confirm(page).await
    }

    /// Consumes the stored invoice for the confirmation page and ends the
    /// checkout lifecycle. The invoice is gone after the first call, so a
    /// reload cannot replay the order.
    pub async fn finish(&self) -> Result<Option<Invoice>, CheckoutError> {
        let invoice = self.session.take_invoice().await?;
        self.session.clear().await?;
        self.events.send_or_log(CheckoutEvent::CheckoutCleared).await;
        Ok(invoice)
    }

    /// Ends the checkout lifecycle without an order.
    pub async fn abandon(&self) -> Result<(), CheckoutError> {
        self.session.clear().await?;
        self.events.send_or_log(CheckoutEvent::CheckoutCleared).await;
        Ok(())
    }

    /// Gateway availability is best-effort at page load: an unreachable
    /// config endpoint disables the gateway instead of failing the page.
    async fn load_gateway(&self) -> GatewayConfig {
        match self.api.gateway_config().await {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, "could not load gateway config, gateway disabled");
                GatewayConfig::disabled()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkout::widget::{WidgetOutcome, WidgetRequest};
    use crate::client::MockStorefrontApi;
    use crate::errors::Redirect;
    use crate::models::SummaryItem;
    use crate::session::MemorySession;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn delivery() -> DeliveryDetails {
        DeliveryDetails {
            full_name: "Jane Doe".to_string(),
            address: "1 High Street".to_string(),
            city: "Springfield".to_string(),
            postal_code: "12345".to_string(),
            phone: "555-0100".to_string(),
        }
    }

    fn summary() -> CheckoutSummary {
        CheckoutSummary {
            items: vec![SummaryItem {
                product_id: "p1".to_string(),
                product_name: "Ring".to_string(),
                quantity: 1,
                item_total: dec!(100),
            }],
            total_amount: dec!(100),
        }
    }

    struct NoWidget;

    #[async_trait::async_trait]
    impl HostedWidget for NoWidget {
        async fn collect_payment(&self, _request: WidgetRequest) -> WidgetOutcome {
            WidgetOutcome::Dismissed
        }
    }

    fn flow(api: MockStorefrontApi, session: SessionContext) -> CheckoutFlow {
        let (events, mut rx) = EventSender::channel(32);
        tokio::spawn(async move { while rx.recv().await.is_some() {} });
        let config = AppConfig::new("http://localhost:5000");
        CheckoutFlow::new(Arc::new(api), Arc::new(NoWidget), session, events, &config)
    }

    #[test]
    fn page_defaults_to_cash_on_delivery_with_no_discount() {
        let page = PaymentSession::new(
            "jane@example.com".to_string(),
            delivery(),
            summary(),
            GatewayConfig::disabled(),
        );
        assert_eq!(page.method(), PaymentMethod::CashOnDelivery);
        assert_eq!(page.discount(), Decimal::ZERO);
        assert_eq!(page.final_total(), dec!(100));
    }

    #[test]
    fn selecting_a_method_keeps_the_discount() {
        let mut page = PaymentSession::new(
            "jane@example.com".to_string(),
            delivery(),
            summary(),
            GatewayConfig::disabled(),
        );
        page.set_discount(dec!(20));
        page.select_method(PaymentMethod::Card);

        assert_eq!(page.method(), PaymentMethod::Card);
        assert_eq!(page.discount(), dec!(20));
        assert_eq!(page.final_total(), dec!(80));
    }

    #[test]
    fn gateway_is_offered_only_when_configured() {
        let page = PaymentSession::new(
            "jane@example.com".to_string(),
            delivery(),
            summary(),
            GatewayConfig {
                key_id: Some("key_live_x".to_string()),
            },
        );
        assert!(page
            .available_methods()
            .contains(&PaymentMethod::HostedGateway));

        let page = PaymentSession::new(
            "jane@example.com".to_string(),
            delivery(),
            summary(),
            GatewayConfig::disabled(),
        );
        assert!(!page
            .available_methods()
            .contains(&PaymentMethod::HostedGateway));
        assert_eq!(page.available_methods()[0], PaymentMethod::CashOnDelivery);
    }

    #[tokio::test]
    async fn missing_identity_skips_the_summary_fetch() {
        let mut api = MockStorefrontApi::new();
        api.expect_fetch_summary().never();
        api.expect_gateway_config().never();

        let session = SessionContext::new(Arc::new(MemorySession::new()));
        let flow = flow(api, session);

        let err = flow.enter_payment().await.unwrap_err();
        assert_eq!(err.redirect(), Some(Redirect::Login));
    }

    #[tokio::test]
    async fn entry_builds_a_page_with_gateway_availability() {
        let mut api = MockStorefrontApi::new();
        api.expect_fetch_summary()
            .times(1)
            .returning(|_| Ok(Some(summary())));
        api.expect_gateway_config().times(1).returning(|| {
            Ok(GatewayConfig {
                key_id: Some("key_live_x".to_string()),
            })
        });

        let session = SessionContext::new(Arc::new(MemorySession::new()));
        session.set_identity("jane@example.com").await.unwrap();
        session.set_delivery_details(&delivery()).await.unwrap();
        let flow = flow(api, session);

        let page = flow.enter_payment().await.unwrap();
        assert_eq!(page.identity, "jane@example.com");
        assert_eq!(page.summary.total_amount, dec!(100));
        assert!(page.gateway.is_enabled());
    }

    #[tokio::test]
    async fn unreachable_gateway_config_disables_the_gateway() {
        let mut api = MockStorefrontApi::new();
        api.expect_fetch_summary()
            .times(1)
            .returning(|_| Ok(Some(summary())));
        api.expect_gateway_config().times(1).returning(|| {
            let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
            Err(CheckoutError::Serialization(json_err))
        });

        let session = SessionContext::new(Arc::new(MemorySession::new()));
        session.set_identity("jane@example.com").await.unwrap();
        session.set_delivery_details(&delivery()).await.unwrap();
        let flow = flow(api, session);

        let page = flow.enter_payment().await.unwrap();
        assert!(!page.gateway.is_enabled());
    }

    #[tokio::test]
    async fn finish_consumes_the_invoice_and_clears_checkout_state() {
        use crate::models::Invoice;
        use chrono::Utc;

        let session = SessionContext::new(Arc::new(MemorySession::new()));
        session.set_identity("jane@example.com").await.unwrap();
        session.set_delivery_details(&delivery()).await.unwrap();
        session
            .store_invoice(&Invoice {
                order_id: "ord-1".to_string(),
                items: vec![],
                total_amount: dec!(100),
                discount: dec!(20),
                final_amount: dec!(80),
                payment_method: PaymentMethod::CashOnDelivery,
                transaction_id: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let flow = flow(MockStorefrontApi::new(), session.clone());

        let invoice = flow.finish().await.unwrap();
        assert_matches!(invoice, Some(stored) => assert_eq!(stored.order_id, "ord-1"));

        // Second read finds nothing; identity survives for the next visit.
        assert!(flow.finish().await.unwrap().is_none());
        assert!(session.delivery_details().await.unwrap().is_none());
        assert_eq!(
            session.identity().await.unwrap(),
            Some("jane@example.com".to_string())
        );
    }
}
