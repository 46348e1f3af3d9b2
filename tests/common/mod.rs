use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use storefront_checkout::{
    AppConfig, CheckoutEvent, CheckoutFlow, DeliveryDetails, EventSender, HostedWidget, HttpApi,
    MemorySession, SessionContext, WidgetOutcome, WidgetRequest,
};
use tokio::sync::{mpsc, Mutex};
use url::Url;
use wiremock::MockServer;

pub const IDENTITY: &str = "jane@example.com";

pub fn delivery() -> DeliveryDetails {
    DeliveryDetails {
        full_name: "Jane Doe".to_string(),
        address: "1 High Street".to_string(),
        city: "Springfield".to_string(),
        postal_code: "12345".to_string(),
        phone: "555-0100".to_string(),
    }
}

pub fn delivery_json() -> Value {
    json!({
        "fullName": "Jane Doe",
        "address": "1 High Street",
        "city": "Springfield",
        "postalCode": "12345",
        "phone": "555-0100"
    })
}

/// Summary body for a one-ring cart totalling 100.
pub fn summary_body() -> Value {
    json!({
        "items": [
            {"productId": "p1", "productName": "Ring", "quantity": 1, "itemTotal": 100.0}
        ],
        "totalAmount": 100.0
    })
}

pub fn invoice_body(method: &str, transaction_id: Option<&str>) -> Value {
    json!({
        "orderId": "ord-1",
        "items": [
            {"productId": "p1", "productName": "Ring", "quantity": 1, "itemTotal": 100.0}
        ],
        "totalAmount": 100.0,
        "discount": 20.0,
        "finalAmount": 80.0,
        "paymentMethod": method,
        "transactionId": transaction_id,
        "createdAt": "2024-05-01T10:00:00Z"
    })
}

/// Helper harness wiring one checkout flow to a wiremock backend.
pub struct Harness {
    pub server: MockServer,
    pub flow: CheckoutFlow,
    pub session: SessionContext,
    pub events: mpsc::Receiver<CheckoutEvent>,
}

impl Harness {
    /// Harness with identity and delivery details already in the session.
    pub async fn ready(widget: Arc<dyn HostedWidget>) -> Self {
        let harness = Self::anonymous(widget).await;
        harness.session.set_identity(IDENTITY).await.unwrap();
        harness
            .session
            .set_delivery_details(&delivery())
            .await
            .unwrap();
        harness
    }

    /// Harness with an empty session.
    pub async fn anonymous(widget: Arc<dyn HostedWidget>) -> Self {
        let server = MockServer::start().await;
        let session = SessionContext::new(Arc::new(MemorySession::new()));
        let (events, rx) = EventSender::channel(64);

        let mut config = AppConfig::new(server.uri());
        config.widget_wait_secs = 1;

        let api = HttpApi::new(
            Url::parse(&server.uri()).unwrap(),
            session.clone(),
            config.request_timeout(),
        )
        .unwrap();
        let flow = CheckoutFlow::new(Arc::new(api), widget, session.clone(), events, &config);

        Self {
            server,
            flow,
            session,
            events: rx,
        }
    }

    /// Drains every event published so far.
    pub fn drain_events(&mut self) -> Vec<CheckoutEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }
}

/// Widget that authorizes immediately with a fixed transaction id and
/// records the request it was opened with.
pub struct ApprovingWidget {
    transaction_id: String,
    pub seen: Mutex<Option<WidgetRequest>>,
}

impl ApprovingWidget {
    pub fn new(transaction_id: &str) -> Arc<Self> {
        Arc::new(Self {
            transaction_id: transaction_id.to_string(),
            seen: Mutex::new(None),
        })
    }
}

#[async_trait]
impl HostedWidget for ApprovingWidget {
    async fn collect_payment(&self, request: WidgetRequest) -> WidgetOutcome {
        *self.seen.lock().await = Some(request);
        WidgetOutcome::Completed {
            transaction_id: self.transaction_id.clone(),
        }
    }
}

/// Widget that reports a provider-side failure.
pub struct DecliningWidget;

#[async_trait]
impl HostedWidget for DecliningWidget {
    async fn collect_payment(&self, _request: WidgetRequest) -> WidgetOutcome {
        WidgetOutcome::Failed {
            message: "Payment failed".to_string(),
        }
    }
}

/// Widget that never reports back, for timeout scenarios.
pub struct UnattendedWidget;

#[async_trait]
impl HostedWidget for UnattendedWidget {
    async fn collect_payment(&self, _request: WidgetRequest) -> WidgetOutcome {
        std::future::pending().await
    }
}

/// Widget for flows that must never open one.
pub struct ClosedWidget;

#[async_trait]
impl HostedWidget for ClosedWidget {
    async fn collect_payment(&self, _request: WidgetRequest) -> WidgetOutcome {
        panic!("widget must not open in this test");
    }
}
