use async_trait::async_trait;
use rust_decimal::Decimal;

/// Parameters handed to the provider-hosted payment widget.
///
/// `amount_minor` is the charge in the provider's minor currency unit, the
/// major amount times one hundred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetRequest {
    pub key: String,
    pub order_id: String,
    pub amount_minor: Decimal,
    pub currency: String,
    pub display_name: String,
    pub description: String,
}

/// Result reported by the hosted widget for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetOutcome {
    /// The provider authorized the payment and returned its transaction id.
    Completed { transaction_id: String },
    /// The provider reported the attempt as failed.
    Failed { message: String },
    /// The user closed the widget without completing payment.
    Dismissed,
}

/// Provider-hosted payment widget. The embedding shell bridges this to the
/// real provider script; tests substitute their own.
///
/// The orchestrator bounds the wait with its configured timeout, so an
/// implementation may stay pending for as long as the user keeps the widget
/// open.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HostedWidget: Send + Sync {
    async fn collect_payment(&self, request: WidgetRequest) -> WidgetOutcome;
}
