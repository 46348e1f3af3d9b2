use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::checkout::widget::{HostedWidget, WidgetOutcome, WidgetRequest};
use crate::checkout::PaymentSession;
use crate::client::StorefrontApi;
use crate::config::AppConfig;
use crate::errors::{CheckoutError, MissingInput};
use crate::events::{CheckoutEvent, EventSender};
use crate::models::{ConfirmPaymentRequest, DeliveryDetails, GatewayOrder, Invoice, PaymentMethod};
use crate::session::SessionContext;

const WIDGET_DESCRIPTION: &str = "Order payment";
const GATEWAY_ORDER_FAILURE: &str = "Could not create payment order";

/// Phase of a confirmation attempt.
///
/// `Confirmed`, `Failed` and `Abandoned` are terminal for the attempt. After
/// a failure or abandonment the page is back at `Idle` with its summary and
/// discount intact, so the user can retry without re-fetching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentPhase {
    Idle,
    AwaitingGatewayOrder,
    AwaitingGatewayResult,
    Confirming,
    Confirmed,
    Failed { reason: String },
    Abandoned,
}

impl PaymentPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed { .. } | Self::Abandoned)
    }
}

impl fmt::Display for PaymentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::AwaitingGatewayOrder => "awaiting_gateway_order",
            Self::AwaitingGatewayResult => "awaiting_gateway_result",
            Self::Confirming => "confirming",
            Self::Confirmed => "confirmed",
            Self::Failed { .. } => "failed",
            Self::Abandoned => "abandoned",
        };
        f.write_str(name)
    }
}

/// Inputs that advance a confirmation attempt.
#[derive(Debug, Clone)]
pub enum PaymentEvent {
    ConfirmRequested,
    GatewayOrderCreated(GatewayOrder),
    GatewayOrderRejected { reason: String },
    WidgetCompleted { transaction_id: String },
    WidgetFailed { reason: String },
    WidgetAbandoned,
    ConfirmationSucceeded(Invoice),
    ConfirmationRejected { reason: String },
}

/// Side effect requested by a transition. The driver executes it and feeds
/// the result back as the next event.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentCommand {
    None,
    CreateGatewayOrder { amount: Decimal, currency: String },
    OpenWidget(WidgetRequest),
    Confirm(ConfirmPaymentRequest),
    StoreInvoice(Invoice),
}

/// One step of the machine: the phase to move to and the side effect to run.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next: PaymentPhase,
    pub command: PaymentCommand,
}

impl Transition {
    fn failed(reason: String) -> Self {
        Self {
            next: PaymentPhase::Failed { reason },
            command: PaymentCommand::None,
        }
    }
}

/// Frozen inputs of one confirmation attempt.
///
/// The summary is immutable during the payment step, so the attempt copies
/// the figures it needs up front; nothing read later can disagree with what
/// the user saw when they pressed confirm.
#[derive(Debug, Clone)]
pub struct PaymentAttempt {
    pub id: Uuid,
    pub identity: String,
    pub delivery: DeliveryDetails,
    pub item_count: usize,
    pub total_amount: Decimal,
    pub discount: Decimal,
    pub method: PaymentMethod,
    pub currency: String,
    pub shop_name: String,
    pub gateway_key: Option<String>,
}

impl PaymentAttempt {
    /// Captures the current page state for one attempt.
    pub fn from_session(page: &PaymentSession, currency: &str, shop_name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity: page.identity.clone(),
            delivery: page.delivery.clone(),
            item_count: page.summary.items.len(),
            total_amount: page.summary.total_amount,
            discount: page.discount(),
            method: page.method(),
            currency: currency.to_string(),
            shop_name: shop_name.to_string(),
            gateway_key: page.gateway.key_id.clone(),
        }
    }

    /// Amount actually charged: summary total minus discount.
    pub fn final_total(&self) -> Decimal {
        self.total_amount - self.discount
    }

    fn confirm_request(&self, transaction_id: Option<String>) -> ConfirmPaymentRequest {
        ConfirmPaymentRequest {
            user_id: self.identity.clone(),
            delivery: self.delivery.clone(),
            discount: self.discount,
            payment_method: self.method,
            transaction_id,
        }
    }

    /// Builds the widget launch parameters. `None` when the order amount is
    /// too large to express in minor units.
    fn widget_request(&self, order: &GatewayOrder) -> Option<WidgetRequest> {
        // Providers take the charge in minor units.
        let amount_minor = order.amount.checked_mul(dec!(100))?.round_dp(0);
        Some(WidgetRequest {
            key: self.gateway_key.clone().unwrap_or_default(),
            order_id: order.order_id.clone(),
            amount_minor,
            currency: order.currency.clone(),
            display_name: self.shop_name.clone(),
            description: WIDGET_DESCRIPTION.to_string(),
        })
    }
}

/// Advances the machine one step. Pure: the only outputs are the next phase
/// and the command the driver should run.
pub fn step(
    attempt: &PaymentAttempt,
    phase: &PaymentPhase,
    event: PaymentEvent,
) -> Result<Transition, CheckoutError> {
    match (phase, event) {
        (PaymentPhase::Idle, PaymentEvent::ConfirmRequested) => start(attempt),
        // One attempt at a time; re-entry is rejected, not queued.
        (_, PaymentEvent::ConfirmRequested) => Err(CheckoutError::ConfirmationInProgress),
        (PaymentPhase::AwaitingGatewayOrder, PaymentEvent::GatewayOrderCreated(order)) => {
            // An order amount the provider cannot express fails the attempt.
            match attempt.widget_request(&order) {
                Some(request) => Ok(Transition {
                    next: PaymentPhase::AwaitingGatewayResult,
                    command: PaymentCommand::OpenWidget(request),
                }),
                None => Ok(Transition::failed(GATEWAY_ORDER_FAILURE.to_string())),
            }
        }
        (PaymentPhase::AwaitingGatewayOrder, PaymentEvent::GatewayOrderRejected { reason }) => {
            Ok(Transition::failed(reason))
        }
        (PaymentPhase::AwaitingGatewayResult, PaymentEvent::WidgetCompleted { transaction_id }) => {
            Ok(Transition {
                next: PaymentPhase::Confirming,
                command: PaymentCommand::Confirm(attempt.confirm_request(Some(transaction_id))),
            })
        }
        (PaymentPhase::AwaitingGatewayResult, PaymentEvent::WidgetFailed { reason }) => {
            Ok(Transition::failed(reason))
        }
        (PaymentPhase::AwaitingGatewayResult, PaymentEvent::WidgetAbandoned) => Ok(Transition {
            next: PaymentPhase::Abandoned,
            command: PaymentCommand::None,
        }),
        (PaymentPhase::Confirming, PaymentEvent::ConfirmationSucceeded(invoice)) => {
            Ok(Transition {
                next: PaymentPhase::Confirmed,
                command: PaymentCommand::StoreInvoice(invoice),
            })
        }
        (PaymentPhase::Confirming, PaymentEvent::ConfirmationRejected { reason }) => {
            Ok(Transition::failed(reason))
        }
        // A result arriving after the attempt already resolved changes
        // nothing.
        (phase, _) => Ok(Transition {
            next: phase.clone(),
            command: PaymentCommand::None,
        }),
    }
}

/// Entry guards and the method branch. `Card` confirms directly like Cash on
/// Delivery; only the hosted gateway takes the order-creation detour, and
/// PayPal is refused before any side effect.
fn start(attempt: &PaymentAttempt) -> Result<Transition, CheckoutError> {
    if attempt.identity.trim().is_empty() {
        return Err(CheckoutError::PreconditionFailed(MissingInput::Identity));
    }
    if attempt.item_count == 0 {
        return Err(CheckoutError::EmptyCart);
    }
    if attempt.final_total() < Decimal::ZERO {
        return Err(CheckoutError::DiscountExceedsTotal {
            total: attempt.total_amount,
            discount: attempt.discount,
        });
    }
    match attempt.method {
        PaymentMethod::PayPal => Err(CheckoutError::MethodUnavailable(PaymentMethod::PayPal)),
        PaymentMethod::HostedGateway => {
            let enabled = attempt
                .gateway_key
                .as_deref()
                .map_or(false, |key| !key.trim().is_empty());
            if !enabled {
                return Err(CheckoutError::GatewayUnavailable);
            }
            Ok(Transition {
                next: PaymentPhase::AwaitingGatewayOrder,
                command: PaymentCommand::CreateGatewayOrder {
                    amount: attempt.final_total(),
                    currency: attempt.currency.clone(),
                },
            })
        }
        PaymentMethod::CashOnDelivery | PaymentMethod::Card => Ok(Transition {
            next: PaymentPhase::Confirming,
            command: PaymentCommand::Confirm(attempt.confirm_request(None)),
        }),
    }
}

/// Terminal result of a driven confirmation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentOutcome {
    /// The backend confirmed the order. The invoice is already persisted to
    /// the session for the confirmation page.
    Confirmed(Invoice),
    /// The widget was dismissed or timed out before reporting a result.
    Abandoned,
}

/// Clears the in-flight flag when an attempt ends, whichever way it ends.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives confirmation attempts end to end: runs the commands produced by
/// [`step`] against the backend and the hosted widget, and feeds the results
/// back as events until the attempt reaches a terminal phase.
#[derive(Clone)]
pub struct PaymentOrchestrator {
    api: Arc<dyn StorefrontApi>,
    widget: Arc<dyn HostedWidget>,
    session: SessionContext,
    events: EventSender,
    currency: String,
    shop_name: String,
    widget_wait: Duration,
    in_flight: Arc<AtomicBool>,
}

impl PaymentOrchestrator {
    pub fn new(
        api: Arc<dyn StorefrontApi>,
        widget: Arc<dyn HostedWidget>,
        session: SessionContext,
        events: EventSender,
        config: &AppConfig,
    ) -> Self {
        Self {
            api,
            widget,
            session,
            events,
            currency: config.currency.clone(),
            shop_name: config.shop_name.clone(),
            widget_wait: config.widget_wait(),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Runs one confirmation attempt for the current page state.
    ///
    /// At most one attempt runs at a time; a second call while one is in
    /// flight returns [`CheckoutError::ConfirmationInProgress`] without
    /// touching the network.
    #[instrument(skip(self, page), fields(method = %page.method()))]
    pub async fn confirm(&self, page: &PaymentSession) -> Result<PaymentOutcome, CheckoutError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CheckoutError::ConfirmationInProgress);
        }
        let _guard = InFlightGuard(Arc::clone(&self.in_flight));

        let attempt = PaymentAttempt::from_session(page, &self.currency, &self.shop_name);
        self.drive(attempt).await
    }

    async fn drive(&self, attempt: PaymentAttempt) -> Result<PaymentOutcome, CheckoutError> {
        info!(
            attempt_id = %attempt.id,
            method = %attempt.method,
            total = %attempt.final_total(),
            "starting confirmation attempt"
        );

        let mut phase = PaymentPhase::Idle;
        let mut invoice: Option<Invoice> = None;
        let mut failure: Option<CheckoutError> = None;
        let mut pending = Some(PaymentEvent::ConfirmRequested);

        while let Some(event) = pending.take() {
            let Transition { next, command } = step(&attempt, &phase, event)?;
            if next != phase {
                self.events
                    .send_or_log(CheckoutEvent::PaymentPhaseChanged {
                        attempt_id: attempt.id,
                        phase: next.to_string(),
                    })
                    .await;
            }
            phase = next;

            pending = match command {
                PaymentCommand::None => None,
                PaymentCommand::CreateGatewayOrder { amount, currency } => {
                    match self.api.create_gateway_order(amount, &currency).await {
                        Ok(order) => Some(PaymentEvent::GatewayOrderCreated(order)),
                        Err(err) => {
                            let reason = err.user_message();
                            failure = Some(err);
                            Some(PaymentEvent::GatewayOrderRejected { reason })
                        }
                    }
                }
                PaymentCommand::OpenWidget(request) => Some(self.await_widget(request).await),
                PaymentCommand::Confirm(request) => {
                    match self.api.confirm_payment(&request).await {
                        Ok(result) => Some(PaymentEvent::ConfirmationSucceeded(result)),
                        Err(err) => {
                            let reason = err.user_message();
                            failure = Some(err);
                            Some(PaymentEvent::ConfirmationRejected { reason })
                        }
                    }
                }
                PaymentCommand::StoreInvoice(result) => {
                    self.session.store_invoice(&result).await?;
                    invoice = Some(result);
                    None
                }
            };
        }

        self.finish(&attempt, phase, invoice, failure).await
    }

    /// Waits for the widget, bounded by the configured timeout. A timeout is
    /// an abandonment, the same as the user closing the widget.
    async fn await_widget(&self, request: WidgetRequest) -> PaymentEvent {
        match tokio::time::timeout(self.widget_wait, self.widget.collect_payment(request)).await {
            Ok(WidgetOutcome::Completed { transaction_id }) => {
                PaymentEvent::WidgetCompleted { transaction_id }
            }
            Ok(WidgetOutcome::Failed { message }) => PaymentEvent::WidgetFailed { reason: message },
            Ok(WidgetOutcome::Dismissed) => PaymentEvent::WidgetAbandoned,
            Err(_) => {
                warn!(wait = ?self.widget_wait, "hosted widget did not report in time");
                PaymentEvent::WidgetAbandoned
            }
        }
    }

    async fn finish(
        &self,
        attempt: &PaymentAttempt,
        phase: PaymentPhase,
        invoice: Option<Invoice>,
        failure: Option<CheckoutError>,
    ) -> Result<PaymentOutcome, CheckoutError> {
        match phase {
            PaymentPhase::Confirmed => {
                let invoice = invoice.ok_or_else(|| {
                    CheckoutError::ConfirmationFailed("Payment failed".to_string())
                })?;
                self.events
                    .send_or_log(CheckoutEvent::PaymentConfirmed {
                        attempt_id: attempt.id,
                        order_id: invoice.order_id.clone(),
                        amount: invoice.final_amount,
                        confirmed_at: Utc::now(),
                    })
                    .await;
                info!(
                    attempt_id = %attempt.id,
                    order_id = %invoice.order_id,
                    "payment confirmed"
                );
                Ok(PaymentOutcome::Confirmed(invoice))
            }
            PaymentPhase::Abandoned => {
                self.events
                    .send_or_log(CheckoutEvent::PaymentAbandoned {
                        attempt_id: attempt.id,
                    })
                    .await;
                warn!(attempt_id = %attempt.id, "attempt abandoned before a widget result");
                Ok(PaymentOutcome::Abandoned)
            }
            PaymentPhase::Failed { reason } => {
                self.events
                    .send_or_log(CheckoutEvent::PaymentFailed {
                        attempt_id: attempt.id,
                        reason: reason.clone(),
                    })
                    .await;
                warn!(attempt_id = %attempt.id, %reason, "confirmation attempt failed");
                Err(failure.unwrap_or(CheckoutError::ConfirmationFailed(reason)))
            }
            other => {
                warn!(attempt_id = %attempt.id, phase = %other, "attempt stopped mid-flight");
                Err(CheckoutError::ConfirmationFailed("Payment failed".to_string()))
            }
        }
    }
}
