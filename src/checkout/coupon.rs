use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use crate::checkout::PaymentSession;
use crate::client::StorefrontApi;
use crate::errors::CheckoutError;
use crate::events::{CheckoutEvent, EventSender};
use crate::models::StatusMessage;

const COUPON_FALLBACK_FAILURE: &str = "Error applying coupon";

/// Validates coupon codes against the backend and applies the result to the
/// page state.
#[derive(Clone)]
pub struct CouponResolver {
    api: Arc<dyn StorefrontApi>,
    events: EventSender,
}

impl CouponResolver {
    pub fn new(api: Arc<dyn StorefrontApi>, events: EventSender) -> Self {
        Self { api, events }
    }

    /// Applies `code` to the page.
    ///
    /// A successful application replaces any prior discount; any failure
    /// resets it to zero. The displayed total only moves once the backend
    /// has answered, so a slow response never shows a provisional price.
    #[instrument(skip(self, page))]
    pub async fn apply(&self, page: &mut PaymentSession, code: &str) -> StatusMessage {
        match self.api.apply_coupon(code).await {
            Ok(discount) => {
                // The discount is never negative.
                let discount = discount.max(Decimal::ZERO);
                page.set_discount(discount);
                info!(%code, %discount, "coupon applied");
                self.events
                    .send_or_log(CheckoutEvent::CouponApplied {
                        code: code.to_string(),
                        discount,
                    })
                    .await;
                StatusMessage::success(format!("Coupon applied: {discount} off"))
            }
            Err(err) => {
                page.set_discount(Decimal::ZERO);
                warn!(%code, error = %err, "coupon application failed");
                self.events
                    .send_or_log(CheckoutEvent::CouponRejected {
                        code: code.to_string(),
                    })
                    .await;
                StatusMessage::error(failure_text(&err))
            }
        }
    }
}

/// Invalid codes keep the backend's wording; transport faults get a fixed
/// line so network details never reach the banner.
fn failure_text(err: &CheckoutError) -> String {
    match err {
        CheckoutError::InvalidCoupon(reason) => reason.clone(),
        _ => COUPON_FALLBACK_FAILURE.to_string(),
    }
}
