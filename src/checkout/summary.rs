use std::sync::Arc;

use tracing::{instrument, warn};

use crate::client::StorefrontApi;
use crate::errors::{CheckoutError, MissingInput};
use crate::events::{CheckoutEvent, EventSender};
use crate::models::{CheckoutSummary, DeliveryDetails};
use crate::session::SessionContext;

/// Retrieves the authoritative order summary for the payment step.
///
/// The summary is the single source of truth for priced line items. It is
/// fetched once per page entry and never mutated in place; coupons adjust a
/// separate discount figure.
#[derive(Clone)]
pub struct SummaryService {
    api: Arc<dyn StorefrontApi>,
    session: SessionContext,
    events: EventSender,
}

impl SummaryService {
    pub fn new(api: Arc<dyn StorefrontApi>, session: SessionContext, events: EventSender) -> Self {
        Self {
            api,
            session,
            events,
        }
    }

    /// Checks the outputs of the upstream steps.
    ///
    /// Identity is checked before delivery so the redirect chain is
    /// deterministic, and both are checked before any network call. Stored
    /// delivery details that no longer parse count as missing, sending the
    /// user back through the capture step.
    pub async fn preconditions(&self) -> Result<(String, DeliveryDetails), CheckoutError> {
        let identity = self
            .session
            .identity()
            .await?
            .filter(|identity| !identity.trim().is_empty())
            .ok_or(CheckoutError::PreconditionFailed(MissingInput::Identity))?;

        let delivery = match self.session.delivery_details().await {
            Ok(Some(delivery)) => delivery,
            Ok(None) => {
                return Err(CheckoutError::PreconditionFailed(MissingInput::Delivery));
            }
            Err(err) => {
                warn!(error = %err, "stored delivery details are unreadable");
                return Err(CheckoutError::PreconditionFailed(MissingInput::Delivery));
            }
        };

        Ok((identity, delivery))
    }

    /// Fetches the summary for `identity`. A missing or empty cart resolves
    /// to [`CheckoutError::EmptyCart`], which redirects back to the cart
    /// page rather than rendering an empty payment page.
    #[instrument(skip(self))]
    pub async fn fetch_summary(&self, identity: &str) -> Result<CheckoutSummary, CheckoutError> {
        let summary = self
            .api
            .fetch_summary(identity)
            .await?
            .filter(|summary| !summary.is_empty())
            .ok_or(CheckoutError::EmptyCart)?;

        self.events
            .send_or_log(CheckoutEvent::SummaryFetched {
                identity: identity.to_string(),
                item_count: summary.items.len(),
                total_amount: summary.total_amount,
            })
            .await;

        Ok(summary)
    }
}
