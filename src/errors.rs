use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

use crate::models::PaymentMethod;
use crate::session::SessionError;

/// Output of an upstream checkout step that the payment page needs but the
/// session does not hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingInput {
    Identity,
    Delivery,
}

impl fmt::Display for MissingInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => write!(f, "user identity"),
            Self::Delivery => write!(f, "delivery details"),
        }
    }
}

/// Where the shell should navigate for errors that are handled by leaving
/// the payment page instead of showing a banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    Login,
    DeliveryCapture,
    Cart,
}

/// Error type for the checkout flow
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Missing {0}")]
    PreconditionFailed(MissingInput),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Invalid coupon: {0}")]
    InvalidCoupon(String),

    #[error("Payment gateway is not configured")]
    GatewayUnavailable,

    #[error("{0} is not available yet")]
    MethodUnavailable(PaymentMethod),

    #[error("Gateway order failed: {0}")]
    GatewayOrderFailed(String),

    #[error("{0}")]
    ConfirmationFailed(String),

    #[error("A payment attempt is already in progress")]
    ConfirmationInProgress,

    #[error("Discount {discount} exceeds order total {total}")]
    DiscountExceedsTotal { total: Decimal, discount: Decimal },

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CheckoutError {
    /// Maps an error to the page the shell should navigate to, if any.
    /// This is the single source of truth for the redirect-versus-banner
    /// split: missing inputs send the user back to the step that produces
    /// them, an empty cart goes back to the cart, everything else stays on
    /// the payment page.
    pub fn redirect(&self) -> Option<Redirect> {
        match self {
            Self::PreconditionFailed(MissingInput::Identity) => Some(Redirect::Login),
            Self::PreconditionFailed(MissingInput::Delivery) => Some(Redirect::DeliveryCapture),
            Self::EmptyCart => Some(Redirect::Cart),
            _ => None,
        }
    }

    /// Banner text for errors [`redirect`](Self::redirect) does not cover.
    /// Backend-supplied failure reasons pass through verbatim; transport and
    /// session faults collapse to a generic line so wire details never reach
    /// the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::PreconditionFailed(_) => "Missing delivery or user info".to_string(),
            Self::EmptyCart => "Your cart is empty.".to_string(),
            Self::InvalidCoupon(reason) => reason.clone(),
            Self::GatewayUnavailable => {
                "Online payment is not configured. Use Cash on Delivery.".to_string()
            }
            Self::MethodUnavailable(method) => {
                format!("{method} is not available yet. Please choose another payment method.")
            }
            Self::GatewayOrderFailed(reason) => reason.clone(),
            Self::ConfirmationFailed(reason) => reason.clone(),
            Self::ConfirmationInProgress => {
                "A payment is already in progress. Please wait for it to finish.".to_string()
            }
            Self::DiscountExceedsTotal { .. } => {
                "Discount exceeds the order total. Remove the coupon and try again.".to_string()
            }
            Self::Session(_) | Self::Url(_) | Self::Transport(_) | Self::Serialization(_) => {
                "Something went wrong. Please try again.".to_string()
            }
        }
    }
}
