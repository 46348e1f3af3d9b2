//! Storefront Checkout Library
//!
//! This crate provides the client-side core of a small storefront's checkout:
//! the session state that survives page navigation, the order summary and
//! coupon services, and the payment confirmation state machine with its
//! hosted-widget integration.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod checkout;
pub mod client;
pub mod config;
pub mod errors;
pub mod events;
pub mod models;
pub mod session;

pub use checkout::payment::{PaymentOrchestrator, PaymentOutcome, PaymentPhase};
pub use checkout::widget::{HostedWidget, WidgetOutcome, WidgetRequest};
pub use checkout::{CheckoutFlow, CouponResolver, PaymentSession, SummaryService};
pub use client::{HttpApi, StorefrontApi};
pub use config::{init_tracing, load_config, AppConfig, AppConfigError};
pub use errors::{CheckoutError, MissingInput, Redirect};
pub use events::{CheckoutEvent, EventSender};
pub use models::{
    CheckoutSummary, ConfirmPaymentRequest, DeliveryDetails, GatewayConfig, GatewayOrder, Invoice,
    PaymentMethod, StatusMessage, StatusTag, SummaryItem,
};
pub use session::{MemorySession, SessionBackend, SessionContext, SessionError};
