use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};
use url::Url;

use crate::errors::CheckoutError;
use crate::models::{
    CheckoutSummary, ConfirmPaymentRequest, GatewayConfig, GatewayOrder, Invoice,
};
use crate::session::SessionContext;

const GATEWAY_ORDER_FAILURE: &str = "Could not create payment order";
const CONFIRMATION_FAILURE: &str = "Payment failed";
const INVALID_COUPON: &str = "Invalid coupon.";

/// Backend contract consumed by the checkout flow.
///
/// `fetch_summary` resolves to `None` when the backend has no cart for the
/// identity; the emptiness policy lives with the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorefrontApi: Send + Sync {
    async fn fetch_summary(
        &self,
        identity: &str,
    ) -> Result<Option<CheckoutSummary>, CheckoutError>;

    async fn apply_coupon(&self, code: &str) -> Result<Decimal, CheckoutError>;

    async fn gateway_config(&self) -> Result<GatewayConfig, CheckoutError>;

    async fn create_gateway_order(
        &self,
        amount: Decimal,
        currency: &str,
    ) -> Result<GatewayOrder, CheckoutError>;

    async fn confirm_payment(
        &self,
        request: &ConfirmPaymentRequest,
    ) -> Result<Invoice, CheckoutError>;
}

/// HTTP implementation of [`StorefrontApi`] against the storefront backend.
#[derive(Clone)]
pub struct HttpApi {
    client: Client,
    base_url: Url,
    session: SessionContext,
}

impl HttpApi {
    /// Creates an API client with the given request timeout.
    pub fn new(
        base_url: Url,
        session: SessionContext,
        timeout: Duration,
    ) -> Result<Self, CheckoutError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url, session))
    }

    /// Creates an API client from an existing `reqwest` client (useful for
    /// testing).
    pub fn with_client(client: Client, mut base_url: Url, session: SessionContext) -> Self {
        // Relative joins drop the last path segment unless the base path
        // ends in a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            client,
            base_url,
            session,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, CheckoutError> {
        Ok(self.base_url.join(path)?)
    }

    /// Attaches the session's bearer token when one is present.
    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, CheckoutError> {
        match self.session.access_token().await? {
            Some(token) if !token.is_empty() => Ok(request.bearer_auth(token)),
            _ => Ok(request),
        }
    }
}

#[async_trait]
impl StorefrontApi for HttpApi {
    #[instrument(skip(self))]
    async fn fetch_summary(
        &self,
        identity: &str,
    ) -> Result<Option<CheckoutSummary>, CheckoutError> {
        let url = self.endpoint(&format!("api/checkout/{identity}"))?;
        let request = self.authorize(self.client.get(url)).await?;
        let response = request.send().await?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "summary fetch returned non-success");
            return Ok(None);
        }
        Ok(Some(response.json::<CheckoutSummary>().await?))
    }

    #[instrument(skip(self))]
    async fn apply_coupon(&self, code: &str) -> Result<Decimal, CheckoutError> {
        let mut url = self.endpoint("api/coupons/apply")?;
        url.query_pairs_mut().append_pair("code", code);
        let request = self.authorize(self.client.get(url)).await?;
        let response = request.send().await?;

        if !response.status().is_success() {
            let reason = error_text(response)
                .await
                .unwrap_or_else(|| INVALID_COUPON.to_string());
            return Err(CheckoutError::InvalidCoupon(reason));
        }
        let body: CouponResponse = response.json().await?;
        Ok(body.discount_amount)
    }

    #[instrument(skip(self))]
    async fn gateway_config(&self) -> Result<GatewayConfig, CheckoutError> {
        let url = self.endpoint("api/payments/gateway/config")?;
        let request = self.authorize(self.client.get(url)).await?;
        let response = request.send().await?;

        if !response.status().is_success() {
            // A backend without gateway credentials answers non-success;
            // that is a disabled gateway, not a fault.
            return Ok(GatewayConfig::disabled());
        }
        match response.json::<GatewayConfig>().await {
            Ok(config) => Ok(config),
            Err(err) => {
                warn!(error = %err, "gateway config response was not decodable");
                Ok(GatewayConfig::disabled())
            }
        }
    }

    #[instrument(skip(self))]
    async fn create_gateway_order(
        &self,
        amount: Decimal,
        currency: &str,
    ) -> Result<GatewayOrder, CheckoutError> {
        let url = self.endpoint("api/payments/gateway/create-order")?;
        let body = CreateOrderRequest { amount, currency };
        let request = self.authorize(self.client.post(url)).await?.json(&body);
        let response = request.send().await?;

        if !response.status().is_success() {
            let reason = error_text(response)
                .await
                .unwrap_or_else(|| GATEWAY_ORDER_FAILURE.to_string());
            return Err(CheckoutError::GatewayOrderFailed(reason));
        }
        let order = response
            .json::<GatewayOrder>()
            .await
            .map_err(|_| CheckoutError::GatewayOrderFailed(GATEWAY_ORDER_FAILURE.to_string()))?;
        if order.order_id.is_empty() {
            return Err(CheckoutError::GatewayOrderFailed(
                GATEWAY_ORDER_FAILURE.to_string(),
            ));
        }
        Ok(order)
    }

    #[instrument(
        skip(self, request),
        fields(user_id = %request.user_id, method = %request.payment_method)
    )]
    async fn confirm_payment(
        &self,
        request: &ConfirmPaymentRequest,
    ) -> Result<Invoice, CheckoutError> {
        let url = self.endpoint("api/checkout/confirm-payment")?;
        let http_request = self.authorize(self.client.post(url)).await?.json(request);
        let response = http_request.send().await?;

        if !response.status().is_success() {
            let reason = error_text(response)
                .await
                .unwrap_or_else(|| CONFIRMATION_FAILURE.to_string());
            return Err(CheckoutError::ConfirmationFailed(reason));
        }
        Ok(response.json::<Invoice>().await?)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderRequest<'a> {
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    currency: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CouponResponse {
    #[serde(with = "rust_decimal::serde::float")]
    discount_amount: Decimal,
}

/// Failure bodies carry `{error}` or `{message}` depending on the endpoint.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Best-effort extraction of a failure reason from a non-success response.
async fn error_text(response: Response) -> Option<String> {
    let body: ErrorBody = response.json().await.ok()?;
    body.error
        .or(body.message)
        .filter(|text| !text.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySession;
    use std::sync::Arc;

    fn api(base: &str) -> HttpApi {
        let session = SessionContext::new(Arc::new(MemorySession::new()));
        HttpApi::with_client(Client::new(), Url::parse(base).unwrap(), session)
    }

    #[test]
    fn endpoint_joins_relative_paths() {
        let api = api("http://localhost:5000");
        let url = api.endpoint("api/checkout/confirm-payment").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:5000/api/checkout/confirm-payment"
        );
    }

    #[test]
    fn endpoint_keeps_a_base_path_prefix() {
        let api = api("http://localhost:5000/shop");
        let url = api.endpoint("api/coupons/apply").unwrap();
        assert_eq!(url.as_str(), "http://localhost:5000/shop/api/coupons/apply");
    }

    #[test]
    fn create_order_body_uses_plain_numbers() {
        use rust_decimal_macros::dec;

        let body = CreateOrderRequest {
            amount: dec!(80),
            currency: "INR",
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value, serde_json::json!({"amount": 80.0, "currency": "INR"}));
    }
}
