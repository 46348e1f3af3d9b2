use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One priced line item of the checkout summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryItem {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    /// Line total, already multiplied by quantity.
    #[serde(with = "rust_decimal::serde::float")]
    pub item_total: Decimal,
}

/// Authoritative order summary for the payment step.
///
/// Produced by the backend from the persisted cart; the client never prices
/// items itself and never mutates a fetched summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSummary {
    pub items: Vec<SummaryItem>,
    /// Pre-discount order total.
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
}

impl CheckoutSummary {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Delivery details captured by the step before payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryDetails {
    pub full_name: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub phone: String,
}

/// Payment methods the page can offer. The wire names are fixed by the
/// backend contract and shorter than the display labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "COD")]
    CashOnDelivery,
    #[serde(rename = "Gateway")]
    HostedGateway,
    Card,
    PayPal,
}

impl PaymentMethod {
    /// Wire name used in requests and invoices.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CashOnDelivery => "COD",
            Self::HostedGateway => "Gateway",
            Self::Card => "Card",
            Self::PayPal => "PayPal",
        }
    }

    /// Label shown to the user.
    pub fn label(&self) -> &'static str {
        match self {
            Self::CashOnDelivery => "Cash on Delivery",
            Self::HostedGateway => "Online payment",
            Self::Card => "Card",
            Self::PayPal => "PayPal",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Publishable gateway configuration fetched at page load. A missing or
/// blank key means the hosted gateway is not offered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default)]
    pub key_id: Option<String>,
}

impl GatewayConfig {
    pub fn disabled() -> Self {
        Self { key_id: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.key_id
            .as_deref()
            .map_or(false, |key| !key.trim().is_empty())
    }
}

/// Provider order created before the hosted widget opens. `amount` is in
/// major currency units; the widget takes minor units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayOrder {
    pub order_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub currency: String,
}

/// Body of the final confirmation call.
///
/// `transaction_id` is serialized as an explicit `null` for methods without
/// a provider transaction; the backend distinguishes null from absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPaymentRequest {
    pub user_id: String,
    pub delivery: DeliveryDetails,
    #[serde(with = "rust_decimal::serde::float")]
    pub discount: Decimal,
    pub payment_method: PaymentMethod,
    pub transaction_id: Option<String>,
}

/// Confirmed-order record returned by the backend. The client never builds
/// one itself; it is held in the session for the confirmation page and
/// consumed there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub order_id: String,
    #[serde(default)]
    pub items: Vec<SummaryItem>,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    pub discount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub final_amount: Decimal,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Tone of an inline status banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusTag {
    Success,
    Error,
}

/// Inline banner shown next to the coupon box or the confirm button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub tag: StatusTag,
    pub text: String,
}

impl StatusMessage {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            tag: StatusTag::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            tag: StatusTag::Error,
            text: text.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.tag == StatusTag::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn summary_uses_camel_case_field_names() {
        let body = json!({
            "items": [
                {"productId": "p1", "productName": "Ring", "quantity": 1, "itemTotal": 100.0}
            ],
            "totalAmount": 100.0
        });
        let summary: CheckoutSummary = serde_json::from_value(body).unwrap();
        assert_eq!(summary.items.len(), 1);
        assert_eq!(summary.items[0].product_name, "Ring");
        assert_eq!(summary.total_amount, dec!(100));
        assert!(!summary.is_empty());
    }

    #[test]
    fn summary_amounts_accept_plain_integers() {
        let body = json!({"items": [], "totalAmount": 250});
        let summary: CheckoutSummary = serde_json::from_value(body).unwrap();
        assert_eq!(summary.total_amount, dec!(250));
        assert!(summary.is_empty());
    }

    #[test]
    fn payment_method_wire_names_are_fixed() {
        assert_eq!(
            serde_json::to_value(PaymentMethod::CashOnDelivery).unwrap(),
            json!("COD")
        );
        assert_eq!(
            serde_json::to_value(PaymentMethod::HostedGateway).unwrap(),
            json!("Gateway")
        );
        assert_eq!(serde_json::to_value(PaymentMethod::Card).unwrap(), json!("Card"));
        assert_eq!(serde_json::to_value(PaymentMethod::PayPal).unwrap(), json!("PayPal"));

        let method: PaymentMethod = serde_json::from_value(json!("COD")).unwrap();
        assert_eq!(method, PaymentMethod::CashOnDelivery);
    }

    #[test]
    fn confirm_request_serializes_null_transaction_id() {
        let request = ConfirmPaymentRequest {
            user_id: "jane@example.com".to_string(),
            delivery: DeliveryDetails {
                full_name: "Jane Doe".to_string(),
                address: "1 High Street".to_string(),
                city: "Springfield".to_string(),
                postal_code: "12345".to_string(),
                phone: "555-0100".to_string(),
            },
            discount: dec!(20),
            payment_method: PaymentMethod::CashOnDelivery,
            transaction_id: None,
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["userId"], json!("jane@example.com"));
        assert_eq!(body["discount"], json!(20.0));
        assert_eq!(body["paymentMethod"], json!("COD"));
        assert_eq!(body["transactionId"], serde_json::Value::Null);
        assert_eq!(body["delivery"]["postalCode"], json!("12345"));
    }

    #[test]
    fn gateway_config_without_key_is_disabled() {
        let config: GatewayConfig = serde_json::from_value(json!({})).unwrap();
        assert!(!config.is_enabled());

        let config: GatewayConfig = serde_json::from_value(json!({"keyId": null})).unwrap();
        assert!(!config.is_enabled());

        let config: GatewayConfig = serde_json::from_value(json!({"keyId": "   "})).unwrap();
        assert!(!config.is_enabled());

        let config: GatewayConfig =
            serde_json::from_value(json!({"keyId": "key_live_x"})).unwrap();
        assert!(config.is_enabled());
    }

    #[test]
    fn invoice_tolerates_missing_optional_fields() {
        let body = json!({
            "orderId": "ord-1",
            "totalAmount": 100.0,
            "finalAmount": 100.0,
            "paymentMethod": "COD",
            "createdAt": "2024-05-01T10:00:00Z"
        });
        let invoice: Invoice = serde_json::from_value(body).unwrap();
        assert_eq!(invoice.order_id, "ord-1");
        assert_eq!(invoice.discount, Decimal::ZERO);
        assert_eq!(invoice.transaction_id, None);
        assert!(invoice.items.is_empty());
    }

    #[test]
    fn status_message_constructors_set_the_tag() {
        assert!(StatusMessage::success("Coupon applied: 20 off").is_success());
        assert!(!StatusMessage::error("Invalid coupon.").is_success());
    }
}
