use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::{DeliveryDetails, Invoice};

/// Error type for session storage operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session operation failed: {0}")]
    OperationFailed(String),
}

/// String key-value store that outlives page navigation within one visit.
///
/// Values are stored as strings so every backend sees the same serialized
/// shape. Reads and writes are atomic per call; coordination across
/// concurrent visits is out of scope.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, SessionError>;
    async fn set(&self, key: &str, value: String) -> Result<(), SessionError>;
    async fn remove(&self, key: &str) -> Result<(), SessionError>;
}

/// In-memory session backend, the default for tests and embedded use.
#[derive(Debug, Clone, Default)]
pub struct MemorySession {
    store: Arc<RwLock<HashMap<String, String>>>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionBackend for MemorySession {
    async fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        let store = self.store.read().await;
        Ok(store.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), SessionError> {
        let mut store = self.store.write().await;
        store.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), SessionError> {
        let mut store = self.store.write().await;
        store.remove(key);
        Ok(())
    }
}

/// Session keys shared between checkout steps. The auth layer owns
/// `IDENTITY` and `ACCESS_TOKEN`; checkout only reads them.
mod keys {
    pub const IDENTITY: &str = "userEmail";
    pub const ACCESS_TOKEN: &str = "accessToken";
    pub const DELIVERY: &str = "deliveryDetails";
    pub const INVOICE: &str = "invoice";
}

/// Typed view over the session store for the checkout steps.
#[derive(Clone)]
pub struct SessionContext {
    backend: Arc<dyn SessionBackend>,
}

impl SessionContext {
    pub fn new(backend: Arc<dyn SessionBackend>) -> Self {
        Self { backend }
    }

    /// Identity of the signed-in user, if any.
    pub async fn identity(&self) -> Result<Option<String>, SessionError> {
        self.backend.get(keys::IDENTITY).await
    }

    pub async fn set_identity(&self, identity: &str) -> Result<(), SessionError> {
        self.backend.set(keys::IDENTITY, identity.to_string()).await
    }

    /// Bearer token attached to backend requests when present.
    pub async fn access_token(&self) -> Result<Option<String>, SessionError> {
        self.backend.get(keys::ACCESS_TOKEN).await
    }

    pub async fn set_access_token(&self, token: &str) -> Result<(), SessionError> {
        self.backend.set(keys::ACCESS_TOKEN, token.to_string()).await
    }

    pub async fn delivery_details(&self) -> Result<Option<DeliveryDetails>, SessionError> {
        self.get_json(keys::DELIVERY).await
    }

    pub async fn set_delivery_details(
        &self,
        delivery: &DeliveryDetails,
    ) -> Result<(), SessionError> {
        self.set_json(keys::DELIVERY, delivery).await
    }

    /// Persists the confirmed invoice for the confirmation page.
    pub async fn store_invoice(&self, invoice: &Invoice) -> Result<(), SessionError> {
        self.set_json(keys::INVOICE, invoice).await
    }

    /// Takes the stored invoice, removing it so a reload of the confirmation
    /// page cannot replay a stale order.
    pub async fn take_invoice(&self) -> Result<Option<Invoice>, SessionError> {
        let invoice = self.get_json::<Invoice>(keys::INVOICE).await?;
        if invoice.is_some() {
            self.backend.remove(keys::INVOICE).await?;
        }
        Ok(invoice)
    }

    /// Removes checkout-owned state. Identity and access token belong to the
    /// auth layer and survive.
    pub async fn clear(&self) -> Result<(), SessionError> {
        self.backend.remove(keys::DELIVERY).await?;
        self.backend.remove(keys::INVOICE).await?;
        debug!("checkout session state cleared");
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SessionError> {
        match self.backend.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), SessionError> {
        let raw = serde_json::to_string(value)?;
        self.backend.set(key, raw).await
    }
}
