//! Inbound processor webhooks.
//!
//! Each processor gets a [`WebhookAdapter`] whose only job is to verify the
//! delivery's signature and translate the processor's payload into a
//! [`NormalizedEvent`]. The [`reconciler`] applies normalized events to the
//! ledger and never sees processor-specific shapes.

pub mod card_gateway;
pub mod paypal;
pub mod reconciler;
pub mod stripe;

use crate::config::AppConfig;
use crate::entities::Processor;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub use card_gateway::CardGatewayAdapter;
pub use paypal::PaypalAdapter;
pub use reconciler::{WebhookAck, WebhookOutcome, WebhookReconciler};
pub use stripe::StripeAdapter;

type HmacSha256 = Hmac<Sha256>;

/// The three ledger-relevant things a processor can tell us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    Captured,
    Denied,
    Refunded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEvent {
    /// Processor's unique id for this delivery, the idempotency key
    pub event_id: String,
    pub processor_reference: String,
    pub kind: EventKind,
    /// Amount actually captured, in minor units
    pub captured_amount: Option<i64>,
    /// Fee the processor reports having charged, in minor units
    pub processor_fee: Option<i64>,
    /// Amount refunded so far, in minor units
    pub refunded_amount: Option<i64>,
    /// Upper-case ISO 4217 code
    pub currency: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("missing header {0}")]
    MissingHeader(&'static str),
    #[error("malformed signature header: {0}")]
    MalformedSignature(String),
    #[error("signature mismatch")]
    SignatureMismatch,
    #[error("timestamp outside tolerance")]
    StaleTimestamp,
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl WebhookError {
    pub fn is_verification_failure(&self) -> bool {
        !matches!(self, WebhookError::InvalidPayload(_))
    }
}

pub trait WebhookAdapter: Send + Sync {
    fn processor(&self) -> Processor;

    /// Checks the delivery's signature against the raw body.
    fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), WebhookError>;

    /// Translates a verified payload. `Ok(None)` means the event type does not
    /// affect the ledger.
    fn parse(&self, headers: &HeaderMap, body: &[u8])
        -> Result<Option<NormalizedEvent>, WebhookError>;
}

/// Adapters for every processor whose secret is configured.
#[derive(Clone, Default)]
pub struct WebhookAdapters {
    adapters: HashMap<Processor, Arc<dyn WebhookAdapter>>,
}

impl WebhookAdapters {
    pub fn from_config(config: &AppConfig) -> Self {
        let tolerance = config.webhook_tolerance_secs;
        let mut adapters = Self::default();

        if let Some(secret) = non_empty(&config.stripe_webhook_secret) {
            adapters.register(Arc::new(StripeAdapter::new(secret, tolerance)));
        }
        if let Some(secret) = non_empty(&config.paypal_webhook_secret) {
            let webhook_id = non_empty(&config.paypal_webhook_id).unwrap_or_default();
            adapters.register(Arc::new(PaypalAdapter::new(secret, webhook_id, tolerance)));
        }
        if let Some(secret) = non_empty(&config.card_gateway_webhook_secret) {
            adapters.register(Arc::new(CardGatewayAdapter::new(secret)));
        }

        adapters
    }

    pub fn register(&mut self, adapter: Arc<dyn WebhookAdapter>) {
        self.adapters.insert(adapter.processor(), adapter);
    }

    pub fn get(&self, processor: Processor) -> Option<Arc<dyn WebhookAdapter>> {
        self.adapters.get(&processor).cloned()
    }

    pub fn configured(&self) -> Vec<Processor> {
        let mut processors: Vec<_> = self.adapters.keys().copied().collect();
        processors.sort_by_key(|p| p.to_string());
        processors
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub(crate) fn header_str<'a>(
    headers: &'a HeaderMap,
    name: &'static str,
) -> Result<&'a str, WebhookError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(WebhookError::MissingHeader(name))
}

pub(crate) fn hmac_sha256(secret: &[u8], message: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.iter().zip(b) {
        res |= x ^ y;
    }
    res == 0
}

pub(crate) fn within_tolerance(timestamp: i64, tolerance_secs: u64) -> bool {
    let now = chrono::Utc::now().timestamp();
    (now - timestamp).unsigned_abs() <= tolerance_secs
}

pub(crate) fn parse_json(body: &[u8]) -> Result<serde_json::Value, WebhookError> {
    serde_json::from_slice(body).map_err(|e| WebhookError::InvalidPayload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_compares_contents_and_length() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }

    #[test]
    fn adapters_exist_only_for_configured_secrets() {
        let mut config = AppConfig::new(
            "sqlite::memory:".into(),
            "redis://127.0.0.1:6379".into(),
            "127.0.0.1".into(),
            8080,
            "development".into(),
        );
        config.stripe_webhook_secret = Some("whsec_test".into());
        config.paypal_webhook_secret = Some("   ".into());

        let adapters = WebhookAdapters::from_config(&config);
        assert!(adapters.get(Processor::Stripe).is_some());
        assert!(adapters.get(Processor::Paypal).is_none());
        assert!(adapters.get(Processor::CardGateway).is_none());
        assert_eq!(adapters.configured(), vec![Processor::Stripe]);
    }

    #[test]
    fn only_payload_errors_are_not_verification_failures() {
        assert!(WebhookError::SignatureMismatch.is_verification_failure());
        assert!(WebhookError::MissingHeader("x").is_verification_failure());
        assert!(!WebhookError::InvalidPayload("x".into()).is_verification_failure());
    }
}
