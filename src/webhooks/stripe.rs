use super::{
    constant_time_eq, header_str, hmac_sha256, parse_json, within_tolerance, EventKind,
    NormalizedEvent, WebhookAdapter, WebhookError,
};
use crate::entities::Processor;
use axum::http::HeaderMap;
use serde_json::Value;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Verifies `Stripe-Signature: t=<unix>,v1=<hex hmac>` over `"{t}.{body}"`.
pub struct StripeAdapter {
    secret: String,
    tolerance_secs: u64,
}

impl StripeAdapter {
    pub fn new(secret: impl Into<String>, tolerance_secs: u64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    /// Header value for a payload signed at `timestamp`.
    pub fn sign(&self, timestamp: i64, body: &[u8]) -> String {
        format!(
            "t={},v1={}",
            timestamp,
            hex::encode(self.signature(&timestamp.to_string(), body))
        )
    }

    fn signature(&self, timestamp: &str, body: &[u8]) -> Vec<u8> {
        let mut signed = Vec::with_capacity(timestamp.len() + 1 + body.len());
        signed.extend_from_slice(timestamp.as_bytes());
        signed.push(b'.');
        signed.extend_from_slice(body);
        hmac_sha256(self.secret.as_bytes(), &signed)
    }
}

impl WebhookAdapter for StripeAdapter {
    fn processor(&self) -> Processor {
        Processor::Stripe
    }

    fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), WebhookError> {
        let header = header_str(headers, SIGNATURE_HEADER)?;

        let mut timestamp = None;
        let mut candidates = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => candidates.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| WebhookError::MalformedSignature("missing t=".into()))?;
        if candidates.is_empty() {
            return Err(WebhookError::MalformedSignature("missing v1=".into()));
        }
        let ts: i64 = timestamp
            .parse()
            .map_err(|_| WebhookError::MalformedSignature("non-numeric t=".into()))?;
        if !within_tolerance(ts, self.tolerance_secs) {
            return Err(WebhookError::StaleTimestamp);
        }

        let expected = self.signature(timestamp, body);
        // Stripe sends several v1 entries while a secret is being rolled.
        let matched = candidates.iter().any(|candidate| {
            hex::decode(candidate)
                .map(|sig| constant_time_eq(&expected, &sig))
                .unwrap_or(false)
        });

        if matched {
            Ok(())
        } else {
            Err(WebhookError::SignatureMismatch)
        }
    }

    fn parse(
        &self,
        _headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Option<NormalizedEvent>, WebhookError> {
        let json = parse_json(body)?;
        let event_id = json
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| WebhookError::InvalidPayload("missing event id".into()))?;
        let event_type = json.get("type").and_then(Value::as_str).unwrap_or_default();

        let kind = match event_type {
            "payment_intent.succeeded" | "charge.succeeded" => EventKind::Captured,
            "payment_intent.payment_failed" | "charge.failed" => EventKind::Denied,
            "charge.refunded" => EventKind::Refunded,
            _ => return Ok(None),
        };

        let object = json
            .pointer("/data/object")
            .ok_or_else(|| WebhookError::InvalidPayload("missing data.object".into()))?;

        // Checkouts are recorded against the PaymentIntent; charges point back to it.
        let processor_reference = object
            .get("payment_intent")
            .and_then(Value::as_str)
            .or_else(|| object.get("id").and_then(Value::as_str))
            .ok_or_else(|| WebhookError::InvalidPayload("missing object id".into()))?;

        let captured_amount = match kind {
            EventKind::Captured => ["amount_received", "amount_captured", "amount"]
                .iter()
                .find_map(|field| object.get(*field).and_then(Value::as_i64)),
            _ => None,
        };
        let processor_fee = object
            .pointer("/balance_transaction/fee")
            .and_then(Value::as_i64)
            .or_else(|| object.pointer("/latest_charge/balance_transaction/fee").and_then(Value::as_i64));
        let refunded_amount = match kind {
            EventKind::Refunded => object.get("amount_refunded").and_then(Value::as_i64),
            _ => None,
        };
        let currency = object
            .get("currency")
            .and_then(Value::as_str)
            .map(str::to_ascii_uppercase);

        Ok(Some(NormalizedEvent {
            event_id: event_id.to_string(),
            processor_reference: processor_reference.to_string(),
            kind,
            captured_amount,
            processor_fee,
            refunded_amount,
            currency,
        }))
    }
}
