use super::{
    constant_time_eq, header_str, hmac_sha256, parse_json, EventKind, NormalizedEvent,
    WebhookAdapter, WebhookError,
};
use crate::entities::Processor;
use axum::http::HeaderMap;
use serde_json::Value;

pub const SIGNATURE_HEADER: &str = "x-gateway-signature";
pub const EVENT_ID_HEADER: &str = "x-gateway-event-id";

/// Hex HMAC-SHA256 of the raw body with the shared gateway secret.
pub struct CardGatewayAdapter {
    secret: String,
}

impl CardGatewayAdapter {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn sign(&self, body: &[u8]) -> String {
        hex::encode(hmac_sha256(self.secret.as_bytes(), body))
    }
}

impl WebhookAdapter for CardGatewayAdapter {
    fn processor(&self) -> Processor {
        Processor::CardGateway
    }

    fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), WebhookError> {
        let signature = header_str(headers, SIGNATURE_HEADER)?;
        let provided = hex::decode(signature)
            .map_err(|_| WebhookError::MalformedSignature("signature is not hex".into()))?;
        let expected = hmac_sha256(self.secret.as_bytes(), body);

        if constant_time_eq(&expected, &provided) {
            Ok(())
        } else {
            Err(WebhookError::SignatureMismatch)
        }
    }

    fn parse(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Option<NormalizedEvent>, WebhookError> {
        let json = parse_json(body)?;

        let event_id = header_str(headers, EVENT_ID_HEADER)
            .ok()
            .map(str::to_string)
            .or_else(|| json.get("id").and_then(Value::as_str).map(str::to_string))
            .ok_or_else(|| WebhookError::InvalidPayload("missing event id".into()))?;

        let kind = match json.get("type").and_then(Value::as_str).unwrap_or_default() {
            "payment.captured" => EventKind::Captured,
            "payment.failed" => EventKind::Denied,
            "refund.processed" => EventKind::Refunded,
            _ => return Ok(None),
        };

        let data = json
            .get("data")
            .ok_or_else(|| WebhookError::InvalidPayload("missing data".into()))?;
        let processor_reference = data
            .get("reference")
            .and_then(Value::as_str)
            .ok_or_else(|| WebhookError::InvalidPayload("missing data.reference".into()))?;
        let amount = data.get("amount").and_then(Value::as_i64);

        Ok(Some(NormalizedEvent {
            event_id,
            processor_reference: processor_reference.to_string(),
            kind,
            captured_amount: (kind == EventKind::Captured).then_some(amount).flatten(),
            processor_fee: (kind == EventKind::Captured)
                .then(|| data.get("fee").and_then(Value::as_i64))
                .flatten(),
            refunded_amount: (kind == EventKind::Refunded).then_some(amount).flatten(),
            currency: data
                .get("currency")
                .and_then(Value::as_str)
                .map(str::to_ascii_uppercase),
        }))
    }
}
