use super::{
    constant_time_eq, header_str, hmac_sha256, parse_json, within_tolerance, EventKind,
    NormalizedEvent, WebhookAdapter, WebhookError,
};
use crate::entities::Processor;
use crate::money::parse_major_units;
use axum::http::HeaderMap;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub const TRANSMISSION_ID_HEADER: &str = "paypal-transmission-id";
pub const TRANSMISSION_TIME_HEADER: &str = "paypal-transmission-time";
pub const TRANSMISSION_SIG_HEADER: &str = "paypal-transmission-sig";

/// Verifies the transmission signature: base64 HMAC-SHA256 over
/// `"{transmission_id}|{transmission_time}|{webhook_id}|{hex sha256(body)}"`.
pub struct PaypalAdapter {
    secret: String,
    webhook_id: String,
    tolerance_secs: u64,
}

impl PaypalAdapter {
    pub fn new(secret: impl Into<String>, webhook_id: impl Into<String>, tolerance_secs: u64) -> Self {
        Self {
            secret: secret.into(),
            webhook_id: webhook_id.into(),
            tolerance_secs,
        }
    }

    pub fn sign(&self, transmission_id: &str, transmission_time: &str, body: &[u8]) -> String {
        BASE64.encode(self.signature(transmission_id, transmission_time, body))
    }

    fn signature(&self, transmission_id: &str, transmission_time: &str, body: &[u8]) -> Vec<u8> {
        let body_digest = hex::encode(Sha256::digest(body));
        let message = format!(
            "{}|{}|{}|{}",
            transmission_id, transmission_time, self.webhook_id, body_digest
        );
        hmac_sha256(self.secret.as_bytes(), message.as_bytes())
    }
}

fn amount_in_minor(value: Option<&Value>, currency: &str) -> Result<Option<i64>, WebhookError> {
    match value.and_then(Value::as_str) {
        None => Ok(None),
        Some(raw) => parse_major_units(raw, currency)
            .map(Some)
            .ok_or_else(|| WebhookError::InvalidPayload(format!("invalid amount '{}'", raw))),
    }
}

impl WebhookAdapter for PaypalAdapter {
    fn processor(&self) -> Processor {
        Processor::Paypal
    }

    fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), WebhookError> {
        let transmission_id = header_str(headers, TRANSMISSION_ID_HEADER)?;
        let transmission_time = header_str(headers, TRANSMISSION_TIME_HEADER)?;
        let signature = header_str(headers, TRANSMISSION_SIG_HEADER)?;

        let sent_at = chrono::DateTime::parse_from_rfc3339(transmission_time)
            .map_err(|_| WebhookError::MalformedSignature("transmission time".into()))?;
        if !within_tolerance(sent_at.timestamp(), self.tolerance_secs) {
            return Err(WebhookError::StaleTimestamp);
        }

        let provided = BASE64
            .decode(signature)
            .map_err(|_| WebhookError::MalformedSignature("signature is not base64".into()))?;
        let expected = self.signature(transmission_id, transmission_time, body);

        if constant_time_eq(&expected, &provided) {
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
        let event_type = json
            .get("event_type")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let kind = match event_type {
            "PAYMENT.CAPTURE.COMPLETED" => EventKind::Captured,
            "PAYMENT.CAPTURE.DENIED" | "PAYMENT.CAPTURE.DECLINED" => EventKind::Denied,
            "PAYMENT.CAPTURE.REFUNDED" => EventKind::Refunded,
            _ => return Ok(None),
        };

        let resource = json
            .get("resource")
            .ok_or_else(|| WebhookError::InvalidPayload("missing resource".into()))?;

        // Checkouts are recorded against the order; refunds carry the capture too.
        let processor_reference = ["order_id", "capture_id"]
            .iter()
            .find_map(|key| {
                resource
                    .pointer(&format!("/supplementary_data/related_ids/{}", key))
                    .and_then(Value::as_str)
            })
            .or_else(|| resource.get("id").and_then(Value::as_str))
            .ok_or_else(|| WebhookError::InvalidPayload("missing resource id".into()))?;

        let currency = resource
            .pointer("/amount/currency_code")
            .and_then(Value::as_str)
            .map(str::to_ascii_uppercase);
        let currency_code = currency.as_deref().unwrap_or("USD");

        let amount = amount_in_minor(resource.pointer("/amount/value"), currency_code)?;
        let processor_fee = amount_in_minor(
            resource.pointer("/seller_receivable_breakdown/paypal_fee/value"),
            currency_code,
        )?;

        let (captured_amount, refunded_amount) = match kind {
            EventKind::Captured => (amount, None),
            EventKind::Refunded => {
                // Refund resources report the refunded total separately when
                // several refunds exist for one capture.
                let total = amount_in_minor(
                    resource.pointer("/seller_payable_breakdown/total_refunded_amount/value"),
                    currency_code,
                )?;
                (None, total.or(amount))
            }
            EventKind::Denied => (None, None),
        };

        Ok(Some(NormalizedEvent {
            event_id: event_id.to_string(),
            processor_reference: processor_reference.to_string(),
            kind,
            captured_amount,
            processor_fee: if kind == EventKind::Captured {
                processor_fee
            } else {
                None
            },
            refunded_amount,
            currency,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    fn adapter() -> PaypalAdapter {
        PaypalAdapter::new("pp_secret", "WH-ID-1", 300)
    }

    fn signed_headers(adapter: &PaypalAdapter, body: &[u8]) -> HeaderMap {
        let time = chrono::Utc::now().to_rfc3339();
        let mut headers = HeaderMap::new();
        headers.insert(TRANSMISSION_ID_HEADER, HeaderValue::from_static("tx-1"));
        headers.insert(
            TRANSMISSION_TIME_HEADER,
            HeaderValue::from_str(&time).unwrap(),
        );
        headers.insert(
            TRANSMISSION_SIG_HEADER,
            HeaderValue::from_str(&adapter.sign("tx-1", &time, body)).unwrap(),
        );
        headers
    }

    #[test]
    fn accepts_valid_transmission_signature() {
        let adapter = adapter();
        let body = br#"{"id":"WH-1"}"#;
        let headers = signed_headers(&adapter, body);
        assert_eq!(adapter.verify(&headers, body), Ok(()));
    }

    #[test]
    fn signature_is_bound_to_webhook_id() {
        let body = br#"{"id":"WH-1"}"#;
        let other = PaypalAdapter::new("pp_secret", "WH-ID-2", 300);
        let headers = signed_headers(&other, body);
        assert_eq!(
            adapter().verify(&headers, body),
            Err(WebhookError::SignatureMismatch)
        );
    }

    #[test]
    fn missing_transmission_headers_fail_verification() {
        let err = adapter().verify(&HeaderMap::new(), b"{}").unwrap_err();
        assert!(err.is_verification_failure());
    }

    #[test]
    fn parses_capture_completed_with_fee() {
        let body = json!({
            "id": "WH-EVT-1",
            "event_type": "PAYMENT.CAPTURE.COMPLETED",
            "resource": {
                "id": "CAP-1",
                "amount": {"currency_code": "USD", "value": "100.00"},
                "seller_receivable_breakdown": {"paypal_fee": {"currency_code": "USD", "value": "3.40"}},
                "supplementary_data": {"related_ids": {"order_id": "ORDER-1"}}
            }
        })
        .to_string();

        let event = adapter()
            .parse(&HeaderMap::new(), body.as_bytes())
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, EventKind::Captured);
        assert_eq!(event.processor_reference, "ORDER-1");
        assert_eq!(event.captured_amount, Some(10_000));
        assert_eq!(event.processor_fee, Some(340));
    }

    #[test]
    fn parses_refund_amount() {
        let body = json!({
            "id": "WH-EVT-2",
            "event_type": "PAYMENT.CAPTURE.REFUNDED",
            "resource": {
                "id": "REF-1",
                "amount": {"currency_code": "USD", "value": "25.00"},
                "supplementary_data": {"related_ids": {"order_id": "ORDER-1", "capture_id": "CAP-1"}}
            }
        })
        .to_string();

        let event = adapter()
            .parse(&HeaderMap::new(), body.as_bytes())
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, EventKind::Refunded);
        assert_eq!(event.refunded_amount, Some(2_500));
    }

    #[test]
    fn rejects_unparseable_amounts() {
        let body = json!({
            "id": "WH-EVT-3",
            "event_type": "PAYMENT.CAPTURE.COMPLETED",
            "resource": {"id": "CAP-2", "amount": {"currency_code": "USD", "value": "ten"}}
        })
        .to_string();
        assert!(matches!(
            adapter().parse(&HeaderMap::new(), body.as_bytes()),
            Err(WebhookError::InvalidPayload(_))
        ));
    }

    #[test]
    fn ignores_unrelated_events() {
        let body = json!({"id": "WH-EVT-4", "event_type": "CHECKOUT.ORDER.APPROVED", "resource": {}}).to_string();
        assert_eq!(adapter().parse(&HeaderMap::new(), body.as_bytes()), Ok(None));
    }
}
