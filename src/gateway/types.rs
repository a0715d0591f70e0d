//! Request/response payloads for the public API.
//!
//! Shapes here are the external contract; field names and the `status`
//! strings must stay stable for existing storefront clients.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateIntentRequest {
    pub quantity: i64,
}

/// Successful intent: pay exactly `amount` to `payment_address`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentResponse {
    pub success: bool,
    pub session_id: String,
    /// Exact 8-decimal string, e.g. `"0.00500001"`.
    pub amount: String,
    pub payment_address: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemRef {
    pub cid: String,
}

/// `check-payment-status` envelope, discriminated by `status`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusResponse {
    Pending,
    Expired {
        message: String,
    },
    PaymentPending {
        message: String,
        txid: String,
    },
    Complete {
        items: Vec<ItemRef>,
        quantity: i64,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthResponse {
    pub fn healthy(timestamp: i64) -> Self {
        Self {
            status: "healthy",
            timestamp: Some(timestamp),
            error: None,
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            status: "unhealthy",
            timestamp: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_envelope_shapes() {
        let pending = serde_json::to_value(StatusResponse::Pending).unwrap();
        assert_eq!(pending, json!({"status": "pending"}));

        let payment_pending = serde_json::to_value(StatusResponse::PaymentPending {
            message: "Payment detected".to_string(),
            txid: "abc".to_string(),
        })
        .unwrap();
        assert_eq!(payment_pending["status"], "payment_pending");
        assert_eq!(payment_pending["txid"], "abc");

        let complete = serde_json::to_value(StatusResponse::Complete {
            items: vec![ItemRef {
                cid: "cid-1".to_string(),
            }],
            quantity: 1,
        })
        .unwrap();
        assert_eq!(complete["status"], "complete");
        assert_eq!(complete["items"][0]["cid"], "cid-1");
    }

    #[test]
    fn test_create_intent_response_casing() {
        let response = serde_json::to_value(CreateIntentResponse {
            success: true,
            session_id: "deadbeef".to_string(),
            amount: "0.00500001".to_string(),
            payment_address: "bc1qdrop".to_string(),
        })
        .unwrap();
        assert_eq!(
            response,
            json!({
                "success": true,
                "sessionId": "deadbeef",
                "amount": "0.00500001",
                "paymentAddress": "bc1qdrop",
            })
        );
    }

    #[test]
    fn test_health_omits_empty_fields() {
        let healthy = serde_json::to_value(HealthResponse::healthy(1_700_000_000)).unwrap();
        assert_eq!(
            healthy,
            json!({"status": "healthy", "timestamp": 1_700_000_000})
        );

        let unhealthy = serde_json::to_value(HealthResponse::unhealthy("db gone")).unwrap();
        assert_eq!(unhealthy, json!({"status": "unhealthy", "error": "db gone"}));
    }
}
