use crate::api::{self, unwrap_list, unwrap_record, ApiClient, ApiResponse};
use crate::booking::parse_date;
use crate::checkout::{self, CheckoutHost, Contact, Order, PaymentSuccess};
use crate::error::{server_message, ApiError};
use crate::lenient;
use chrono::{DateTime, Utc};
use leptos::logging::warn;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;

const HISTORY_FAILED: &str = "Failed to fetch payment history";

/// What a payment record shows when the backend left a field out.
pub mod defaults {
    pub const AMOUNT: f64 = 0.0;
    pub const LABEL: &str = "unknown";
    pub const INSTALLMENT: u32 = 0;
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPayment {
    #[serde(default, rename = "_id", deserialize_with = "lenient::text")]
    pub object_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub amount: Option<f64>,
    #[serde(default, rename = "type", deserialize_with = "lenient::text")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub method: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub completed_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub installment_number: Option<f64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub receipt_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub screenshot_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: String,
    pub amount: f64,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    pub method: String,
    pub completed_at: DateTime<Utc>,
    pub installment_number: u32,
    pub receipt_id: Option<String>,
    pub screenshot_url: Option<String>,
}

impl PaymentRecord {
    /// `now` stands in for a missing completion date.
    pub fn from_raw(raw: &RawPayment, now: DateTime<Utc>) -> Self {
        let label = |value: &Option<String>| {
            value
                .clone()
                .unwrap_or_else(|| defaults::LABEL.to_owned())
        };
        PaymentRecord {
            id: raw
                .object_id
                .clone()
                .or_else(|| raw.id.clone())
                .unwrap_or_default(),
            amount: raw.amount.unwrap_or(defaults::AMOUNT),
            kind: label(&raw.kind),
            status: label(&raw.status),
            method: label(&raw.method),
            completed_at: raw
                .completed_at
                .as_deref()
                .and_then(parse_date)
                .unwrap_or(now),
            installment_number: raw
                .installment_number
                .filter(|number| *number >= 0.0)
                .map(|number| number as u32)
                .unwrap_or(defaults::INSTALLMENT),
            receipt_id: raw.receipt_id.clone(),
            screenshot_url: raw.screenshot_url.clone(),
        }
    }
}

pub fn payments_from_response(
    res: ApiResponse,
    now: DateTime<Utc>,
) -> Result<Vec<PaymentRecord>, ApiError> {
    let body = res.into_result(HISTORY_FAILED)?;
    let raws: Vec<RawPayment> = lenient::records(unwrap_list(body, "payments"));
    Ok(raws
        .iter()
        .map(|raw| PaymentRecord::from_raw(raw, now))
        .collect())
}

pub async fn fetch_payment_history(
    api: &ApiClient,
    booking_id: &str,
) -> Result<Vec<PaymentRecord>, ApiError> {
    let request = api.authorized(Method::GET, &["payments", "booking", booking_id])?;
    payments_from_response(api::send(request).await?, Utc::now())
}

/// History is informational: a failure is logged and shows as no payments.
pub fn payments_or_empty(
    booking_id: &str,
    result: Result<Vec<PaymentRecord>, ApiError>,
) -> Vec<PaymentRecord> {
    result.unwrap_or_else(|err| {
        warn!("Payment history for {booking_id} unavailable: {err}");
        vec![]
    })
}

pub async fn create_order(api: &ApiClient, booking_id: &str, amount: f64) -> Result<Order, ApiError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ApiError::Invalid("Amount must be greater than zero".into()));
    }
    let request = api
        .authorized(Method::POST, &["payments", "create-order"])?
        .json(&json!({ "bookingId": booking_id, "amount": amount }));
    let body = api::send(request)
        .await?
        .into_result("Failed to create payment order")?;
    Ok(serde_json::from_value(unwrap_record(body, "order"))?)
}

/// Creates an order for `amount` and opens the checkout for it. The key is
/// checked first so an unconfigured build never creates orders.
pub async fn pay_booking<H, F>(
    api: &ApiClient,
    host: &H,
    key: Option<&str>,
    booking_id: &str,
    amount: f64,
    contact: &Contact,
    on_success: F,
) -> Result<(), ApiError>
where
    H: CheckoutHost,
    F: FnOnce(PaymentSuccess) + 'static,
{
    let key = checkout::require_key(key)?;
    let order = create_order(api, booking_id, amount).await?;
    checkout::open_checkout(host, Some(key), &order, booking_id, amount, contact, on_success).await?;
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyArgs<'a> {
    booking_id: &'a str,
    #[serde(flatten)]
    success: &'a PaymentSuccess,
}

/// Hands the gateway's success payload to the backend, which checks the
/// signature and records the payment against the booking.
pub async fn verify_payment(
    api: &ApiClient,
    booking_id: &str,
    success: &PaymentSuccess,
) -> Result<(), ApiError> {
    let request = api
        .authorized(Method::POST, &["payments", "verify"])?
        .json(&VerifyArgs {
            booking_id,
            success,
        });
    api::send(request)
        .await?
        .into_result("Payment verification failed")?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    pub booking_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    pub reason: String,
}

/// Returns the backend's acknowledgement.
pub async fn request_refund(api: &ApiClient, refund: &RefundRequest) -> Result<String, ApiError> {
    if refund.reason.trim().is_empty() {
        return Err(ApiError::Invalid("Please give a reason for the refund".into()));
    }
    let request = api
        .authorized(Method::POST, &["payments", "refund"])?
        .json(refund);
    let body = api::send(request)
        .await?
        .into_result("Failed to request refund")?;
    Ok(server_message(&body).unwrap_or_else(|| "Refund requested".to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::storage::{MemoryStore, TOKEN_KEY};
    use futures::executor::block_on;
    use reqwest::StatusCode;
    use serde_json::Value;
    use std::rc::Rc;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_750_000_000, 0).unwrap()
    }

    fn map(value: Value) -> PaymentRecord {
        let raw: RawPayment = serde_json::from_value(value).unwrap_or_default();
        PaymentRecord::from_raw(&raw, now())
    }

    #[test]
    fn missing_amount_is_zero() {
        let record = map(json!({"_id": "p1", "type": "installment"}));
        assert_eq!(record.amount, 0.0);
        assert_eq!(record.kind, "installment");
        assert_eq!(map(json!({"amount": null})).amount, 0.0);
        assert_eq!(map(json!({"amount": "abc"})).amount, 0.0);
    }

    #[test]
    fn defaults_table() {
        let record = map(json!([]));
        assert_eq!(record.id, "");
        assert_eq!(record.kind, defaults::LABEL);
        assert_eq!(record.status, defaults::LABEL);
        assert_eq!(record.method, defaults::LABEL);
        assert_eq!(record.completed_at, now());
        assert_eq!(record.installment_number, defaults::INSTALLMENT);
        assert_eq!(record.receipt_id, None);
        assert_eq!(record.screenshot_url, None);
    }

    #[test]
    fn full_record() {
        let record = map(json!({
            "_id": "p2",
            "amount": 1500,
            "type": "installment",
            "status": "completed",
            "method": "upi",
            "completedAt": "2025-02-01T10:30:00.000Z",
            "installmentNumber": 2,
            "receiptId": "rcpt_9",
            "screenshotUrl": "https://cdn.example.com/p2.png"
        }));
        assert_eq!(record.amount, 1500.0);
        assert_eq!(record.installment_number, 2);
        assert_eq!(record.completed_at.to_rfc3339(), "2025-02-01T10:30:00+00:00");
        assert_eq!(record.receipt_id.as_deref(), Some("rcpt_9"));
        assert_eq!(map(json!({"installmentNumber": -1})).installment_number, 0);
    }

    #[test]
    fn server_error_is_a_result() {
        let res = ApiResponse::new(StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "boom"}));
        let err = payments_from_response(res, now()).unwrap_err();
        assert_eq!(err.to_string(), "boom");
        let res = ApiResponse::new(StatusCode::INTERNAL_SERVER_ERROR, Value::Null);
        assert_eq!(
            payments_from_response(res, now()).unwrap_err().to_string(),
            HISTORY_FAILED
        );
    }

    #[test]
    fn failed_history_shows_as_empty() {
        let res = ApiResponse::new(StatusCode::INTERNAL_SERVER_ERROR, json!({"message": "down"}));
        assert!(payments_or_empty("b1", payments_from_response(res, now())).is_empty());

        let res = ApiResponse::new(StatusCode::OK, json!([{"amount": 10}]));
        assert_eq!(payments_or_empty("b1", payments_from_response(res, now())).len(), 1);
    }

    #[test]
    fn verification_forwards_the_whole_payload() {
        let success = PaymentSuccess::from_response(json!({
            "razorpay_payment_id": "pay_1",
            "razorpay_order_id": "order_1",
            "razorpay_signature": "sig",
            "razorpay_invoice_id": "inv_7"
        }));
        let body = serde_json::to_value(VerifyArgs {
            booking_id: "b1",
            success: &success,
        })
        .unwrap();
        assert_eq!(body["bookingId"], "b1");
        assert_eq!(body["razorpay_payment_id"], "pay_1");
        assert_eq!(body["razorpay_invoice_id"], "inv_7");
    }

    /// Any use of the gateway fails the test.
    struct NoGateway;

    impl CheckoutHost for NoGateway {
        fn gateway_ready(&self) -> bool {
            panic!("gateway consulted")
        }

        async fn inject_script(&self, _src: &str) -> bool {
            panic!("script injected")
        }

        fn open(
            &self,
            _options: &checkout::CheckoutOptions,
            _on_success: checkout::OnSuccess,
            _on_dismiss: checkout::OnDismiss,
        ) -> Result<(), checkout::CheckoutError> {
            panic!("checkout opened")
        }
    }

    #[test]
    fn no_key_no_order() {
        // Any attempt to create the order would fail with a connection error.
        let config = Config::new("http://127.0.0.1:9/api", None).unwrap();
        let api = ApiClient::new(&config, Rc::new(MemoryStore::with([(TOKEN_KEY, "abc.def.ghi")])));
        for key in [None, Some(""), Some("  ")] {
            let err = block_on(pay_booking(
                &api,
                &NoGateway,
                key,
                "b1",
                500.0,
                &Contact::default(),
                |_| {},
            ))
            .unwrap_err();
            assert!(matches!(
                err,
                ApiError::Checkout(checkout::CheckoutError::MissingKey)
            ));
        }
    }

    #[test]
    fn wrapped_list() {
        let res = ApiResponse::new(StatusCode::OK, json!({"payments": [{"amount": 10}, 3]}));
        let records = payments_from_response(res, now()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].amount, 10.0);
        assert_eq!(records[1].amount, 0.0);
    }

    #[test]
    fn order_shapes() {
        let order: Order =
            serde_json::from_value(unwrap_record(json!({"order": {"id": "order_1", "amount": 5000}}), "order"))
                .unwrap();
        assert_eq!(order.id, "order_1");
        assert_eq!(order.amount, Some(5000));
    }
}
