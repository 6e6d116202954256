use crate::api::{self, unwrap_list, unwrap_record, ApiClient, ApiResponse};
use crate::error::ApiError;
use crate::lenient;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

const MS_PER_DAY: i64 = 86_400_000;
const FETCH_FAILED: &str = "Failed to fetch bookings";
const CREATE_FAILED: &str = "Failed to create booking";

/// What a booking view shows when the backend left a field out.
pub mod defaults {
    pub const GUIDE_NAME: &str = "Unknown Guide";
    pub const GUIDE_CONTACT: &str = "N/A";
    pub const LANGUAGES: &str = "Not specified";
    pub const DATE: &str = "N/A";
    pub const DURATION: &str = "N/A";
    pub const AMOUNT: f64 = 0.0;
    pub const STATUS: &str = "pending";
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawGuide {
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "lenient::texts")]
    pub languages: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBooking {
    #[serde(default, rename = "_id", deserialize_with = "lenient::text")]
    pub object_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::record")]
    pub guide: Option<RawGuide>,
    /// Populated guide reference, when the backend expands `guideId`.
    #[serde(default, deserialize_with = "lenient::record")]
    pub guide_id: Option<RawGuide>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub start_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub end_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub budget: Option<f64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub payment_status: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub total_paid: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub remaining_balance: Option<f64>,
    #[serde(default, deserialize_with = "activities")]
    pub activities: Vec<String>,
}

/// Activities are either plain names or `{ name }` / `{ title }` objects.
fn activities<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let values = match value {
        Some(Value::Array(values)) => values,
        _ => return Ok(vec![]),
    };
    Ok(values
        .iter()
        .filter_map(|value| match value {
            Value::Object(map) => map
                .get("name")
                .or_else(|| map.get("title"))
                .and_then(lenient::as_text),
            value => lenient::as_text(value),
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    pub id: String,
    pub guide_name: String,
    pub guide_email: String,
    pub guide_phone: String,
    pub guide_languages: String,
    pub start_date: String,
    pub end_date: String,
    pub budget: f64,
    pub status: String,
    pub payment_status: String,
    pub total_paid: f64,
    pub remaining_balance: f64,
    pub activities: Vec<String>,
    pub duration: String,
}

impl BookingView {
    pub fn from_raw(raw: &RawBooking) -> Self {
        let guide = raw
            .guide
            .clone()
            .or_else(|| raw.guide_id.clone())
            .unwrap_or_default();
        let start = raw.start_date.as_deref().and_then(parse_date);
        let end = raw.end_date.as_deref().and_then(parse_date);
        let budget = raw.budget.unwrap_or(defaults::AMOUNT);
        let guide_languages = if guide.languages.is_empty() {
            defaults::LANGUAGES.to_owned()
        } else {
            guide.languages.join(", ")
        };
        let duration = match (start, end) {
            (Some(start), Some(end)) => duration_days(start, end).map(|days| format!("{days} days")),
            _ => None,
        };

        BookingView {
            id: raw
                .object_id
                .clone()
                .or_else(|| raw.id.clone())
                .unwrap_or_default(),
            guide_name: guide.name.unwrap_or_else(|| defaults::GUIDE_NAME.to_owned()),
            guide_email: guide
                .email
                .unwrap_or_else(|| defaults::GUIDE_CONTACT.to_owned()),
            guide_phone: guide
                .phone
                .unwrap_or_else(|| defaults::GUIDE_CONTACT.to_owned()),
            guide_languages,
            start_date: start
                .map(format_date)
                .unwrap_or_else(|| defaults::DATE.to_owned()),
            end_date: end
                .map(format_date)
                .unwrap_or_else(|| defaults::DATE.to_owned()),
            budget,
            status: raw
                .status
                .clone()
                .unwrap_or_else(|| defaults::STATUS.to_owned()),
            payment_status: raw
                .payment_status
                .clone()
                .unwrap_or_else(|| defaults::STATUS.to_owned()),
            total_paid: raw.total_paid.unwrap_or(defaults::AMOUNT),
            remaining_balance: raw.remaining_balance.unwrap_or(budget),
            activities: raw.activities.clone(),
            duration: duration.unwrap_or_else(|| defaults::DURATION.to_owned()),
        }
    }
}

/// RFC 3339 timestamps, naive ISO timestamps and bare dates, all read as UTC.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|date| date.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|date| date.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|date| date.and_utc())
        })
}

pub fn format_date(date: DateTime<Utc>) -> String {
    date.format("%-m/%-d/%Y").to_string()
}

/// Whole days covered by the range, partial days rounded up. `None` for a
/// range that ends before it starts.
pub fn duration_days(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<i64> {
    let ms = (end - start).num_milliseconds();
    if ms < 0 {
        return None;
    }
    Some((ms + MS_PER_DAY - 1) / MS_PER_DAY)
}

pub fn bookings_from_response(res: ApiResponse) -> Result<Vec<BookingView>, ApiError> {
    let body = res.into_result(FETCH_FAILED)?;
    let raws: Vec<RawBooking> = lenient::records(unwrap_list(body, "bookings"));
    Ok(raws.iter().map(BookingView::from_raw).collect())
}

pub async fn fetch_bookings(api: &ApiClient, user_id: &str) -> Result<Vec<BookingView>, ApiError> {
    let request = api.authorized(Method::GET, &["bookings", "user", user_id])?;
    bookings_from_response(api::send(request).await?)
}

fn booking_from_response(res: ApiResponse, fallback: &str) -> Result<BookingView, ApiError> {
    let body = res.into_result(fallback)?;
    let raw: RawBooking = serde_json::from_value(unwrap_record(body, "booking")).unwrap_or_default();
    Ok(BookingView::from_raw(&raw))
}

pub async fn fetch_booking(api: &ApiClient, booking_id: &str) -> Result<BookingView, ApiError> {
    let request = api.authorized(Method::GET, &["bookings", booking_id])?;
    booking_from_response(api::send(request).await?, "Failed to fetch booking")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBooking {
    pub guide_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub budget: f64,
    pub activities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl NewBooking {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.guide_id.trim().is_empty() {
            return Err(ApiError::Invalid("Please choose a guide".into()));
        }
        if self.end_date < self.start_date {
            return Err(ApiError::Invalid(
                "End date cannot be before start date".into(),
            ));
        }
        if !self.budget.is_finite() || self.budget < 0.0 {
            return Err(ApiError::Invalid("Budget must be a positive amount".into()));
        }
        Ok(())
    }
}

pub async fn create_booking(api: &ApiClient, booking: &NewBooking) -> Result<BookingView, ApiError> {
    booking.validate()?;
    let request = api.authorized(Method::POST, &["bookings"])?.json(booking);
    booking_from_response(api::send(request).await?, CREATE_FAILED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use serde_json::json;

    fn map(value: Value) -> BookingView {
        let raw: RawBooking = serde_json::from_value(value).unwrap_or_default();
        BookingView::from_raw(&raw)
    }

    #[test]
    fn three_day_trip() {
        let view = map(json!({"startDate": "2025-01-01", "endDate": "2025-01-04", "budget": 300}));
        assert_eq!(view.duration, "3 days");
        assert_eq!(view.remaining_balance, 300.0);
        assert_eq!(view.total_paid, 0.0);
        assert_eq!(view.start_date, "1/1/2025");
        assert_eq!(view.end_date, "1/4/2025");
    }

    #[test]
    fn missing_dates() {
        assert_eq!(map(json!({"startDate": "2025-01-01"})).duration, "N/A");
        assert_eq!(map(json!({"endDate": "2025-01-01"})).duration, "N/A");
        let view = map(json!({"startDate": null, "endDate": "2025-01-01"}));
        assert_eq!(view.duration, "N/A");
        assert_eq!(view.start_date, "N/A");
    }

    #[test]
    fn partial_days_round_up() {
        let cases = [
            ("2025-03-01T00:00:00Z", "2025-03-01T00:00:00Z", "0 days"),
            ("2025-03-01T00:00:00Z", "2025-03-01T00:00:00.001Z", "1 days"),
            ("2025-03-01T00:00:00Z", "2025-03-02T01:00:00Z", "2 days"),
            ("2025-03-01T10:00:00+05:30", "2025-03-08T10:00:00+05:30", "7 days"),
            ("2025-03-01", "2025-03-31T00:00:00.000", "30 days"),
        ];
        for (start, end, expected) in cases {
            let view = map(json!({"startDate": start, "endDate": end}));
            assert_eq!(view.duration, expected, "{start} -> {end}");
        }
    }

    #[test]
    fn never_negative() {
        let view = map(json!({"startDate": "2025-01-04", "endDate": "2025-01-01"}));
        assert_eq!(view.duration, defaults::DURATION);
        let view = map(json!({"startDate": "soon", "endDate": "2025-01-01"}));
        assert_eq!(view.duration, defaults::DURATION);
        assert_eq!(view.start_date, defaults::DATE);
    }

    #[test]
    fn guide_fields() {
        let view = map(json!({
            "_id": "b1",
            "guideId": {"name": "Ravi", "email": "ravi@example.com", "languages": ["Hindi", "English"]},
            "status": "confirmed",
            "paymentStatus": "partial",
            "budget": "1200",
            "totalPaid": 400,
            "remainingBalance": 800,
            "activities": ["Trek", {"name": "Rafting"}, {"title": "Camp"}, 7]
        }));
        assert_eq!(view.id, "b1");
        assert_eq!(view.guide_name, "Ravi");
        assert_eq!(view.guide_phone, defaults::GUIDE_CONTACT);
        assert_eq!(view.guide_languages, "Hindi, English");
        assert_eq!(view.budget, 1200.0);
        assert_eq!(view.remaining_balance, 800.0);
        assert_eq!(view.activities, vec!["Trek", "Rafting", "Camp", "7"]);
    }

    #[test]
    fn everything_defaults() {
        for value in [json!({}), json!("b1"), json!({"guide": "g1", "budget": {}})] {
            let view = map(value);
            assert_eq!(view.guide_name, defaults::GUIDE_NAME);
            assert_eq!(view.guide_languages, defaults::LANGUAGES);
            assert_eq!(view.budget, 0.0);
            assert_eq!(view.remaining_balance, 0.0);
            assert_eq!(view.status, defaults::STATUS);
            assert_eq!(view.duration, defaults::DURATION);
            assert!(view.activities.is_empty());
        }
    }

    #[test]
    fn server_error_is_reported() {
        let res = ApiResponse::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"message": "Bookings are unavailable"}),
        );
        let err = bookings_from_response(res).unwrap_err();
        assert_eq!(err.to_string(), "Bookings are unavailable");

        let res = ApiResponse::new(StatusCode::INTERNAL_SERVER_ERROR, Value::Null);
        assert_eq!(
            bookings_from_response(res).unwrap_err().to_string(),
            FETCH_FAILED
        );
    }

    #[test]
    fn list_or_wrapped() {
        let res = ApiResponse::new(StatusCode::OK, json!({"bookings": [{"_id": "a"}, {"_id": "b"}]}));
        let views = bookings_from_response(res).unwrap();
        assert_eq!(views.len(), 2);
        assert_eq!(views[1].id, "b");
    }

    #[test]
    fn new_booking_validation() {
        let mut booking = NewBooking {
            guide_id: "g1".into(),
            start_date: NaiveDate::from_ymd_opt(2025, 1, 4).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            budget: 100.0,
            activities: vec![],
            notes: None,
        };
        assert!(matches!(booking.validate(), Err(ApiError::Invalid(_))));
        booking.end_date = NaiveDate::from_ymd_opt(2025, 1, 5).unwrap();
        assert!(booking.validate().is_ok());
        let body = serde_json::to_value(&booking).unwrap();
        assert_eq!(body["guideId"], "g1");
        assert_eq!(body["startDate"], "2025-01-04");
        assert!(body.get("notes").is_none());
    }
}
