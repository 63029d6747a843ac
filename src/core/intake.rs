//! Normalization and validation of inbound reward requests.

use crate::core::error::{PostingError, ValidationError};
use crate::core::model::{DEFAULT_REWARD_SOURCE, UserId};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use uuid::Uuid;

/// Reward request as received, before any checks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRewardRequest {
    pub user_id: Option<String>,
    pub stock_symbol: Option<String>,
    /// Accepts JSON numbers and numeric strings.
    pub quantity: Option<serde_json::Value>,
    pub rewarded_at: Option<String>,
    pub source: Option<String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedReward {
    pub user_id: String,
    pub stock_symbol: String,
    pub quantity: Decimal,
    pub rewarded_at: DateTime<Utc>,
    pub source: String,
    pub idempotency_key: Option<String>,
}

impl NormalizedReward {
    pub fn user_uuid(&self) -> Result<UserId, PostingError> {
        Uuid::parse_str(&self.user_id)
            .map_err(|_| PostingError::InvalidUserId(self.user_id.clone()))
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_quantity(value: &serde_json::Value) -> Result<Decimal, &'static str> {
    let parsed = match value {
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string())),
        serde_json::Value::String(s) => {
            Decimal::from_str(s.trim()).or_else(|_| Decimal::from_scientific(s.trim()))
        }
        _ => return Err("quantity must be numeric"),
    };
    let quantity = parsed.map_err(|_| "quantity must be numeric")?;
    if quantity <= Decimal::ZERO {
        return Err("quantity must be > 0");
    }
    Ok(quantity)
}

/// Accepts RFC 3339, a naive `YYYY-MM-DD HH:MM:SS` (or `T` separated) local time,
/// or a bare local date meaning its midnight.
pub fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|ts| ts.with_timezone(&Utc));
        }
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|ts| ts.with_timezone(&Utc))
}

/// Checks every field and returns either the normalized request or all violations.
pub fn validate(raw: &RawRewardRequest) -> Result<NormalizedReward, ValidationError> {
    let mut messages = Vec::new();

    let user_id = non_blank(&raw.user_id);
    if user_id.is_none() {
        messages.push("user_id is required".to_string());
    }

    let stock_symbol = non_blank(&raw.stock_symbol);
    if stock_symbol.is_none() {
        messages.push("stock_symbol is required".to_string());
    }

    let quantity = match &raw.quantity {
        None | Some(serde_json::Value::Null) => {
            messages.push("quantity is required".to_string());
            None
        }
        Some(value) => match parse_quantity(value) {
            Ok(q) => Some(q),
            Err(msg) => {
                messages.push(msg.to_string());
                None
            }
        },
    };

    let rewarded_at = match non_blank(&raw.rewarded_at) {
        None => {
            messages.push("rewarded_at is required".to_string());
            None
        }
        Some(value) => {
            let parsed = parse_timestamp(value);
            if parsed.is_none() {
                messages.push("rewarded_at must be a valid timestamp".to_string());
            }
            parsed
        }
    };

    match (user_id, stock_symbol, quantity, rewarded_at) {
        (Some(user_id), Some(stock_symbol), Some(quantity), Some(rewarded_at))
            if messages.is_empty() =>
        {
            Ok(NormalizedReward {
                user_id: user_id.to_string(),
                stock_symbol: stock_symbol.to_string(),
                quantity,
                rewarded_at,
                source: non_blank(&raw.source)
                    .unwrap_or(DEFAULT_REWARD_SOURCE)
                    .to_string(),
                idempotency_key: non_blank(&raw.idempotency_key).map(str::to_string),
            })
        }
        _ => Err(ValidationError { messages }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> RawRewardRequest {
        RawRewardRequest {
            user_id: Some("6f1c2a8e-8d1e-4c39-9f43-1b1f9a3a0c11".to_string()),
            stock_symbol: Some("TCS.NS".to_string()),
            quantity: Some(json!(2)),
            rewarded_at: Some("2026-10-01T10:00:00Z".to_string()),
            source: None,
            idempotency_key: Some("  ".to_string()),
        }
    }

    #[test]
    fn test_valid_request_is_normalized() {
        let normalized = validate(&request()).unwrap();
        assert_eq!(normalized.quantity, Decimal::from(2));
        assert_eq!(normalized.stock_symbol, "TCS.NS");
        assert_eq!(normalized.source, DEFAULT_REWARD_SOURCE);
        assert_eq!(normalized.idempotency_key, None);
        assert_eq!(
            normalized.rewarded_at,
            DateTime::parse_from_rfc3339("2026-10-01T10:00:00Z").unwrap()
        );
    }

    #[test]
    fn test_all_violations_are_collected() {
        let err = validate(&RawRewardRequest::default()).unwrap_err();
        assert_eq!(
            err.messages,
            vec![
                "user_id is required",
                "stock_symbol is required",
                "quantity is required",
                "rewarded_at is required",
            ]
        );
    }

    #[test]
    fn test_quantity_rules() {
        let mut raw = request();
        raw.quantity = Some(json!("abc"));
        assert_eq!(
            validate(&raw).unwrap_err().messages,
            vec!["quantity must be numeric"]
        );

        raw.quantity = Some(json!(0));
        assert_eq!(
            validate(&raw).unwrap_err().messages,
            vec!["quantity must be > 0"]
        );

        raw.quantity = Some(json!(-3.5));
        assert_eq!(
            validate(&raw).unwrap_err().messages,
            vec!["quantity must be > 0"]
        );

        raw.quantity = Some(json!(true));
        assert!(validate(&raw).is_err());

        raw.quantity = Some(json!("1.25"));
        assert_eq!(validate(&raw).unwrap().quantity, Decimal::new(125, 2));
    }

    #[test]
    fn test_unparseable_timestamp_reported_with_other_errors() {
        let mut raw = request();
        raw.rewarded_at = Some("yesterday-ish".to_string());
        raw.stock_symbol = None;
        let err = validate(&raw).unwrap_err();
        assert_eq!(
            err.messages,
            vec!["stock_symbol is required", "rewarded_at must be a valid timestamp"]
        );
    }

    #[test]
    fn test_timestamp_formats() {
        assert!(parse_timestamp("2026-10-01").is_some());
        assert!(parse_timestamp("2026-10-01 09:30:00").is_some());
        assert!(parse_timestamp("2026-10-01T09:30:00+05:30").is_some());
        assert!(parse_timestamp("01/10/2026").is_none());
    }

    #[test]
    fn test_malformed_user_id_is_separate_from_validation() {
        let mut raw = request();
        raw.user_id = Some("not-a-uuid".to_string());
        let normalized = validate(&raw).unwrap();
        let err = normalized.user_uuid().unwrap_err();
        assert!(matches!(err, PostingError::InvalidUserId(_)));
    }
}
