//! JSON contract of the upstream provider API (`POST <url>`, form chosen by `action`)
//!
//! Providers are loose about number encoding: ids and counters arrive as
//! numbers, numeric strings or null. Decoding accepts all three.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::core_types::ProviderOrderId;

#[derive(Debug, Serialize)]
pub struct AddRequest<'a> {
    pub key: &'a str,
    pub action: &'static str,
    pub service: String,
    pub link: &'a str,
    pub quantity: i64,
}

#[derive(Debug, Serialize)]
pub struct OrdersRequest<'a> {
    pub key: &'a str,
    pub action: &'static str,
    /// Comma-joined provider order ids
    pub orders: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct AddResponse {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub order: i64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One element of a bulk status reply
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct StatusEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: String,
    #[serde(default, deserialize_with = "lenient_i64", alias = "start_count")]
    pub start_counter: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub remains: i64,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub charge: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub order: ProviderOrderId,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub error: Option<String>,
}

/// Bulk status reply: a list, a map keyed by order id, or a request-level error
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OrdersResponse {
    List(Vec<StatusEntry>),
    Failure { error: String },
    Map(HashMap<String, StatusEntry>),
}

impl OrdersResponse {
    /// Flatten into entries; map keys fill in a missing `order`.
    pub fn into_entries(self) -> Result<Vec<StatusEntry>, String> {
        match self {
            OrdersResponse::List(entries) => Ok(entries),
            OrdersResponse::Failure { error } => Err(error),
            OrdersResponse::Map(map) => Ok(map
                .into_iter()
                .map(|(key, mut entry)| {
                    if entry.order == 0 {
                        entry.order = key.trim().parse().unwrap_or(0);
                    }
                    entry
                })
                .collect()),
        }
    }
}

pub(crate) fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
                .unwrap_or(0)
        }
        _ => 0,
    })
}

pub(crate) fn lenient_opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(lenient_opt_string(d)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_list_with_string_numbers() {
        let body = r#"[
            {"status":"In progress","start_counter":"120","remains":"30","charge":"0.25","order":42},
            {"order":"43","error":"Incorrect order ID"}
        ]"#;
        let entries = serde_json::from_str::<OrdersResponse>(body)
            .unwrap()
            .into_entries()
            .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].order, 42);
        assert_eq!(entries[0].start_counter, 120);
        assert_eq!(entries[0].remains, 30);
        assert_eq!(entries[0].charge.as_deref(), Some("0.25"));
        assert!(entries[0].error.is_none());
        assert_eq!(entries[1].order, 43);
        assert_eq!(entries[1].error.as_deref(), Some("Incorrect order ID"));
    }

    #[test]
    fn test_status_map_keyed_by_id() {
        let body = r#"{"42":{"status":"Completed","remains":0,"start_count":10}}"#;
        let entries = serde_json::from_str::<OrdersResponse>(body)
            .unwrap()
            .into_entries()
            .unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].order, 42);
        assert_eq!(entries[0].start_counter, 10);
        assert_eq!(entries[0].status, "Completed");
    }

    #[test]
    fn test_request_level_error() {
        let body = r#"{"error":"Invalid API key"}"#;
        let result = serde_json::from_str::<OrdersResponse>(body)
            .unwrap()
            .into_entries();
        assert_eq!(result.unwrap_err(), "Invalid API key");
    }

    #[test]
    fn test_add_response_variants() {
        let ok: AddResponse = serde_json::from_str(r#"{"order":"9001"}"#).unwrap();
        assert_eq!(ok.order, 9001);
        assert!(ok.error.is_none());

        let err: AddResponse = serde_json::from_str(r#"{"error":"Not enough funds on balance"}"#).unwrap();
        assert_eq!(err.order, 0);
        assert_eq!(err.error.as_deref(), Some("Not enough funds on balance"));
    }

    #[test]
    fn test_add_request_shape() {
        let req = AddRequest {
            key: "k",
            action: "add",
            service: "77".into(),
            link: "https://x",
            quantity: 1000,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["action"], "add");
        assert_eq!(json["service"], "77");
        assert_eq!(json["quantity"], 1000);
    }
}
