//! Typed view over the key/value map a parser extracts from a document.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Fields the allocator understands. Anything else a parser returns is kept in `extra`
/// and round-trips untouched through staff edits.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ParsedFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    /// Numbers or numeric strings; parsed defensively by the allocator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vat_amount: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<Value>,
    /// Staff override: allocate to this company without matching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<Uuid>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ParsedFields {
    /// Deserialize, tolerating fields with an unexpected shape: numeric identifiers are
    /// rendered as strings and a non-UUID `company_id` is dropped.
    pub fn from_value_lossy(value: Value) -> Self {
        match serde_json::from_value::<ParsedFields>(value.clone()) {
            Ok(fields) => fields,
            Err(_) => {
                let mut extra = match value {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                let mut text = |key: &str| {
                    extra.remove(key).and_then(|v| match v {
                        Value::String(s) => Some(s),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                };
                let document_type = text("document_type");
                let account_number = text("account_number");
                let document_number = text("document_number");
                let date = text("date");
                let due_date = text("due_date");
                extra.remove("company_id");
                ParsedFields {
                    document_type,
                    account_number,
                    document_number,
                    date,
                    due_date,
                    amount: extra.remove("amount"),
                    vat_amount: extra.remove("vat_amount"),
                    total_amount: extra.remove("total_amount"),
                    company_id: None,
                    extra,
                }
            }
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Object(Map::new()))
    }

    /// Account number with surrounding whitespace removed; blank counts as absent.
    pub fn account_number(&self) -> Option<&str> {
        self.account_number
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn document_number(&self) -> Option<&str> {
        self.document_number
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}
