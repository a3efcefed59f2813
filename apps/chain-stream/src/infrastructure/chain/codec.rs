//! Chain Codec
//!
//! Turns upstream JSON into [`Snapshot`]s.
//!
//! Upstreams disagree on field names, so every logical field has a list of
//! accepted synonyms. The first synonym carrying a number wins; a field with
//! no usable synonym reads as zero.
//!
//! # Poll body
//!
//! ```json
//! {"underlying":"ETH","expiry":"7D","chain":[{"k":2700,"callBid":10,"ivC":0.5}]}
//! ```
//!
//! # Push frame
//!
//! Any JSON object with a `rows` array is accepted:
//!
//! ```json
//! {"symbol":"BTC","rows":[{"strike":60000,"callBid":900,"callAsk":920}]}
//! ```

use serde_json::{Map, Value};

use crate::domain::snapshot::{QuoteRow, Snapshot};

/// Maximum number of rows kept from a poll response.
pub const MAX_POLL_ROWS: usize = 20;

const UNDERLYING_KEYS: &[&str] = &["underlying", "symbol", "instrumentKey", "instrument"];
const PUSH_INSTRUMENT_KEYS: &[&str] = &["instrumentKey", "symbol", "underlying"];
const EXPIRY_KEYS: &[&str] = &["expiry", "expiryLabel", "expiration", "exp"];
const ROW_ARRAY_KEYS: &[&str] = &["chain", "rows", "quotes", "data"];

const STRIKE_KEYS: &[&str] = &["strike", "k", "K"];
const CALL_BID_KEYS: &[&str] = &["callBid", "call_bid", "cBid", "cb"];
const CALL_ASK_KEYS: &[&str] = &["callAsk", "call_ask", "cAsk", "ca"];
const PUT_BID_KEYS: &[&str] = &["putBid", "put_bid", "pBid", "pb"];
const PUT_ASK_KEYS: &[&str] = &["putAsk", "put_ask", "pAsk", "pa"];
const CALL_IV_KEYS: &[&str] = &["callIV", "callIv", "call_iv", "ivC"];
const PUT_IV_KEYS: &[&str] = &["putIV", "putIv", "put_iv", "ivP"];

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Payload is not valid JSON.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload is JSON but not an object.
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// No quote array under any accepted key.
    #[error("missing quote array")]
    MissingRows,

    /// A quote array entry is not an object.
    #[error("quote row {0} is not an object")]
    InvalidRow(usize),
}

/// Normalize a poll response body into a live snapshot.
///
/// `requested_key` is used when the body does not name its underlying.
///
/// # Errors
///
/// Returns an error when the body is not an object, carries no quote array,
/// or contains a quote entry that is not an object.
pub fn normalize_poll_body(body: &Value, requested_key: &str) -> Result<Snapshot, CodecError> {
    let obj = as_object(body)?;

    let rows_value = first_present(obj, ROW_ARRAY_KEYS).ok_or(CodecError::MissingRows)?;
    let rows = normalize_rows(rows_value, Some(MAX_POLL_ROWS))?;

    let instrument = first_string(obj, UNDERLYING_KEYS).unwrap_or_else(|| requested_key.to_string());

    Ok(Snapshot::live(instrument, first_string(obj, EXPIRY_KEYS), rows))
}

/// Parse a push text frame into a live snapshot.
///
/// # Errors
///
/// Returns an error when the frame is not JSON, not an object, has no
/// `rows` array, or has a row that is not an object.
pub fn parse_push_frame(text: &str, subscribed_key: &str) -> Result<Snapshot, CodecError> {
    let value: Value = serde_json::from_str(text)?;
    let obj = as_object(&value)?;

    let rows_value = obj.get("rows").ok_or(CodecError::MissingRows)?;
    let rows = normalize_rows(rows_value, None)?;

    let instrument =
        first_string(obj, PUSH_INSTRUMENT_KEYS).unwrap_or_else(|| subscribed_key.to_string());

    Ok(Snapshot::live(instrument, first_string(obj, EXPIRY_KEYS), rows))
}

/// Normalize a single quote object.
#[must_use]
pub fn normalize_row(row: &Map<String, Value>) -> QuoteRow {
    QuoteRow {
        strike: first_number(row, STRIKE_KEYS),
        call_bid: first_number(row, CALL_BID_KEYS),
        call_ask: first_number(row, CALL_ASK_KEYS),
        put_bid: first_number(row, PUT_BID_KEYS),
        put_ask: first_number(row, PUT_ASK_KEYS),
        call_iv: first_number(row, CALL_IV_KEYS),
        put_iv: first_number(row, PUT_IV_KEYS),
    }
}

fn normalize_rows(value: &Value, cap: Option<usize>) -> Result<Vec<QuoteRow>, CodecError> {
    let entries = value.as_array().ok_or(CodecError::MissingRows)?;
    let take = cap.unwrap_or(entries.len());

    entries
        .iter()
        .take(take)
        .enumerate()
        .map(|(i, entry)| {
            entry
                .as_object()
                .map(normalize_row)
                .ok_or(CodecError::InvalidRow(i))
        })
        .collect()
}

fn as_object(value: &Value) -> Result<&Map<String, Value>, CodecError> {
    value.as_object().ok_or(CodecError::NotAnObject(kind_of(value)))
}

const fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn first_present<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k))
}

fn first_string(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn first_number(obj: &Map<String, Value>, keys: &[&str]) -> f64 {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(as_number))
        .unwrap_or(0.0)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
