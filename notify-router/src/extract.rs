//! Field extraction from inbound notifications.
//!
//! Every extracted field is described by an ordered list of candidate
//! [`FieldPath`]s. The first candidate that satisfies the field's acceptance
//! rule wins, so deployment variants differ only in their path lists.

use crate::decision::DecisionRequest;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

pub const DEFAULT_CURRENCY: &str = "USD";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FieldPathError {
    #[error("Field path cannot be empty")]
    Empty,

    #[error("Field path contains an empty segment: {0}")]
    EmptySegment(String),
}

/// Dotted path into a JSON document, e.g. `order.checkout_params.cid`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn parse(path: &str) -> Result<Self, FieldPathError> {
        if path.is_empty() {
            return Err(FieldPathError::Empty);
        }
        if path.split('.').any(str::is_empty) {
            return Err(FieldPathError::EmptySegment(path.to_string()));
        }
        Ok(Self::split(path))
    }

    fn split(path: &str) -> Self {
        FieldPath(path.split('.').map(String::from).collect())
    }

    /// Walks nested objects; anything that is not an object along the way resolves to `None`.
    pub fn resolve<'a>(&self, payload: &'a Value) -> Option<&'a Value> {
        self.0
            .iter()
            .try_fold(payload, |current, segment| current.as_object()?.get(segment))
    }
}

impl TryFrom<String> for FieldPath {
    type Error = FieldPathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        FieldPath::parse(&value)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// Candidate locations for each field the relay extracts.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ExtractionProfile {
    pub order_id: Vec<FieldPath>,
    #[serde(default)]
    pub amount: Vec<FieldPath>,
    #[serde(default)]
    pub currency: Vec<FieldPath>,
    pub tracking_token: Vec<FieldPath>,
    #[serde(default)]
    pub affiliate_id: Vec<FieldPath>,
    #[serde(default)]
    pub sub_id: Vec<FieldPath>,
}

fn paths(raw: &[&str]) -> Vec<FieldPath> {
    raw.iter().map(|p| FieldPath::split(p)).collect()
}

impl ExtractionProfile {
    /// Click id integration: `cid` tokens plus affiliate and sub identifiers.
    pub fn cid() -> Self {
        Self {
            order_id: paths(&["order.id", "order.order_id"]),
            amount: paths(&["order.total_price"]),
            currency: paths(&["order.currency"]),
            tracking_token: paths(&[
                "order.cid",
                "order.CID",
                "order.checkout_params.cid",
                "order.custom_attributes.cid",
            ]),
            affiliate_id: paths(&["order.checkout_params.affid", "order.affid"]),
            sub_id: paths(&["order.checkout_params.sub1", "order.sub1"]),
        }
    }

    /// Referral token integration: `ref_token` or `evclid` tokens, no affiliate fields.
    pub fn ref_token() -> Self {
        Self {
            order_id: paths(&["order.id", "order.order_id"]),
            amount: paths(&["order.total_price"]),
            currency: paths(&["order.currency"]),
            tracking_token: paths(&[
                "order.ref_token",
                "order.REF_TOKEN",
                "order.checkout_params.ref_token",
                "order.custom_attributes.ref_token",
                "order.evclid",
                "order.checkout_params.evclid",
                "order.custom_attributes.evclid",
            ]),
            affiliate_id: Vec::new(),
            sub_id: Vec::new(),
        }
    }

    pub fn extract(&self, payload: &Value) -> ExtractedFields {
        ExtractedFields {
            order_id: first_match(payload, &self.order_id, is_truthy).cloned(),
            amount: first_match(payload, &self.amount, |v| !v.is_null()).and_then(parse_amount),
            currency: first_match(payload, &self.currency, is_truthy)
                .cloned()
                .unwrap_or_else(|| Value::from(DEFAULT_CURRENCY)),
            tracking_token: first_non_empty_string(payload, &self.tracking_token)
                .map(String::from),
            affiliate_id: first_truthy_or_last(payload, &self.affiliate_id).cloned(),
            sub_id: first_truthy_or_last(payload, &self.sub_id).cloned(),
        }
    }
}

/// Fields pulled out of one notification. Missing values stay `None`.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractedFields {
    pub order_id: Option<Value>,
    pub amount: Option<f64>,
    pub currency: Value,
    pub tracking_token: Option<String>,
    pub affiliate_id: Option<Value>,
    pub sub_id: Option<Value>,
}

impl ExtractedFields {
    /// Builds the decision request, or `None` when a required field is missing.
    pub fn decision_request(&self) -> Option<DecisionRequest> {
        Some(DecisionRequest {
            order_id: self.order_id.clone()?,
            amount: self.amount,
            currency: self.currency.clone(),
            tracking_token: self.tracking_token.clone()?,
            affiliate_id: self.affiliate_id.clone(),
            sub_id: self.sub_id.clone(),
        })
    }
}

fn first_match<'a>(
    payload: &'a Value,
    candidates: &[FieldPath],
    accept: impl Fn(&Value) -> bool,
) -> Option<&'a Value> {
    candidates
        .iter()
        .filter_map(|path| path.resolve(payload))
        .find(|value| accept(value))
}

/// Returns the first candidate holding a string that is not blank after trimming.
pub fn first_non_empty_string<'a>(
    payload: &'a Value,
    candidates: &[FieldPath],
) -> Option<&'a str> {
    first_match(payload, candidates, |v| {
        v.as_str().is_some_and(|s| !s.trim().is_empty())
    })
    .and_then(Value::as_str)
}

/// First truthy candidate, otherwise whatever the last candidate holds.
fn first_truthy_or_last<'a>(payload: &'a Value, candidates: &[FieldPath]) -> Option<&'a Value> {
    first_match(payload, candidates, is_truthy)
        .or_else(|| candidates.last().and_then(|path| path.resolve(payload)))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Lenient amount parsing: numbers pass through, strings use their longest numeric prefix.
pub fn parse_amount(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_float_prefix(s),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

/// Single pass over `[sign] digits [. digits] [e [sign] digits]`; the exponent
/// only counts when at least one digit follows it.
fn parse_float_prefix(raw: &str) -> Option<f64> {
    let trimmed = raw.trim_start();
    let bytes = trimmed.as_bytes();
    let digits_from = |from: usize| {
        bytes[from..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count()
    };

    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let int_digits = digits_from(end);
    end += int_digits;

    let mut frac_digits = 0;
    if bytes.get(end) == Some(&b'.') {
        frac_digits = digits_from(end + 1);
        if int_digits + frac_digits > 0 {
            end += 1 + frac_digits;
        }
    }
    if int_digits + frac_digits == 0 {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let sign = usize::from(matches!(bytes.get(end + 1), Some(b'+' | b'-')));
        let exp_digits = digits_from(end + 1 + sign);
        if exp_digits > 0 {
            end += 1 + sign + exp_digits;
        }
    }

    trimmed[..end].parse().ok()
}
