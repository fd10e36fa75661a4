//! Numeric coercion for field values and table cells.
//!
//! Precedence for a document field: a native numeric attribute, then `valueString`, then
//! the raw text as a currency cell. The first attempt that yields a finite number wins.

use crate::models::RawField;
use regex::Regex;
use std::sync::OnceLock;

/// The input held no usable number. Callers treat the value as absent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no numeric value in {input:?}")]
pub struct NonNumeric {
    pub input: String,
}

impl NonNumeric {
    fn new(input: &str) -> Self {
        Self {
            input: input.to_string(),
        }
    }
}

fn number_pattern() -> &'static Regex {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    NUMBER.get_or_init(|| Regex::new(r"[\d,]+\.?\d*").expect("number regex"))
}

fn finite(value: f64, input: &str) -> Result<f64, NonNumeric> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(NonNumeric::new(input))
    }
}

/// Step 1: a typed number already present on the field (`valueNumber`, the currency
/// amount, or `valueInteger`).
pub fn from_native(field: &RawField) -> Option<f64> {
    field
        .value_number
        .or_else(|| field.value_currency.as_ref().and_then(|c| c.amount))
        .or(field.value_integer.map(|n| n as f64))
        .filter(|n| n.is_finite())
}

/// Step 2: drop thousands separators, then take the first run of digits (with an optional
/// fractional part) anywhere in the string.
pub fn from_value_string(s: &str) -> Result<f64, NonNumeric> {
    let stripped = s.replace(',', "");
    let found = number_pattern()
        .find(&stripped)
        .ok_or_else(|| NonNumeric::new(s))?;
    let parsed = found
        .as_str()
        .parse::<f64>()
        .map_err(|_| NonNumeric::new(s))?;
    finite(parsed, s)
}

/// Step 3: currency-formatted cell text such as `"$1,234.50"`. Only `$` and `,` are
/// removed; anything else left over makes the parse fail.
pub fn from_cell_text(s: &str) -> Result<f64, NonNumeric> {
    let cleaned = s.replace(['$', ','], "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Err(NonNumeric::new(s));
    }
    let parsed = cleaned.parse::<f64>().map_err(|_| NonNumeric::new(s))?;
    finite(parsed, s)
}

/// Run all three steps against a document field.
pub fn coerce_field(field: &RawField) -> Result<f64, NonNumeric> {
    if let Some(n) = from_native(field) {
        return Ok(n);
    }
    if let Some(s) = field.value_string.as_deref().filter(|s| !s.trim().is_empty()) {
        if let Ok(n) = from_value_string(s) {
            return Ok(n);
        }
    }
    let content = field.content.as_deref().unwrap_or("");
    from_cell_text(content)
}
