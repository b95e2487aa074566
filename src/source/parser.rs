//! Tolerant block payload parser.
//!
//! Sources disagree on envelope and field naming, so extraction is driven
//! by ordered rule tables: for each logical field the first candidate key
//! that is present and normalizes to a non-negative integer wins.
//!
//! Numeric values may arrive as JSON numbers, decimal strings or
//! `0x`-prefixed hex strings.

use serde_json::Value;

use crate::source::SourceError;
use crate::storage::Block;

/// Envelope keys checked, in order, before falling back to the top level.
pub const WRAPPER_KEYS: &[&str] = &["block", "result", "data"];

/// Keys whose presence marks an unwrapped top-level block.
pub const TOP_LEVEL_MARKERS: &[&str] = &["number", "blockNumber"];

/// How a candidate key's value becomes an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extractor {
    /// Number, decimal string or hex string.
    Numeric,
    /// Length of a JSON array.
    ArrayLen,
}

/// One candidate key for a logical field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    pub key: &'static str,
    pub extractor: Extractor,
}

impl FieldRule {
    const fn numeric(key: &'static str) -> Self {
        Self {
            key,
            extractor: Extractor::Numeric,
        }
    }

    const fn array_len(key: &'static str) -> Self {
        Self {
            key,
            extractor: Extractor::ArrayLen,
        }
    }

    /// Apply this rule to a block object.
    pub fn extract(&self, block: &Value) -> Option<i64> {
        let value = block.get(self.key).filter(|v| !is_absent(v))?;
        match self.extractor {
            Extractor::Numeric => normalize_integer(value),
            Extractor::ArrayLen => value.as_array().and_then(|a| i64::try_from(a.len()).ok()),
        }
    }
}

pub const BLOCK_NUMBER_RULES: &[FieldRule] = &[
    FieldRule::numeric("number"),
    FieldRule::numeric("blockNumber"),
    FieldRule::numeric("height"),
];

pub const TIMESTAMP_RULES: &[FieldRule] =
    &[FieldRule::numeric("timestamp"), FieldRule::numeric("time")];

pub const TRANSACTION_COUNT_RULES: &[FieldRule] = &[
    FieldRule::numeric("transactionCount"),
    FieldRule::numeric("txCount"),
    FieldRule::array_len("transactions"),
];

pub const GAS_USED_RULES: &[FieldRule] = &[
    FieldRule::numeric("gasUsed"),
    FieldRule::numeric("gas"),
    FieldRule::numeric("gasLimit"),
];

/// First rule in `rules` that yields a value.
pub fn extract_field(block: &Value, rules: &[FieldRule]) -> Option<i64> {
    rules.iter().find_map(|rule| rule.extract(block))
}

/// Locate the block object inside a response payload.
pub fn locate_block(payload: &Value) -> Option<&Value> {
    WRAPPER_KEYS
        .iter()
        .filter_map(|key| payload.get(*key))
        .find(|v| v.is_object())
        .or_else(|| {
            TOP_LEVEL_MARKERS
                .iter()
                .any(|key| payload.get(*key).is_some_and(|v| !is_absent(v)))
                .then_some(payload)
        })
}

/// Parse a source payload into a candidate [`Block`].
///
/// `now_secs` is used when the payload carries no timestamp.
///
/// # Errors
/// Returns [`SourceError::Parse`] when no block object can be located or
/// no block-number candidate normalizes.
pub fn parse_block(payload: &Value, now_secs: i64) -> Result<Block, SourceError> {
    let block = locate_block(payload).ok_or_else(|| {
        let keys = payload
            .as_object()
            .map(|o| o.keys().cloned().collect::<Vec<_>>().join(", "))
            .unwrap_or_default();
        SourceError::Parse(format!("unknown response structure (keys: [{keys}])"))
    })?;

    let block_number = extract_field(block, BLOCK_NUMBER_RULES)
        .ok_or_else(|| SourceError::Parse("no block number found in response".to_string()))?;

    Ok(Block::new(
        block_number,
        extract_field(block, TIMESTAMP_RULES).unwrap_or(now_secs),
        extract_field(block, TRANSACTION_COUNT_RULES).unwrap_or(0),
        extract_field(block, GAS_USED_RULES).unwrap_or(0),
    ))
}

/// Normalize a JSON number, decimal string or hex string to an integer.
///
/// Negative, fractional and out-of-range values yield `None`.
pub fn normalize_integer(value: &Value) -> Option<i64> {
    let unsigned = match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) if is_digits(hex, 16) => u64::from_str_radix(hex, 16).ok(),
                None if is_digits(s, 10) => s.parse::<u64>().ok(),
                _ => None,
            }
        }
        _ => None,
    }?;
    i64::try_from(unsigned).ok()
}

/// Non-empty and made only of digits in `radix`; rejects a leading sign.
fn is_digits(s: &str, radix: u32) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_digit(radix))
}

/// Values treated as "not supplied" when walking candidate keys.
fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        _ => false,
    }
}
