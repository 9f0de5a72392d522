//! Upload schema validation
//!
//! An uploaded distribution is either an array of bucket objects or a wrapper
//! object carrying that array under a conventional key. Every bucket object
//! has exactly `score` (integer in `[0, 720]`) and `count` (integer `>= 0`);
//! numeric strings are accepted for both. Wrapper objects may only add
//! `year`, `category` and an explicit total.
//!
//! Validation never stops at the first problem: every violation is reported.

use serde_json::{Map, Value};

use crate::error::SchemaViolation;
use crate::model::{Category, MAX_SCORE, MIN_SCORE};
use crate::normalize::{coerce_count, coerce_number, TOTAL_KEYS, WRAPPER_KEYS};
use crate::{Error, Result};

const BUCKET_PROPERTIES: [&str; 2] = ["score", "count"];

/// Metadata a validated upload declared about itself
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UploadEnvelope {
    /// Wrapper key the buckets were found under (`None` for a bare array)
    pub list_key: Option<&'static str>,
    pub year: Option<i32>,
    pub category: Option<Category>,
    pub explicit_total: Option<u64>,
    pub bucket_count: usize,
    pub bucket_sum: u64,
}

/// Validate an upload against the bucket schema.
///
/// `target_year` must match a `year` the wrapper declares; `target_category`,
/// when given, must match a declared `category`.
pub fn validate_upload(
    payload: &Value,
    target_year: i32,
    target_category: Option<&Category>,
) -> Result<UploadEnvelope> {
    let mut violations = Vec::new();
    let mut envelope = UploadEnvelope::default();

    match payload {
        Value::Array(entries) => {
            check_buckets(entries, "", &mut envelope, &mut violations);
        }
        Value::Object(wrapper) => {
            check_wrapper(wrapper, target_year, target_category, &mut envelope, &mut violations);
        }
        _ => violations.push(SchemaViolation::new(
            "",
            "must be an array of buckets or an object wrapping one",
        )),
    }

    if violations.is_empty() {
        Ok(envelope)
    } else {
        Err(Error::SchemaValidation(violations))
    }
}

fn check_wrapper(
    wrapper: &Map<String, Value>,
    target_year: i32,
    target_category: Option<&Category>,
    envelope: &mut UploadEnvelope,
    violations: &mut Vec<SchemaViolation>,
) {
    let list_key = WRAPPER_KEYS.into_iter().find(|k| wrapper.contains_key(*k));
    envelope.list_key = list_key;

    match list_key.and_then(|k| wrapper.get(k).map(|v| (k, v))) {
        Some((key, Value::Array(entries))) => {
            check_buckets(entries, &format!("/{}", key), envelope, violations);
        }
        Some((key, _)) => {
            violations.push(SchemaViolation::new(format!("/{}", key), "must be an array"));
        }
        None => violations.push(SchemaViolation::new(
            "",
            format!("missing bucket list (expected one of: {})", WRAPPER_KEYS.join(", ")),
        )),
    }

    let total_key = TOTAL_KEYS.into_iter().find(|k| wrapper.contains_key(*k));

    for (key, value) in wrapper {
        let path = format!("/{}", pointer_escape(key));
        match key.as_str() {
            k if Some(k) == list_key => {}
            k if Some(k) == total_key => {
                match coerce_count(value) {
                    Some(total) if total >= envelope.bucket_sum => {
                        envelope.explicit_total = Some(total);
                    }
                    Some(total) => violations.push(SchemaViolation::new(
                        path,
                        format!(
                            "total {} is less than the sum of bucket counts {}",
                            total, envelope.bucket_sum
                        ),
                    )),
                    None => violations.push(SchemaViolation::new(
                        path,
                        "must be a non-negative integer",
                    )),
                }
            }
            "year" => match coerce_number(value) {
                Some(year) if year.fract() == 0.0 && year == f64::from(target_year) => {
                    envelope.year = Some(target_year);
                }
                Some(_) => violations.push(SchemaViolation::new(
                    path,
                    format!("must match the target year {}", target_year),
                )),
                None => violations.push(SchemaViolation::new(path, "must be an integer year")),
            },
            "category" => match value.as_str().map(Category::parse) {
                Some(Ok(declared)) => {
                    if target_category.is_some_and(|target| *target != declared) {
                        violations.push(SchemaViolation::new(
                            path,
                            format!(
                                "declared category {} does not match the target category {}",
                                declared,
                                target_category.map(ToString::to_string).unwrap_or_default()
                            ),
                        ));
                    } else {
                        envelope.category = Some(declared);
                    }
                }
                Some(Err(_)) | None => violations.push(SchemaViolation::new(
                    path,
                    "must be a category code (letters, digits, '_' or '-')",
                )),
            },
            _ => violations.push(SchemaViolation::new(path, "additional property not allowed")),
        }
    }
}

fn check_buckets(
    entries: &[Value],
    prefix: &str,
    envelope: &mut UploadEnvelope,
    violations: &mut Vec<SchemaViolation>,
) {
    envelope.bucket_count = entries.len();

    for (index, entry) in entries.iter().enumerate() {
        let path = format!("{}/{}", prefix, index);
        let Value::Object(fields) = entry else {
            violations.push(SchemaViolation::new(path, "must be an object with score and count"));
            continue;
        };

        for required in BUCKET_PROPERTIES {
            if !fields.contains_key(required) {
                violations.push(SchemaViolation::new(
                    path.clone(),
                    format!("missing required property '{}'", required),
                ));
            }
        }
        for extra in fields.keys().filter(|k| !BUCKET_PROPERTIES.contains(&k.as_str())) {
            violations.push(SchemaViolation::new(
                format!("{}/{}", path, pointer_escape(extra)),
                "additional property not allowed",
            ));
        }

        if let Some(score) = fields.get("score") {
            check_score(score, &format!("{}/score", path), violations);
        }
        if let Some(count) = fields.get("count") {
            if let Some(count) = check_count(count, &format!("{}/count", path), violations) {
                envelope.bucket_sum = envelope.bucket_sum.saturating_add(count);
            }
        }
    }
}

fn check_score(value: &Value, path: &str, violations: &mut Vec<SchemaViolation>) {
    let Some(score) = coerce_number(value) else {
        violations.push(SchemaViolation::new(path, "must be a number"));
        return;
    };
    if score.fract() != 0.0 {
        violations.push(SchemaViolation::new(path, "must be an integer"));
    }
    if score < f64::from(MIN_SCORE) || score > f64::from(MAX_SCORE) {
        violations.push(SchemaViolation::new(
            path,
            format!("must be between {} and {}", MIN_SCORE, MAX_SCORE),
        ));
    }
}

fn check_count(value: &Value, path: &str, violations: &mut Vec<SchemaViolation>) -> Option<u64> {
    let Some(count) = coerce_number(value) else {
        violations.push(SchemaViolation::new(path, "must be a number"));
        return None;
    };
    if count < 0.0 {
        violations.push(SchemaViolation::new(path, "must be >= 0"));
        return None;
    }
    if count.fract() != 0.0 {
        violations.push(SchemaViolation::new(path, "must be an integer"));
        return None;
    }
    let count = coerce_count(value);
    if count.is_none() {
        violations.push(SchemaViolation::new(path, "must fit in an unsigned 64-bit integer"));
    }
    count
}

/// Escape a key for use in a JSON pointer (RFC 6901)
fn pointer_escape(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}
