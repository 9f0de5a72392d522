//! Bucket normalization
//!
//! Converts a distribution payload of unknown shape into canonical buckets.
//! Known shapes are tried in a fixed order:
//!
//! 1. [`PayloadShape::BucketArray`]: `[{"score": 720, "count": 5}, ...]`
//! 2. [`PayloadShape::Wrapped`]: `{"buckets": [...], "total_candidates": 1000}`
//!    (also `data`, `distribution`, `scores`)
//! 3. [`PayloadShape::SparseMap`]: `{"720": 5, "700": 50}`
//!
//! Array entries may be objects using field synonyms (`score`/`s`/`marks`,
//! `count`/`c`/`students`, ...), single-key objects `{"720": 5}`, or pairs
//! `[720, 5]`. Entries that cannot be coerced to an in-range pair are
//! discarded and counted.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::model::{merge_buckets, Bucket, Distribution, DistributionKey, MAX_SCORE, MIN_SCORE};
use crate::{Error, Result};

/// Conventional keys under which a bucket list may be wrapped, in priority order
pub const WRAPPER_KEYS: [&str; 4] = ["buckets", "data", "distribution", "scores"];

/// Keys that may carry an explicit candidate total in a wrapper object
pub const TOTAL_KEYS: [&str; 3] = ["total_candidates", "totalCandidates", "total"];

const SCORE_KEYS: [&str; 5] = ["score", "s", "marks", "MARK", "SCORE"];
const COUNT_KEYS: [&str; 6] = ["count", "c", "students", "students_count", "freq", "frequency"];

/// Wrapper metadata that is not a bucket when it appears in a sparse map
const METADATA_KEYS: [&str; 5] = ["year", "category", "total_candidates", "totalCandidates", "total"];

/// Recognized payload layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum PayloadShape {
    BucketArray,
    Wrapped { key: &'static str },
    SparseMap,
}

/// Canonical buckets derived from a payload
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBuckets {
    /// Unique scores, sorted descending
    pub buckets: Vec<Bucket>,
    /// Total supplied by the payload, if any (already checked against the bucket sum)
    pub explicit_total: Option<u64>,
    /// Entries dropped during coercion
    pub discarded: usize,
    pub shape: PayloadShape,
}

impl NormalizedBuckets {
    pub fn bucket_sum(&self) -> u64 {
        self.buckets.iter().map(|b| b.count).fold(0, u64::saturating_add)
    }

    /// Explicit total when supplied, otherwise the bucket sum
    pub fn total_candidates(&self) -> u64 {
        self.explicit_total.unwrap_or_else(|| self.bucket_sum())
    }

    pub fn into_distribution(self, key: DistributionKey) -> Distribution {
        Distribution::from_buckets(key, self.buckets, self.explicit_total)
    }
}

/// Normalize a payload into canonical buckets.
///
/// Fails with [`Error::Normalization`] when no usable bucket remains.
pub fn normalize(payload: &Value) -> Result<NormalizedBuckets> {
    let Some((shape, entries)) = detect_shape(payload) else {
        return Err(Error::Normalization { discarded: 0 });
    };

    let mut collected = Vec::new();
    let mut discarded = 0usize;

    match entries {
        Value::Array(items) => {
            for item in items {
                match bucket_from_item(item) {
                    Some(bucket) => collected.push(bucket),
                    None => discarded += 1,
                }
            }
        }
        Value::Object(map) => {
            for (key, value) in map {
                if METADATA_KEYS.contains(&key.as_str()) {
                    continue;
                }
                match pair(&Value::String(key.clone()), Some(value)) {
                    Some(bucket) => collected.push(bucket),
                    None => discarded += 1,
                }
            }
        }
        _ => return Err(Error::Normalization { discarded: 0 }),
    }

    if collected.is_empty() {
        return Err(Error::Normalization { discarded });
    }

    let buckets = merge_buckets(collected);
    let sum = buckets.iter().map(|b| b.count).fold(0, u64::saturating_add);

    let explicit_total = match (shape, payload) {
        (PayloadShape::Wrapped { .. }, Value::Object(wrapper)) => explicit_total(wrapper, sum),
        _ => None,
    };

    if discarded > 0 {
        debug!(discarded, kept = buckets.len(), ?shape, "Discarded unusable distribution entries");
    }

    Ok(NormalizedBuckets {
        buckets,
        explicit_total,
        discarded,
        shape,
    })
}

/// Pick the first matching shape and the value holding its entries
fn detect_shape(payload: &Value) -> Option<(PayloadShape, &Value)> {
    match payload {
        Value::Array(_) => Some((PayloadShape::BucketArray, payload)),
        Value::Object(map) => {
            for key in WRAPPER_KEYS {
                if let Some(inner) = map.get(key).filter(|v| has_entries(v)) {
                    return Some((PayloadShape::Wrapped { key }, inner));
                }
            }
            if map.keys().any(|k| parse_number(k).is_some()) {
                return Some((PayloadShape::SparseMap, payload));
            }
            None
        }
        _ => None,
    }
}

fn has_entries(value: &Value) -> bool {
    match value {
        Value::Array(items) => !items.is_empty(),
        Value::Object(entries) => !entries.is_empty(),
        _ => false,
    }
}

fn bucket_from_item(item: &Value) -> Option<Bucket> {
    match item {
        Value::Array(pair_items) if pair_items.len() >= 2 => {
            pair(&pair_items[0], Some(&pair_items[1]))
        }
        Value::Object(fields) => {
            if let Some(score) = first_present(fields, &SCORE_KEYS) {
                // Absent count reads as zero candidates
                return pair(score, first_present(fields, &COUNT_KEYS));
            }
            if fields.len() == 1 {
                let (key, value) = fields.iter().next()?;
                return pair(&Value::String(key.clone()), Some(value));
            }
            None
        }
        _ => None,
    }
}

fn pair(score: &Value, count: Option<&Value>) -> Option<Bucket> {
    let score = coerce_score(score)?;
    let count = match count {
        Some(value) => coerce_count(value)?,
        None => 0,
    };
    Some(Bucket { score, count })
}

fn first_present<'a>(fields: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| fields.get(*k))
}

fn explicit_total(wrapper: &Map<String, Value>, sum: u64) -> Option<u64> {
    let raw = first_present(wrapper, &TOTAL_KEYS)?;
    match coerce_count(raw) {
        Some(total) if total >= sum => Some(total),
        Some(total) => {
            warn!(total, sum, "Explicit total below bucket sum, using bucket sum");
            None
        }
        None => {
            warn!(value = %raw, "Ignoring unusable explicit total");
            None
        }
    }
}

/// Numeric value of a JSON number or numeric-like string
pub(crate) fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Integral score within `[MIN_SCORE, MAX_SCORE]`
pub(crate) fn coerce_score(value: &Value) -> Option<u16> {
    let n = coerce_number(value)?;
    if n.fract() != 0.0 || n < f64::from(MIN_SCORE) || n > f64::from(MAX_SCORE) {
        return None;
    }
    Some(n as u16)
}

/// Integral non-negative count
pub(crate) fn coerce_count(value: &Value) -> Option<u64> {
    if let Value::Number(n) = value {
        if let Some(exact) = n.as_u64() {
            return Some(exact);
        }
    }
    let n = coerce_number(value)?;
    if n.fract() != 0.0 || n < 0.0 || n >= u64::MAX as f64 {
        return None;
    }
    Some(n as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scores(n: &NormalizedBuckets) -> Vec<(u16, u64)> {
        n.buckets.iter().map(|b| (b.score, b.count)).collect()
    }

    #[test]
    fn test_bucket_array() {
        let payload = json!([
            {"score": 650, "count": 200},
            {"score": 720, "count": 5},
            {"score": 700, "count": 50}
        ]);
        let n = normalize(&payload).unwrap();
        assert_eq!(n.shape, PayloadShape::BucketArray);
        assert_eq!(scores(&n), vec![(720, 5), (700, 50), (650, 200)]);
        assert_eq!(n.total_candidates(), 255);
        assert_eq!(n.explicit_total, None);
        assert_eq!(n.discarded, 0);
    }

    #[test]
    fn test_field_synonyms_and_entry_encodings() {
        let payload = json!([
            {"s": 720, "c": 1},
            {"marks": "700", "students": "2"},
            {"MARK": 690, "freq": 3},
            {"SCORE": 680, "frequency": 4},
            {"score": 670, "students_count": 5},
            {"660": 6},
            [650, 7]
        ]);
        let n = normalize(&payload).unwrap();
        assert_eq!(
            scores(&n),
            vec![(720, 1), (700, 2), (690, 3), (680, 4), (670, 5), (660, 6), (650, 7)]
        );
        assert_eq!(n.discarded, 0);
    }

    #[test]
    fn test_missing_count_reads_as_zero() {
        let n = normalize(&json!([{"score": 700}, {"score": 600, "count": 3}])).unwrap();
        assert_eq!(scores(&n), vec![(700, 0), (600, 3)]);
    }

    #[test]
    fn test_duplicates_are_summed() {
        let payload = json!([
            {"score": 700, "count": 10},
            {"score": "700", "count": 15},
            [700, 5]
        ]);
        let n = normalize(&payload).unwrap();
        assert_eq!(scores(&n), vec![(700, 30)]);
    }

    #[test]
    fn test_discards_are_counted_not_clamped() {
        let payload = json!([
            {"score": 721, "count": 1},
            {"score": -1, "count": 1},
            {"score": 700.5, "count": 1},
            {"score": 700, "count": -3},
            {"score": 700, "count": 2.5},
            {"score": "abc", "count": 1},
            {"name": "x", "other": 1},
            42,
            null,
            "700",
            {"score": 600, "count": 9}
        ]);
        let n = normalize(&payload).unwrap();
        assert_eq!(scores(&n), vec![(600, 9)]);
        assert_eq!(n.discarded, 10);
    }

    #[test]
    fn test_wrapped_with_explicit_total() {
        let payload = json!({
            "year": 2024,
            "total_candidates": 1000,
            "buckets": [{"score": 720, "count": 5}, {"score": 700, "count": 50}]
        });
        let n = normalize(&payload).unwrap();
        assert_eq!(n.shape, PayloadShape::Wrapped { key: "buckets" });
        assert_eq!(n.explicit_total, Some(1000));
        assert_eq!(n.total_candidates(), 1000);
        assert_eq!(n.bucket_sum(), 55);
    }

    #[test]
    fn test_wrapped_key_priority_and_alternatives() {
        let payload = json!({"buckets": [], "data": [{"score": 1, "count": 1}]});
        let n = normalize(&payload).unwrap();
        assert_eq!(n.shape, PayloadShape::Wrapped { key: "data" });

        let payload = json!({"scores": {"700": 3, "650": "4"}, "totalCandidates": "10"});
        let n = normalize(&payload).unwrap();
        assert_eq!(n.shape, PayloadShape::Wrapped { key: "scores" });
        assert_eq!(scores(&n), vec![(700, 3), (650, 4)]);
        assert_eq!(n.total_candidates(), 10);
    }

    #[test]
    fn test_explicit_total_below_sum_is_ignored() {
        let payload = json!({"total": 3, "distribution": [[700, 5]]});
        let n = normalize(&payload).unwrap();
        assert_eq!(n.explicit_total, None);
        assert_eq!(n.total_candidates(), 5);
    }

    #[test]
    fn test_sparse_map() {
        let payload = json!({"720": 5, "700": 50, "year": 2024, "oops": 1});
        let n = normalize(&payload).unwrap();
        assert_eq!(n.shape, PayloadShape::SparseMap);
        assert_eq!(scores(&n), vec![(720, 5), (700, 50)]);
        assert_eq!(n.discarded, 1);
        assert_eq!(n.explicit_total, None);
    }

    #[test]
    fn test_unrecognized_payloads_fail() {
        for payload in [json!(null), json!(42), json!("x"), json!({"name": "x"}), json!({"buckets": []})] {
            match normalize(&payload) {
                Err(Error::Normalization { discarded }) => assert_eq!(discarded, 0),
                other => panic!("expected normalization error for {payload}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_all_entries_discarded_reports_count() {
        match normalize(&json!([{"score": 900, "count": 1}, [1000, 2]])) {
            Err(Error::Normalization { discarded }) => assert_eq!(discarded, 2),
            other => panic!("expected normalization error, got {other:?}"),
        }
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let payload = json!([[700, 5], {"score": 720, "count": 1}, {"700": 5}, {"marks": 10}]);
        let first = normalize(&payload).unwrap();
        let canonical = serde_json::to_value(&first.buckets).unwrap();
        let second = normalize(&canonical).unwrap();
        assert_eq!(first.buckets, second.buckets);
        assert_eq!(first.total_candidates(), second.total_candidates());
    }

    #[test]
    fn test_input_is_not_mutated() {
        let payload = json!([{"score": "700", "count": "5"}, {"score": 700, "count": 1}]);
        let before = payload.clone();
        let _ = normalize(&payload).unwrap();
        assert_eq!(payload, before);
    }
}
