//! CSV distribution tables
//!
//! A table such as
//!
//! ```text
//! score,count
//! 720,5
//! 700,50
//! ```
//!
//! becomes the same JSON tree a bucket-array upload produces:
//! `[{"score": "720", "count": "5"}, ...]`. Header names are trimmed and
//! lowercased; cells stay strings and are coerced by validation and
//! normalization like any numeric string.

use serde_json::{Map, Value};

use crate::{Error, Result};

/// Parse a headed CSV table into an array of row objects
pub fn parse_csv(bytes: &[u8]) -> Result<Value> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(normalize_header)
        .collect();
    if headers.iter().all(String::is_empty) {
        return Err(Error::InvalidInput("CSV has no header row".to_string()));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        let row: Map<String, Value> = headers
            .iter()
            .cloned()
            .zip(record.iter().map(|cell| Value::String(cell.to_string())))
            .collect();
        rows.push(Value::Object(row));
    }
    Ok(Value::Array(rows))
}

/// Whether a header row names both a score and a count column
pub fn has_bucket_columns(table: &[u8]) -> bool {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(table);
    reader.headers().is_ok_and(|headers| {
        let names: Vec<String> = headers.iter().map(normalize_header).collect();
        names.iter().any(|n| n == "score") && names.iter().any(|n| n == "count")
    })
}

fn normalize_header(name: &str) -> String {
    // Spreadsheet exports often lead with a UTF-8 BOM
    name.trim().trim_start_matches('\u{feff}').to_ascii_lowercase()
}

fn csv_error(e: csv::Error) -> Error {
    Error::InvalidInput(format!("Not a valid CSV table: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::validate::validate_upload;
    use serde_json::json;

    #[test]
    fn test_rows_become_bucket_objects() {
        let table = b"\xef\xbb\xbfScore, Count\n720,5\n\n700 , 50\n";
        let value = parse_csv(table).unwrap();
        assert_eq!(
            value,
            json!([{"score": "720", "count": "5"}, {"score": "700", "count": "50"}])
        );

        let envelope = validate_upload(&value, 2024, None).unwrap();
        assert_eq!(envelope.bucket_sum, 55);
        let normalized = normalize(&value).unwrap();
        assert_eq!(normalized.buckets.len(), 2);
        assert_eq!(normalized.discarded, 0);
    }

    #[test]
    fn test_synonym_headers_normalize() {
        let value = parse_csv(b"marks,students\n650,3\n").unwrap();
        let normalized = normalize(&value).unwrap();
        assert_eq!(normalized.total_candidates(), 3);
    }

    #[test]
    fn test_ragged_row_is_rejected() {
        let err = parse_csv(b"score,count\n720\n").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)), "{:?}", err);
    }

    #[test]
    fn test_bad_cells_surface_as_violations() {
        let value = parse_csv(b"score,count\n720,lots\n800,1\n").unwrap();
        match validate_upload(&value, 2024, None) {
            Err(Error::SchemaValidation(v)) => {
                let paths: Vec<_> = v.iter().map(|v| v.path.as_str()).collect();
                assert_eq!(paths, vec!["/0/count", "/1/score"]);
            }
            other => panic!("expected schema violations, got {:?}", other),
        }
    }

    #[test]
    fn test_header_only_is_empty() {
        assert_eq!(parse_csv(b"score,count\n").unwrap(), json!([]));
        assert!(parse_csv(b"").is_err());
    }

    #[test]
    fn test_bucket_columns() {
        assert!(has_bucket_columns(b"Count,Score\n5,720\n"));
        assert!(!has_bucket_columns(b"hello world\n"));
        assert!(!has_bucket_columns(b"{\"broken\": \n"));
    }
}
