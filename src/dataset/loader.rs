// Dataset loader - reads a JSON array of feedback records and validates every entry
//
// Validation is all-or-nothing: the first bad record fails the whole load.

use serde_json::{Map, Value};
use std::path::Path;

use super::record::{is_truthy, FeedbackRecord};
use crate::errors::{Error, Result};

/// Load and validate a feedback dataset from disk
pub fn load_feedback_dataset(path: &Path) -> Result<Vec<FeedbackRecord>> {
    let bytes = std::fs::read(path).map_err(|source| Error::DatasetIo {
        path: path.to_path_buf(),
        source,
    })?;

    let contents = String::from_utf8(bytes).map_err(|e| Error::DatasetFormat {
        path: path.to_path_buf(),
        index: None,
        reason: format!("not valid UTF-8: {}", e),
    })?;

    let records = parse_feedback_dataset(&contents).map_err(|e| match e {
        Error::DatasetFormat { index, reason, .. } => Error::DatasetFormat {
            path: path.to_path_buf(),
            index,
            reason,
        },
        other => other,
    })?;

    tracing::info!(
        "Loaded {} feedback records from {}",
        records.len(),
        path.display()
    );

    Ok(records)
}

/// Validate an in-memory JSON document. Errors carry an empty path.
pub fn parse_feedback_dataset(contents: &str) -> Result<Vec<FeedbackRecord>> {
    let document: Value = serde_json::from_str(contents)
        .map_err(|e| format_error(None, format!("not valid JSON: {}", e)))?;

    let entries = match document {
        Value::Array(entries) => entries,
        other => {
            return Err(format_error(
                None,
                format!("top-level value must be an array, found {}", kind(&other)),
            ))
        }
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| validate_record(index, entry))
        .collect()
}

fn validate_record(index: usize, entry: Value) -> Result<FeedbackRecord> {
    let fields = match entry {
        Value::Object(fields) => fields,
        other => {
            return Err(format_error(
                Some(index),
                format!("expected an object, found {}", kind(&other)),
            ))
        }
    };

    let prompt = required_text(index, &fields, "prompt")?;
    let completion = required_text(index, &fields, "completion")?;
    let adopted = fields.get("adopted").map(is_truthy).unwrap_or(false);

    Ok(FeedbackRecord {
        prompt,
        completion,
        adopted,
    })
}

fn required_text(index: usize, fields: &Map<String, Value>, name: &str) -> Result<String> {
    match fields.get(name) {
        Some(Value::String(text)) if !text.is_empty() => Ok(text.clone()),
        Some(Value::String(_)) => Err(format_error(Some(index), format!("'{}' is empty", name))),
        Some(Value::Null) | None => Err(format_error(Some(index), format!("missing '{}'", name))),
        Some(other) => Err(format_error(
            Some(index),
            format!("'{}' must be a string, found {}", name, kind(other)),
        )),
    }
}

fn format_error(index: Option<usize>, reason: String) -> Error {
    Error::DatasetFormat {
        path: Default::default(),
        index,
        reason,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_dataset(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_loads_valid_records_in_order() {
        let file = write_dataset(
            r#"[{"prompt":"a","completion":"b","adopted":true},{"prompt":"c","completion":"d"}]"#,
        );
        let records = load_feedback_dataset(file.path()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0], FeedbackRecord::new("a", "b").adopted());
        assert_eq!(records[1], FeedbackRecord::new("c", "d"));
    }

    #[test]
    fn test_duplicates_preserved() {
        let records = parse_feedback_dataset(
            r#"[{"prompt":"x","completion":"y"},{"prompt":"x","completion":"y"}]"#,
        )
        .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], records[1]);
    }

    #[test]
    fn test_extra_fields_ignored() {
        let records = parse_feedback_dataset(
            r#"[{"prompt":"p","completion":"c","source":"ide","score":0.7}]"#,
        )
        .unwrap();
        assert_eq!(records, vec![FeedbackRecord::new("p", "c")]);
    }

    #[test]
    fn test_empty_array_is_valid() {
        assert!(parse_feedback_dataset("[]").unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_feedback_dataset(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, Error::DatasetIo { .. }), "got: {:?}", err);
    }

    #[test]
    fn test_invalid_json_is_format_error() {
        let file = write_dataset("[{\"prompt\": ");
        let err = load_feedback_dataset(file.path()).unwrap_err();
        match err {
            Error::DatasetFormat { path, index, .. } => {
                assert_eq!(path, file.path());
                assert_eq!(index, None);
            }
            other => panic!("expected format error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_utf8_is_format_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[b'[', 0xff, 0xfe, b']']).unwrap();
        let err = load_feedback_dataset(file.path()).unwrap_err();
        assert!(matches!(err, Error::DatasetFormat { index: None, .. }));
    }

    #[test]
    fn test_non_array_top_level_rejected() {
        for doc in [r#"{"prompt":"a","completion":"b"}"#, "42", "\"text\"", "null", "true"] {
            let err = parse_feedback_dataset(doc).unwrap_err();
            assert!(
                matches!(err, Error::DatasetFormat { index: None, .. }),
                "{} should be rejected, got {:?}",
                doc,
                err
            );
        }
    }

    #[test]
    fn test_non_object_element_names_index() {
        let err =
            parse_feedback_dataset(r#"[{"prompt":"a","completion":"b"}, "oops"]"#).unwrap_err();
        assert_eq!(err.record_index(), Some(1));
    }

    #[test]
    fn test_empty_prompt_rejected_at_any_position() {
        let good = r#"{"prompt":"a","completion":"b"}"#;
        let bad = r#"{"prompt":"","completion":"x"}"#;

        for position in 0..3 {
            let mut entries = vec![good; 3];
            entries[position] = bad;
            let doc = format!("[{}]", entries.join(","));

            let err = parse_feedback_dataset(&doc).unwrap_err();
            assert_eq!(err.record_index(), Some(position));
        }
    }

    #[test]
    fn test_missing_or_null_fields_rejected() {
        let cases = [
            (r#"[{"completion":"x"}]"#, "prompt"),
            (r#"[{"prompt":null,"completion":"x"}]"#, "prompt"),
            (r#"[{"prompt":"x"}]"#, "completion"),
            (r#"[{"prompt":"x","completion":""}]"#, "completion"),
            (r#"[{"prompt":7,"completion":"x"}]"#, "prompt"),
        ];

        for (doc, field) in cases {
            let err = parse_feedback_dataset(doc).unwrap_err();
            assert_eq!(err.record_index(), Some(0), "doc: {}", doc);
            assert!(err.to_string().contains(field), "doc: {} msg: {}", doc, err);
        }
    }

    #[test]
    fn test_first_bad_record_aborts_whole_load() {
        // Later records are valid; nothing may be returned.
        let result = parse_feedback_dataset(
            r#"[{"prompt":"a","completion":"b"},{"prompt":"","completion":"x"},{"prompt":"c","completion":"d"}]"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_adopted_uses_truthiness() {
        let records = parse_feedback_dataset(
            r#"[
                {"prompt":"a","completion":"b","adopted":true},
                {"prompt":"a","completion":"b","adopted":false},
                {"prompt":"a","completion":"b","adopted":null},
                {"prompt":"a","completion":"b","adopted":1},
                {"prompt":"a","completion":"b"}
            ]"#,
        )
        .unwrap();
        let flags: Vec<bool> = records.iter().map(|r| r.adopted).collect();
        assert_eq!(flags, vec![true, false, false, true, false]);
    }
}
