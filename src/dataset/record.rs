// Feedback record - one prompt/completion pair to learn from

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One observed interaction: a prompt, the completion that was produced,
/// and whether the completion was accepted downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// Input text (never empty after validation)
    pub prompt: String,
    /// Target text (never empty after validation)
    pub completion: String,
    /// Whether the completion was adopted; absent in the source means false
    #[serde(default)]
    pub adopted: bool,
}

impl FeedbackRecord {
    pub fn new(prompt: impl Into<String>, completion: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            completion: completion.into(),
            adopted: false,
        }
    }

    /// Mark the record as adopted
    pub fn adopted(mut self) -> Self {
        self.adopted = true;
        self
    }
}

/// JSON truthiness: false, null, zero, and empty strings/arrays/objects are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("yes")));
        assert!(is_truthy(&json!([0])));
        assert!(is_truthy(&json!({"a": 1})));

        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!(0.0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!([])));
        assert!(!is_truthy(&json!({})));
    }

    #[test]
    fn test_builder() {
        let record = FeedbackRecord::new("q", "a");
        assert!(!record.adopted);
        assert!(record.adopted().adopted);
    }
}
