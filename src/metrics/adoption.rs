// Adoption rate - fraction of feedback records whose completion was accepted

use serde_json::Value;

use crate::dataset::{is_truthy, FeedbackRecord};

/// Anything that can report whether it was adopted downstream
pub trait Adoption {
    fn is_adopted(&self) -> bool;
}

impl Adoption for FeedbackRecord {
    fn is_adopted(&self) -> bool {
        self.adopted
    }
}

/// Raw JSON records: a missing `adopted` field counts as not adopted.
impl Adoption for Value {
    fn is_adopted(&self) -> bool {
        self.get("adopted").map(is_truthy).unwrap_or(false)
    }
}

impl<T: Adoption + ?Sized> Adoption for &T {
    fn is_adopted(&self) -> bool {
        (**self).is_adopted()
    }
}

/// Fraction of adopted records in `[0.0, 1.0]`; an empty slice yields `0.0`.
pub fn compute_adoption_rate<T: Adoption>(records: &[T]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }

    let adopted = records.iter().filter(|r| r.is_adopted()).count();
    adopted as f64 / records.len() as f64
}

/// Report line printed at the end of a run, e.g. `Base adoption rate: 50.00%`
pub fn format_adoption_rate(rate: f64) -> String {
    format!("Base adoption rate: {:.2}%", rate * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_is_zero() {
        let records: Vec<FeedbackRecord> = Vec::new();
        assert_eq!(compute_adoption_rate(&records), 0.0);
    }

    #[test]
    fn test_one_of_three() {
        let records = vec![
            FeedbackRecord::new("a", "b").adopted(),
            FeedbackRecord::new("c", "d"),
            FeedbackRecord::new("e", "f"),
        ];
        let rate = compute_adoption_rate(&records);
        assert!((rate - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_all_and_none() {
        let all = vec![FeedbackRecord::new("a", "b").adopted(); 4];
        assert_eq!(compute_adoption_rate(&all), 1.0);

        let none = vec![FeedbackRecord::new("a", "b"); 4];
        assert_eq!(compute_adoption_rate(&none), 0.0);
    }

    #[test]
    fn test_missing_field_same_as_false() {
        let missing = vec![json!({"prompt": "a"}), json!({"prompt": "b", "adopted": true})];
        let explicit = vec![
            json!({"prompt": "a", "adopted": false}),
            json!({"prompt": "b", "adopted": true}),
        ];
        assert_eq!(compute_adoption_rate(&missing), 0.5);
        assert_eq!(
            compute_adoption_rate(&missing),
            compute_adoption_rate(&explicit)
        );
    }

    #[test]
    fn test_malformed_values_never_fail() {
        let records = vec![json!(null), json!("text"), json!([1, 2]), json!({"adopted": "yes"})];
        assert_eq!(compute_adoption_rate(&records), 0.25);
    }

    #[test]
    fn test_borrowed_records() {
        let owned = vec![FeedbackRecord::new("a", "b").adopted(), FeedbackRecord::new("c", "d")];
        let borrowed: Vec<&FeedbackRecord> = owned.iter().collect();
        assert_eq!(compute_adoption_rate(&borrowed), 0.5);
    }

    #[test]
    fn test_report_line() {
        assert_eq!(format_adoption_rate(0.5), "Base adoption rate: 50.00%");
        assert_eq!(format_adoption_rate(1.0 / 3.0), "Base adoption rate: 33.33%");
        assert_eq!(format_adoption_rate(0.0), "Base adoption rate: 0.00%");
    }
}
