// Feedback dataset: record type and all-or-nothing loader

mod loader;
mod record;

pub use loader::{load_feedback_dataset, parse_feedback_dataset};
pub use record::{is_truthy, FeedbackRecord};
