// Metrics module
// Statistics reported over a feedback dataset

mod adoption;

pub use adoption::{compute_adoption_rate, format_adoption_rate, Adoption};
