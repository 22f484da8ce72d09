//! Post-verification processing: recency-weighted priority and detection
//! confidence per tag

mod confidence;
mod priority;

pub use confidence::confidence_score;
pub use priority::PriorityScorer;
