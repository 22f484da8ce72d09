//! Shared data structures for the tag anomaly pipeline
//!
//! - `TagSample` / `TagSeries` / `UnitTable`: raw readings and their aligned views
//! - `OperatingState`: running/stopped labels for one unit run
//! - `BaselineProfile`: calibrated per-tag thresholds and quality verdict
//! - `AnomalyCandidate` / `AnomalyRecord`: pipeline stage state and final output

mod anomaly;
mod profile;
mod samples;
mod state;

pub use anomaly::*;
pub use profile::*;
pub use samples::*;
pub use state::*;
