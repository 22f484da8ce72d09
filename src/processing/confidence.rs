//! Detection confidence per tag, 0-100.
//!
//! Each layer earns a fixed number of points per flagged sample up to its
//! cap: the sigma pass 4 per hit (max 40), MTD 2 per confirmation (max 20),
//! the isolation ensemble 1 per confirmation (max 10). There is no
//! pattern-based primary detector, so 70 is the highest reachable score.

use crate::types::{ConfidenceBreakdown, ConfidenceScore};

const SIGMA_POINTS: f64 = 4.0;
const SIGMA_CAP: f64 = 40.0;
const MTD_POINTS: f64 = 2.0;
const MTD_CAP: f64 = 20.0;
const ISOLATION_POINTS: f64 = 1.0;
const ISOLATION_CAP: f64 = 10.0;

fn contribution(count: usize, points: f64, cap: f64) -> f64 {
    (count as f64 * points).min(cap)
}

/// Score a tag from how many samples each stage flagged or confirmed.
pub fn confidence_score(primary: usize, mtd: usize, isolation: usize) -> ConfidenceScore {
    ConfidenceScore::from_breakdown(ConfidenceBreakdown {
        sigma: contribution(primary, SIGMA_POINTS, SIGMA_CAP),
        mtd: contribution(mtd, MTD_POINTS, MTD_CAP),
        isolation: contribution(isolation, ISOLATION_POINTS, ISOLATION_CAP),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConfidenceLevel;

    #[test]
    fn test_nothing_flagged_is_zero() {
        let c = confidence_score(0, 0, 0);
        assert_eq!(c.score, 0.0);
        assert_eq!(c.level, ConfidenceLevel::Low);
        assert_eq!(c.breakdown, ConfidenceBreakdown::default());
    }

    #[test]
    fn test_points_scale_with_counts() {
        let c = confidence_score(3, 2, 1);
        assert_eq!(c.breakdown.sigma, 12.0);
        assert_eq!(c.breakdown.mtd, 4.0);
        assert_eq!(c.breakdown.isolation, 1.0);
        assert_eq!(c.score, 17.0);
        assert_eq!(c.level, ConfidenceLevel::Low);
    }

    #[test]
    fn test_each_layer_is_capped() {
        let c = confidence_score(500, 300, 200);
        assert_eq!(c.breakdown.sigma, 40.0);
        assert_eq!(c.breakdown.mtd, 20.0);
        assert_eq!(c.breakdown.isolation, 10.0);
        assert_eq!(c.score, 70.0);
        assert_eq!(c.level, ConfidenceLevel::High);
    }

    #[test]
    fn test_medium_boundary() {
        // 10 sigma hits reach the sigma cap alone
        assert_eq!(confidence_score(10, 0, 0).level, ConfidenceLevel::Medium);
        assert_eq!(confidence_score(9, 1, 1).level, ConfidenceLevel::Low);
        // 40 + 20 = 60
        assert_eq!(confidence_score(10, 10, 0).level, ConfidenceLevel::High);
    }
}
