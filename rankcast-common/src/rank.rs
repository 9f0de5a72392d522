//! Rank and percentile computation
//!
//! Pure functions over an immutable [`Distribution`]. Rank is 1-based and
//! counts only candidates who scored strictly higher; equal scores share the
//! query's rank band.
//!
//! Percentile is `(total - rank) / total * 100`, clamped to `[0, 100]`. A
//! query below every bucket ranks after all scored candidates, which would
//! otherwise produce a slightly negative percentile; the unclamped value is
//! kept in [`RankOutcome::raw_percentile`].

use serde::Serialize;

use crate::model::Distribution;
use crate::{Error, Result};

/// Rank of one query score within a distribution
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RankOutcome {
    /// Candidates who scored strictly higher
    pub count_above: u64,
    /// `count_above + 1`
    pub rank: u64,
    /// Clamped to `[0, 100]`
    pub percentile: f64,
    #[serde(skip)]
    pub raw_percentile: f64,
    pub total_candidates: u64,
}

/// Compute rank and percentile of `score` in `distribution`.
pub fn compute(distribution: &Distribution, score: f64) -> Result<RankOutcome> {
    if !score.is_finite() {
        return Err(Error::InvalidInput(format!("Score must be a finite number, got {}", score)));
    }

    let total = distribution.total_candidates();
    if total == 0 {
        return Err(Error::EmptyDistribution {
            year: distribution.year(),
            category: distribution.category().clone(),
        });
    }

    let count_above = distribution.count_above(score);
    let rank = count_above.saturating_add(1);
    let raw_percentile = (total as f64 - rank as f64) / total as f64 * 100.0;

    Ok(RankOutcome {
        count_above,
        rank,
        percentile: raw_percentile.clamp(0.0, 100.0),
        raw_percentile,
        total_candidates: total,
    })
}
