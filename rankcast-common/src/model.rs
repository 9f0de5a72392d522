//! Distribution data model
//!
//! A distribution is a histogram of (score → candidate count) buckets for one
//! exam year and one category scope. Distributions are immutable once built;
//! replacing a dataset always builds a new value.

use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use crate::{Error, Result};

/// Lowest attainable score
pub const MIN_SCORE: u16 = 0;

/// Highest attainable score
pub const MAX_SCORE: u16 = 720;

/// Accepted exam year range
pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 9999;

/// Category strings that mean "no category narrowing"
const GENERAL_SENTINELS: [&str; 4] = ["", "GENERAL", "GEN", "ALL"];

const MAX_CATEGORY_LEN: usize = 32;

/// Number of candidates who achieved exactly `score`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bucket {
    pub score: u16,
    pub count: u64,
}

impl Bucket {
    pub fn new(score: u16, count: u64) -> Self {
        Self { score, count }
    }
}

/// Category scope of a distribution
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    /// Category-unscoped dataset for a year
    General,
    /// Category-specific dataset (uppercase code, e.g. `OBC`)
    Named(String),
}

impl Category {
    /// Parse a category string.
    ///
    /// Case-insensitive; `GENERAL`, `GEN`, `ALL` and blank map to [`Category::General`].
    pub fn parse(raw: &str) -> Result<Self> {
        let code = raw.trim().to_ascii_uppercase();
        if GENERAL_SENTINELS.contains(&code.as_str()) {
            return Ok(Category::General);
        }
        if code.len() > MAX_CATEGORY_LEN
            || !code
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(Error::InvalidInput(format!("Invalid category: {}", raw)));
        }
        Ok(Category::Named(code))
    }

    /// Parse an optional category; absent means general
    pub fn from_option(raw: Option<&str>) -> Result<Self> {
        raw.map_or(Ok(Category::General), Self::parse)
    }

    pub fn is_general(&self) -> bool {
        matches!(self, Category::General)
    }

    /// Code as stored in artifact names and database rows (`""` for general)
    pub fn code(&self) -> &str {
        match self {
            Category::General => "",
            Category::Named(code) => code,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::General => f.write_str("GENERAL"),
            Category::Named(code) => f.write_str(code),
        }
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Which tier of the fallback hierarchy answered a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchedDataset {
    Category,
    General,
}

/// Address of one stored distribution: (year, category)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DistributionKey {
    pub year: i32,
    pub category: Category,
}

impl DistributionKey {
    pub fn new(year: i32, category: Category) -> Result<Self> {
        validate_year(year)?;
        Ok(Self { year, category })
    }

    pub fn general(year: i32) -> Result<Self> {
        Self::new(year, Category::General)
    }

    /// Deterministic artifact name without extension:
    /// `distribution_<year>` or `distribution_<year>_<CATEGORY>`
    pub fn artifact_stem(&self) -> String {
        match &self.category {
            Category::General => format!("distribution_{}", self.year),
            Category::Named(code) => format!("distribution_{}_{}", self.year, code),
        }
    }

    /// Inverse of [`DistributionKey::artifact_stem`]
    pub fn from_artifact_stem(stem: &str) -> Option<Self> {
        let rest = stem.strip_prefix("distribution_")?;
        let (year_part, category) = match rest.split_once('_') {
            Some((year, code)) => match Category::parse(code).ok()? {
                Category::General => return None,
                named => (year, named),
            },
            None => (rest, Category::General),
        };
        if year_part.len() != 4 || !year_part.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let year = year_part.parse().ok()?;
        Self::new(year, category).ok()
    }
}

impl fmt::Display for DistributionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.year, self.category)
    }
}

pub fn validate_year(year: i32) -> Result<()> {
    if (MIN_YEAR..=MAX_YEAR).contains(&year) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "Year {} outside {}..={}",
            year, MIN_YEAR, MAX_YEAR
        )))
    }
}

/// Histogram of candidate scores for one (year, category)
///
/// Buckets are unique per score and sorted descending. `above[i]` holds the
/// number of candidates in `buckets[..i]`, so the count strictly above any
/// query score is one binary search away.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    key: DistributionKey,
    buckets: Vec<Bucket>,
    above: Vec<u64>,
    total_candidates: u64,
    total_explicit: bool,
}

impl Distribution {
    /// Build from buckets in any order.
    ///
    /// Duplicate scores are summed. An explicit total below the bucket sum is
    /// ignored in favour of the sum.
    pub fn from_buckets(
        key: DistributionKey,
        buckets: impl IntoIterator<Item = Bucket>,
        explicit_total: Option<u64>,
    ) -> Self {
        let buckets = merge_buckets(buckets);

        let mut above = Vec::with_capacity(buckets.len() + 1);
        let mut running = 0u64;
        above.push(0);
        for b in &buckets {
            running = running.saturating_add(b.count);
            above.push(running);
        }

        let (total_candidates, total_explicit) = match explicit_total {
            Some(total) if total >= running => (total, true),
            _ => (running, false),
        };

        Self {
            key,
            buckets,
            above,
            total_candidates,
            total_explicit,
        }
    }

    pub fn key(&self) -> &DistributionKey {
        &self.key
    }

    pub fn year(&self) -> i32 {
        self.key.year
    }

    pub fn category(&self) -> &Category {
        &self.key.category
    }

    /// Buckets sorted descending by score
    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn total_candidates(&self) -> u64 {
        self.total_candidates
    }

    /// Whether the total came from the payload rather than the bucket sum
    pub fn total_is_explicit(&self) -> bool {
        self.total_explicit
    }

    /// Sum of all bucket counts
    pub fn bucket_sum(&self) -> u64 {
        self.above.last().copied().unwrap_or(0)
    }

    /// Candidates whose score is strictly greater than `score`
    pub fn count_above(&self, score: f64) -> u64 {
        let idx = self.buckets.partition_point(|b| f64::from(b.score) > score);
        self.above[idx]
    }

    pub fn max_score(&self) -> Option<u16> {
        self.buckets.first().map(|b| b.score)
    }

    pub fn min_score(&self) -> Option<u16> {
        self.buckets.last().map(|b| b.score)
    }
}

/// Sum counts per score and order descending
pub(crate) fn merge_buckets(buckets: impl IntoIterator<Item = Bucket>) -> Vec<Bucket> {
    let mut merged: BTreeMap<u16, u64> = BTreeMap::new();
    for b in buckets {
        let slot = merged.entry(b.score).or_insert(0);
        *slot = slot.saturating_add(b.count);
    }
    merged
        .into_iter()
        .rev()
        .map(|(score, count)| Bucket { score, count })
        .collect()
}
