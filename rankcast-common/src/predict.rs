//! Prediction service (query interface)

use serde::Serialize;
use tracing::debug;

use crate::model::{Category, MatchedDataset};
use crate::rank;
use crate::repository::DistributionRepository;
use crate::{Error, Result};

/// Rank and percentile for one score
#[derive(Debug, Clone, Serialize)]
pub struct PredictionResult {
    pub year: i32,
    pub score: f64,
    /// Category as requested
    pub category: Category,
    pub matched_dataset: MatchedDataset,
    pub rank: u64,
    pub percentile: f64,
    pub total_candidates: u64,
    /// Cache version of the dataset that answered
    pub dataset_version: u64,
}

/// Answers rank queries through the repository
#[derive(Clone)]
pub struct PredictionService {
    repository: DistributionRepository,
}

impl PredictionService {
    pub fn new(repository: DistributionRepository) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &DistributionRepository {
        &self.repository
    }

    pub async fn predict(
        &self,
        year: i32,
        score: f64,
        category: Option<&str>,
    ) -> Result<PredictionResult> {
        let category = Category::from_option(category)?;
        if !score.is_finite() {
            return Err(Error::InvalidInput(format!(
                "Score must be a finite number, got {}",
                score
            )));
        }

        let resolved = self.repository.resolve(year, &category).await?;
        let outcome = rank::compute(resolved.distribution(), score)?;

        debug!(
            year,
            score,
            %category,
            matched = ?resolved.matched,
            rank = outcome.rank,
            "Prediction computed"
        );

        Ok(PredictionResult {
            year,
            score,
            category,
            matched_dataset: resolved.matched,
            rank: outcome.rank,
            percentile: outcome.percentile,
            total_candidates: outcome.total_candidates,
            dataset_version: resolved.entry.version,
        })
    }

    /// One prediction per stored year, oldest first.
    ///
    /// Years without a usable dataset for the request are skipped; store
    /// failures abort.
    pub async fn history(&self, score: f64, category: Option<&str>) -> Result<Vec<PredictionResult>> {
        let mut results = Vec::new();
        for year in self.years().await? {
            match self.predict(year, score, category).await {
                Ok(result) => results.push(result),
                Err(
                    e @ (Error::DistributionNotFound { .. }
                    | Error::EmptyDistribution { .. }
                    | Error::Normalization { .. }),
                ) => debug!(year, "Skipping year in history: {}", e),
                Err(e) => return Err(e),
            }
        }
        Ok(results)
    }

    /// Distinct years with at least one stored dataset, ascending
    pub async fn years(&self) -> Result<Vec<i32>> {
        let mut years: Vec<i32> = self
            .repository
            .available()
            .await?
            .into_iter()
            .map(|key| key.year)
            .collect();
        years.sort_unstable();
        years.dedup();
        Ok(years)
    }
}
