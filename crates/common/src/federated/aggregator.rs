use serde::{Deserialize, Serialize};

use super::update::ClientUpdate;

/// How buffered updates are combined into the next global model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationStrategy {
    /// Sample-weighted mean: `Σ(delta·n) / Σn`
    #[default]
    FedAvg,
    /// Unweighted mean over contributing clients
    Mean,
}

impl std::fmt::Display for AggregationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregationStrategy::FedAvg => write!(f, "fedavg"),
            AggregationStrategy::Mean => write!(f, "mean"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AggregateError {
    #[error("no updates with samples to aggregate")]
    NothingToAggregate,
    #[error("total sample count overflows")]
    SampleOverflow,
}

/// Output of combining one round of updates
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub weights: Vec<f64>,
    pub bias: f64,
    /// Updates that contributed; zero-sample updates are not counted
    pub num_clients: usize,
    pub total_samples: u64,
    pub avg_local_accuracy: Option<f64>,
}

impl AggregationStrategy {
    /// Combine `updates`, all of which must have `num_features` weights
    ///
    /// Updates with zero samples are left out entirely.
    pub fn aggregate(
        &self,
        updates: &[ClientUpdate],
        num_features: usize,
    ) -> Result<Aggregation, AggregateError> {
        let contributing: Vec<&ClientUpdate> = updates.iter().filter(|u| u.contributes()).collect();
        if contributing.is_empty() {
            return Err(AggregateError::NothingToAggregate);
        }
        let total_samples = contributing
            .iter()
            .try_fold(0u64, |total, u| total.checked_add(u.num_samples))
            .ok_or(AggregateError::SampleOverflow)?;

        let factor = |update: &ClientUpdate| -> f64 {
            match self {
                AggregationStrategy::FedAvg => update.num_samples as f64 / total_samples as f64,
                AggregationStrategy::Mean => 1.0 / contributing.len() as f64,
            }
        };

        let mut weights = vec![0.0; num_features];
        let mut bias = 0.0;
        for update in &contributing {
            let f = factor(update);
            for (acc, delta) in weights.iter_mut().zip(&update.weight_delta) {
                *acc += f * delta;
            }
            bias += f * update.bias_delta;
        }

        let accuracies: Vec<f64> = contributing.iter().filter_map(|u| u.local_accuracy).collect();
        let avg_local_accuracy = if accuracies.is_empty() {
            None
        } else {
            Some(accuracies.iter().sum::<f64>() / accuracies.len() as f64)
        };

        Ok(Aggregation {
            weights,
            bias,
            num_clients: contributing.len(),
            total_samples,
            avg_local_accuracy,
        })
    }
}
