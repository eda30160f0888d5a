use serde::{Deserialize, Serialize};

use super::aggregator::AggregationStrategy;

pub const DEFAULT_NUM_FEATURES: usize = 10;
pub const DEFAULT_MIN_CLIENTS_FOR_ROUND: usize = 2;
pub const DEFAULT_MAX_ROUNDS: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("num_features must be at least 1")]
    NoFeatures,
    #[error("min_clients_for_round must be at least 1")]
    NoClients,
    #[error("max_rounds must be at least 1")]
    NoRounds,
}

/// Coordinator tuning, the `[federated]` table of the app config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederatedSettings {
    pub num_features: usize,
    pub min_clients_for_round: usize,
    pub max_rounds: u32,
    pub strategy: AggregationStrategy,
}

impl Default for FederatedSettings {
    fn default() -> Self {
        Self {
            num_features: DEFAULT_NUM_FEATURES,
            min_clients_for_round: DEFAULT_MIN_CLIENTS_FOR_ROUND,
            max_rounds: DEFAULT_MAX_ROUNDS,
            strategy: AggregationStrategy::default(),
        }
    }
}

impl FederatedSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.num_features == 0 {
            return Err(SettingsError::NoFeatures);
        }
        if self.min_clients_for_round == 0 {
            return Err(SettingsError::NoClients);
        }
        if self.max_rounds == 0 {
            return Err(SettingsError::NoRounds);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = FederatedSettings::default();
        assert_eq!(settings.num_features, 10);
        assert_eq!(settings.min_clients_for_round, 2);
        assert_eq!(settings.max_rounds, 50);
        assert_eq!(settings.strategy, AggregationStrategy::FedAvg);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_table_uses_defaults() {
        let settings: FederatedSettings =
            serde_json::from_str(r#"{"max_rounds": 3, "strategy": "mean"}"#).unwrap();
        assert_eq!(settings.max_rounds, 3);
        assert_eq!(settings.strategy, AggregationStrategy::Mean);
        assert_eq!(settings.num_features, DEFAULT_NUM_FEATURES);
    }

    #[test]
    fn test_validate() {
        let settings = FederatedSettings {
            min_clients_for_round: 0,
            ..Default::default()
        };
        assert_eq!(settings.validate(), Err(SettingsError::NoClients));
    }
}
