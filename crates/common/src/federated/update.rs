use serde::{Deserialize, Serialize};

pub type ClientId = String;

/// Most samples a single update may claim
pub const MAX_SAMPLES_PER_UPDATE: u64 = u32::MAX as u64;

/// One client's locally trained parameters for the current round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientUpdate {
    pub client_id: ClientId,
    pub weight_delta: Vec<f64>,
    pub bias_delta: f64,
    /// Local training samples behind this update; its weight under FedAvg
    pub num_samples: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_accuracy: Option<f64>,
}

impl ClientUpdate {
    pub fn new(client_id: impl Into<ClientId>, weight_delta: Vec<f64>, bias_delta: f64, num_samples: u64) -> Self {
        Self {
            client_id: client_id.into(),
            weight_delta,
            bias_delta,
            num_samples,
            local_accuracy: None,
        }
    }

    pub fn with_accuracy(mut self, local_accuracy: f64) -> Self {
        self.local_accuracy = Some(local_accuracy);
        self
    }

    /// Whether this update takes part in weighted averaging
    pub fn contributes(&self) -> bool {
        self.num_samples > 0
    }

    /// Check shape and values against a model with `num_features` inputs
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self, num_features: usize) -> Result<(), String> {
        if self.client_id.is_empty() {
            return Err("client_id is empty".to_string());
        }
        if self.weight_delta.len() != num_features {
            return Err(format!(
                "expected {} weights, got {}",
                num_features,
                self.weight_delta.len()
            ));
        }
        if let Some(i) = self.weight_delta.iter().position(|w| !w.is_finite()) {
            return Err(format!("weight {} is not finite", i));
        }
        if !self.bias_delta.is_finite() {
            return Err("bias is not finite".to_string());
        }
        if self.num_samples > MAX_SAMPLES_PER_UPDATE {
            return Err(format!(
                "num_samples {} exceeds the limit of {}",
                self.num_samples, MAX_SAMPLES_PER_UPDATE
            ));
        }
        if let Some(accuracy) = self.local_accuracy {
            if !(0.0..=1.0).contains(&accuracy) {
                return Err(format!("local accuracy {} is outside [0, 1]", accuracy));
            }
        }
        Ok(())
    }
}
