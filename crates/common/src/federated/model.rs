use serde::{Deserialize, Serialize};

/// Decision threshold on the predicted probability
pub const DECISION_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("expected {expected} features, got {actual}")]
pub struct DimensionMismatch {
    pub expected: usize,
    pub actual: usize,
}

/// The shared logistic regression model
///
/// `round` counts completed aggregations; a freshly initialised model is
///  at round 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalModel {
    pub weights: Vec<f64>,
    pub bias: f64,
    pub round: u32,
    pub num_features: usize,
}

impl GlobalModel {
    /// All-zero weights and bias at round 0
    pub fn zeros(num_features: usize) -> Self {
        Self {
            weights: vec![0.0; num_features],
            bias: 0.0,
            round: 0,
            num_features,
        }
    }

    pub fn with_parameters(weights: Vec<f64>, bias: f64) -> Self {
        Self {
            num_features: weights.len(),
            weights,
            bias,
            round: 0,
        }
    }

    fn check_dimension(&self, features: &[f64]) -> Result<(), DimensionMismatch> {
        if features.len() != self.num_features {
            return Err(DimensionMismatch {
                expected: self.num_features,
                actual: features.len(),
            });
        }
        Ok(())
    }

    /// Probability of the positive class for one sample
    pub fn predict_proba(&self, features: &[f64]) -> Result<f64, DimensionMismatch> {
        self.check_dimension(features)?;
        let z = self
            .weights
            .iter()
            .zip(features)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.bias;
        Ok(sigmoid(z))
    }

    /// Class label (0 or 1) for one sample
    pub fn predict(&self, features: &[f64]) -> Result<u8, DimensionMismatch> {
        let p = self.predict_proba(features)?;
        Ok(u8::from(p >= DECISION_THRESHOLD))
    }
}

/// Logistic function, stable for large |z|
fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_zero_model_is_undecided() {
        let model = GlobalModel::zeros(3);
        assert_eq!(model.predict_proba(&[1.0, -2.0, 3.0]).unwrap(), 0.5);
        // ties go to the positive class
        assert_eq!(model.predict(&[1.0, -2.0, 3.0]).unwrap(), 1);
    }

    #[test]
    fn test_predict() {
        let model = GlobalModel::with_parameters(vec![2.0, -1.0], 0.5);
        assert_eq!(model.num_features, 2);

        let p = model.predict_proba(&[1.0, 1.0]).unwrap();
        assert!((p - sigmoid(1.5)).abs() < 1e-12);
        assert_eq!(model.predict(&[1.0, 1.0]).unwrap(), 1);
        assert_eq!(model.predict(&[-1.0, 1.0]).unwrap(), 0);
    }

    #[test]
    fn test_sigmoid_extremes() {
        assert_eq!(sigmoid(1000.0), 1.0);
        assert_eq!(sigmoid(-1000.0), 0.0);
        assert!(sigmoid(-1000.0).is_finite());
    }

    #[test]
    fn test_dimension_mismatch() {
        let model = GlobalModel::zeros(3);
        assert_eq!(
            model.predict_proba(&[1.0]),
            Err(DimensionMismatch {
                expected: 3,
                actual: 1
            })
        );
    }
}
