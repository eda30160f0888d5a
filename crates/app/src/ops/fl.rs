use clap::{Args, Subcommand};
use common::federated::{
    AggregationStrategy, ClientUpdate, Coordinator, DimensionMismatch, FederatedSettings,
    GlobalModel, Request, Response, SettingsError,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::state::{AppConfig, StateError};

/// Federated learning tools
#[derive(Args, Debug, Clone)]
pub struct Fl {
    #[command(subcommand)]
    pub command: FlCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum FlCommand {
    /// Train a model across synthetic in-process clients
    Simulate(Simulate),
}

#[derive(Args, Debug, Clone)]
pub struct Simulate {
    /// Number of simulated clients
    #[arg(long, default_value_t = 3)]
    pub clients: usize,

    /// Rounds to run (defaults to the configured max_rounds, capped at 10)
    #[arg(long)]
    pub rounds: Option<u32>,

    /// Training samples held by each client
    #[arg(long, default_value_t = 200)]
    pub samples: usize,

    /// Local gradient descent epochs per round
    #[arg(long, default_value_t = 5)]
    pub epochs: usize,

    #[arg(long, default_value_t = 0.5)]
    pub learning_rate: f64,

    /// Aggregation strategy, overriding the config (fedavg or mean)
    #[arg(long, value_parser = parse_strategy)]
    pub strategy: Option<AggregationStrategy>,

    /// Seed for the synthetic data, random if unset
    #[arg(long)]
    pub seed: Option<u64>,
}

fn parse_strategy(s: &str) -> Result<AggregationStrategy, String> {
    match s {
        "fedavg" => Ok(AggregationStrategy::FedAvg),
        "mean" => Ok(AggregationStrategy::Mean),
        other => Err(format!("unknown strategy '{}', expected fedavg or mean", other)),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FlError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("invalid simulation settings: {0}")]
    Settings(#[from] SettingsError),
    #[error("coordinator refused ({kind}): {message}")]
    Coordinator { kind: String, message: String },
    #[error("unexpected coordinator response: {0}")]
    Unexpected(String),
    #[error(transparent)]
    Dimension(#[from] DimensionMismatch),
}

#[async_trait::async_trait]
impl crate::op::Op for Fl {
    type Error = FlError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        match &self.command {
            FlCommand::Simulate(simulate) => simulate.run(ctx),
        }
    }
}

/// A simulated participant and its private data
struct SimulatedClient {
    id: String,
    data: Vec<(Vec<f64>, f64)>,
}

impl SimulatedClient {
    /// Gradient descent on the local data starting from the global model.
    ///  Returns the trained model and its accuracy on the local data.
    fn train(&self, global: &GlobalModel, epochs: usize, learning_rate: f64) -> Result<(GlobalModel, f64), FlError> {
        let mut local = global.clone();
        let n = self.data.len().max(1) as f64;
        for _ in 0..epochs {
            let mut grad_w = vec![0.0; local.num_features];
            let mut grad_b = 0.0;
            for (x, y) in &self.data {
                let err = local.predict_proba(x)? - y;
                for (g, xi) in grad_w.iter_mut().zip(x) {
                    *g += err * xi;
                }
                grad_b += err;
            }
            for (w, g) in local.weights.iter_mut().zip(&grad_w) {
                *w -= learning_rate * g / n;
            }
            local.bias -= learning_rate * grad_b / n;
        }
        let accuracy = accuracy(&local, &self.data)?;
        Ok((local, accuracy))
    }
}

fn accuracy(model: &GlobalModel, data: &[(Vec<f64>, f64)]) -> Result<f64, DimensionMismatch> {
    if data.is_empty() {
        return Ok(0.0);
    }
    let mut correct = 0usize;
    for (x, y) in data {
        if f64::from(model.predict(x)?) == *y {
            correct += 1;
        }
    }
    Ok(correct as f64 / data.len() as f64)
}

/// Linearly separable data around a shared true model, shifted per
///  client so the clients do not hold identical distributions
fn synthesize(rng: &mut StdRng, clients: usize, samples: usize, num_features: usize) -> Vec<SimulatedClient> {
    const HETEROGENEITY: f64 = 0.3;
    const LABEL_NOISE: f64 = 0.05;

    let true_weights: Vec<f64> = (0..num_features).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let true_bias: f64 = rng.gen_range(-0.5..0.5);

    (0..clients)
        .map(|i| {
            let shift: Vec<f64> = (0..num_features)
                .map(|_| rng.gen_range(-HETEROGENEITY..HETEROGENEITY))
                .collect();
            let data = (0..samples)
                .map(|_| {
                    let x: Vec<f64> = shift.iter().map(|s| rng.gen_range(-1.0..1.0) + s).collect();
                    let z: f64 = true_weights.iter().zip(&x).map(|(w, xi)| w * xi).sum::<f64>() + true_bias;
                    let mut y = if z > 0.0 { 1.0 } else { 0.0 };
                    if rng.gen_bool(LABEL_NOISE) {
                        y = 1.0 - y;
                    }
                    (x, y)
                })
                .collect();
            SimulatedClient {
                id: format!("client-{}", i + 1),
                data,
            }
        })
        .collect()
}

/// Turn a boundary error into a typed one
fn check(response: Response) -> Result<Response, FlError> {
    match response {
        Response::Error { kind, message } => Err(FlError::Coordinator { kind, message }),
        other => Ok(other),
    }
}

impl Simulate {
    fn settings(&self, ctx: &crate::op::OpContext) -> Result<FederatedSettings, FlError> {
        let mut settings = AppConfig::load_or_default(ctx.config_path.clone())?.federated;
        settings.max_rounds = self.rounds.unwrap_or_else(|| settings.max_rounds.min(10));
        if let Some(strategy) = self.strategy {
            settings.strategy = strategy;
        }
        settings.validate()?;
        Ok(settings)
    }

    fn run(&self, ctx: &crate::op::OpContext) -> Result<String, FlError> {
        let settings = self.settings(ctx)?;
        let seed = self.seed.unwrap_or_else(rand::random);
        let mut rng = StdRng::seed_from_u64(seed);
        let clients = synthesize(&mut rng, self.clients, self.samples, settings.num_features);
        let all_data: Vec<(Vec<f64>, f64)> = clients.iter().flat_map(|c| c.data.clone()).collect();

        tracing::info!(
            clients = self.clients,
            rounds = settings.max_rounds,
            strategy = %settings.strategy,
            seed,
            "starting federated simulation"
        );

        let coordinator = Coordinator::new(settings.clone())?;
        check(coordinator.handle(Request::InitModel { num_features: None }))?;
        for client in &clients {
            check(coordinator.handle(Request::Register {
                client_id: client.id.clone(),
                metadata: [("samples".to_string(), client.data.len().to_string())].into(),
            }))?;
        }

        let mut lines = vec![
            format!(
                "Federated simulation: {} clients, {} rounds, strategy {}, seed {}",
                self.clients, settings.max_rounds, settings.strategy, seed
            ),
            format!(
                "{:>5}  {:>7}  {:>7}  {:>9}  {:>9}",
                "round", "clients", "samples", "local_acc", "global_acc"
            ),
        ];

        for _ in 0..settings.max_rounds {
            let model = match check(coordinator.handle(Request::StartRound))? {
                Response::RoundStarted { model, .. } => model,
                other => return Err(FlError::Unexpected(format!("{:?}", other))),
            };

            for client in &clients {
                let (trained, local_accuracy) = client.train(&model, self.epochs, self.learning_rate)?;
                let update = ClientUpdate::new(
                    client.id.clone(),
                    trained.weights,
                    trained.bias,
                    client.data.len() as u64,
                )
                .with_accuracy(local_accuracy);
                check(coordinator.handle(Request::SubmitUpdate(update)))?;
            }

            let (model, record) = match check(coordinator.handle(Request::Aggregate))? {
                Response::RoundCompleted { model, record } => (model, record),
                other => return Err(FlError::Unexpected(format!("{:?}", other))),
            };
            let global_accuracy = accuracy(&model, &all_data)?;
            tracing::debug!(round = record.round, global_accuracy, "evaluated global model");

            let local = record
                .avg_local_accuracy
                .map(|a| format!("{:.3}", a))
                .unwrap_or_else(|| "-".to_string());
            lines.push(format!(
                "{:>5}  {:>7}  {:>7}  {:>9}  {:>9.3}",
                record.round, record.num_clients, record.total_samples, local, global_accuracy
            ));
        }

        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::op::{Op, OpContext};

    fn simulate(clients: usize, rounds: u32) -> Fl {
        Fl {
            command: FlCommand::Simulate(Simulate {
                clients,
                rounds: Some(rounds),
                samples: 50,
                epochs: 2,
                learning_rate: 0.5,
                strategy: None,
                seed: Some(7),
            }),
        }
    }

    #[tokio::test]
    async fn test_simulation_runs_every_round() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = OpContext::new(Some(dir.path().join("uninitialized")));

        let output = simulate(3, 3).execute(&ctx).await.unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2 + 3);
        assert!(lines[2].trim_start().starts_with('1'));
        assert!(lines[4].contains("150"));
    }

    #[tokio::test]
    async fn test_simulation_is_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = OpContext::new(Some(dir.path().join("uninitialized")));

        let first = simulate(2, 2).execute(&ctx).await.unwrap();
        let second = simulate(2, 2).execute(&ctx).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_too_few_clients() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = OpContext::new(Some(dir.path().join("uninitialized")));

        let err = simulate(1, 1).execute(&ctx).await.unwrap_err();
        assert!(matches!(
            err,
            FlError::Coordinator { ref kind, .. } if kind == "insufficient_clients"
        ));
    }

    #[tokio::test]
    async fn test_zero_rounds_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = OpContext::new(Some(dir.path().join("uninitialized")));

        let err = simulate(3, 0).execute(&ctx).await.unwrap_err();
        assert!(matches!(err, FlError::Settings(SettingsError::NoRounds)));
    }

    #[tokio::test]
    async fn test_malformed_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state");
        let state = crate::state::AppState::init(Some(path.clone()), None).unwrap();
        std::fs::write(&state.config_path, "[federated\n").unwrap();

        let ctx = OpContext::new(Some(path));
        let err = simulate(3, 1).execute(&ctx).await.unwrap_err();
        assert!(matches!(err, FlError::State(StateError::TomlDe(_))));
    }

    #[test]
    fn test_parse_strategy() {
        assert_eq!(parse_strategy("mean"), Ok(AggregationStrategy::Mean));
        assert!(parse_strategy("median").is_err());
    }
}
