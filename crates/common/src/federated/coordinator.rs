use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::aggregator::{AggregateError, AggregationStrategy};
use super::model::{DimensionMismatch, GlobalModel};
use super::settings::{FederatedSettings, SettingsError};
use super::update::{ClientId, ClientUpdate};

/// Where the coordinator is in its round cycle
///
/// ```text
/// IDLE --start_round--> COLLECTING --aggregate--> AGGREGATING --> IDLE
/// ```
///
/// Once the model has completed `max_rounds` rounds the coordinator stays
///  IDLE and refuses to start another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundState {
    Idle,
    Collecting,
    Aggregating,
}

impl std::fmt::Display for RoundState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoundState::Idle => write!(f, "idle"),
            RoundState::Collecting => write!(f, "collecting"),
            RoundState::Aggregating => write!(f, "aggregating"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoordinatorError {
    #[error("operation requires the {expected} state, coordinator is {actual}")]
    WrongState {
        expected: RoundState,
        actual: RoundState,
    },
    #[error("global model is already initialized")]
    AlreadyInitialized,
    #[error("global model is not initialized")]
    NotInitialized,
    #[error("client '{0}' already submitted an update this round")]
    DuplicateSubmission(ClientId),
    #[error("need at least {required} registered clients, have {registered}")]
    InsufficientClients { required: usize, registered: usize },
    #[error("no updates with samples to aggregate")]
    NoUpdates,
    #[error("total sample count of the round overflows")]
    SampleOverflow,
    #[error("training complete after {0} rounds")]
    TrainingComplete(u32),
    #[error("client '{0}' is not registered")]
    UnknownClient(ClientId),
    #[error("invalid update from '{client_id}': {reason}")]
    InvalidUpdate { client_id: ClientId, reason: String },
    #[error("invalid model: {0}")]
    InvalidModel(String),
    #[error(transparent)]
    Dimension(#[from] DimensionMismatch),
}

impl CoordinatorError {
    /// Stable machine-readable name, used on the request/response boundary
    pub fn kind(&self) -> &'static str {
        match self {
            CoordinatorError::WrongState { .. } => "wrong_state",
            CoordinatorError::AlreadyInitialized => "already_initialized",
            CoordinatorError::NotInitialized => "not_initialized",
            CoordinatorError::DuplicateSubmission(_) => "duplicate_submission",
            CoordinatorError::InsufficientClients { .. } => "insufficient_clients",
            CoordinatorError::NoUpdates => "no_updates",
            CoordinatorError::SampleOverflow => "sample_overflow",
            CoordinatorError::TrainingComplete(_) => "training_complete",
            CoordinatorError::UnknownClient(_) => "unknown_client",
            CoordinatorError::InvalidUpdate { .. } => "invalid_update",
            CoordinatorError::InvalidModel(_) => "invalid_model",
            CoordinatorError::Dimension(_) => "dimension_mismatch",
        }
    }
}

impl From<AggregateError> for CoordinatorError {
    fn from(err: AggregateError) -> Self {
        match err {
            AggregateError::NothingToAggregate => CoordinatorError::NoUpdates,
            AggregateError::SampleOverflow => CoordinatorError::SampleOverflow,
        }
    }
}

/// One completed round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round: u32,
    pub num_clients: usize,
    pub total_samples: u64,
    pub avg_local_accuracy: Option<f64>,
    pub strategy: AggregationStrategy,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    /// Free-form labels supplied at registration
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub registered_at: DateTime<Utc>,
    pub rounds_participated: u32,
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorStatus {
    pub state: RoundState,
    pub initialized: bool,
    /// Completed rounds
    pub current_round: u32,
    pub max_rounds: u32,
    pub registered_clients: usize,
    pub min_clients_required: usize,
    pub pending_updates: usize,
    pub history_len: usize,
}

/// Acknowledgement of a buffered update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub client_id: ClientId,
    /// The round being collected
    pub round: u32,
    pub pending_updates: usize,
}

/// Federated averaging coordinator
///
/// A single owned object holding the global model, the registered clients
///  and the round state. Cheap to clone; clones share state.
///
/// Submissions are an atomic check-and-insert under the coordinator lock,
///  so a client can land at most one update per round. [`Coordinator::aggregate`]
///  leaves COLLECTING under the same lock before it takes the buffer, so
///  no update can slip in while the combination is computed.
#[derive(Debug, Clone)]
pub struct Coordinator(Arc<Mutex<CoordinatorInner>>);

#[derive(Debug)]
struct CoordinatorInner {
    settings: FederatedSettings,
    model: Option<GlobalModel>,
    state: RoundState,
    clients: BTreeMap<ClientId, ClientInfo>,
    buffer: BTreeMap<ClientId, ClientUpdate>,
    history: Vec<RoundRecord>,
    round_started_at: Option<DateTime<Utc>>,
}

impl CoordinatorInner {
    fn expect_state(&self, expected: RoundState) -> Result<(), CoordinatorError> {
        if self.state != expected {
            return Err(CoordinatorError::WrongState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    fn model(&self) -> Result<&GlobalModel, CoordinatorError> {
        self.model.as_ref().ok_or(CoordinatorError::NotInitialized)
    }
}

/// Holds the buffer taken for an aggregation
///
/// Unless [`AggregationGuard::complete`] is called, dropping the guard puts
///  the updates back and reopens COLLECTING. This covers error returns and
///  unwinding alike. Must not be dropped while the coordinator lock is held.
struct AggregationGuard<'a> {
    coordinator: &'a Coordinator,
    updates: Option<Vec<ClientUpdate>>,
}

impl AggregationGuard<'_> {
    fn updates(&self) -> &[ClientUpdate] {
        self.updates.as_deref().unwrap_or_default()
    }

    fn complete(mut self) -> Vec<ClientUpdate> {
        self.updates.take().unwrap_or_default()
    }
}

impl Drop for AggregationGuard<'_> {
    fn drop(&mut self) {
        let Some(updates) = self.updates.take() else {
            return;
        };
        let mut inner = self.coordinator.0.lock();
        inner.buffer = updates
            .into_iter()
            .map(|u| (u.client_id.clone(), u))
            .collect();
        inner.state = RoundState::Collecting;
        tracing::debug!(pending_updates = inner.buffer.len(), "round reopened");
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::with_settings(FederatedSettings::default())
    }
}

impl Coordinator {
    /// Build a coordinator, refusing settings that could never run a round
    pub fn new(settings: FederatedSettings) -> Result<Self, SettingsError> {
        settings.validate()?;
        Ok(Self::with_settings(settings))
    }

    fn with_settings(settings: FederatedSettings) -> Self {
        Self(Arc::new(Mutex::new(CoordinatorInner {
            settings,
            model: None,
            state: RoundState::Idle,
            clients: BTreeMap::new(),
            buffer: BTreeMap::new(),
            history: Vec::new(),
            round_started_at: None,
        })))
    }

    pub fn settings(&self) -> FederatedSettings {
        self.0.lock().settings.clone()
    }

    /// Zero-initialise the global model at round 0
    pub fn init_model(&self, num_features: usize) -> Result<GlobalModel, CoordinatorError> {
        if num_features == 0 {
            return Err(CoordinatorError::InvalidModel(
                "a model needs at least one feature".to_string(),
            ));
        }
        self.install_initial(GlobalModel::zeros(num_features))
    }

    /// Initialise the global model from explicit parameters at round 0
    pub fn init_model_with(&self, weights: Vec<f64>, bias: f64) -> Result<GlobalModel, CoordinatorError> {
        if weights.is_empty() {
            return Err(CoordinatorError::InvalidModel(
                "a model needs at least one feature".to_string(),
            ));
        }
        if !bias.is_finite() || weights.iter().any(|w| !w.is_finite()) {
            return Err(CoordinatorError::InvalidModel(
                "parameters must be finite".to_string(),
            ));
        }
        self.install_initial(GlobalModel::with_parameters(weights, bias))
    }

    fn install_initial(&self, model: GlobalModel) -> Result<GlobalModel, CoordinatorError> {
        let mut inner = self.0.lock();
        if inner.model.is_some() {
            return Err(CoordinatorError::AlreadyInitialized);
        }
        tracing::info!(num_features = model.num_features, "initialized global model");
        inner.model = Some(model.clone());
        Ok(model)
    }

    /// Drop the model, clients, pending updates and history
    ///
    /// Refused while a round is being aggregated.
    pub fn reset(&self) -> Result<(), CoordinatorError> {
        let mut inner = self.0.lock();
        if inner.state == RoundState::Aggregating {
            return Err(CoordinatorError::WrongState {
                expected: RoundState::Idle,
                actual: RoundState::Aggregating,
            });
        }
        inner.model = None;
        inner.state = RoundState::Idle;
        inner.clients.clear();
        inner.buffer.clear();
        inner.history.clear();
        inner.round_started_at = None;
        tracing::info!("coordinator reset");
        Ok(())
    }

    /// Register a client. Registering twice is a no-op; returns whether
    ///  the client was new.
    pub fn register_client(&self, client_id: &str) -> bool {
        self.register_client_with(client_id, BTreeMap::new())
    }

    /// Register a client along with descriptive metadata
    ///
    /// An already registered client keeps its original metadata.
    pub fn register_client_with(&self, client_id: &str, metadata: BTreeMap<String, String>) -> bool {
        let mut inner = self.0.lock();
        if inner.clients.contains_key(client_id) {
            return false;
        }
        inner.clients.insert(
            client_id.to_string(),
            ClientInfo {
                client_id: client_id.to_string(),
                metadata,
                registered_at: Utc::now(),
                rounds_participated: 0,
                last_update: None,
            },
        );
        tracing::info!(client_id, registered = inner.clients.len(), "registered client");
        true
    }

    /// Remove a client, along with any update it has pending this round
    pub fn unregister_client(&self, client_id: &str) -> bool {
        let mut inner = self.0.lock();
        let removed = inner.clients.remove(client_id).is_some();
        if removed && inner.state == RoundState::Collecting {
            inner.buffer.remove(client_id);
        }
        if removed {
            tracing::info!(client_id, "unregistered client");
        }
        removed
    }

    pub fn client(&self, client_id: &str) -> Option<ClientInfo> {
        self.0.lock().clients.get(client_id).cloned()
    }

    /// Every registered client, ordered by id
    pub fn clients(&self) -> Vec<ClientInfo> {
        self.0.lock().clients.values().cloned().collect()
    }

    /// Open a round for submissions and return the model clients train from
    pub fn start_round(&self) -> Result<GlobalModel, CoordinatorError> {
        let mut inner = self.0.lock();
        inner.expect_state(RoundState::Idle)?;
        let model = inner.model()?.clone();
        if model.round >= inner.settings.max_rounds {
            return Err(CoordinatorError::TrainingComplete(model.round));
        }
        let registered = inner.clients.len();
        let required = inner.settings.min_clients_for_round;
        if registered < required {
            return Err(CoordinatorError::InsufficientClients {
                required,
                registered,
            });
        }

        inner.buffer.clear();
        inner.state = RoundState::Collecting;
        inner.round_started_at = Some(Utc::now());
        tracing::info!(round = model.round + 1, clients = registered, "round started");
        Ok(model)
    }

    /// Buffer one client's update for the open round
    pub fn submit_update(&self, update: ClientUpdate) -> Result<SubmitReceipt, CoordinatorError> {
        let mut inner = self.0.lock();
        inner.expect_state(RoundState::Collecting)?;
        if !inner.clients.contains_key(&update.client_id) {
            return Err(CoordinatorError::UnknownClient(update.client_id));
        }
        if inner.buffer.contains_key(&update.client_id) {
            tracing::warn!(client_id = %update.client_id, "duplicate submission rejected");
            return Err(CoordinatorError::DuplicateSubmission(update.client_id));
        }
        let model = inner.model()?;
        let round = model.round + 1;
        if let Err(reason) = update.validate(model.num_features) {
            return Err(CoordinatorError::InvalidUpdate {
                client_id: update.client_id,
                reason,
            });
        }

        let client_id = update.client_id.clone();
        if let Some(info) = inner.clients.get_mut(&client_id) {
            info.last_update = Some(Utc::now());
        }
        inner.buffer.insert(client_id.clone(), update);
        let pending_updates = inner.buffer.len();

        tracing::debug!(%client_id, round, pending_updates, "update received");
        Ok(SubmitReceipt {
            client_id,
            round,
            pending_updates,
        })
    }

    /// Combine the buffered updates into the next global model
    ///
    /// If no buffered update carries samples, or their sample counts
    ///  overflow, the round stays open with its buffer intact.
    pub fn aggregate(&self) -> Result<(GlobalModel, RoundRecord), CoordinatorError> {
        let (guard, num_features, strategy) = self.begin_aggregation()?;

        let result = strategy.aggregate(guard.updates(), num_features);
        let aggregation = match result {
            Ok(aggregation) => aggregation,
            Err(err) => {
                drop(guard);
                tracing::warn!(error = %err, "round not aggregated");
                return Err(err.into());
            }
        };
        let updates = guard.complete();

        let mut inner = self.0.lock();
        let Some(mut model) = inner.model.clone() else {
            inner.state = RoundState::Idle;
            return Err(CoordinatorError::NotInitialized);
        };
        model.weights = aggregation.weights;
        model.bias = aggregation.bias;
        model.round += 1;
        inner.model = Some(model.clone());

        for update in updates.iter().filter(|u| u.contributes()) {
            if let Some(info) = inner.clients.get_mut(&update.client_id) {
                info.rounds_participated += 1;
            }
        }

        let record = RoundRecord {
            round: model.round,
            num_clients: aggregation.num_clients,
            total_samples: aggregation.total_samples,
            avg_local_accuracy: aggregation.avg_local_accuracy,
            strategy,
            started_at: inner.round_started_at.take(),
            completed_at: Utc::now(),
        };
        inner.history.push(record.clone());
        inner.state = RoundState::Idle;

        tracing::info!(
            round = record.round,
            clients = record.num_clients,
            total_samples = record.total_samples,
            %strategy,
            "round aggregated"
        );
        Ok((model, record))
    }

    /// Leave COLLECTING and take the buffer, under one lock
    fn begin_aggregation(
        &self,
    ) -> Result<(AggregationGuard<'_>, usize, AggregationStrategy), CoordinatorError> {
        let mut inner = self.0.lock();
        inner.expect_state(RoundState::Collecting)?;
        let num_features = inner.model()?.num_features;
        if !inner.buffer.values().any(ClientUpdate::contributes) {
            return Err(CoordinatorError::NoUpdates);
        }
        inner.state = RoundState::Aggregating;
        let updates: Vec<ClientUpdate> = std::mem::take(&mut inner.buffer).into_values().collect();
        let guard = AggregationGuard {
            coordinator: self,
            updates: Some(updates),
        };
        Ok((guard, num_features, inner.settings.strategy))
    }

    /// Snapshot of the global model, valid in any round state
    pub fn model(&self) -> Result<GlobalModel, CoordinatorError> {
        self.0.lock().model().cloned()
    }

    pub fn state(&self) -> RoundState {
        self.0.lock().state
    }

    pub fn status(&self) -> CoordinatorStatus {
        let inner = self.0.lock();
        CoordinatorStatus {
            state: inner.state,
            initialized: inner.model.is_some(),
            current_round: inner.model.as_ref().map(|m| m.round).unwrap_or(0),
            max_rounds: inner.settings.max_rounds,
            registered_clients: inner.clients.len(),
            min_clients_required: inner.settings.min_clients_for_round,
            pending_updates: inner.buffer.len(),
            history_len: inner.history.len(),
        }
    }

    pub fn history(&self) -> Vec<RoundRecord> {
        self.0.lock().history.clone()
    }

    /// Positive-class probabilities for each sample under the current model
    pub fn predict_proba(&self, samples: &[Vec<f64>]) -> Result<Vec<f64>, CoordinatorError> {
        let model = self.model()?;
        samples
            .iter()
            .map(|x| model.predict_proba(x).map_err(CoordinatorError::from))
            .collect()
    }
}
